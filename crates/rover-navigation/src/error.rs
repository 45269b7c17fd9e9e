//! This module defines the error types used by the `rover-navigation` crate.

#![warn(missing_docs)]

/// Error type for navigation operations.
///
/// This enum encapsulates the failures a caller can act on: bad map parameters,
/// out-of-bounds access, undecodable map descriptors or sensor frames, and goals
/// the planner cannot reach.
#[derive(Debug, PartialEq)]
pub enum NavigationError {
    /// Error for invalid map dimensions.
    /// Returned when the arena is too small to hold the border walls and a rover.
    InvalidDimensions(&'static str),
    /// Error for out-of-bounds access.
    /// Returned when addressing a cell outside the grid.
    OutOfBounds(&'static str),
    /// Error for a map descriptor that cannot be decoded into the grid.
    InvalidDescriptor(&'static str),
    /// Error for a hardware sensor frame that does not match the sensor layout.
    MalformedFrame(&'static str),
    /// Error for a goal the planner cannot reach from the current pose.
    Unreachable(&'static str),
}

impl core::fmt::Display for NavigationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NavigationError::InvalidDimensions(msg) => write!(f, "Invalid map dimensions: {}", msg),
            NavigationError::OutOfBounds(msg) => write!(f, "Map access out of bounds: {}", msg),
            NavigationError::InvalidDescriptor(msg) => write!(f, "Invalid map descriptor: {}", msg),
            NavigationError::MalformedFrame(msg) => write!(f, "Malformed sensor frame: {}", msg),
            NavigationError::Unreachable(msg) => write!(f, "Goal unreachable: {}", msg),
        }
    }
}

impl core::error::Error for NavigationError {}

/// Error type for the hardware link seam.
///
/// The core never retries; a transport error means "no data this cycle".
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The read did not complete within the link's timeout.
    Timeout,
    /// The peer closed the connection.
    Closed,
    /// Any other I/O failure, carried as text.
    Io(String),
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "Link read timed out"),
            TransportError::Closed => write!(f, "Link closed by peer"),
            TransportError::Io(msg) => write!(f, "Link I/O error: {}", msg),
        }
    }
}

impl core::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => TransportError::Timeout,
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::Io(e.to_string()),
        }
    }
}

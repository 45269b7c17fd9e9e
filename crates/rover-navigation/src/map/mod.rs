//! Occupancy grid, its coordinates, and the hex descriptor format.

pub mod descriptor;
pub mod grid;
pub mod point_types;

pub use descriptor::MapDescriptor;
pub use grid::{Cell, GridMap};
pub use point_types::GridPoint;

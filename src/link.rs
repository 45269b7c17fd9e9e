use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use anyhow::{Context, Result};
use rover_navigation::{RoverLink, TransportError};
use tracing::{debug, info};

/// Routing tag the controller bridge uses for messages bound to the rover.
const ROVER_TAG: &str = "A";

/// Line-oriented TCP connection to the controller bridge.
#[derive(Debug)]
pub struct TcpLink {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    line: String,
}

impl TcpLink {
    pub fn connect(address: &str, read_timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(address).with_context(|| format!("connecting to controller at {address}"))?;
        stream.set_nodelay(true).context("disabling Nagle on the controller link")?;
        // A zero timeout is rejected by the socket API; treat it as "block forever".
        let timeout = (!read_timeout.is_zero()).then_some(read_timeout);
        stream.set_read_timeout(timeout).context("setting the link read timeout")?;
        let reader = BufReader::new(stream.try_clone().context("cloning the controller socket")?);
        info!(address, timeout_ms = read_timeout.as_millis() as u64, "controller link up");
        Ok(Self {
            writer: stream,
            reader,
            line: String::new(),
        })
    }
}

impl RoverLink for TcpLink {
    fn send_command(&mut self, encoded: &str) -> Result<(), TransportError> {
        let line = format!("{ROVER_TAG}{encoded}\n");
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn receive_sensor_frame(&mut self) -> Result<Option<String>, TransportError> {
        self.line.clear();
        let read = self.reader.read_line(&mut self.line)?;
        if read == 0 {
            return Err(TransportError::Closed);
        }
        let frame = self.line.trim();
        debug!(frame, "received sensor frame");
        Ok((!frame.is_empty()).then(|| frame.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_commands_are_tagged_and_frames_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let controller = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut stream = stream;
            stream.write_all(b"F1,1|F2,-1|F3,-1|R1,-1|R2,-1|L1,-1\n").unwrap();
            line
        });

        let mut link = TcpLink::connect(&address, Duration::from_secs(2)).unwrap();
        link.send_command("W3|").unwrap();
        let frame = link.receive_sensor_frame().unwrap();

        assert_eq!(controller.join().unwrap(), "AW3|\n", "outgoing lines carry the rover tag");
        assert_eq!(frame.as_deref(), Some("F1,1|F2,-1|F3,-1|R1,-1|R2,-1|L1,-1"));
    }

    #[test]
    fn test_silent_controller_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let mut link = TcpLink::connect(&address, Duration::from_millis(50)).unwrap();
        let (_held, _) = listener.accept().unwrap();

        assert_eq!(link.receive_sensor_frame(), Err(TransportError::Timeout));
    }

    #[test]
    fn test_closed_controller_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let mut link = TcpLink::connect(&address, Duration::from_secs(2)).unwrap();
        drop(listener.accept().unwrap());

        assert_eq!(link.receive_sensor_frame(), Err(TransportError::Closed));
    }
}

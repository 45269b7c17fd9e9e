//! The hardware controller seam: an injected link and the sensor frame format.
//!
//! The rover never owns a socket. It is handed a [`RoverLink`] at construction,
//! which lets tests substitute a [`ScriptedLink`].

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{NavigationError, TransportError};
use crate::sensor::{Sensor, SensorId};

/// Transport to the rover's motor/sensor controller.
pub trait RoverLink: Send {
    /// Sends one encoded command such as `W1|`.
    fn send_command(&mut self, encoded: &str) -> Result<(), TransportError>;

    /// Blocks for the next raw sensor frame. `Ok(None)` means nothing arrived.
    fn receive_sensor_frame(&mut self) -> Result<Option<String>, TransportError>;
}

/// One decoded sensor frame: a reading, or none, for every sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFrame {
    readings: Vec<(SensorId, Option<i32>)>,
}

impl SensorFrame {
    /// Decodes `F1,2|F2,-1|...` against the rover's sensor set.
    ///
    /// The first pair must belong to `F1` and every sensor must appear exactly once.
    /// Distances outside a sensor's window become "no reading".
    pub fn parse(raw: &str, sensors: &[Sensor]) -> Result<Self, NavigationError> {
        let pairs: Vec<&str> = raw.trim().split('|').map(str::trim).filter(|p| !p.is_empty()).collect();
        if !pairs.first().is_some_and(|p| p.starts_with(SensorId::F1.wire_id())) {
            return Err(NavigationError::MalformedFrame("Frame must start with the front sensor"));
        }

        let mut readings = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let (id, distance) = pair
                .split_once(',')
                .ok_or(NavigationError::MalformedFrame("Expected `id,distance`"))?;
            let id = SensorId::from_wire(id.trim()).ok_or(NavigationError::MalformedFrame("Unknown sensor id"))?;
            let distance: i32 = distance
                .trim()
                .parse()
                .map_err(|_| NavigationError::MalformedFrame("Distance is not an integer"))?;
            if readings.iter().any(|(seen, _)| *seen == id) {
                return Err(NavigationError::MalformedFrame("Sensor reported twice"));
            }
            let sensor = sensors
                .iter()
                .find(|s| s.id() == id)
                .ok_or(NavigationError::MalformedFrame("Sensor not mounted"))?;
            readings.push((id, sensor.in_window(distance).then_some(distance)));
        }

        if sensors.iter().any(|s| !readings.iter().any(|(id, _)| *id == s.id())) {
            return Err(NavigationError::MalformedFrame("Frame is missing a sensor"));
        }
        Ok(Self { readings })
    }

    /// Reading for `id`, `None` when out of window or absent.
    pub fn get(&self, id: SensorId) -> Option<i32> {
        self.readings.iter().find(|(s, _)| *s == id).and_then(|(_, d)| *d)
    }
}

/// In-memory link that records commands and replays queued frames.
///
/// Clones share state, so a test can keep one handle while the rover owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLink {
    sent: Arc<Mutex<Vec<String>>>,
    frames: Arc<Mutex<VecDeque<Result<String, TransportError>>>>,
}

impl ScriptedLink {
    /// Empty link: no frames queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw frame for the next receive.
    pub fn push_frame(&self, raw: impl Into<String>) {
        self.frames.lock().push_back(Ok(raw.into()));
    }

    /// Queues a transport failure for the next receive.
    pub fn push_error(&self, error: TransportError) {
        self.frames.lock().push_back(Err(error));
    }

    /// Every command sent so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl RoverLink for ScriptedLink {
    fn send_command(&mut self, encoded: &str) -> Result<(), TransportError> {
        self.sent.lock().push(encoded.to_string());
        Ok(())
    }

    fn receive_sensor_frame(&mut self) -> Result<Option<String>, TransportError> {
        self.frames.lock().pop_front().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::Direction;
    use crate::map::GridPoint;

    fn sensors() -> Vec<Sensor> {
        Sensor::layout(GridPoint::new(3, 3), Direction::Up)
    }

    #[test]
    fn test_parse_full_frame() {
        let frame = SensorFrame::parse("F1,1|F2,-1|F3,2|R1,5|R2,1|L1,3\n", &sensors()).unwrap();
        assert_eq!(frame.get(SensorId::F1), Some(1));
        assert_eq!(frame.get(SensorId::F2), None);
        assert_eq!(frame.get(SensorId::R1), None, "5 is outside the short window");
        assert_eq!(frame.get(SensorId::L1), Some(3));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let s = sensors();
        for raw in [
            "",
            "F2,1|F1,1|F3,1|R1,1|R2,1|L1,3",
            "F1,1|F2,1|F3,1|R1,1|R2,1",
            "F1,1|F2,x|F3,1|R1,1|R2,1|L1,3",
            "F1,1|F1,1|F3,1|R1,1|R2,1|L1,3",
            "F1,1|F2,1|F3,1|R1,1|R2,1|Q7,3",
        ] {
            assert!(
                matches!(SensorFrame::parse(raw, &s), Err(NavigationError::MalformedFrame(_))),
                "frame {raw:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_scripted_link_replays_in_order() {
        let handle = ScriptedLink::new();
        let mut link: Box<dyn RoverLink> = Box::new(handle.clone());
        handle.push_frame("a");
        handle.push_error(TransportError::Timeout);

        link.send_command("W1|").unwrap();
        assert_eq!(link.receive_sensor_frame(), Ok(Some("a".to_string())));
        assert_eq!(link.receive_sensor_frame(), Err(TransportError::Timeout));
        assert_eq!(link.receive_sensor_frame(), Ok(None));
        assert_eq!(handle.sent(), vec!["W1|"]);
    }
}

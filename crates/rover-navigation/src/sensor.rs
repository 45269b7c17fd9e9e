//! Fixed-offset range sensors carried by the rover.

#![warn(missing_docs)]

use crate::direction::Direction;
use crate::map::{GridMap, GridPoint};

/// Identity of one of the six range sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorId {
    /// Front row, left column, facing forward.
    F1,
    /// Front row, centre column, facing forward.
    F2,
    /// Front row, right column, facing forward.
    F3,
    /// Front row, right column, facing right.
    R1,
    /// Front row, left column, facing left.
    R2,
    /// Middle row, left column, long range, facing left.
    L1,
}

impl SensorId {
    /// All sensors in frame order.
    pub const ALL: [SensorId; 6] = [SensorId::F1, SensorId::F2, SensorId::F3, SensorId::R1, SensorId::R2, SensorId::L1];

    /// Identifier used in hardware sensor frames.
    pub const fn wire_id(self) -> &'static str {
        match self {
            SensorId::F1 => "F1",
            SensorId::F2 => "F2",
            SensorId::F3 => "F3",
            SensorId::R1 => "R1",
            SensorId::R2 => "R2",
            SensorId::L1 => "L1",
        }
    }

    /// Parses a hardware frame identifier.
    pub fn from_wire(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.wire_id() == id)
    }
}

/// Short-range window used by the front and side sensors.
pub const SHORT_RANGE: (i32, i32) = (1, 2);
/// Long-range window of the left-side sensor.
pub const LONG_RANGE: (i32, i32) = (3, 4);

/// A range sensor: a cell on the rover body, a facing, and a detection window.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    id: SensorId,
    min_range: i32,
    max_range: i32,
    pos: GridPoint,
    dir: Direction,
}

impl Sensor {
    /// Creates a sensor mounted at `pos` looking along `dir`.
    pub const fn new(id: SensorId, (min_range, max_range): (i32, i32), pos: GridPoint, dir: Direction) -> Self {
        Self { id, min_range, max_range, pos, dir }
    }

    /// The standard six-sensor layout for a rover centred on `center` facing `heading`.
    ///
    /// The layout is defined facing up and rotated rigidly into place.
    pub fn layout(center: GridPoint, heading: Direction) -> Vec<Sensor> {
        let (x, y) = (center.x, center.y);
        let mut sensors = vec![
            Sensor::new(SensorId::F1, SHORT_RANGE, GridPoint::new(x - 1, y + 1), Direction::Up),
            Sensor::new(SensorId::F2, SHORT_RANGE, GridPoint::new(x, y + 1), Direction::Up),
            Sensor::new(SensorId::F3, SHORT_RANGE, GridPoint::new(x + 1, y + 1), Direction::Up),
            Sensor::new(SensorId::R1, SHORT_RANGE, GridPoint::new(x + 1, y + 1), Direction::Right),
            Sensor::new(SensorId::R2, SHORT_RANGE, GridPoint::new(x - 1, y + 1), Direction::Left),
            Sensor::new(SensorId::L1, LONG_RANGE, GridPoint::new(x - 1, y), Direction::Left),
        ];
        let right_turns = match heading {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        };
        for sensor in &mut sensors {
            if right_turns == 3 {
                sensor.rotate_left(center);
            } else {
                (0..right_turns).for_each(|_| sensor.rotate_right(center));
            }
        }
        sensors
    }

    /// Sensor identity.
    pub fn id(&self) -> SensorId {
        self.id
    }

    /// Nearest detectable distance.
    pub fn min_range(&self) -> i32 {
        self.min_range
    }

    /// Farthest detectable distance.
    pub fn max_range(&self) -> i32 {
        self.max_range
    }

    /// Mounting cell.
    pub fn position(&self) -> GridPoint {
        self.pos
    }

    /// Facing.
    pub fn direction(&self) -> Direction {
        self.dir
    }

    /// Whether `distance` falls inside the detection window.
    pub fn in_window(&self, distance: i32) -> bool {
        (self.min_range..=self.max_range).contains(&distance)
    }

    /// The cell `distance` steps away along the facing.
    pub fn ray(&self, distance: i32) -> GridPoint {
        self.pos.step(self.dir, distance)
    }

    /// Moves the sensor with the rover.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        self.pos = GridPoint::new(self.pos.x + dx, self.pos.y + dy);
    }

    /// Rotates the mount 90° anticlockwise about `center`.
    pub fn rotate_left(&mut self, center: GridPoint) {
        let (x0, y0) = (center.x, center.y);
        self.pos = GridPoint::new(x0 + y0 - self.pos.y, self.pos.x - x0 + y0);
        self.dir = self.dir.anticlockwise();
    }

    /// Rotates the mount 90° clockwise about `center`.
    pub fn rotate_right(&mut self, center: GridPoint) {
        let (x0, y0) = (center.x, center.y);
        self.pos = GridPoint::new(self.pos.y - y0 + x0, x0 + y0 - self.pos.x);
        self.dir = self.dir.clockwise();
    }

    /// Simulated reading against a ground-truth arena.
    ///
    /// Walks outward from the mount. The first step past the grid edge is the wall and
    /// the first ground-truth obstacle blocks the ray; either is reported only if it
    /// falls inside the window, so an obstacle closer than `min_range` hides
    /// everything behind it.
    pub fn detect(&self, arena: &GridMap) -> Option<i32> {
        for distance in 1..=self.max_range {
            let blocked = arena.cell(self.ray(distance)).is_none_or(|c| c.is_obstacle());
            if blocked {
                return self.in_window(distance).then_some(distance);
            }
        }
        None
    }
}

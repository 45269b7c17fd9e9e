//! The rover agent: pose, sensor set, motion primitives, and the map updates that
//! follow each sensing pass.
//!
//! A rover is built around a [`Backend`] that decides where readings come from:
//! a ground-truth arena in simulation, an injected [`RoverLink`] on hardware, or
//! nothing at all for the shadow rover used to turn paths into commands.
//!
//! Hardware moves drift, so the rover tracks how far it has gone since it last
//! squared up against a surface and issues alignment commands when needed. None of
//! that happens in simulation.

use std::fmt;
use std::time::Duration;

use spin_sleep::SpinSleeper;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::direction::Direction;
use crate::link::{RoverLink, SensorFrame};
use crate::map::{GridMap, GridPoint};
use crate::sensor::{Sensor, SensorId};

/// Steps and turns tolerated before a right-wall alignment is due.
pub const CALIBRATE_AFTER: u32 = 4;
/// Consecutive touching readings on the right before a forced alignment.
pub const SIDE_CONTACT_STREAK: u32 = 3;

/// Where sensor readings come from and where commands go.
pub enum Backend {
    /// Readings are computed against a ground-truth arena.
    Simulated {
        /// The real arena; only its obstacle flags are read.
        arena: GridMap,
        /// Sleep per executed step, emulating the real rover's speed.
        pacing: Option<Duration>,
    },
    /// Readings and commands travel over a controller link.
    Hardware {
        /// The injected transport.
        link: Box<dyn RoverLink>,
    },
    /// No sensing and no transport.
    Detached,
}

impl Backend {
    /// Simulation backend. `steps_per_second == 0` disables pacing.
    pub fn simulated(arena: GridMap, steps_per_second: u32) -> Self {
        let pacing = (steps_per_second > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(steps_per_second)));
        Backend::Simulated { arena, pacing }
    }

    /// Hardware backend over `link`.
    pub fn hardware(link: impl RoverLink + 'static) -> Self {
        Backend::Hardware { link: Box::new(link) }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Simulated { pacing, .. } => f.debug_struct("Simulated").field("pacing", pacing).finish_non_exhaustive(),
            Backend::Hardware { .. } => f.write_str("Hardware"),
            Backend::Detached => f.write_str("Detached"),
        }
    }
}

/// Whether moves record the swept footprint as traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Mapping the arena; swept cells become pass-through.
    Exploring,
    /// Replaying a planned route over a known map.
    FollowingPath,
}

/// Drift counters that decide when to realign on hardware.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Steps moved plus turns made since the last alignment.
    pub steps_since_alignment: u32,
    /// Consecutive sensing passes with an obstacle touching the right side.
    pub side_contact_streak: u32,
}

/// The 3×3 rover: pose, sensors and the backend it talks to.
#[derive(Debug)]
pub struct Rover {
    pos: GridPoint,
    heading: Direction,
    sensors: Vec<Sensor>,
    backend: Backend,
    mode: Mode,
    calibration: Calibration,
    awaiting_frame: bool,
    sleeper: SpinSleeper,
}

impl Rover {
    /// Places a rover centred on `start` facing `heading`.
    pub fn new(start: GridPoint, heading: Direction, backend: Backend) -> Self {
        Self {
            pos: start,
            heading,
            sensors: Sensor::layout(start, heading),
            backend,
            mode: Mode::Exploring,
            calibration: Calibration::default(),
            awaiting_frame: false,
            sleeper: SpinSleeper::new(100_000),
        }
    }

    /// A disposable copy of a pose that never senses or transmits.
    pub fn shadow(pos: GridPoint, heading: Direction) -> Self {
        let mut rover = Self::new(pos, heading, Backend::Detached);
        rover.mode = Mode::FollowingPath;
        rover
    }

    /// Centre cell.
    pub fn position(&self) -> GridPoint {
        self.pos
    }

    /// Current heading.
    pub fn heading(&self) -> Direction {
        self.heading
    }

    /// Mounted sensors at their current positions.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// Current motion mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches between exploring and path following.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Current drift counters.
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Whether commands go to a real controller.
    pub fn is_hardware(&self) -> bool {
        matches!(self.backend, Backend::Hardware { .. })
    }

    /// Teleports the rover, re-laying its sensors. Used by shadow rovers.
    pub fn set_pose(&mut self, pos: GridPoint, heading: Direction) {
        self.pos = pos;
        self.heading = heading;
        self.sensors = Sensor::layout(pos, heading);
    }

    /// Drives `steps` cells forward or backward.
    ///
    /// Each step is validated with [`GridMap::check_valid_move`]; the rover stops
    /// before the first invalid cell. A move with no valid step is logged and skipped.
    ///
    /// # Returns
    /// * `u32` - The number of steps actually taken
    pub fn advance(&mut self, map: &mut GridMap, command: Command, steps: u32) -> u32 {
        let dir = match command {
            Command::Forward => self.heading,
            Command::Backward => self.heading.opposite(),
            other => {
                warn!(command = %other, "not a move command, skipping");
                return 0;
            }
        };

        let mut taken = 0;
        while taken < steps && map.check_valid_move(self.pos.step(dir, taken as i32 + 1)) {
            taken += 1;
        }
        if taken == 0 {
            warn!(x = self.pos.x, y = self.pos.y, heading = %self.heading, command = %command, "destination is not a valid move, skipping");
            return 0;
        }
        if taken < steps {
            debug!(requested = steps, taken, "move cut short by an invalid cell");
        }

        let (dx, dy) = dir.delta();
        for _ in 0..taken {
            self.pos = self.pos.step(dir, 1);
            self.sensors.iter_mut().for_each(|s| s.translate(dx, dy));
            if self.mode == Mode::Exploring {
                map.set_pass_through(self.pos);
            }
        }
        self.calibration.steps_since_alignment += taken;
        self.send(command, taken);
        self.pace(taken);
        taken
    }

    /// Clears both calibration counters.
    pub fn reset_calibration(&mut self) {
        self.calibration = Calibration::default();
    }

    /// Rotates 90° in place, carrying every sensor with the body.
    pub fn turn(&mut self, command: Command) -> bool {
        let center = self.pos;
        match command {
            Command::TurnLeft => {
                self.heading = self.heading.anticlockwise();
                self.sensors.iter_mut().for_each(|s| s.rotate_left(center));
            }
            Command::TurnRight => {
                self.heading = self.heading.clockwise();
                self.sensors.iter_mut().for_each(|s| s.rotate_right(center));
            }
            other => {
                warn!(command = %other, "not a turn command, skipping");
                return false;
            }
        }
        self.calibration.steps_since_alignment += 1;
        self.send(command, 1);
        self.pace(1);
        true
    }

    /// Takes one reading from every sensor and folds it into `map`.
    ///
    /// A missing or malformed hardware frame leaves the map untouched.
    ///
    /// # Returns
    /// * `bool` - Whether a full set of readings was applied
    pub fn sense(&mut self, map: &mut GridMap) -> bool {
        let readings: Vec<Option<i32>> = match &self.backend {
            Backend::Simulated { arena, .. } => self.sensors.iter().map(|s| s.detect(arena)).collect(),
            Backend::Hardware { .. } => {
                let Some(frame) = self.read_frame() else {
                    return false;
                };
                self.sensors.iter().map(|s| frame.get(s.id())).collect()
            }
            Backend::Detached => return false,
        };

        let mut changed = false;
        for (sensor, reading) in self.sensors.iter().zip(&readings) {
            changed |= if sensor.min_range() > 1 {
                apply_long_reading(map, sensor, *reading)
            } else {
                apply_reading(map, sensor, *reading)
            };
        }
        if changed {
            map.reinitialize_virtual_wall();
        }

        let touching = self
            .sensors
            .iter()
            .zip(&readings)
            .any(|(s, r)| s.id() == SensorId::R1 && *r == Some(1));
        self.calibration.side_contact_streak = if touching { self.calibration.side_contact_streak + 1 } else { 0 };

        if self.is_hardware() {
            self.maybe_align_right(map);
        }
        true
    }

    /// Squares up against the surface ahead if there is one. Hardware only.
    pub fn align_front(&mut self, map: &GridMap) -> bool {
        if !self.is_hardware() {
            return false;
        }
        let ahead = |lateral: i32| is_blocked(map, self.pos.step(self.heading, 2).step(self.heading.clockwise(), lateral));
        let command = if ahead(-1) && ahead(1) {
            Command::AlignFront
        } else if ahead(0) {
            Command::AlignFrontSingle
        } else {
            return false;
        };
        debug!(command = %command, "aligning against the front surface");
        self.send(command, 1);
        self.calibration.steps_since_alignment = 0;
        true
    }

    /// Full calibration in the start zone. Hardware only.
    pub fn calibrate_at_start(&mut self) -> bool {
        if !self.is_hardware() {
            return false;
        }
        info!("calibrating in the start zone");
        self.send(Command::InitialCalibrate, 1);
        self.calibration = Calibration::default();
        true
    }

    /// Calibration before a timed path-following run. Hardware only.
    pub fn final_calibrate(&mut self) -> bool {
        if !self.is_hardware() {
            return false;
        }
        self.send(Command::FinalCalibrate, 1);
        self.calibration = Calibration::default();
        true
    }

    /// Whether both cells flanking the body on the right are walls or obstacles.
    pub fn right_side_flush(&self, map: &GridMap) -> bool {
        let right = self.heading.clockwise();
        [1, -1]
            .into_iter()
            .all(|forward| is_blocked(map, self.pos.step(self.heading, forward).step(right, 2)))
    }

    fn maybe_align_right(&mut self, map: &GridMap) {
        let due = self.right_side_flush(map) && self.calibration.steps_since_alignment > CALIBRATE_AFTER;
        let forced = self.calibration.side_contact_streak >= SIDE_CONTACT_STREAK;
        if due || forced {
            debug!(due, forced, "aligning against the right side");
            self.send(Command::AlignRight, 1);
            self.calibration = Calibration::default();
        }
    }

    fn read_frame(&mut self) -> Option<SensorFrame> {
        if !self.awaiting_frame {
            self.send(Command::SendSensors, 1);
        }
        let Backend::Hardware { link } = &mut self.backend else {
            return None;
        };
        self.awaiting_frame = false;
        match link.receive_sensor_frame() {
            Ok(Some(raw)) => match SensorFrame::parse(&raw, &self.sensors) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!(error = %e, raw = raw.trim(), "discarding sensor frame");
                    None
                }
            },
            Ok(None) => {
                debug!("no sensor frame this cycle");
                None
            }
            Err(e) => {
                warn!(error = %e, "sensor read failed, skipping map update");
                None
            }
        }
    }

    fn send(&mut self, command: Command, steps: u32) {
        let Backend::Hardware { link } = &mut self.backend else {
            return;
        };
        let encoded = command.encode(steps);
        match link.send_command(&encoded) {
            Ok(()) => {
                debug!(encoded = %encoded, "sent command");
                if command.is_motion() {
                    self.awaiting_frame = true;
                }
            }
            Err(e) => warn!(error = %e, encoded = %encoded, "failed to send command"),
        }
    }

    fn pace(&self, units: u32) {
        if let Backend::Simulated { pacing: Some(per_step), .. } = &self.backend {
            self.sleeper.sleep(*per_step * units);
        }
    }
}

fn is_blocked(map: &GridMap, p: GridPoint) -> bool {
    map.cell(p).is_none_or(|c| c.is_obstacle())
}

/// Short-range update: everything up to the reading is seen; the reading itself is an
/// obstacle unless the rover has already stood there.
fn apply_reading(map: &mut GridMap, sensor: &Sensor, reading: Option<i32>) -> bool {
    let mut changed = false;
    for distance in sensor.min_range()..=sensor.max_range() {
        let p = sensor.ray(distance);
        let Some(cell) = map.cell_mut(p) else {
            break;
        };
        cell.explored = true;
        let traversed = cell.passed_through;
        if reading == Some(distance) {
            if !traversed {
                changed |= map.mark_obstacle(p, true);
            }
            break;
        }
        changed |= map.mark_obstacle(p, false);
    }
    changed
}

/// Long-range update with the clear-corridor fallback for an empty reading.
fn apply_long_reading(map: &mut GridMap, sensor: &Sensor, reading: Option<i32>) -> bool {
    match reading {
        None => {
            let corridor_clear = (1..sensor.min_range())
                .all(|d| map.cell(sensor.ray(d)).is_some_and(|c| c.is_explored() && !c.is_obstacle()));
            if !corridor_clear {
                return false;
            }
            let mut changed = false;
            for distance in sensor.min_range()..=sensor.max_range() {
                let p = sensor.ray(distance);
                let Some(cell) = map.cell_mut(p) else {
                    break;
                };
                cell.explored = true;
                changed |= map.mark_obstacle(p, false);
            }
            changed
        }
        Some(distance) => {
            let line_clear = (1..distance).all(|d| map.cell(sensor.ray(d)).is_some_and(|c| !c.is_obstacle()));
            if !line_clear {
                return false;
            }
            for d in 1..distance {
                if let Some(cell) = map.cell_mut(sensor.ray(d)) {
                    cell.explored = true;
                }
            }
            let target = sensor.ray(distance);
            match map.cell_mut(target) {
                Some(cell) if !cell.passed_through => {
                    cell.explored = true;
                    map.mark_obstacle(target, true)
                }
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ScriptedLink;

    fn explored_map(h: usize, w: usize) -> GridMap {
        let mut map = GridMap::new(h, w).unwrap();
        map.set_all_explored();
        map
    }

    fn sim_rover(arena: GridMap, start: GridPoint, heading: Direction) -> Rover {
        Rover::new(start, heading, Backend::simulated(arena, 0))
    }

    #[test]
    fn test_move_translates_sensors_and_marks_footprint() {
        let mut map = explored_map(10, 10);
        let mut rover = sim_rover(map.clone(), GridPoint::new(2, 2), Direction::Right);
        let before: Vec<GridPoint> = rover.sensors().iter().map(Sensor::position).collect();

        assert_eq!(rover.advance(&mut map, Command::Forward, 2), 2);
        assert_eq!(rover.position(), GridPoint::new(4, 2));
        for (s, old) in rover.sensors().iter().zip(before) {
            assert_eq!(s.position(), GridPoint::new(old.x + 2, old.y), "sensor {:?} must move rigidly", s.id());
        }
        assert!(map.cell(GridPoint::new(5, 3)).unwrap().is_passed_through());
        assert!(map.cell(GridPoint::new(3, 1)).unwrap().is_passed_through());

        rover.set_mode(Mode::FollowingPath);
        rover.advance(&mut map, Command::Backward, 1);
        assert_eq!(rover.position(), GridPoint::new(3, 2));
        assert_eq!(rover.heading(), Direction::Right, "backing up keeps the heading");
    }

    #[test]
    fn test_invalid_move_is_skipped() {
        let mut map = explored_map(6, 6);
        let mut rover = sim_rover(map.clone(), GridPoint::new(1, 1), Direction::Down);
        assert_eq!(rover.advance(&mut map, Command::Forward, 1), 0);
        assert_eq!(rover.position(), GridPoint::new(1, 1));

        let mut rover = sim_rover(map.clone(), GridPoint::new(1, 1), Direction::Right);
        assert_eq!(rover.advance(&mut map, Command::Forward, 9), 3, "stops before the border wall");
        assert_eq!(rover.position(), GridPoint::new(4, 1));
        assert_eq!(rover.advance(&mut map, Command::TurnLeft, 1), 0);
    }

    #[test]
    fn test_turn_matches_fresh_layout() {
        let map = explored_map(10, 10);
        let mut rover = sim_rover(map, GridPoint::new(4, 4), Direction::Up);
        assert!(rover.turn(Command::TurnRight));
        assert_eq!(rover.heading(), Direction::Right);
        assert_eq!(rover.sensors(), Sensor::layout(GridPoint::new(4, 4), Direction::Right).as_slice());
        rover.turn(Command::TurnLeft);
        rover.turn(Command::TurnLeft);
        assert_eq!(rover.sensors(), Sensor::layout(GridPoint::new(4, 4), Direction::Left).as_slice());
        assert!(!rover.turn(Command::Forward));
    }

    #[test]
    fn test_sense_marks_obstacle_and_virtual_wall() {
        let mut arena = explored_map(10, 10);
        arena.set_obstacle(GridPoint::new(5, 2), true).unwrap();
        let mut map = GridMap::new(10, 10).unwrap();
        map.set_pass_through(GridPoint::new(2, 2));
        let mut rover = sim_rover(arena, GridPoint::new(2, 2), Direction::Right);

        assert!(rover.sense(&mut map));
        let o = map.cell(GridPoint::new(5, 2)).unwrap();
        assert!(o.is_obstacle() && o.is_explored());
        assert!(map.cell(GridPoint::new(4, 2)).unwrap().is_explored());
        assert!(!map.cell(GridPoint::new(4, 2)).unwrap().is_obstacle());
        for q in GridMap::block(GridPoint::new(5, 2)) {
            assert!(map.cell(q).unwrap().is_virtual_wall(), "{q} must be walled off");
        }
    }

    #[test]
    fn test_sense_clears_stale_obstacle_and_respects_pass_through() {
        let arena = explored_map(10, 10);
        let mut map = GridMap::new(10, 10).unwrap();
        map.set_pass_through(GridPoint::new(2, 2));
        map.set_obstacle(GridPoint::new(4, 3), true).unwrap();
        let mut rover = sim_rover(arena, GridPoint::new(2, 2), Direction::Right);
        rover.sense(&mut map);
        assert!(!map.cell(GridPoint::new(4, 3)).unwrap().is_obstacle(), "a clear reading removes the stale obstacle");
        assert!(!map.cell(GridPoint::new(5, 3)).unwrap().is_virtual_wall());

        // Arena claims an obstacle where the rover has already driven
        let mut arena = explored_map(10, 10);
        arena.set_obstacle(GridPoint::new(4, 2), true).unwrap();
        let mut map = GridMap::new(10, 10).unwrap();
        map.set_pass_through(GridPoint::new(2, 2));
        map.set_pass_through(GridPoint::new(3, 2));
        let mut rover = sim_rover(arena, GridPoint::new(2, 2), Direction::Right);
        rover.sense(&mut map);
        assert!(!map.cell(GridPoint::new(4, 2)).unwrap().is_obstacle(), "traversed cells win over readings");
    }

    #[test]
    fn test_long_sensor_corridor_and_hit() {
        let mut arena = explored_map(12, 12);
        arena.set_obstacle(GridPoint::new(5, 8), true).unwrap();
        let mut map = GridMap::new(12, 12).unwrap();
        // Heading right, the long sensor sits at (5, 3) and looks up
        map.set_pass_through(GridPoint::new(5, 2));
        let mut rover = sim_rover(arena.clone(), GridPoint::new(5, 2), Direction::Right);

        // Corridor cells (5, 4) and (5, 5) are unknown: no bulk clear
        rover.sense(&mut map);
        assert!(!map.cell(GridPoint::new(5, 7)).unwrap().is_explored());

        map.set_explored(GridPoint::new(5, 4), true).unwrap();
        map.set_explored(GridPoint::new(5, 5), true).unwrap();
        rover.sense(&mut map);
        assert!(map.cell(GridPoint::new(5, 6)).unwrap().is_explored());
        assert!(map.cell(GridPoint::new(5, 7)).unwrap().is_explored());
        assert!(!map.cell(GridPoint::new(5, 8)).unwrap().is_explored(), "beyond the window");

        // One row higher the long sensor sits at (5, 4) and reaches the obstacle
        let mut rover = sim_rover(arena, GridPoint::new(5, 3), Direction::Right);
        rover.sense(&mut map);
        let hit = map.cell(GridPoint::new(5, 8)).unwrap();
        assert!(hit.is_obstacle() && hit.is_explored(), "hit at distance 4");
        assert!(!map.cell(GridPoint::new(5, 7)).unwrap().is_obstacle());
    }

    #[test]
    fn test_front_alignment() {
        let link = ScriptedLink::new();
        let mut map = explored_map(10, 10);
        let mut rover = Rover::new(GridPoint::new(4, 8), Direction::Up, Backend::hardware(link.clone()));
        assert!(rover.align_front(&map), "the wall spans the whole front");

        map.set_obstacle(GridPoint::new(4, 6), true).unwrap();
        let mut rover = Rover::new(GridPoint::new(4, 4), Direction::Up, Backend::hardware(link.clone()));
        assert!(rover.align_front(&map));
        rover.set_pose(GridPoint::new(2, 2), Direction::Right);
        assert!(!rover.align_front(&map), "nothing two cells ahead");

        assert_eq!(link.sent(), vec!["O1|", "F1|"]);
    }

    #[test]
    fn test_shadow_rover_never_senses() {
        let mut map = GridMap::new(8, 8).unwrap();
        let mut shadow = Rover::shadow(GridPoint::new(3, 3), Direction::Up);
        assert!(!shadow.sense(&mut map));
        assert_eq!(map.explored_percentage(), 0.0);
        assert_eq!(shadow.mode(), Mode::FollowingPath);
        assert!(!shadow.align_front(&map));
        assert!(!shadow.calibrate_at_start());
    }

    #[test]
    fn test_hardware_commands_and_frames() {
        let link = ScriptedLink::new();
        let mut map = explored_map(10, 10);
        let mut rover = Rover::new(GridPoint::new(1, 1), Direction::Up, Backend::hardware(link.clone()));

        link.push_frame("F1,-1|F2,-1|F3,-1|R1,-1|R2,-1|L1,-1");
        assert!(rover.sense(&mut map));
        rover.advance(&mut map, Command::Forward, 2);
        link.push_frame("garbage");
        assert!(!rover.sense(&mut map), "malformed frames are dropped whole");
        rover.turn(Command::TurnRight);
        link.push_error(crate::error::TransportError::Timeout);
        assert!(!rover.sense(&mut map));

        assert_eq!(link.sent(), vec!["K1|", "W2|", "D1|"]);
        assert_eq!(rover.calibration().steps_since_alignment, 3);
    }

    #[test]
    fn test_side_contact_forces_alignment() {
        let link = ScriptedLink::new();
        let mut map = explored_map(10, 10);
        let mut rover = Rover::new(GridPoint::new(4, 4), Direction::Up, Backend::hardware(link.clone()));
        for _ in 0..SIDE_CONTACT_STREAK {
            link.push_frame("F1,-1|F2,-1|F3,-1|R1,1|R2,-1|L1,-1");
            rover.sense(&mut map);
        }
        assert_eq!(link.sent().last().map(String::as_str), Some("P1|"));
        assert_eq!(rover.calibration(), Calibration::default());
    }

    #[test]
    fn test_right_wall_alignment_after_drift() {
        let link = ScriptedLink::new();
        let mut map = explored_map(10, 10);
        // Heading up along the right border at x = 8
        let mut rover = Rover::new(GridPoint::new(8, 2), Direction::Up, Backend::hardware(link.clone()));
        assert!(rover.right_side_flush(&map));
        for _ in 0..5 {
            rover.advance(&mut map, Command::Forward, 1);
            link.push_frame("F1,-1|F2,-1|F3,-1|R1,1|R2,-1|L1,-1");
        }
        // Each move queued one frame; drain them
        rover.sense(&mut map);
        assert!(link.sent().contains(&"P1|".to_string()));
        assert_eq!(rover.calibration().steps_since_alignment, 0);
    }
}

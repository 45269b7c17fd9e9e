//! The exploration engine: right-hand wall hugging with stall detection, bounded
//! rerouting to unexplored space, the return home, and the follow-up tasks that
//! run on the finished map (fastest path and surface capture).
//!
//! The engine is the single writer of its [`GridMap`]. Everything it does between
//! two [`TaskControl::checkpoint`] calls is one decision followed by its motion and
//! sensing, so a pause never splits a move from the reading that follows it.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::astar::{Planner, path_commands};
use crate::command::{Command, MAX_MOVE, MoveStep, group_moves};
use crate::control::{NullSink, StatusSink, TaskControl};
use crate::direction::Direction;
use crate::error::NavigationError;
use crate::map::{GridMap, GridPoint, MapDescriptor};
use crate::report::StateReport;
use crate::rover::{Mode, Rover};
use crate::sensor::Sensor;
use crate::surface::{CAMERA_RANGE, CaptureLog, ImageClassifier, enumerate_surfaces};

/// Iterations without new coverage before a reroute is forced.
pub const CHECKING_STEP: u32 = 18;

/// Tunables for one exploration run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorationConfig {
    /// Stop once this percentage of the arena is explored.
    pub coverage_limit: f64,
    /// Wall-clock budget for the exploration loop.
    pub time_limit: Duration,
    /// Stall threshold, see [`CHECKING_STEP`].
    pub checking_step: u32,
    /// Consecutive right-turn steps tolerated before rerouting.
    pub right_turn_limit: u32,
    /// Unexplored cells considered per reroute, nearest first.
    pub reroute_targets: usize,
    /// Standing cells actually travelled to per reroute.
    pub max_reroute_attempts: usize,
    /// Replans allowed when a planned route turns out to be blocked.
    pub max_replans: u32,
    /// The start cell, also the home cell.
    pub start: GridPoint,
    /// Heading the rover calibrates against in the start zone.
    pub home_heading: Direction,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            coverage_limit: 100.0,
            time_limit: Duration::from_secs(360),
            checking_step: CHECKING_STEP,
            right_turn_limit: 3,
            reroute_targets: 16,
            max_reroute_attempts: 6,
            max_replans: 5,
            start: GridPoint::new(1, 1),
            home_heading: Direction::Down,
        }
    }
}

/// Why the exploration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Explored percentage reached the coverage limit.
    CoverageReached,
    /// The time budget ran out.
    TimeExpired,
    /// Reroutes kept failing to reveal anything new.
    NoProgress,
    /// The task was cancelled; the rover was not driven home.
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::CoverageReached => write!(f, "coverage limit reached"),
            Termination::TimeExpired => write!(f, "time limit reached"),
            Termination::NoProgress => write!(f, "no further progress possible"),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of [`ExplorationEngine::explore`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorationReport {
    /// Why the loop stopped.
    pub termination: Termination,
    /// Coverage when the engine returned.
    pub explored_pct: f64,
    /// Wall-hug iterations executed.
    pub iterations: u32,
    /// Time spent, including the return home.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reroute {
    Progress,
    NoProgress,
    NoTarget,
}

/// Stall bookkeeping owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StallCounters {
    moves: u32,
    right_moves: u32,
}

impl Default for StallCounters {
    fn default() -> Self {
        Self {
            moves: 1,
            right_moves: 0,
        }
    }
}

/// Drives a [`Rover`] over its explored [`GridMap`].
pub struct ExplorationEngine {
    map: GridMap,
    rover: Rover,
    config: ExplorationConfig,
    control: TaskControl,
    sink: Box<dyn StatusSink>,
    status: String,
    captures: CaptureLog,
    stall: StallCounters,
}

impl fmt::Debug for ExplorationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplorationEngine")
            .field("rover", &self.rover)
            .field("config", &self.config)
            .field("status", &self.status)
            .field("stall", &self.stall)
            .finish_non_exhaustive()
    }
}

impl ExplorationEngine {
    /// Creates an engine over the rover's working map.
    pub fn new(map: GridMap, rover: Rover, config: ExplorationConfig) -> Self {
        Self {
            map,
            rover,
            config,
            control: TaskControl::new(),
            sink: Box::new(NullSink),
            status: String::new(),
            captures: CaptureLog::new(),
            stall: StallCounters::default(),
        }
    }

    /// Shares a pause/cancel handle with the caller.
    pub fn with_control(mut self, control: TaskControl) -> Self {
        self.control = control;
        self
    }

    /// Sends every status transition to `sink`.
    pub fn with_sink(mut self, sink: impl StatusSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// The working map.
    pub fn map(&self) -> &GridMap {
        &self.map
    }

    /// The rover.
    pub fn rover(&self) -> &Rover {
        &self.rover
    }

    /// Last status message.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Labels captured so far.
    pub fn captures(&self) -> &CaptureLog {
        &self.captures
    }

    /// Consumes the engine, returning the map it built.
    pub fn into_map(self) -> GridMap {
        self.map
    }

    /// Everything a status consumer needs, built fresh from the current state.
    pub fn export_state(&self) -> StateReport {
        let descriptor = MapDescriptor::from_map(&self.map);
        let pos = self.rover.position();
        StateReport {
            x: pos.x,
            y: pos.y,
            heading: self.rover.heading().label().to_string(),
            explored: descriptor.explored,
            obstacles: descriptor.obstacles,
            explored_pct: self.map.explored_percentage(),
            status: self.status.clone(),
            captures: self.captures.records(),
        }
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        let pos = self.rover.position();
        info!(x = pos.x, y = pos.y, heading = %self.rover.heading(), status = %self.status, "status");
        self.sink.publish(self.export_state());
    }

    /// Explores until coverage, time or progress runs out, then drives home.
    ///
    /// Cancellation is honoured between iterations and skips the return home.
    pub fn explore(&mut self) -> ExplorationReport {
        let started = Instant::now();
        self.rover.set_mode(Mode::Exploring);
        self.stall = StallCounters::default();
        self.set_status("exploration started");

        // The body already covers its own footprint.
        self.map.set_pass_through(self.rover.position());
        self.rover.calibrate_at_start();
        self.rover.sense(&mut self.map);

        let mut iterations = 0;
        let termination = loop {
            if !self.control.checkpoint() {
                break Termination::Cancelled;
            }
            let before = self.map.explored_percentage();
            if before >= self.config.coverage_limit {
                break Termination::CoverageReached;
            }
            if started.elapsed() >= self.config.time_limit {
                break Termination::TimeExpired;
            }

            self.wall_hug_step();
            iterations += 1;

            let after = self.map.explored_percentage();
            if after > before {
                self.stall.moves = 1;
            } else {
                self.stall.moves += 1;
            }
            debug!(iterations, explored = after, moves = self.stall.moves, right_moves = self.stall.right_moves, "wall hug step");

            let at_start = self.rover.position() == self.config.start;
            let stalled = self.stall.moves % self.config.checking_step.max(1) == 0;
            let circling = self.stall.right_moves > self.config.right_turn_limit;
            if stalled || circling || (at_start && after < 100.0) {
                if at_start {
                    self.recalibrate_at_start();
                }
                if self.reroute() == Reroute::NoProgress {
                    self.set_status("no reachable unexplored space, stopping");
                    break Termination::NoProgress;
                }
                self.stall.moves = 1;
                self.stall.right_moves = 0;
            }
        };

        self.set_status(format!("exploration finished: {termination}"));
        if termination != Termination::Cancelled {
            self.return_home();
        }

        ExplorationReport {
            termination,
            explored_pct: self.map.explored_percentage(),
            iterations,
            elapsed: started.elapsed(),
        }
    }

    fn movable(&self, dir: Direction) -> bool {
        self.map.check_valid_move(self.rover.position().step(dir, 1))
    }

    /// One right-hand-rule decision: right, else forward, else left, else U-turn.
    fn wall_hug_step(&mut self) {
        let heading = self.rover.heading();
        if self.movable(heading.clockwise()) {
            self.hug_turn(Command::TurnRight);
            self.forward_and_sense();
            self.stall.right_moves += 1;
        } else if self.movable(heading) {
            self.forward_and_sense();
            self.stall.right_moves = 0;
        } else if self.movable(heading.anticlockwise()) {
            self.hug_turn(Command::TurnLeft);
            self.forward_and_sense();
            self.stall.right_moves = 0;
        } else {
            for _ in 0..2 {
                self.hug_turn(Command::TurnLeft);
            }
        }
    }

    /// Wall-hug turn. Both calibration counters restart before sensing.
    fn hug_turn(&mut self, command: Command) {
        self.rover.align_front(&self.map);
        if self.rover.turn(command) {
            self.rover.reset_calibration();
            self.rover.sense(&mut self.map);
        }
    }

    fn turn_and_sense(&mut self, command: Command) {
        if self.rover.turn(command) {
            self.rover.sense(&mut self.map);
        }
    }

    fn forward_and_sense(&mut self) -> bool {
        if !self.movable(self.rover.heading()) {
            return false;
        }
        let moved = self.rover.advance(&mut self.map, Command::Forward, 1) > 0;
        if moved {
            self.rover.sense(&mut self.map);
        }
        moved
    }

    /// Turns by the shorter way until facing `heading`, sensing after each turn.
    /// Senses once if no turn is needed.
    fn face(&mut self, heading: Direction) {
        if self.rover.heading() == heading {
            self.rover.sense(&mut self.map);
            return;
        }
        while self.rover.heading() != heading {
            let command = if self.rover.heading().clockwise() == heading {
                Command::TurnRight
            } else {
                Command::TurnLeft
            };
            self.rover.align_front(&self.map);
            self.turn_and_sense(command);
        }
    }

    /// Turns left to the home heading, sensing as it goes, then calibrates.
    fn recalibrate_at_start(&mut self) {
        self.set_status("recalibrating at start");
        for _ in 0..Direction::ALL.len() {
            if self.rover.heading() == self.config.home_heading {
                break;
            }
            self.turn_and_sense(Command::TurnLeft);
        }
        self.rover.calibrate_at_start();
    }

    /// Travels somewhere that reveals unexplored space.
    fn reroute(&mut self) -> Reroute {
        let pos = self.rover.position();
        let mut unexplored: Vec<GridPoint> = self.map.cells().filter(|c| !c.is_explored()).map(|c| c.position()).collect();
        if unexplored.is_empty() {
            return Reroute::NoTarget;
        }
        unexplored.sort_by_key(|p| p.distance_squared(pos));

        let before = self.map.explored_percentage();
        let mut attempts = 0;
        'targets: for target in unexplored.into_iter().take(self.config.reroute_targets.max(1)) {
            for (stand, heading) in self.reroute_candidates(target) {
                if attempts >= self.config.max_reroute_attempts {
                    break 'targets;
                }
                let here = self.rover.position();
                if stand != here && Planner::new(&self.map).search(here, stand, self.rover.heading()).is_none() {
                    debug!(x = stand.x, y = stand.y, "reroute candidate unreachable");
                    continue;
                }
                attempts += 1;
                self.set_status(format!("going to {stand} to look at {target}"));
                if !self.go_to(stand) {
                    continue;
                }
                match heading {
                    Some(h) => self.face(h),
                    None => {
                        self.rover.sense(&mut self.map);
                    }
                }
                if self.map.explored_percentage() > before {
                    return Reroute::Progress;
                }
            }
        }
        self.set_status("reroute found nothing new");
        Reroute::NoProgress
    }

    /// Frontier cell first, then observation posts ordered by distance to the rover.
    fn reroute_candidates(&self, target: GridPoint) -> Vec<(GridPoint, Option<Direction>)> {
        let pos = self.rover.position();
        let mut candidates = Vec::new();
        if let Some(frontier) = self.map.nearest_explored_cell(target, pos) {
            candidates.push((frontier, None));
        }

        let mut posts = Vec::new();
        let reach = 4;
        for y in target.y - reach..=target.y + reach {
            for x in target.x - reach..=target.x + reach {
                let p = GridPoint::new(x, y);
                if !self.map.check_valid_move(p) || !self.map.clear_for_robot(p) {
                    continue;
                }
                for heading in Direction::ALL {
                    if self.observes(p, heading, target) {
                        posts.push((p, heading));
                    }
                }
            }
        }
        posts.sort_by_key(|(p, _)| p.distance_squared(pos));
        candidates.extend(posts.into_iter().map(|(p, h)| (p, Some(h))));
        candidates
    }

    /// Whether a short-range sensor of a rover at `p` facing `heading` would see
    /// `target` with no known obstacle in the way.
    fn observes(&self, p: GridPoint, heading: Direction, target: GridPoint) -> bool {
        Sensor::layout(p, heading).iter().filter(|s| s.min_range() == 1).any(|s| {
            (s.min_range()..=s.max_range()).any(|k| {
                s.ray(k) == target
                    && (1..k).all(|d| self.map.cell(s.ray(d)).is_some_and(|c| !c.is_obstacle()))
            })
        })
    }

    /// Plans and drives to `target`, sensing after every command and replanning
    /// when a step turns out to be blocked.
    ///
    /// # Returns
    /// * `bool` - Whether the rover stands on `target`
    pub fn go_to(&mut self, target: GridPoint) -> bool {
        for attempt in 0..=self.config.max_replans {
            let pos = self.rover.position();
            if pos == target {
                return true;
            }
            let Some(path) = Planner::new(&self.map).search(pos, target, self.rover.heading()) else {
                warn!(x = target.x, y = target.y, attempt, "no path to target");
                return false;
            };
            let commands = path_commands(pos, self.rover.heading(), &path);
            if self.execute(&commands) {
                return self.rover.position() == target;
            }
            debug!(attempt, "route blocked, replanning");
        }
        self.rover.position() == target
    }

    fn execute(&mut self, commands: &[Command]) -> bool {
        for &command in commands {
            match command {
                Command::Forward => {
                    if !self.forward_and_sense() {
                        return false;
                    }
                }
                Command::TurnLeft | Command::TurnRight => {
                    self.rover.align_front(&self.map);
                    self.turn_and_sense(command);
                }
                other => warn!(command = %other, "unexpected command in route"),
            }
        }
        true
    }

    /// Drives back to the start cell and recalibrates there.
    ///
    /// Wall hugging is tried first within a bounded number of steps; the planner
    /// finishes the job if that does not get the rover home.
    pub fn return_home(&mut self) {
        self.set_status("returning to start");
        let start = self.config.start;
        let bound = 2 * 4 * (self.map.height() + self.map.width());
        for _ in 0..bound {
            if self.rover.position() == start {
                break;
            }
            self.wall_hug_step();
        }
        if self.rover.position() != start {
            self.set_status("wall hug did not reach start, planning a route");
            if !self.go_to(start) {
                self.set_status("start is unreachable");
                return;
            }
        }
        self.recalibrate_at_start();
        self.set_status("back at start");
    }

    /// Plans rover → waypoint → goal over the explored map and drives it with
    /// grouped forward moves.
    ///
    /// # Returns
    /// * `Result<Vec<MoveStep>, NavigationError>` - The executed steps, or `Unreachable` if either leg has no path
    pub fn run_fastest_path(&mut self, waypoint: Option<GridPoint>, goal: GridPoint) -> Result<Vec<MoveStep>, NavigationError> {
        let mut pos = self.rover.position();
        let mut heading = self.rover.heading();
        let mut cells = Vec::new();
        let mut commands = Vec::new();
        for leg in waypoint.into_iter().chain(std::iter::once(goal)) {
            let planner = Planner::new(&self.map);
            let Some(path) = planner.search(pos, leg, heading) else {
                self.set_status(format!("no fastest path to {leg}"));
                return Err(NavigationError::Unreachable("No path to fastest-path leg"));
            };
            commands.extend(path_commands(pos, heading, &path));
            if let Some(&last) = path.last() {
                let prev = path.len().checked_sub(2).map_or(pos, |i| path[i]);
                heading = GridMap::cell_direction(prev, last);
                pos = last;
            }
            cells.extend(path);
        }

        self.map.remove_paths();
        for &p in &cells {
            self.map.set_on_path(p, true);
        }

        let steps = group_moves(&commands, MAX_MOVE);
        self.rover.set_mode(Mode::FollowingPath);
        self.rover.final_calibrate();
        self.set_status(format!("fastest path: {} cells in {} messages", cells.len(), steps.len()));
        for step in &steps {
            match step.command {
                Command::Forward | Command::Backward => {
                    let taken = self.rover.advance(&mut self.map, step.command, step.steps);
                    if taken < step.steps {
                        self.set_status("fastest path blocked");
                        return Err(NavigationError::Unreachable("Fastest path blocked"));
                    }
                }
                command => {
                    self.rover.turn(command);
                }
            }
        }
        self.set_status("fastest path complete");
        Ok(steps)
    }

    /// Photographs obstacle faces, nearest first, recording each new label once.
    ///
    /// # Returns
    /// * `usize` - Number of distinct labels recorded so far
    pub fn capture_surfaces(&mut self, classifier: &mut dyn ImageClassifier) -> usize {
        let mut surfaces = enumerate_surfaces(&self.map, CAMERA_RANGE);
        self.set_status(format!("capturing {} obstacle faces", surfaces.len()));
        for _ in 0..surfaces.len() {
            if surfaces.is_empty() || !self.control.checkpoint() {
                break;
            }
            let pos = self.rover.position();
            let Some(index) = surfaces
                .iter()
                .enumerate()
                .min_by_key(|(i, s)| (s.stand.distance_squared(pos), *i))
                .map(|(i, _)| i)
            else {
                break;
            };
            let surface = surfaces.remove(index);
            if !self.go_to(surface.stand) {
                debug!(x = surface.obstacle.x, y = surface.obstacle.y, face = %surface.face, "surface unreachable");
                continue;
            }
            self.face(surface.heading);
            match classifier.classify(&surface) {
                Ok(reply) => match self.captures.record(&surface, &reply) {
                    Ok(true) => self.set_status(format!("captured label on {} face of {}", surface.face, surface.obstacle)),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, reply = reply.trim(), "unreadable classifier reply"),
                },
                Err(e) => warn!(error = %e, "classifier unavailable, skipping surface"),
            }
            surfaces.retain(|s| !surface.is_lateral_neighbour(s));
        }
        self.captures.len()
    }
}

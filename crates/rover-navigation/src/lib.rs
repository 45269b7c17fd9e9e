//! Mapping and navigation core for a grid rover.
//!
//! A [`Rover`] senses into a [`GridMap`]; the [`ExplorationEngine`] wall-hugs
//! and reroutes until the arena is covered, and the [`Planner`] turns the
//! finished map into heading-aware routes.

#![warn(missing_docs)]

pub mod astar;
pub mod command;
pub mod control;
pub mod direction;
pub mod error;
pub mod exploration;
pub mod link;
pub mod map;
pub mod report;
pub mod rover;
pub mod sensor;
pub mod surface;

pub use astar::{INFINITE_COST, MOVE_COST, PathResult, Planner, TURN_COST, path_commands, turn_cost};
pub use command::{Command, MAX_MOVE, MoveStep, group_moves};
pub use control::{NullSink, StatusSink, TaskControl};
pub use direction::Direction;
pub use error::{NavigationError, TransportError};
pub use exploration::{CHECKING_STEP, ExplorationConfig, ExplorationEngine, ExplorationReport, Termination};
pub use link::{RoverLink, ScriptedLink, SensorFrame};
pub use map::{Cell, GridMap, GridPoint, MapDescriptor};
pub use report::StateReport;
pub use rover::{Backend, CALIBRATE_AFTER, Calibration, Mode, Rover, SIDE_CONTACT_STREAK};
pub use sensor::{Sensor, SensorId};
pub use surface::{CAMERA_RANGE, CaptureLog, CaptureRecord, ImageClassifier, LabelledArena, ObsSurface};

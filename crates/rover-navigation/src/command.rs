//! Motion and calibration commands and their controller wire encoding.

use std::fmt;

/// Largest step count the controller accepts in one forward message.
pub const MAX_MOVE: u32 = 9;

/// Every command the rover controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Drive forward.
    Forward,
    /// Drive backward.
    Backward,
    /// Rotate 90° anticlockwise in place.
    TurnLeft,
    /// Rotate 90° clockwise in place.
    TurnRight,
    /// Ask for a sensor frame without moving.
    SendSensors,
    /// Square up against the surface ahead.
    AlignFront,
    /// Square up against the surface on the right.
    AlignRight,
    /// Full calibration in the start zone.
    InitialCalibrate,
    /// Square up against a single obstacle ahead.
    AlignFrontSingle,
    /// Calibration before a timed run.
    FinalCalibrate,
}

impl Command {
    /// Controller letter for this command.
    pub const fn wire_code(self) -> char {
        match self {
            Command::Forward => 'W',
            Command::Backward => 'S',
            Command::TurnLeft => 'A',
            Command::TurnRight => 'D',
            Command::SendSensors => 'K',
            Command::AlignFront => 'O',
            Command::AlignRight => 'P',
            Command::InitialCalibrate => 'T',
            Command::AlignFrontSingle => 'F',
            Command::FinalCalibrate => 'Z',
        }
    }

    /// Letter, step count and separator, e.g. `W3|`.
    pub fn encode(self, steps: u32) -> String {
        format!("{}{}|", self.wire_code(), steps)
    }

    /// Whether the command changes the rover's pose.
    pub const fn is_motion(self) -> bool {
        matches!(self, Command::Forward | Command::Backward | Command::TurnLeft | Command::TurnRight)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Forward => "FORWARD",
            Command::Backward => "BACKWARD",
            Command::TurnLeft => "TURN_LEFT",
            Command::TurnRight => "TURN_RIGHT",
            Command::SendSensors => "SEND_SENSORS",
            Command::AlignFront => "ALIGN_FRONT",
            Command::AlignRight => "ALIGN_RIGHT",
            Command::InitialCalibrate => "INITIAL_CALIBRATE",
            Command::AlignFrontSingle => "ALIGN_FRONT_SINGLE",
            Command::FinalCalibrate => "FINAL_CALIBRATE",
        };
        f.write_str(name)
    }
}

/// A command with its repeat count, as sent in one controller message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveStep {
    /// What to do.
    pub command: Command,
    /// How many times; always 1 for turns.
    pub steps: u32,
}

impl MoveStep {
    /// Wire form of this step.
    pub fn encode(&self) -> String {
        self.command.encode(self.steps)
    }
}

/// Collapses runs of `Forward` into multi-step moves of at most `max_steps`.
pub fn group_moves(commands: &[Command], max_steps: u32) -> Vec<MoveStep> {
    let max_steps = max_steps.max(1);
    let mut grouped: Vec<MoveStep> = Vec::with_capacity(commands.len());
    for &command in commands {
        match grouped.last_mut() {
            Some(last) if command == Command::Forward && last.command == Command::Forward && last.steps < max_steps => {
                last.steps += 1;
            }
            _ => grouped.push(MoveStep { command, steps: 1 }),
        }
    }
    grouped
}

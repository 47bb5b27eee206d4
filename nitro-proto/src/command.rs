//! Logical drive intents issued by the control surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A logical movement intent.
///
/// The set is closed; a raw token that maps to none of these is a protocol
/// mismatch and is handled by [`Codec::encode_token`](crate::Codec::encode_token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DriveCommand {
    /// Drive forward at normal speed.
    Forward,
    /// Drive forward at turbo speed.
    Turbo,
    /// Drive in reverse.
    Backward,
    /// Steer to the left target angle.
    TurnLeft,
    /// Steer to the right target angle.
    TurnRight,
    /// Steer back to center.
    Center,
    /// Halt the drive motors only.
    Stop,
    /// Halt every actuator and end the listener program.
    Shutdown,
}

impl DriveCommand {
    /// Every command, in token-table order.
    pub const ALL: [Self; 8] = [
        Self::Forward,
        Self::Turbo,
        Self::Backward,
        Self::TurnLeft,
        Self::TurnRight,
        Self::Center,
        Self::Stop,
        Self::Shutdown,
    ];

    /// Single-byte control token understood by the listener program.
    pub const fn token(self) -> u8 {
        match self {
            Self::Forward => b'F',
            Self::Turbo => b'T',
            Self::Backward => b'B',
            Self::TurnLeft => b'L',
            Self::TurnRight => b'R',
            Self::Center => b'C',
            Self::Stop => b'S',
            Self::Shutdown => b'X',
        }
    }

    /// Inverse of [`token`](Self::token). Returns `None` for unknown bytes.
    pub const fn from_token(token: u8) -> Option<Self> {
        Some(match token {
            b'F' => Self::Forward,
            b'T' => Self::Turbo,
            b'B' => Self::Backward,
            b'L' => Self::TurnLeft,
            b'R' => Self::TurnRight,
            b'C' => Self::Center,
            b'S' => Self::Stop,
            b'X' => Self::Shutdown,
            _ => return None,
        })
    }

    /// Snake-case identifier, used to name synthesized programs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Turbo => "turbo",
            Self::Backward => "backward",
            Self::TurnLeft => "turn_left",
            Self::TurnRight => "turn_right",
            Self::Center => "center",
            Self::Stop => "stop",
            Self::Shutdown => "shutdown",
        }
    }

    /// Status-line label shown to the operator.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Forward => "▲ Driving forward",
            Self::Turbo => "TURBO!",
            Self::Backward => "▼ Reversing",
            Self::TurnLeft => "◀ Turning left",
            Self::TurnRight => "▶ Turning right",
            Self::Center => "● Centering steering",
            Self::Stop => "Stopping motors",
            Self::Shutdown => "Shutting down",
        }
    }

    /// Returns `true` for commands that move the drive motors.
    pub const fn is_drive(self) -> bool {
        matches!(self, Self::Forward | Self::Turbo | Self::Backward)
    }
}

impl fmt::Display for DriveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string names no [`DriveCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown drive command: {}", self.0)
    }
}

impl std::error::Error for ParseCommandError {}

impl FromStr for DriveCommand {
    type Err = ParseCommandError;

    /// Accepts the snake-case name, a short alias, or the token letter
    /// (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "f" | "forward" | "fwd" => Ok(Self::Forward),
            "t" | "turbo" => Ok(Self::Turbo),
            "b" | "backward" | "back" | "reverse" => Ok(Self::Backward),
            "l" | "left" | "turn_left" => Ok(Self::TurnLeft),
            "r" | "right" | "turn_right" => Ok(Self::TurnRight),
            "c" | "center" | "centre" => Ok(Self::Center),
            "s" | "stop" => Ok(Self::Stop),
            "x" | "shutdown" => Ok(Self::Shutdown),
            _ => Err(ParseCommandError(s.to_owned())),
        }
    }
}

//! Deployment-tunable magnitudes: speeds, angles, ports and dwell times.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DriveCommand;

/// Hub I/O port an actuator is plugged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Port {
    /// Port A.
    A,
    /// Port B.
    B,
    /// Port C.
    C,
    /// Port D.
    D,
    /// Port E.
    E,
    /// Port F.
    F,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
        })
    }
}

/// Per-command hold time for discrete programs, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dwell {
    /// Hold after starting forward drive.
    pub forward_ms: u64,
    /// Hold after starting turbo drive.
    pub turbo_ms: u64,
    /// Hold after starting reverse drive.
    pub backward_ms: u64,
    /// Hold after a left or right steering move.
    pub turn_ms: u64,
    /// Hold after re-centering.
    pub center_ms: u64,
}

impl Default for Dwell {
    fn default() -> Self {
        Self {
            forward_ms: 1000,
            turbo_ms: 1000,
            backward_ms: 1000,
            turn_ms: 500,
            center_ms: 500,
        }
    }
}

impl Dwell {
    /// Looks up the hold time for `cmd`. Stop and shutdown never hold.
    pub const fn for_command(&self, cmd: DriveCommand) -> Duration {
        Duration::from_millis(match cmd {
            DriveCommand::Forward => self.forward_ms,
            DriveCommand::Turbo => self.turbo_ms,
            DriveCommand::Backward => self.backward_ms,
            DriveCommand::TurnLeft | DriveCommand::TurnRight => self.turn_ms,
            DriveCommand::Center => self.center_ms,
            DriveCommand::Stop | DriveCommand::Shutdown => 0,
        })
    }
}

/// Actuator layout and motion magnitudes of one vehicle build.
///
/// Speeds are in degrees per second, angles in degrees. All are unsigned
/// magnitudes; direction comes from the motion table. The left drive motor
/// is mounted mirrored, so forward runs it at negative speed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Left drive motor.
    pub drive_left: Port,
    /// Right drive motor.
    pub drive_right: Port,
    /// Steering motor.
    pub steering: Port,
    /// Normal forward speed.
    pub forward_speed: u32,
    /// Turbo forward speed.
    pub turbo_speed: u32,
    /// Reverse speed (magnitude).
    pub reverse_speed: u32,
    /// Steering motor speed.
    pub steer_speed: u32,
    /// Steering target angle (magnitude); left is negative.
    pub steer_angle: u32,
    /// Discrete-program hold times.
    pub dwell: Dwell,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            drive_left: Port::B,
            drive_right: Port::F,
            steering: Port::D,
            forward_speed: 900,
            turbo_speed: 1100,
            reverse_speed: 800,
            steer_speed: 500,
            steer_angle: 25,
            dwell: Dwell::default(),
        }
    }
}

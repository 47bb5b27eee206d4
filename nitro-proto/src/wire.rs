//! Protocol codec: translates drive commands into what the hub executes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DriveCommand, Program, Tuning, discrete_program, listener_program};

/// Deployment mode selecting a [`Codec`] strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Mode {
    /// One token per command, written to a resident listener program.
    #[default]
    Streaming,
    /// One self-terminating program per command, run to completion.
    Program,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Streaming => "streaming",
            Self::Program => "program",
        })
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "streaming" | "stream" => Ok(Self::Streaming),
            "program" | "discrete" => Ok(Self::Program),
            _ => Err(format!("unknown mode: {s}")),
        }
    }
}

/// The wire representation of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum WireUnit {
    /// A control token for the listener program.
    Token(u8),
    /// A program to upload and run to completion.
    Program(Program),
}

/// A strategy for encoding drive commands.
///
/// `encode` is pure and total over [`DriveCommand`].
pub trait Codec: Send + Sync + fmt::Debug {
    /// The mode this codec implements.
    fn mode(&self) -> Mode;

    /// Encodes one command.
    fn encode(&self, cmd: DriveCommand) -> WireUnit;

    /// Program to install when a link opens, if the mode needs one.
    fn setup(&self) -> Option<Program>;

    /// The unit that brings the vehicle to a safe halt.
    fn safe_stop(&self) -> WireUnit;

    /// Encodes a raw token, falling back to [`safe_stop`](Self::safe_stop)
    /// for bytes that name no command.
    fn encode_token(&self, token: u8) -> WireUnit {
        if let Some(cmd) = DriveCommand::from_token(token) {
            self.encode(cmd)
        } else {
            tracing::warn!(token, "unrecognized drive token, sending safe stop");
            self.safe_stop()
        }
    }
}

/// Streaming strategy: single-byte tokens for the resident listener.
#[derive(Debug, Clone, Default)]
pub struct Streaming {
    /// Magnitudes baked into the listener program.
    tuning: Tuning,
}

impl Streaming {
    /// Creates a streaming codec for the given tuning.
    pub const fn new(tuning: Tuning) -> Self {
        Self { tuning }
    }
}

impl Codec for Streaming {
    fn mode(&self) -> Mode {
        Mode::Streaming
    }

    fn encode(&self, cmd: DriveCommand) -> WireUnit {
        WireUnit::Token(cmd.token())
    }

    fn setup(&self) -> Option<Program> {
        Some(listener_program(&self.tuning))
    }

    /// `S`: halts the drive motors and keeps the listener alive.
    fn safe_stop(&self) -> WireUnit {
        WireUnit::Token(DriveCommand::Stop.token())
    }
}

/// Discrete strategy: one synthesized program per command.
#[derive(Debug, Clone, Default)]
pub struct Discrete {
    /// Magnitudes and dwell table used for synthesis.
    tuning: Tuning,
}

impl Discrete {
    /// Creates a discrete-program codec for the given tuning.
    pub const fn new(tuning: Tuning) -> Self {
        Self { tuning }
    }
}

impl Codec for Discrete {
    fn mode(&self) -> Mode {
        Mode::Program
    }

    fn encode(&self, cmd: DriveCommand) -> WireUnit {
        WireUnit::Program(discrete_program(cmd, &self.tuning))
    }

    fn setup(&self) -> Option<Program> {
        None
    }

    fn safe_stop(&self) -> WireUnit {
        self.encode(DriveCommand::Shutdown)
    }
}

/// Builds the codec for `mode`.
pub fn codec_for(mode: Mode, tuning: Tuning) -> Box<dyn Codec> {
    match mode {
        Mode::Streaming => Box::new(Streaming::new(tuning)),
        Mode::Program => Box::new(Discrete::new(tuning)),
    }
}

//! Wire-level vocabulary for driving a remote motorized hub.
//!
//! Two layers live here:
//!
//! - The **device protocol**: [`DriveCommand`]s are translated by a
//!   [`Codec`] into [`WireUnit`]s, either a single control token for the
//!   resident listener program ([`Streaming`]) or a short self-terminating
//!   program uploaded per command ([`Discrete`]).
//! - The **bridge protocol**: [`Request`] / [`Response`] messages exchanged
//!   with the local bridge daemon that owns the radio. They are serialized
//!   with [`postcard`] and framed with a 4-byte big-endian length prefix.

mod codec;
mod command;
mod message;
mod program;
mod tuning;
mod wire;

pub use codec::{recv, send};
pub use command::{DriveCommand, ParseCommandError};
pub use message::{DeviceInfo, ProgramId, Request, Response};
pub use program::{Program, discrete_program, listener_program};
pub use tuning::{Dwell, Port, Tuning};
pub use wire::{Codec, Discrete, Mode, Streaming, WireUnit, codec_for};

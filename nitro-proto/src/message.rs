//! Host↔bridge message types.
//!
//! The bridge daemon owns the radio link to the hub. One socket connection
//! carries one hub session: a `Connect` opens it and EOF (or `Disconnect`)
//! ends it. Discovery uses a short-lived connection with a single `Scan`.

use serde::{Deserialize, Serialize};

/// Bridge-assigned identifier of a running program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub u32);

/// A peer reported by a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Radio address (opaque to the host).
    pub address: String,
    /// Advertised name; empty when the peer advertises none.
    pub name: String,
}

/// Request sent from host to bridge.
#[derive(Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Request {
    /// Scan for nearby hubs for the given duration.
    Scan {
        /// Scan duration in milliseconds.
        timeout_ms: u64,
    },
    /// Open a link to the hub at `address`.
    Connect {
        /// Radio address from a previous scan.
        address: String,
    },
    /// Upload a program and start it. Answered once it is running.
    Install {
        /// Program name, for the bridge's logs.
        name: String,
        /// Program source text.
        source: String,
    },
    /// Wait for a running program to finish.
    Wait {
        /// Program to wait for.
        program: ProgramId,
    },
    /// Stop a running program. Idempotent.
    Stop {
        /// Program to stop.
        program: ProgramId,
    },
    /// Write raw bytes to the running program's stdin.
    Write(Vec<u8>),
    /// Close the hub link.
    Disconnect,
}

/// Response sent from bridge to host.
///
/// Each request gets exactly one response, except `Wait`, whose
/// [`Response::Exited`] may arrive after a later `Stop` was issued.
#[derive(Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Response {
    /// Reply to [`Request::Scan`].
    Devices(Vec<DeviceInfo>),
    /// Reply to [`Request::Connect`].
    Connected,
    /// Reply to [`Request::Install`].
    Started {
        /// Identifier of the running program.
        program: ProgramId,
    },
    /// Reply to [`Request::Wait`].
    Exited {
        /// The program that finished.
        program: ProgramId,
        /// Exit status reported by the hub (`0` on normal completion).
        code: i32,
    },
    /// Acknowledgment for `Write`, `Stop` and `Disconnect`.
    Ok,
    /// The hub closed the link.
    Disconnected,
    /// The request failed.
    Error(String),
}

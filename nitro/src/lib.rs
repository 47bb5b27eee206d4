//! Session manager for remotely driving a motorized hub.
//!
//! `nitro` holds exactly one wireless link to one hub at a time, turns
//! high-level [`DriveCommand`]s into what the hub executes, and reports
//! progress as human-readable [`LogEvent`]s.
//!
//! The radio itself sits behind the [`Link`] trait. On Unix, [`BridgeLink`]
//! implements it by talking to a local bridge daemon over a socket.
//!
//! # Quick start
//!
//! ```no_run
//! use nitro::{BridgeLink, DeviceDescriptor, DriveCommand, SessionConfig, SessionManager};
//!
//! let link = BridgeLink::new("/run/user/1000/nitro/bridge.sock");
//! let (session, mut events) = SessionManager::start(link, SessionConfig::default())?;
//!
//! session.connect(DeviceDescriptor::new("90:84:2B:00:00:01", "Pybricks Hub"))?;
//! // ...once `session.is_active()`:
//! session.enqueue(DriveCommand::Forward);
//!
//! for event in events.drain() {
//!     println!("{event}");
//! }
//! session.disconnect();
//! # Ok::<(), nitro::Error>(())
//! ```

#[cfg(unix)]
mod bridge;
mod config;
mod device;
mod error;
mod link;
mod queue;
mod relay;
mod session;
mod state;
#[cfg(test)]
mod testing;

#[cfg(unix)]
pub use bridge::{BridgeLink, BridgeSession};
pub use config::SessionConfig;
pub use device::DeviceDescriptor;
pub use error::{Error, Result};
pub use link::{Discovery, Link};
pub use nitro_proto::{DriveCommand, Dwell, Mode, ParseCommandError, Port, Program, Tuning};
pub use queue::CommandSender;
pub use relay::{EventReceiver, Level, LogEvent};
pub use session::SessionManager;
pub use state::SessionState;

//! Boundary contracts over the transport and discovery collaborators.
//!
//! The session manager never touches radios or files directly; everything
//! physical goes through a [`Link`] implementation.

use std::future::Future;
use std::time::Duration;

use nitro_proto::Program;

use crate::{DeviceDescriptor, Result};

/// Transport and execution primitives for one kind of hub link.
///
/// Every operation may fail. A remote hang-up must surface as
/// [`Error::Disconnected`](crate::Error::Disconnected) so the session can
/// tell it apart from real failures.
pub trait Link: Send + Sync + 'static {
    /// An open connection to one hub.
    type Handle: Send + 'static;
    /// A program started on the hub.
    type Program: Send + Sync + 'static;

    /// Connects to `device`. Suspends until connected or failed.
    fn open(&self, device: &DeviceDescriptor) -> impl Future<Output = Result<Self::Handle>> + Send;

    /// Uploads `program` and starts it. Suspends until it is running.
    fn install_program(
        &self,
        handle: &mut Self::Handle,
        program: &Program,
    ) -> impl Future<Output = Result<Self::Program>> + Send;

    /// Suspends until `program` finishes on the hub.
    fn wait_program(
        &self,
        handle: &mut Self::Handle,
        program: &Self::Program,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Stops `program`. Best-effort and idempotent.
    fn cancel_program(
        &self,
        handle: &mut Self::Handle,
        program: &Self::Program,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Writes `bytes` to the running program. Suspends until delivered.
    fn write(&self, handle: &mut Self::Handle, bytes: &[u8])
    -> impl Future<Output = Result<()>> + Send;

    /// Closes the connection. Best-effort and idempotent.
    fn close(&self, handle: Self::Handle) -> impl Future<Output = Result<()>> + Send;

    /// Uploads `program` and suspends until it has run to completion.
    fn run_program(
        &self,
        handle: &mut Self::Handle,
        program: &Program,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let running = self.install_program(handle, program).await?;
            self.wait_program(handle, &running).await
        }
    }
}

/// Enumerates nearby hubs.
pub trait Discovery {
    /// Scans for `timeout` and returns every peer seen.
    fn scan(&self, timeout: Duration) -> impl Future<Output = Result<Vec<DeviceDescriptor>>> + Send;
}

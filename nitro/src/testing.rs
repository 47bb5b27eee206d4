//! Scripted in-memory [`Link`] for exercising the session worker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nitro_proto::Program;

use crate::{DeviceDescriptor, Error, Link, Result};

/// One recorded link operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    /// `open(address)`.
    Open(String),
    /// `install_program(program)`.
    Install(Program),
    /// `wait_program(name)`.
    Wait(String),
    /// `cancel_program(name)`.
    Cancel(String),
    /// `write(bytes)`.
    Write(Vec<u8>),
    /// `close()`.
    Close,
}

/// Failure and timing behavior of a [`MockLink`].
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    /// `open` fails with a link error.
    pub(crate) fail_open: bool,
    /// `close` fails with a link error.
    pub(crate) fail_close: bool,
    /// The write with this index (0-based) and all later ones are recorded
    /// but report a remote hang-up.
    pub(crate) hang_up_at_write: Option<usize>,
    /// How long each program runs.
    pub(crate) program_time: Duration,
    /// Programs never finish on their own.
    pub(crate) programs_hang: bool,
}

/// A [`Link`] that records every call.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockLink {
    /// Recorded calls, shared with clones held by the test.
    calls: Arc<Mutex<Vec<Call>>>,
    /// Behavior.
    script: Arc<Script>,
}

/// Connection state of a [`MockLink`] handle.
#[derive(Debug, Default)]
pub(crate) struct MockHandle {
    /// Writes attempted so far.
    writes: usize,
}

impl MockLink {
    /// Creates a link following `script`.
    pub(crate) fn new(script: Script) -> Self {
        Self {
            calls: Arc::default(),
            script: Arc::new(script),
        }
    }

    /// Snapshot of the recorded calls.
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every byte written (or attempted), in order.
    pub(crate) fn written(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write(bytes) => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Number of recorded calls matching `pred`.
    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Records `call`.
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Link for MockLink {
    type Handle = MockHandle;
    type Program = String;

    async fn open(&self, device: &DeviceDescriptor) -> Result<MockHandle> {
        self.record(Call::Open(device.address().to_owned()));
        if self.script.fail_open {
            return Err(Error::link("open", "hub not found"));
        }
        Ok(MockHandle::default())
    }

    async fn install_program(&self, _handle: &mut MockHandle, program: &Program) -> Result<String> {
        self.record(Call::Install(program.clone()));
        Ok(program.name.clone())
    }

    async fn wait_program(&self, _handle: &mut MockHandle, program: &String) -> Result<()> {
        self.record(Call::Wait(program.clone()));
        if self.script.programs_hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.script.program_time).await;
        Ok(())
    }

    async fn cancel_program(&self, _handle: &mut MockHandle, program: &String) -> Result<()> {
        self.record(Call::Cancel(program.clone()));
        Ok(())
    }

    async fn write(&self, handle: &mut MockHandle, bytes: &[u8]) -> Result<()> {
        let index = handle.writes;
        handle.writes += 1;
        self.record(Call::Write(bytes.to_vec()));
        if self.script.hang_up_at_write.is_some_and(|at| index >= at) {
            return Err(Error::Disconnected);
        }
        Ok(())
    }

    async fn close(&self, _handle: MockHandle) -> Result<()> {
        self.record(Call::Close);
        if self.script.fail_close {
            return Err(Error::link("close", "radio busy"));
        }
        Ok(())
    }
}

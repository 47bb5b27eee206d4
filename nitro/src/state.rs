//! Session lifecycle state and the readiness flag shared with callers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum SessionState {
    /// No link held; ready to connect.
    Idle = 0,
    /// Opening the link and preparing the hub.
    Connecting = 1,
    /// Accepting and forwarding drive commands.
    Active = 2,
    /// Stopping the hub and releasing the link.
    Disconnecting = 3,
}

impl SessionState {
    /// Decodes the atomic representation.
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Active,
            3 => Self::Disconnecting,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Disconnecting => "disconnecting",
        })
    }
}

/// State readable from any thread without blocking.
///
/// The state and the session generation are packed into one word, so a
/// reader always sees a matching pair. Only the session worker moves the
/// state, except for the Idle→Connecting claim made by `connect`.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    /// `generation << 8 | state`.
    word: AtomicU64,
}

/// Low byte of the packed word.
const STATE_MASK: u64 = 0xff;

/// Splits a packed word.
const fn unpack(word: u64) -> (SessionState, u64) {
    // Masked to the low byte, so the cast is lossless.
    #[allow(clippy::cast_possible_truncation)]
    let state = SessionState::from_u8((word & STATE_MASK) as u8);
    (state, word >> 8)
}

impl Shared {
    /// Current state and generation, read together.
    pub(crate) fn snapshot(&self) -> (SessionState, u64) {
        unpack(self.word.load(Ordering::SeqCst))
    }

    /// Current state.
    pub(crate) fn state(&self) -> SessionState {
        self.snapshot().0
    }

    /// Generation of the current (or most recent) active session.
    pub(crate) fn generation(&self) -> u64 {
        self.snapshot().1
    }

    /// Stores `next` and returns the previous state.
    pub(crate) fn swap(&self, next: SessionState) -> SessionState {
        let prev = self.update(|word| (word & !STATE_MASK) | next as u64);
        unpack(prev).0
    }

    /// Atomically moves Idle→Connecting. Returns `false` if not idle.
    pub(crate) fn claim(&self) -> bool {
        self.word
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                (unpack(word).0 == SessionState::Idle)
                    .then_some((word & !STATE_MASK) | SessionState::Connecting as u64)
            })
            .is_ok()
    }

    /// Starts a new generation, invalidating anything queued before it.
    pub(crate) fn advance(&self) -> u64 {
        let prev = self.update(|word| word.wrapping_add(1 << 8));
        unpack(prev).1.wrapping_add(1)
    }

    /// Applies `f` atomically and returns the previous word.
    fn update(&self, f: impl Fn(u64) -> u64) -> u64 {
        match self
            .word
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| Some(f(word)))
        {
            Ok(prev) | Err(prev) => prev,
        }
    }
}

//! Session lifecycle states.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::HandleError;

/// Lifecycle of a [`Session`](super::Session).
///
/// ```text
/// Uninitialized --create--> Ready --load_script--> ScriptLoaded
///     --start_audio_thread--> AudioThreadRunning
/// (any) --destroy--> Disposed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    Ready = 1,
    ScriptLoaded = 2,
    AudioThreadRunning = 3,
    Disposed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Ready,
            2 => Self::ScriptLoaded,
            3 => Self::AudioThreadRunning,
            _ => Self::Disposed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::ScriptLoaded => "script loaded",
            Self::AudioThreadRunning => "audio thread running",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding a [`SessionState`].
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `to` only if currently in `from`.
    pub(crate) fn advance(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `Disposed`, returning the previous state.
    pub(crate) fn dispose(&self) -> SessionState {
        SessionState::from_u8(self.0.swap(SessionState::Disposed as u8, Ordering::AcqRel))
    }

    /// Check that the session has reached at least `min`.
    #[inline]
    pub(crate) fn require(&self, min: SessionState) -> Result<SessionState, HandleError> {
        let state = self.load();
        if state == SessionState::Disposed {
            Err(HandleError::InvalidHandle)
        } else if state < min {
            Err(HandleError::NotLoaded)
        } else {
            Ok(state)
        }
    }
}

//! Process-wide log callback registration
//!
//! The host installs one callback before the engine starts logging. The slot
//! is write-once: reads after initialization are a single atomic load, and a
//! second registration is refused rather than raced.

use crate::types::{BridgeError, Result};
use std::os::raw::{c_char, c_int};
use std::sync::OnceLock;

/// Host log sink called by the trampoline
///
/// `file` and `func` are NUL-terminated. `buf` points at `len` bytes of
/// message text which are only valid for the duration of the call; the bytes
/// are not guaranteed to be NUL-terminated at `len` when the message was
/// truncated.
pub type LogCallback = unsafe extern "C" fn(
    level: c_int,
    file: *const c_char,
    line: c_int,
    func: *const c_char,
    buf: *const c_char,
    len: c_int,
);

/// A set-once holder for a `LogCallback`
#[derive(Debug)]
pub struct CallbackSlot {
    cell: OnceLock<LogCallback>,
}

impl CallbackSlot {
    /// Create an empty slot; an empty slot discards all log output
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Install the callback. Fails if one was already installed.
    pub fn set(&self, callback: LogCallback) -> Result<()> {
        self.cell
            .set(callback)
            .map_err(|_| BridgeError::CallbackAlreadyRegistered)
    }

    /// The installed callback, if any
    #[inline]
    pub fn get(&self) -> Option<LogCallback> {
        self.cell.get().copied()
    }

    pub fn is_registered(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl Default for CallbackSlot {
    fn default() -> Self {
        Self::new()
    }
}

static LOG_CALLBACK: CallbackSlot = CallbackSlot::new();

/// The slot used by the global trampoline
pub fn global_slot() -> &'static CallbackSlot {
    &LOG_CALLBACK
}

/// Register the process-wide log callback
///
/// Must happen during startup, before the engine emits its first message.
pub fn register_log_callback(callback: LogCallback) -> Result<()> {
    LOG_CALLBACK.set(callback)
}

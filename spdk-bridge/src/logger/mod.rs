//! Log trampoline
//!
//! The engine logs through `emit` (or the `bridge_log!` macro); the host
//! receives each message as a pointer and an exact byte length through the
//! callback it registered at startup.
//!
//! Buffer policy, in order:
//! 1. render into a fixed stack buffer and pass the bytes actually written
//! 2. if the message does not fit, render again into a scratch allocation of
//!    exactly the required size
//! 3. if that allocation fails, pass the whole stack buffer with its last byte
//!    forced to NUL

pub mod bridge_logger;
pub mod callback;
pub mod format;
pub mod trampoline;

pub use bridge_logger::BridgeLogger;
pub use callback::{global_slot, register_log_callback, CallbackSlot, LogCallback};
pub use format::{
    format_bytes, format_message, BoundedWriter, FormattedMessage, NoScratch, ScratchAllocator,
    SystemAllocator,
};
pub use trampoline::{emit, emit_bytes, static_cstr, LogTrampoline, DEFAULT_LOG_CAPACITY};

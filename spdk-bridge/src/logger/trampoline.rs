//! The log trampoline
//!
//! Adapts the engine's `(level, file, line, func, format, args...)` logging
//! shape into a single call of the host's `LogCallback` with a rendered
//! buffer and its exact length.

use super::callback::{global_slot, CallbackSlot, LogCallback};
use super::format::{
    format_bytes, format_message, FormattedMessage, ScratchAllocator, SystemAllocator,
};
use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_int};

/// Default stack buffer size for rendered messages
pub const DEFAULT_LOG_CAPACITY: usize = 4096;

/// Forwards formatted log records to a registered callback
///
/// `CAP` is the size of the per-call stack buffer. Messages that need more
/// room are rendered into memory obtained from `A`; if that fails they are
/// truncated to `CAP` bytes.
pub struct LogTrampoline<'s, A = SystemAllocator, const CAP: usize = DEFAULT_LOG_CAPACITY>
where
    A: ScratchAllocator,
{
    slot: &'s CallbackSlot,
    alloc: A,
}

impl LogTrampoline<'static> {
    /// Trampoline bound to the process-wide callback slot
    pub fn global() -> Self {
        Self::new(global_slot(), SystemAllocator)
    }
}

impl<'s, A, const CAP: usize> LogTrampoline<'s, A, CAP>
where
    A: ScratchAllocator,
{
    const NON_EMPTY: () = assert!(CAP > 0, "log buffer capacity must be non-zero");

    pub fn new(slot: &'s CallbackSlot, alloc: A) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self { slot, alloc }
    }

    /// Render one record and hand it to the callback
    ///
    /// Does nothing, not even formatting, when no callback is registered.
    /// Otherwise the callback is invoked exactly once.
    pub fn emit(
        &self,
        level: c_int,
        file: &CStr,
        line: u32,
        func: &CStr,
        args: fmt::Arguments<'_>,
    ) {
        let Some(callback) = self.slot.get() else {
            return;
        };

        let mut stack = [0u8; CAP];
        let message = format_message(&mut stack, &self.alloc, args);
        deliver(callback, level, file, line, func, &message);
    }

    /// Hand an already-rendered message to the callback
    ///
    /// The bytes are forwarded unchanged (they need not be UTF-8) under the
    /// same buffer policy as [`emit`](Self::emit).
    pub fn emit_bytes(&self, level: c_int, file: &CStr, line: u32, func: &CStr, bytes: &[u8]) {
        let Some(callback) = self.slot.get() else {
            return;
        };

        let mut stack = [0u8; CAP];
        let message = format_bytes(&mut stack, &self.alloc, bytes);
        deliver(callback, level, file, line, func, &message);
    }
}

fn deliver(
    callback: LogCallback,
    level: c_int,
    file: &CStr,
    line: u32,
    func: &CStr,
    message: &FormattedMessage<'_>,
) {
    let bytes = message.as_bytes();

    // only the truncated stack buffer can exceed c_int::MAX, and it is
    // bounded by CAP
    let len = c_int::try_from(bytes.len()).unwrap_or(c_int::MAX);
    let line = c_int::try_from(line).unwrap_or(c_int::MAX);

    unsafe {
        callback(
            level,
            file.as_ptr(),
            line,
            func.as_ptr(),
            bytes.as_ptr() as *const c_char,
            len,
        );
    }
}

/// Emit through the process-wide trampoline
pub fn emit(level: c_int, file: &CStr, line: u32, func: &CStr, args: fmt::Arguments<'_>) {
    LogTrampoline::global().emit(level, file, line, func, args);
}

/// Forward pre-rendered bytes through the process-wide trampoline
pub fn emit_bytes(level: c_int, file: &CStr, line: u32, func: &CStr, bytes: &[u8]) {
    LogTrampoline::global().emit_bytes(level, file, line, func, bytes);
}

/// Turn a `concat!(..., "\0")` literal into a `&CStr`, falling back to an
/// empty string if the literal contains an interior NUL
#[doc(hidden)]
pub fn static_cstr(with_nul: &'static str) -> &'static CStr {
    CStr::from_bytes_with_nul(with_nul.as_bytes()).unwrap_or_default()
}

/// Log through the process-wide trampoline with the caller's file and line
///
/// ```
/// use spdk_bridge::{bridge_log, LogLevel};
///
/// bridge_log!(LogLevel::Notice, "bdev {} claimed by {}", "nvme0n1", "nexus-1");
/// ```
#[macro_export]
macro_rules! bridge_log {
    ($level:expr, $($arg:tt)+) => {
        $crate::logger::emit(
            ::std::os::raw::c_int::from($level),
            $crate::logger::static_cstr(concat!(file!(), "\0")),
            line!(),
            $crate::logger::static_cstr(concat!(module_path!(), "\0")),
            format_args!($($arg)+),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::format::NoScratch;
    use std::cell::RefCell;
    use std::slice;

    #[derive(Debug, Clone)]
    struct Captured {
        level: c_int,
        file: String,
        line: c_int,
        bytes: Vec<u8>,
    }

    thread_local! {
        static CAPTURED: RefCell<Vec<Captured>> = RefCell::new(Vec::new());
    }

    unsafe extern "C" fn capture(
        level: c_int,
        file: *const c_char,
        line: c_int,
        _func: *const c_char,
        buf: *const c_char,
        len: c_int,
    ) {
        let bytes = slice::from_raw_parts(buf as *const u8, len as usize).to_vec();
        let file = CStr::from_ptr(file).to_string_lossy().into_owned();
        CAPTURED.with(|c| {
            c.borrow_mut().push(Captured {
                level,
                file,
                line,
                bytes,
            })
        });
    }

    fn take_captured() -> Vec<Captured> {
        CAPTURED.with(|c| c.borrow_mut().drain(..).collect())
    }

    #[test]
    fn test_unregistered_is_noop() {
        take_captured();
        let slot = CallbackSlot::new();
        let trampoline: LogTrampoline<'_, SystemAllocator, 16> =
            LogTrampoline::new(&slot, SystemAllocator);
        trampoline.emit(0, c"a.rs", 1, c"f", format_args!("dropped"));
        assert!(take_captured().is_empty());
    }

    #[test]
    fn test_capacity_16_scenarios() {
        take_captured();
        let slot = CallbackSlot::new();
        slot.set(capture).unwrap();
        let forty = "0123456789".repeat(4);

        let promoted: LogTrampoline<'_, SystemAllocator, 16> =
            LogTrampoline::new(&slot, SystemAllocator);
        promoted.emit(2, c"nvme.rs", 10, c"attach", format_args!("abc"));
        promoted.emit(2, c"nvme.rs", 11, c"attach", format_args!("{}", forty));

        let starved: LogTrampoline<'_, NoScratch, 16> = LogTrampoline::new(&slot, NoScratch);
        starved.emit(2, c"nvme.rs", 12, c"attach", format_args!("{}", forty));

        let got = take_captured();
        assert_eq!(got.len(), 3);

        assert_eq!(got[0].bytes, b"abc");
        assert_eq!(got[0].file, "nvme.rs");
        assert_eq!(got[0].line, 10);

        assert_eq!(got[1].bytes.len(), 40);
        assert_eq!(got[1].bytes, forty.as_bytes());

        assert_eq!(got[2].bytes.len(), 16);
        assert_eq!(&got[2].bytes[..15], &forty.as_bytes()[..15]);
        assert_eq!(got[2].bytes[15], 0);
    }

    #[test]
    fn test_emit_bytes_keeps_invalid_utf8() {
        take_captured();
        let slot = CallbackSlot::new();
        slot.set(capture).unwrap();
        let raw: &[u8] = b"serial \xff\xfe end";

        let promoted: LogTrampoline<'_, SystemAllocator, 8> =
            LogTrampoline::new(&slot, SystemAllocator);
        promoted.emit_bytes(3, c"ctrlr.c", 5, c"identify", raw);

        let wide: LogTrampoline<'_, SystemAllocator, 64> =
            LogTrampoline::new(&slot, SystemAllocator);
        wide.emit_bytes(3, c"ctrlr.c", 6, c"identify", raw);

        let got = take_captured();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].bytes, raw);
        assert_eq!(got[1].bytes, raw);
        assert_eq!(got[1].bytes.len(), 13);
    }

    #[test]
    fn test_one_callback_per_emit() {
        take_captured();
        let slot = CallbackSlot::new();
        slot.set(capture).unwrap();
        let trampoline: LogTrampoline<'_, SystemAllocator, 8> =
            LogTrampoline::new(&slot, SystemAllocator);

        for i in 0..5 {
            trampoline.emit(i, c"x.rs", 1, c"", format_args!("message number {}", i));
        }

        let got = take_captured();
        assert_eq!(got.len(), 5);
        for (i, record) in got.iter().enumerate() {
            assert_eq!(record.level, i as c_int);
            assert_eq!(record.bytes, format!("message number {}", i).as_bytes());
        }
    }
}

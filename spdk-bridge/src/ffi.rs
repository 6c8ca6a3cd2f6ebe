//! C ABI exports
//!
//! Entry points the host and the engine resolve by symbol name.

use crate::engine::completion;
use crate::logger::{self, LogCallback};
use crate::nvme::{NvmeCpl, NvmeStatusField};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::slice;

/// Returned by `bridge_register_log_callback` when a callback is already set
pub const EALREADY: c_int = 114;

/// Register the process-wide log callback
///
/// Returns 0 on success, `-EALREADY` if a callback was already registered.
/// Passing NULL leaves the slot empty and returns 0.
#[no_mangle]
pub extern "C" fn bridge_register_log_callback(cb: Option<LogCallback>) -> c_int {
    match cb {
        None => 0,
        Some(cb) => match logger::register_log_callback(cb) {
            Ok(()) => 0,
            Err(_) => -EALREADY,
        },
    }
}

/// Forward an already-rendered message through the trampoline
///
/// The bytes reach the callback unchanged; they need not be UTF-8.
///
/// # Safety
/// `file` and `func` must be NULL or NUL-terminated; `msg` must be NULL or
/// valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn bridge_log_message(
    level: c_int,
    file: *const c_char,
    line: c_int,
    func: *const c_char,
    msg: *const c_char,
    len: usize,
) {
    let file = if file.is_null() { c"" } else { CStr::from_ptr(file) };
    let func = if func.is_null() { c"" } else { CStr::from_ptr(func) };
    let bytes = if msg.is_null() {
        &[][..]
    } else {
        slice::from_raw_parts(msg as *const u8, len)
    };

    logger::emit_bytes(level, file, u32::try_from(line).unwrap_or_default(), func, bytes);
}

/// Pointer to the bit-field status word inside `cpl`
///
/// # Safety
/// See [`completion::status`].
#[no_mangle]
pub unsafe extern "C" fn bridge_nvme_cpl_status(cpl: *const NvmeCpl) -> *const NvmeStatusField {
    completion::status(cpl)
}

/// Pointer to the raw 16-bit status word inside `cpl`
///
/// # Safety
/// See [`completion::raw_status`].
#[no_mangle]
pub unsafe extern "C" fn bridge_nvme_cpl_raw_status(cpl: *const NvmeCpl) -> *const u16 {
    completion::raw_status(cpl)
}

//! Host log callbacks
//!
//! Either the built-in sink, which timestamps each record and writes it to
//! stdout, or a C function loaded from a shared library.

use anyhow::{Context, Result};
use chrono::Local;
use spdk_bridge::{register_log_callback, LogCallback, LogLevel};
use std::ffi::CStr;
use std::io::{self, Write};
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::slice;

/// Where log records from the trampoline end up
#[derive(Debug, Clone)]
pub enum SinkSource {
    Builtin,
    Library { path: PathBuf, symbol: String },
}

/// Render one record the way the built-in sink prints it
pub fn format_record(level: LogLevel, file: &str, line: c_int, func: &str, msg: &[u8]) -> String {
    // the message may end with a newline (log adapter) or a NUL (truncated)
    let end = msg
        .iter()
        .rposition(|&b| b != b'\n' && b != 0)
        .map_or(0, |i| i + 1);
    let text = String::from_utf8_lossy(&msg[..end]);
    let level = level.to_string();

    if func.is_empty() {
        format!("{:<6} {}:{}: {}", level, file, line, text)
    } else {
        format!("{:<6} {}:{} {}: {}", level, file, line, func, text)
    }
}

unsafe fn lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Built-in host sink
///
/// # Safety
/// Called by the trampoline with valid pointers for the duration of the call.
pub unsafe extern "C" fn stdout_sink(
    level: c_int,
    file: *const c_char,
    line: c_int,
    func: *const c_char,
    buf: *const c_char,
    len: c_int,
) {
    let msg: &[u8] = match usize::try_from(len) {
        Ok(len) if !buf.is_null() => slice::from_raw_parts(buf as *const u8, len),
        _ => &[],
    };
    let record = format_record(LogLevel::from_raw(level), &lossy(file), line, &lossy(func), msg);
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");

    // nowhere to report a failed write from inside a log sink
    let _ = writeln!(io::stdout().lock(), "[{}] {}", timestamp, record);
}

/// Resolve `symbol` in the library at `path`
///
/// The library stays loaded for the rest of the process: the callback is
/// registered for good.
pub fn load_callback(path: &Path, symbol: &str) -> Result<LogCallback> {
    log::debug!("Loading log callback '{}' from {:?}", symbol, path);

    // SAFETY: running the library's initializers is the point of loading it
    let library = unsafe { libloading::Library::new(path) }
        .with_context(|| format!("Failed to load sink library: {:?}", path))?;
    let library: &'static libloading::Library = Box::leak(Box::new(library));

    // SAFETY: the symbol is documented to have the LogCallback signature
    let callback = unsafe { library.get::<LogCallback>(symbol.as_bytes()) }
        .with_context(|| format!("Symbol '{}' not found in {:?}", symbol, path))?;
    Ok(*callback)
}

/// Register the selected sink with the trampoline
pub fn install(source: &SinkSource) -> Result<()> {
    let callback = match source {
        SinkSource::Builtin => stdout_sink as LogCallback,
        SinkSource::Library { path, symbol } => load_callback(path, symbol)?,
    };
    register_log_callback(callback).context("Failed to register log callback")?;
    log::debug!("Log callback installed ({:?})", source);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_record_trims_terminators() {
        let line = format_record(LogLevel::Notice, "nvme.c", 42, "attach", b"attached\n");
        assert_eq!(line, "NOTICE nvme.c:42 attach: attached");

        let line = format_record(LogLevel::Error, "a.rs", 1, "", b"cut sho\0");
        assert_eq!(line, "ERROR  a.rs:1: cut sho");
    }

    #[test]
    fn test_format_record_empty_message() {
        let line = format_record(LogLevel::Debug, "a.rs", 1, "f", b"");
        assert_eq!(line, "DEBUG  a.rs:1 f: ");
    }

    #[test]
    fn test_load_callback_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_callback(&dir.path().join("libnothing.so"), "sink").unwrap_err();
        assert!(err.to_string().contains("Failed to load sink library"));
    }
}

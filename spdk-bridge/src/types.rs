//! Core types for the SPDK bridge library
//!
//! This module defines the error type shared by both halves of the bridge and
//! the log levels understood by the engine's logger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::raw::c_int;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Identifier of a dispatch channel, used in diagnostics and slot binding
pub type ChannelId = u32;

/// Errors that can occur at the bridge boundary
///
/// The bypass submission path returns `ResourceExhausted`, or `InvalidBuffer`
/// for a null buffer with a non-zero length.
/// Allocation failures while formatting log messages are recovered inside the
/// trampoline and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("No free request slot on channel {channel}")]
    ResourceExhausted { channel: ChannelId },

    #[error("Admin opcode 0x{opcode:02X} transfers data to the controller on a read-only device")]
    PermissionDenied { opcode: u8 },

    #[error("Null data buffer passed with a transfer length of {nbytes} bytes")]
    InvalidBuffer { nbytes: usize },

    #[error("A log callback has already been registered")]
    CallbackAlreadyRegistered,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BridgeError {
    /// Check if the caller should back off and try again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::ResourceExhausted { .. })
    }
}

/// Engine log levels, numbered the way the engine's C logger numbers them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum LogLevel {
    Disabled = -1,
    Error = 0,
    Warn = 1,
    Notice = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    /// Raw value passed across the C boundary
    pub fn as_raw(self) -> c_int {
        self as c_int
    }

    /// Map a raw engine level back to a `LogLevel`, clamping unknown values
    pub fn from_raw(level: c_int) -> Self {
        match level {
            i if i < 0 => LogLevel::Disabled,
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Notice,
            3 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl From<LogLevel> for c_int {
    fn from(level: LogLevel) -> Self {
        level.as_raw()
    }
}

impl From<log::Level> for LogLevel {
    /// The engine has one more level than `log`, so everything below warn
    /// shifts down by one: info is NOTICE, debug is INFO, trace is DEBUG.
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Notice,
            log::Level::Debug => LogLevel::Info,
            log::Level::Trace => LogLevel::Debug,
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Disabled => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Notice => log::LevelFilter::Info,
            LogLevel::Info => log::LevelFilter::Debug,
            LogLevel::Debug => log::LevelFilter::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Disabled => write!(f, "DISABLED"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Notice => write!(f, "NOTICE"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(LogLevel::Disabled),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "notice" => Ok(LogLevel::Notice),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(BridgeError::Config(format!("unknown log level '{}'", other))),
        }
    }
}

//! SPDK Bridge Library
//!
//! Glue between a storage engine with a C logging and completion ABI and a
//! host that wants to observe and drive it.
//!
//! # Architecture
//!
//! The library covers two narrow paths:
//! - Log trampoline: renders the engine's log records into a bounded buffer
//!   and hands them to one host-registered callback with an exact length
//! - Bypass submission: queues NVMe admin passthrough commands on a dispatch
//!   channel without the engine's data-direction inference
//!
//! The library does NOT:
//! - Own the engine's threads or poll its channels
//! - Decide which admin commands are safe to bypass
//! - Persist or filter host-side log output
//!
//! Loading configuration files and the command line front-end live in the
//! application layer (spdk-bridge-cli).
//!
//! # Example Usage
//!
//! ```
//! use spdk_bridge::engine::{identify_controller, Device, LoopbackChannel};
//!
//! let channel = LoopbackChannel::new(0, 8);
//! let device = Device::read_only("nvme0n1");
//!
//! identify_controller(&device, &channel, |result| match result {
//!     Ok(ctrlr) => println!("model: {}", ctrlr.model),
//!     Err(status) => eprintln!("identify failed: {}", status),
//! })
//! .unwrap();
//!
//! // completions are delivered on the polling context
//! assert_eq!(channel.poll(), 1);
//! ```

// Public modules
pub mod config;
pub mod engine;
pub mod ffi;
pub mod logger;
pub mod nvme;
pub mod types;

// Re-export main types for convenience
pub use config::BridgeConfig;
pub use engine::{
    submit_admin_passthrough, AdminCompletionFn, Completion, Device, DispatchChannel,
    LoopbackChannel, RequestSlot,
};
pub use logger::{register_log_callback, BridgeLogger, LogCallback, LogTrampoline};
pub use nvme::{NvmeCmd, NvmeCpl, NvmeStatus, NvmeStatusField};
pub use types::{BridgeError, ChannelId, LogLevel, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

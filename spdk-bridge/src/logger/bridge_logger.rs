//! `log` crate adapter
//!
//! Routes records from the `log` facade through the trampoline so that Rust
//! code running inside the engine process ends up in the same host sink as the
//! engine's own messages.

use super::callback::{global_slot, CallbackSlot};
use super::format::SystemAllocator;
use super::trampoline::LogTrampoline;
use crate::config::BridgeConfig;
use crate::types::LogLevel;
use log::{LevelFilter, Log, Metadata, Record};
use std::ffi::CString;

fn is_submodule(parent: &str, possible_child: &str) -> bool {
    let parent = parent.as_bytes();
    let possible_child = possible_child.as_bytes();

    if parent.len() > possible_child.len() {
        return false;
    }

    if parent != &possible_child[..parent.len()] {
        return false;
    }

    // exact match, or the child continues with "::" (so "a::b" does not
    // swallow "a::bad")
    parent.len() == possible_child.len()
        || possible_child.get(parent.len()..parent.len() + 2) == Some(b"::")
}

/// A `log::Log` implementation that forwards to the engine log callback
#[derive(Clone)]
pub struct BridgeLogger {
    /// Sorted allow-list of module paths; empty means everything
    modules: Vec<String>,
    max_level: LevelFilter,
    slot: &'static CallbackSlot,
}

impl BridgeLogger {
    /// Logger bound to the process-wide callback slot
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_slot(config, global_slot())
    }

    /// Logger bound to a specific callback slot
    pub fn with_slot(config: &BridgeConfig, slot: &'static CallbackSlot) -> Self {
        let mut modules = config.modules.clone();
        modules.sort();
        modules.dedup();
        Self {
            modules,
            max_level: config.max_level.into(),
            slot,
        }
    }

    fn includes_module(&self, module_path: &str) -> bool {
        if self.modules.is_empty() {
            return true;
        }

        // every ancestor of module_path sorts before it, but not necessarily
        // right before it ("a" < "a::b" < "a::c"), so check them all
        let end = match self
            .modules
            .binary_search_by(|module| module.as_str().cmp(module_path))
        {
            Ok(_) => return true,
            Err(i) => i,
        };
        self.modules[..end]
            .iter()
            .any(|module| is_submodule(module, module_path))
    }

    /// Install as the global `log` logger
    pub fn init(self) -> Result<(), log::SetLoggerError> {
        let level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for BridgeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level && self.includes_module(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = LogLevel::from(record.level());
        let file = record.file().unwrap_or_default();
        // basename only: spdk-bridge/src/engine/mod.rs -> mod.rs
        let basename = &file[file.rfind('/').map_or(0, |v| v + 1)..];
        let basename = CString::new(basename).unwrap_or_default();
        let func = CString::new(record.module_path().unwrap_or_default()).unwrap_or_default();

        let trampoline: LogTrampoline<'_> = LogTrampoline::new(self.slot, SystemAllocator);
        trampoline.emit(
            level.as_raw(),
            &basename,
            record.line().unwrap_or_default(),
            &func,
            format_args!("{}\n", record.args()),
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::ffi::CStr;
    use std::os::raw::{c_char, c_int};
    use std::slice;

    thread_local! {
        static LINES: RefCell<Vec<(c_int, String, String)>> = RefCell::new(Vec::new());
    }

    unsafe extern "C" fn collect(
        level: c_int,
        file: *const c_char,
        _line: c_int,
        _func: *const c_char,
        buf: *const c_char,
        len: c_int,
    ) {
        let text = String::from_utf8_lossy(slice::from_raw_parts(buf as *const u8, len as usize))
            .into_owned();
        let file = CStr::from_ptr(file).to_string_lossy().into_owned();
        LINES.with(|l| l.borrow_mut().push((level, file, text)));
    }

    static SLOT: CallbackSlot = CallbackSlot::new();

    fn logger(config: &BridgeConfig) -> BridgeLogger {
        let _ = SLOT.set(collect);
        BridgeLogger::with_slot(config, &SLOT)
    }

    #[test]
    fn test_submodule_matching() {
        assert!(is_submodule("a::b", "a::b"));
        assert!(is_submodule("a::b", "a::b::c"));
        assert!(!is_submodule("a::b", "a::bad"));
        assert!(!is_submodule("a::b::c", "a::b"));
    }

    #[test]
    fn test_module_allow_list() {
        let config = BridgeConfig::new()
            .add_module("spdk_bridge::engine")
            .add_module("host");
        let logger = logger(&config);

        assert!(logger.includes_module("spdk_bridge::engine"));
        assert!(logger.includes_module("spdk_bridge::engine::loopback"));
        assert!(logger.includes_module("host::sink"));
        assert!(!logger.includes_module("spdk_bridge::logger"));
        assert!(!logger.includes_module("hostile"));
        assert!(!logger.includes_module("aaa"));
    }

    #[test]
    fn test_nested_allow_list() {
        let config = BridgeConfig::new()
            .add_module("a")
            .add_module("a::b")
            .add_module("a::bz");
        let logger = logger(&config);

        assert!(logger.includes_module("a::c"));
        assert!(logger.includes_module("a::b::x"));
        assert!(logger.includes_module("a::bz::y"));
        assert!(logger.includes_module("a"));
        assert!(!logger.includes_module("ab"));
        assert!(!logger.includes_module("b::a"));
    }

    #[test]
    fn test_record_forwarding() {
        let config = BridgeConfig::new().with_max_level(LogLevel::Info);
        let logger = logger(&config);
        LINES.with(|l| l.borrow_mut().clear());

        logger.log(
            &Record::builder()
                .args(format_args!("bdev {} opened", "malloc0"))
                .level(log::Level::Debug)
                .target("spdk_bridge::engine")
                .file(Some("spdk-bridge/src/engine/mod.rs"))
                .line(Some(42))
                .build(),
        );
        // trace is above the configured level
        logger.log(
            &Record::builder()
                .args(format_args!("noise"))
                .level(log::Level::Trace)
                .target("spdk_bridge::engine")
                .build(),
        );

        let lines = LINES.with(|l| l.borrow_mut().drain(..).collect::<Vec<_>>());
        assert_eq!(lines.len(), 1);
        let (level, file, text) = &lines[0];
        assert_eq!(*level, LogLevel::Info.as_raw());
        assert_eq!(file, "mod.rs");
        assert_eq!(text, "bdev malloc0 opened\n");
    }
}

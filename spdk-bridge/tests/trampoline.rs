// End-to-end checks of the log trampoline through the process-wide slot.
// Registration is write-once per process, so everything touching the global
// slot lives in a single test.

use spdk_bridge::ffi::{bridge_log_message, bridge_register_log_callback, EALREADY};
use spdk_bridge::logger::{CallbackSlot, LogTrampoline, NoScratch, SystemAllocator};
use spdk_bridge::{bridge_log, register_log_callback, BridgeError, LogLevel};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::slice;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Record {
    level: c_int,
    file: String,
    line: c_int,
    func: String,
    bytes: Vec<u8>,
}

static RECORDS: Mutex<Vec<Record>> = Mutex::new(Vec::new());
static LOCAL_RECORDS: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());
static LOCAL_SLOT: CallbackSlot = CallbackSlot::new();

unsafe extern "C" fn host_sink(
    level: c_int,
    file: *const c_char,
    line: c_int,
    func: *const c_char,
    buf: *const c_char,
    len: c_int,
) {
    let record = Record {
        level,
        file: CStr::from_ptr(file).to_string_lossy().into_owned(),
        line,
        func: CStr::from_ptr(func).to_string_lossy().into_owned(),
        bytes: slice::from_raw_parts(buf as *const u8, len as usize).to_vec(),
    };
    RECORDS.lock().unwrap().push(record);
}

unsafe extern "C" fn other_sink(
    _level: c_int,
    _file: *const c_char,
    _line: c_int,
    _func: *const c_char,
    _buf: *const c_char,
    _len: c_int,
) {
    panic!("second registration must not take effect");
}

unsafe extern "C" fn local_sink(
    _level: c_int,
    _file: *const c_char,
    _line: c_int,
    _func: *const c_char,
    buf: *const c_char,
    len: c_int,
) {
    let bytes = slice::from_raw_parts(buf as *const u8, len as usize).to_vec();
    LOCAL_RECORDS.lock().unwrap().push(bytes);
}

fn drain() -> Vec<Record> {
    std::mem::take(&mut *RECORDS.lock().unwrap())
}

#[test]
fn test_global_trampoline_lifecycle() {
    // nothing registered yet: silently dropped
    bridge_log!(LogLevel::Error, "lost {}", 1);
    assert!(drain().is_empty());

    assert_eq!(bridge_register_log_callback(Some(host_sink)), 0);
    assert_eq!(bridge_register_log_callback(Some(other_sink)), -EALREADY);
    assert!(matches!(
        register_log_callback(other_sink),
        Err(BridgeError::CallbackAlreadyRegistered)
    ));

    let expected_line = line!() + 1;
    bridge_log!(LogLevel::Notice, "bdev {} claimed", "nvme0n1");
    let got = drain();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].level, 2);
    assert_eq!(got[0].bytes, b"bdev nvme0n1 claimed");
    assert!(got[0].file.ends_with("trampoline.rs"));
    assert_eq!(got[0].line, expected_line as c_int);
    assert_eq!(got[0].func, module_path!());

    // longer than the default stack buffer: promoted, reported in full
    let long = "x".repeat(10_000);
    bridge_log!(LogLevel::Debug, "{}", long);
    let got = drain();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].bytes.len(), 10_000);

    // pre-rendered engine messages, including NULs for file and func
    let msg = b"controller reset done";
    unsafe {
        bridge_log_message(
            1,
            c"nvme_ctrlr.c".as_ptr(),
            812,
            c"nvme_ctrlr_reset".as_ptr(),
            msg.as_ptr() as *const c_char,
            msg.len(),
        );
        bridge_log_message(0, std::ptr::null(), 3, std::ptr::null(), msg.as_ptr() as *const c_char, 10);
    }
    let got = drain();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].level, 1);
    assert_eq!(got[0].file, "nvme_ctrlr.c");
    assert_eq!(got[0].line, 812);
    assert_eq!(got[0].func, "nvme_ctrlr_reset");
    assert_eq!(got[0].bytes, msg);
    assert_eq!(got[1].file, "");
    assert_eq!(got[1].bytes, b"controller");

    // engine strings are not necessarily UTF-8; nothing is substituted
    let raw = b"serial \xff\xfe end";
    unsafe {
        bridge_log_message(
            3,
            c"nvme_ctrlr.c".as_ptr(),
            90,
            c"identify_done".as_ptr(),
            raw.as_ptr() as *const c_char,
            raw.len(),
        );
    }
    let got = drain();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].bytes.len(), 13);
    assert_eq!(got[0].bytes, raw);
}

#[test]
fn test_capacity_16_policy() {
    LOCAL_SLOT.set(local_sink).unwrap();
    let forty = "abcdefghij".repeat(4);

    let promoted: LogTrampoline<'_, SystemAllocator, 16> =
        LogTrampoline::new(&LOCAL_SLOT, SystemAllocator);
    promoted.emit(2, c"t.rs", 1, c"t", format_args!("abc"));
    promoted.emit(2, c"t.rs", 2, c"t", format_args!("{}", forty));
    // exactly 15 bytes still fits together with the terminator
    promoted.emit(2, c"t.rs", 3, c"t", format_args!("{}", &forty[..15]));
    // 16 bytes does not
    promoted.emit(2, c"t.rs", 4, c"t", format_args!("{}", &forty[..16]));

    let starved: LogTrampoline<'_, NoScratch, 16> = LogTrampoline::new(&LOCAL_SLOT, NoScratch);
    starved.emit(2, c"t.rs", 5, c"t", format_args!("{}", forty));
    starved.emit(2, c"t.rs", 6, c"t", format_args!("short"));

    let got = std::mem::take(&mut *LOCAL_RECORDS.lock().unwrap());
    assert_eq!(got.len(), 6);
    assert_eq!(got[0], b"abc");
    assert_eq!(got[1], forty.as_bytes());
    assert_eq!(got[2], &forty.as_bytes()[..15]);
    assert_eq!(got[3], &forty.as_bytes()[..16]);

    assert_eq!(got[4].len(), 16);
    assert_eq!(&got[4][..15], &forty.as_bytes()[..15]);
    assert_eq!(got[4][15], 0);

    assert_eq!(got[5], b"short");
}

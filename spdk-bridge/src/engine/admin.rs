//! Safe admin command helpers built on the bypass submission path
//!
//! The closure and the data buffer are boxed together and travel through the
//! engine as the completion argument. The completion trampoline unboxes them
//! exactly once; if submission fails the box is reclaimed on the spot.

use super::completion::Completion;
use super::passthru::submit_admin_passthrough;
use super::{Device, DispatchChannel};
use crate::nvme::{NvmeCmd, NvmeCpl, NvmeStatus, IDENTIFY_DATA_LEN};
use crate::types::Result;
use chrono::Utc;
use serde::Serialize;
use std::os::raw::c_void;
use std::ptr;

/// Owned data buffer for an admin command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaBuf {
    data: Vec<u8>,
}

impl DmaBuf {
    /// Zero-filled buffer of `len` bytes
    pub fn new(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        self.data.as_mut_ptr() as *mut c_void
    }
}

impl From<Vec<u8>> for DmaBuf {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

struct AdminContext<F> {
    on_done: F,
    buffer: Option<DmaBuf>,
}

unsafe extern "C" fn admin_done<F>(arg: *mut c_void, cpl: *const NvmeCpl)
where
    F: for<'a> FnOnce(Completion<'a>, Option<DmaBuf>),
{
    let ctx = Box::from_raw(arg as *mut AdminContext<F>);
    let AdminContext { on_done, buffer } = *ctx;
    on_done(Completion::new(&*cpl), buffer);
}

/// Submit `cmd` with an optional owned buffer and a Rust completion closure
///
/// The closure receives the completion (valid only inside the closure) and
/// gets the buffer back. On `ResourceExhausted` the closure is dropped without
/// being called and the error is returned.
///
/// The boxed closure is freed only by its completion. A channel that is torn
/// down with the command still queued must complete it (as `LoopbackChannel`
/// does, with an aborted status) or the closure and buffer leak.
pub fn nvme_admin<C, F>(
    device: &Device,
    channel: &C,
    cmd: &NvmeCmd,
    buffer: Option<DmaBuf>,
    on_done: F,
) -> Result<()>
where
    C: DispatchChannel + ?Sized,
    F: for<'a> FnOnce(Completion<'a>, Option<DmaBuf>) + 'static,
{
    log::trace!("sending nvme admin 0x{:02x} to {}", cmd.opc(), device.name());

    let mut ctx = Box::new(AdminContext { on_done, buffer });
    let (buf, nbytes) = match ctx.buffer.as_mut() {
        Some(b) if !b.is_empty() => (b.as_mut_ptr(), b.len()),
        _ => (ptr::null_mut(), 0),
    };
    let arg = Box::into_raw(ctx);

    // SAFETY: the buffer's heap storage and the context both live in `arg`,
    // which is only freed by admin_done or right below on failure
    let rc = unsafe {
        submit_admin_passthrough(
            device,
            channel,
            cmd,
            buf,
            nbytes,
            admin_done::<F>,
            arg as *mut c_void,
        )
    };

    if let Err(e) = rc {
        drop(unsafe { Box::from_raw(arg) });
        return Err(e);
    }
    Ok(())
}

/// Identify controller data fields the bridge reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifyController {
    pub vid: u16,
    pub ssvid: u16,
    pub serial: String,
    pub model: String,
    pub firmware: String,
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

impl IdentifyController {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 72 {
            return None;
        }
        Some(Self {
            vid: u16::from_le_bytes([data[0], data[1]]),
            ssvid: u16::from_le_bytes([data[2], data[3]]),
            serial: ascii_field(&data[4..24]),
            model: ascii_field(&data[24..64]),
            firmware: ascii_field(&data[64..72]),
        })
    }
}

/// IDENTIFY the controller behind `device`
///
/// `on_done` gets the parsed data, or the failing status.
pub fn identify_controller<C, F>(device: &Device, channel: &C, on_done: F) -> Result<()>
where
    C: DispatchChannel + ?Sized,
    F: FnOnce(std::result::Result<IdentifyController, NvmeStatus>) + 'static,
{
    nvme_admin(
        device,
        channel,
        &NvmeCmd::identify_controller(),
        Some(DmaBuf::new(IDENTIFY_DATA_LEN)),
        move |cpl, buffer| {
            let status = cpl.nvme_status();
            let parsed = match buffer {
                Some(buf) if status.is_success() => {
                    IdentifyController::parse(buf.as_slice()).ok_or(status)
                }
                _ => Err(status),
            };
            on_done(parsed);
        },
    )
}

/// Send a buffer-less admin command and report its status
pub fn admin_custom<C, F>(device: &Device, channel: &C, opcode: u8, on_done: F) -> Result<()>
where
    C: DispatchChannel + ?Sized,
    F: FnOnce(NvmeStatus) + 'static,
{
    nvme_admin(device, channel, &NvmeCmd::new(opcode), None, move |cpl, _| {
        on_done(cpl.nvme_status())
    })
}

/// Ask the device to take a snapshot stamped with the current time
///
/// Returns the snapshot time (seconds since the Unix epoch) that was encoded
/// into the command. `on_done` sees the whole completion.
pub fn create_snapshot<C, F>(device: &Device, channel: &C, on_done: F) -> Result<u64>
where
    C: DispatchChannel + ?Sized,
    F: for<'a> FnOnce(Completion<'a>) + 'static,
{
    let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
    log::debug!("creating snapshot of {} at {}", device.name(), now);
    nvme_admin(
        device,
        channel,
        &NvmeCmd::create_snapshot(now),
        None,
        move |cpl, _| on_done(cpl),
    )?;
    Ok(now)
}

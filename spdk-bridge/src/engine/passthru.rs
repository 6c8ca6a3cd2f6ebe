//! Admin passthrough submission
//!
//! `submit_admin_passthrough` is the bypass path: the caller asserts the
//! command is non-destructive, so the engine's read/write inference (which
//! would refuse data-out commands on read-only descriptors) is skipped and the
//! slot is tagged with `DirectionPolicy::Bypass`.
//!
//! `submit_admin_inferred` is the engine's ordinary path, kept alongside for
//! writable descriptors and for contrast.

use super::{AdminCompletionFn, Device, DirectionPolicy, DispatchChannel, RequestSlot};
use crate::nvme::NvmeCmd;
use crate::types::{BridgeError, Result};
use std::os::raw::c_void;

/// A slot on loan from a channel; goes back to the pool unless dispatched
struct SlotGuard<'c, C: DispatchChannel + ?Sized> {
    channel: &'c C,
    slot: Option<Box<RequestSlot>>,
}

impl<'c, C: DispatchChannel + ?Sized> SlotGuard<'c, C> {
    fn acquire(channel: &'c C) -> Result<Self> {
        match channel.get_slot() {
            Some(slot) => Ok(Self {
                channel,
                slot: Some(slot),
            }),
            None => {
                log::warn!("channel {}: request slot pool exhausted", channel.id());
                Err(BridgeError::ResourceExhausted {
                    channel: channel.id(),
                })
            }
        }
    }

    fn slot_mut(&mut self) -> &mut RequestSlot {
        // only `dispatch` empties the option, and it consumes the guard
        self.slot
            .as_deref_mut()
            .unwrap_or_else(|| unreachable!("slot guard already dispatched"))
    }

    fn dispatch(mut self) {
        if let Some(slot) = self.slot.take() {
            log::debug!(
                "channel {}: dispatching slot {} (opc 0x{:02x})",
                self.channel.id(),
                slot.index(),
                slot.cmd().opc()
            );
            self.channel.dispatch(slot);
        }
    }
}

impl<C: DispatchChannel + ?Sized> Drop for SlotGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            log::debug!(
                "channel {}: returning undispatched slot {}",
                self.channel.id(),
                slot.index()
            );
            slot.reset();
            self.channel.put_slot(slot);
        }
    }
}

fn check_buffer(buf: *mut c_void, nbytes: usize) -> Result<()> {
    if buf.is_null() && nbytes != 0 {
        return Err(BridgeError::InvalidBuffer { nbytes });
    }
    Ok(())
}

/// Submit an admin command without data-direction inference
///
/// Returns as soon as the slot is queued; the command has not necessarily run.
/// `cb(cb_arg, cpl)` fires exactly once later, on whichever context polls
/// `channel`. When no slot is free this returns
/// `BridgeError::ResourceExhausted` and nothing is queued.
///
/// # Safety
/// `buf` must be valid for `nbytes` bytes of reads and writes, and `cb_arg`
/// valid for whatever `cb` does with it, until `cb` has been called. The
/// command must not modify the device: that is exactly the check being
/// bypassed.
#[allow(clippy::too_many_arguments)]
pub unsafe fn submit_admin_passthrough<C>(
    device: &Device,
    channel: &C,
    cmd: &NvmeCmd,
    buf: *mut c_void,
    nbytes: usize,
    cb: AdminCompletionFn,
    cb_arg: *mut c_void,
) -> Result<()>
where
    C: DispatchChannel + ?Sized,
{
    check_buffer(buf, nbytes)?;

    let mut guard = SlotGuard::acquire(channel)?;
    guard.slot_mut().populate_admin(
        channel.id(),
        device,
        DirectionPolicy::Bypass,
        cmd,
        buf,
        nbytes,
        cb,
        cb_arg,
    );
    guard.dispatch();
    Ok(())
}

/// Submit an admin command through the engine's ordinary path
///
/// Commands whose opcode transfers data to the controller require a writable
/// device; otherwise this fails with `BridgeError::PermissionDenied` and the
/// slot goes straight back to the pool.
///
/// # Safety
/// Same buffer and callback contract as [`submit_admin_passthrough`].
#[allow(clippy::too_many_arguments)]
pub unsafe fn submit_admin_inferred<C>(
    device: &Device,
    channel: &C,
    cmd: &NvmeCmd,
    buf: *mut c_void,
    nbytes: usize,
    cb: AdminCompletionFn,
    cb_arg: *mut c_void,
) -> Result<()>
where
    C: DispatchChannel + ?Sized,
{
    check_buffer(buf, nbytes)?;

    let mut guard = SlotGuard::acquire(channel)?;
    let slot = guard.slot_mut();
    slot.populate_admin(
        channel.id(),
        device,
        DirectionPolicy::Inferred,
        cmd,
        buf,
        nbytes,
        cb,
        cb_arg,
    );

    if slot.cmd().data_transfer().writes_to_device() && !device.is_writable() {
        // guard drop returns the slot
        return Err(BridgeError::PermissionDenied { opcode: cmd.opc() });
    }

    guard.dispatch();
    Ok(())
}

//! In-process dispatch channel
//!
//! `LoopbackChannel` stands in for an engine channel: it owns a fixed pool of
//! request slots, queues dispatched slots, and completes them when polled by
//! running each command against an `AdminHandler`. Like a real engine channel
//! it is bound to one thread (it is neither `Send` nor `Sync`).

use super::{Device, DispatchChannel, RequestSlot};
use crate::nvme::{admin_opc, sct, GenericStatusCode, NvmeCmd, NvmeCpl, IDENTIFY_CNS_CTRLR, IDENTIFY_DATA_LEN};
use crate::types::ChannelId;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::slice;

/// Executes admin commands on behalf of a loopback channel
pub trait AdminHandler {
    /// Run `cmd`, reading or filling `data`, and record the outcome in `cpl`
    fn execute(&mut self, device: &Device, cmd: &NvmeCmd, data: &mut [u8], cpl: &mut NvmeCpl);
}

impl<F> AdminHandler for F
where
    F: FnMut(&Device, &NvmeCmd, &mut [u8], &mut NvmeCpl),
{
    fn execute(&mut self, device: &Device, cmd: &NvmeCmd, data: &mut [u8], cpl: &mut NvmeCpl) {
        self(device, cmd, data, cpl)
    }
}

fn set_generic(cpl: &mut NvmeCpl, code: GenericStatusCode) {
    let status = cpl.status_mut();
    status.set_sct(sct::GENERIC);
    status.set_sc(code.into());
}

fn put_ascii(dst: &mut [u8], value: &str) {
    dst.fill(b' ');
    let n = value.len().min(dst.len());
    dst[..n].copy_from_slice(&value.as_bytes()[..n]);
}

/// A minimal NVMe controller answering the admin commands the bridge uses
#[derive(Debug, Clone)]
pub struct EmulatedController {
    pub vid: u16,
    pub ssvid: u16,
    pub serial: String,
    pub model: String,
    pub firmware: String,
    /// Snapshot times received through CREATE_SNAPSHOT
    pub snapshots: Vec<u64>,
}

impl Default for EmulatedController {
    fn default() -> Self {
        Self {
            vid: 0x1b36,
            ssvid: 0x1af4,
            serial: "LOOPBACK0001".to_string(),
            model: "SPDK bridge loopback controller".to_string(),
            firmware: env!("CARGO_PKG_VERSION").to_string(),
            snapshots: Vec::new(),
        }
    }
}

impl EmulatedController {
    fn identify(&self, cmd: &NvmeCmd, data: &mut [u8], cpl: &mut NvmeCpl) {
        if cmd.cdw10 & 0xff != IDENTIFY_CNS_CTRLR || data.len() < IDENTIFY_DATA_LEN {
            set_generic(cpl, GenericStatusCode::InvalidField);
            return;
        }

        let data = &mut data[..IDENTIFY_DATA_LEN];
        data.fill(0);
        data[0..2].copy_from_slice(&self.vid.to_le_bytes());
        data[2..4].copy_from_slice(&self.ssvid.to_le_bytes());
        put_ascii(&mut data[4..24], &self.serial);
        put_ascii(&mut data[24..64], &self.model);
        put_ascii(&mut data[64..72], &self.firmware);
        set_generic(cpl, GenericStatusCode::Success);
    }
}

impl AdminHandler for EmulatedController {
    fn execute(&mut self, device: &Device, cmd: &NvmeCmd, data: &mut [u8], cpl: &mut NvmeCpl) {
        match cmd.opc() {
            admin_opc::IDENTIFY => self.identify(cmd, data, cpl),
            admin_opc::CREATE_SNAPSHOT => {
                log::debug!("{}: snapshot at {}", device.name(), cmd.snapshot_time());
                self.snapshots.push(cmd.snapshot_time());
                set_generic(cpl, GenericStatusCode::Success);
            }
            admin_opc::KEEP_ALIVE => set_generic(cpl, GenericStatusCode::Success),
            other => {
                log::debug!("{}: unsupported admin opcode 0x{:02x}", device.name(), other);
                set_generic(cpl, GenericStatusCode::InvalidOpcode);
                cpl.status_mut().set_dnr(true);
            }
        }
    }
}

/// Single-threaded channel with a fixed slot pool
pub struct LoopbackChannel {
    id: ChannelId,
    pool_size: usize,
    free: RefCell<Vec<Box<RequestSlot>>>,
    pending: RefCell<VecDeque<Box<RequestSlot>>>,
    handler: RefCell<Box<dyn AdminHandler>>,
}

impl LoopbackChannel {
    /// Channel backed by an `EmulatedController`
    pub fn new(id: ChannelId, pool_size: usize) -> Self {
        Self::with_handler(id, pool_size, EmulatedController::default())
    }

    pub fn with_handler<H>(id: ChannelId, pool_size: usize, handler: H) -> Self
    where
        H: AdminHandler + 'static,
    {
        let free = (0..pool_size)
            .rev()
            .map(|i| Box::new(RequestSlot::new(i)))
            .collect();
        Self {
            id,
            pool_size,
            free: RefCell::new(free),
            pending: RefCell::new(VecDeque::new()),
            handler: RefCell::new(Box::new(handler)),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_slots(&self) -> usize {
        self.free.borrow().len()
    }

    /// Dispatched commands not yet completed
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Execute and complete every command queued before this call
    ///
    /// Each completion callback runs with no internal borrow held, so it may
    /// submit again; such submissions are completed by a later poll. A slot
    /// returns to the pool only after its callback has returned.
    pub fn poll(&self) -> usize {
        let batch = self.pending.borrow().len();
        let mut completed = 0;

        for _ in 0..batch {
            let Some(mut slot) = self.pending.borrow_mut().pop_front() else {
                break;
            };

            self.execute(&mut slot);
            slot.complete();
            slot.reset();
            self.free.borrow_mut().push(slot);
            completed += 1;
        }

        if completed > 0 {
            log::trace!("channel {}: completed {} request(s)", self.id, completed);
        }
        completed
    }

    fn execute(&self, slot: &mut RequestSlot) {
        let (buf, nbytes) = slot.data();
        let data: &mut [u8] = if buf.is_null() {
            &mut []
        } else {
            // SAFETY: the submitter guaranteed buf/nbytes stay valid until
            // completion, which has not happened yet
            unsafe { slice::from_raw_parts_mut(buf as *mut u8, nbytes) }
        };

        let cmd = *slot.cmd();
        let Some(device) = slot.device().cloned() else {
            set_generic(slot.cpl_mut(), GenericStatusCode::InternalDeviceError);
            return;
        };

        let mut cpl = NvmeCpl::default();
        self.handler
            .borrow_mut()
            .execute(&device, &cmd, data, &mut cpl);
        *slot.cpl_mut() = cpl;
    }
}

impl DispatchChannel for LoopbackChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn get_slot(&self) -> Option<Box<RequestSlot>> {
        self.free.borrow_mut().pop()
    }

    fn put_slot(&self, slot: Box<RequestSlot>) {
        self.free.borrow_mut().push(slot);
    }

    fn dispatch(&self, slot: Box<RequestSlot>) {
        self.pending.borrow_mut().push_back(slot);
    }
}

/// Requests still queued are completed with "aborted, submission queue
/// deleted" so their callbacks run and release what they own.
impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        let pending = std::mem::take(self.pending.get_mut());
        if pending.is_empty() {
            return;
        }

        log::warn!(
            "channel {} dropped with {} request(s) pending, aborting them",
            self.id,
            pending.len()
        );
        for mut slot in pending {
            set_generic(slot.cpl_mut(), GenericStatusCode::AbortedSubmissionQueueDeleted);
            slot.complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;
    use std::ptr;

    #[test]
    fn test_pool_accounting() {
        let channel = LoopbackChannel::new(7, 3);
        assert_eq!(channel.id(), 7);
        assert_eq!(channel.pool_size(), 3);
        assert_eq!(channel.free_slots(), 3);

        let a = channel.get_slot().unwrap();
        let b = channel.get_slot().unwrap();
        assert_ne!(a.index(), b.index());
        assert_eq!(channel.free_slots(), 1);

        channel.put_slot(a);
        channel.dispatch(b);
        assert_eq!(channel.free_slots(), 2);
        assert_eq!(channel.pending(), 1);
    }

    #[test]
    fn test_emulated_identify() {
        let mut ctrlr = EmulatedController::default();
        let device = Device::read_only("nvme0n1");
        let mut data = vec![0xffu8; IDENTIFY_DATA_LEN];
        let mut cpl = NvmeCpl::default();

        ctrlr.execute(&device, &NvmeCmd::identify_controller(), &mut data, &mut cpl);
        assert!(cpl.succeeded());
        assert_eq!(u16::from_le_bytes([data[0], data[1]]), 0x1b36);
        assert_eq!(&data[4..16], b"LOOPBACK0001");
        assert_eq!(data[16], b' ');
        assert_eq!(data[100], 0);
    }

    #[test]
    fn test_emulated_identify_short_buffer() {
        let mut ctrlr = EmulatedController::default();
        let mut data = vec![0u8; 512];
        let mut cpl = NvmeCpl::default();

        ctrlr.execute(
            &Device::read_only("nvme0n1"),
            &NvmeCmd::identify_controller(),
            &mut data,
            &mut cpl,
        );
        assert_eq!(
            cpl.nvme_status(),
            crate::nvme::NvmeStatus::Generic(GenericStatusCode::InvalidField)
        );
    }

    #[test]
    fn test_unknown_opcode() {
        let mut ctrlr = EmulatedController::default();
        let mut cpl = NvmeCpl::default();
        ctrlr.execute(
            &Device::read_only("nvme0n1"),
            &NvmeCmd::new(admin_opc::FORMAT_NVM),
            &mut [],
            &mut cpl,
        );
        assert!(!cpl.succeeded());
        assert!(cpl.status().dnr());
        assert_eq!(cpl.status().sc(), 0x01);
    }

    #[test]
    fn test_drop_aborts_pending_requests() {
        use crate::engine::admin_custom;
        use crate::nvme::NvmeStatus;
        use std::cell::RefCell;
        use std::rc::Rc;

        let statuses = Rc::new(RefCell::new(Vec::new()));
        {
            let channel = LoopbackChannel::new(0, 2);
            let device = Device::read_only("nvme0n1");
            for _ in 0..2 {
                let sink = statuses.clone();
                admin_custom(&device, &channel, admin_opc::KEEP_ALIVE, move |s| {
                    sink.borrow_mut().push(s)
                })
                .unwrap();
            }
            assert_eq!(Rc::strong_count(&statuses), 3);
        }

        // both closures ran and were freed
        assert_eq!(Rc::strong_count(&statuses), 1);
        assert_eq!(
            *statuses.borrow(),
            vec![
                NvmeStatus::Generic(GenericStatusCode::AbortedSubmissionQueueDeleted);
                2
            ]
        );
    }

    #[test]
    fn test_closure_handler() {
        let channel = LoopbackChannel::with_handler(
            1,
            1,
            |_: &Device, cmd: &NvmeCmd, _: &mut [u8], cpl: &mut NvmeCpl| {
                cpl.cdw0 = cmd.cdw10 + 1;
            },
        );

        unsafe extern "C" fn stash(arg: *mut c_void, cpl: *const NvmeCpl) {
            *(arg as *mut u32) = (*cpl).cdw0;
        }

        let mut out = 0u32;
        unsafe {
            crate::engine::submit_admin_passthrough(
                &Device::read_only("nvme0n1"),
                &channel,
                &NvmeCmd::new(0xC1).with_cdw10(41),
                ptr::null_mut(),
                0,
                stash,
                &mut out as *mut u32 as *mut c_void,
            )
        }
        .unwrap();

        assert_eq!(channel.poll(), 1);
        assert_eq!(out, 42);
    }
}

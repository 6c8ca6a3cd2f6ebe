//! Engine dispatch boundary
//!
//! The engine owns channels and their request slot pools; the bridge borrows a
//! channel per call, fills in one slot and hands it back for execution. This
//! module defines the shapes both sides agree on.
//!
//! A channel is bound to a single worker context. Nothing here synchronizes:
//! callers must only touch a channel from the context that owns it.

pub mod admin;
pub mod completion;
pub mod loopback;
pub mod passthru;

use crate::nvme::{NvmeCmd, NvmeCpl};
use crate::types::ChannelId;
use std::fmt;
use std::os::raw::c_void;
use std::ptr;
use std::sync::Arc;

pub use admin::{admin_custom, create_snapshot, identify_controller, nvme_admin, DmaBuf, IdentifyController};
pub use completion::{raw_status, status, Completion};
pub use loopback::{AdminHandler, EmulatedController, LoopbackChannel};
pub use passthru::{submit_admin_inferred, submit_admin_passthrough};

/// Completion callback for admin commands: `(cb_arg, completion)`
///
/// The completion pointer is only valid for the duration of the call.
pub type AdminCompletionFn = unsafe extern "C" fn(cb_arg: *mut c_void, cpl: *const NvmeCpl);

/// How the engine decides whether an admin command needs a writable device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionPolicy {
    /// Inspect the opcode's data-transfer bits
    Inferred,
    /// The submitter asserts the command is non-destructive; skip inspection
    Bypass,
}

/// What a populated slot asks the engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Slot is sitting in the pool
    Unset,
    NvmeAdmin(DirectionPolicy),
}

/// An open device descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    name: Arc<str>,
    writable: bool,
}

impl Device {
    pub fn open(name: &str, writable: bool) -> Self {
        Self {
            name: Arc::from(name),
            writable,
        }
    }

    pub fn read_only(name: &str) -> Self {
        Self::open(name, false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// One reusable request descriptor from a channel's pool
pub struct RequestSlot {
    index: usize,
    channel: Option<ChannelId>,
    device: Option<Device>,
    op: OpKind,
    cmd: NvmeCmd,
    buf: *mut c_void,
    nbytes: usize,
    md_buf: *mut c_void,
    md_len: usize,
    on_complete: Option<(AdminCompletionFn, *mut c_void)>,
    cpl: NvmeCpl,
}

impl RequestSlot {
    /// A fresh slot for position `index` of a pool
    pub fn new(index: usize) -> Self {
        Self {
            index,
            channel: None,
            device: None,
            op: OpKind::Unset,
            cmd: NvmeCmd::default(),
            buf: ptr::null_mut(),
            nbytes: 0,
            md_buf: ptr::null_mut(),
            md_len: 0,
            on_complete: None,
            cpl: NvmeCpl::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn cmd(&self) -> &NvmeCmd {
        &self.cmd
    }

    /// Data region `(buf, nbytes)`
    pub fn data(&self) -> (*mut c_void, usize) {
        (self.buf, self.nbytes)
    }

    /// Metadata region `(md_buf, md_len)`
    pub fn metadata(&self) -> (*mut c_void, usize) {
        (self.md_buf, self.md_len)
    }

    pub fn cpl(&self) -> &NvmeCpl {
        &self.cpl
    }

    /// The record the engine fills in before completing the slot
    pub fn cpl_mut(&mut self) -> &mut NvmeCpl {
        &mut self.cpl
    }

    pub fn has_completion(&self) -> bool {
        self.on_complete.is_some()
    }

    /// Fill the slot for an admin passthrough
    ///
    /// Every field is overwritten, metadata included, so nothing from a
    /// previous use of the slot survives.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn populate_admin(
        &mut self,
        channel: ChannelId,
        device: &Device,
        policy: DirectionPolicy,
        cmd: &NvmeCmd,
        buf: *mut c_void,
        nbytes: usize,
        cb: AdminCompletionFn,
        cb_arg: *mut c_void,
    ) {
        self.channel = Some(channel);
        self.device = Some(device.clone());
        self.op = OpKind::NvmeAdmin(policy);
        self.cmd = *cmd;
        self.buf = buf;
        self.nbytes = nbytes;
        self.md_buf = ptr::null_mut();
        self.md_len = 0;
        self.on_complete = Some((cb, cb_arg));
        self.cpl = NvmeCpl::default();
    }

    /// Invoke the completion callback with this slot's record
    ///
    /// Fires at most once per population; later calls do nothing. Returns
    /// whether the callback ran.
    pub fn complete(&mut self) -> bool {
        let Some((cb, cb_arg)) = self.on_complete.take() else {
            return false;
        };
        // SAFETY: the submitter vouched for cb/cb_arg when it populated the
        // slot; the record outlives the call
        unsafe { cb(cb_arg, &self.cpl) };
        true
    }

    /// Return the slot to its pristine pool state
    pub fn reset(&mut self) {
        let index = self.index;
        *self = RequestSlot::new(index);
    }
}

impl fmt::Debug for RequestSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSlot")
            .field("index", &self.index)
            .field("channel", &self.channel)
            .field("device", &self.device.as_ref().map(|d| d.name()))
            .field("op", &self.op)
            .field("opc", &self.cmd.opc)
            .field("nbytes", &self.nbytes)
            .field("pending_completion", &self.on_complete.is_some())
            .finish()
    }
}

/// An engine execution context with a pool of request slots
///
/// Methods take `&self`: a channel is shared by reference within its worker
/// context and uses interior mutability.
pub trait DispatchChannel {
    fn id(&self) -> ChannelId;

    /// Take a free slot out of the pool, or `None` if all are in flight
    fn get_slot(&self) -> Option<Box<RequestSlot>>;

    /// Give back a slot that was never dispatched
    fn put_slot(&self, slot: Box<RequestSlot>);

    /// Queue a populated slot for asynchronous execution
    fn dispatch(&self, slot: Box<RequestSlot>);
}

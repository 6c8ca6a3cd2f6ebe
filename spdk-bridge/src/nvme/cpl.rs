//! NVMe completion queue entry and status decoding

use serde::Serialize;
use std::fmt;

/// Status code types (bits 9-11 of the status word)
pub mod sct {
    pub const GENERIC: u8 = 0x0;
    pub const COMMAND_SPECIFIC: u8 = 0x1;
    pub const MEDIA_ERROR: u8 = 0x2;
    pub const PATH: u8 = 0x3;
    pub const VENDOR_SPECIFIC: u8 = 0x7;
}

/// Bit-field view of the 16-bit completion status word
///
/// | bit   | field |
/// |-------|-------|
/// | 0     | P (phase tag) |
/// | 1-8   | SC (status code) |
/// | 9-11  | SCT (status code type) |
/// | 12-13 | CRD (command retry delay) |
/// | 14    | M (more) |
/// | 15    | DNR (do not retry) |
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NvmeStatusField(u16);

impl NvmeStatusField {
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub fn p(self) -> bool {
        self.0 & 0x1 != 0
    }

    pub fn sc(self) -> u8 {
        ((self.0 >> 1) & 0xff) as u8
    }

    pub fn sct(self) -> u8 {
        ((self.0 >> 9) & 0x7) as u8
    }

    pub fn crd(self) -> u8 {
        ((self.0 >> 12) & 0x3) as u8
    }

    pub fn m(self) -> bool {
        self.0 & (1 << 14) != 0
    }

    pub fn dnr(self) -> bool {
        self.0 & (1 << 15) != 0
    }

    pub fn set_sc(&mut self, sc: u8) {
        self.0 = (self.0 & !(0xff << 1)) | ((sc as u16) << 1);
    }

    pub fn set_sct(&mut self, sct: u8) {
        self.0 = (self.0 & !(0x7 << 9)) | (((sct & 0x7) as u16) << 9);
    }

    pub fn set_dnr(&mut self, dnr: bool) {
        if dnr {
            self.0 |= 1 << 15;
        } else {
            self.0 &= !(1 << 15);
        }
    }
}

impl fmt::Debug for NvmeStatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvmeStatusField")
            .field("sct", &self.sct())
            .field("sc", &self.sc())
            .field("dnr", &self.dnr())
            .field("m", &self.m())
            .field("p", &self.p())
            .finish()
    }
}

/// The status word seen either as a raw `u16` or as bit fields
///
/// Both members are plain 16-bit values with no invalid bit patterns, so
/// reading either one is always sound.
#[repr(C)]
#[derive(Clone, Copy)]
pub union CplStatus {
    pub raw: u16,
    pub status: NvmeStatusField,
}

impl Default for CplStatus {
    fn default() -> Self {
        CplStatus { raw: 0 }
    }
}

/// 16-byte NVMe completion, laid out exactly as the engine writes it
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct NvmeCpl {
    /// Command specific; failed admin commands may carry an errno here
    pub cdw0: u32,
    pub rsvd1: u32,
    pub sqhd: u16,
    pub sqid: u16,
    pub cid: u16,
    pub status: CplStatus,
}

const _: () = assert!(std::mem::size_of::<NvmeCpl>() == 16);

impl NvmeCpl {
    /// The status word as bit fields, aliasing the record
    #[inline]
    pub fn status(&self) -> &NvmeStatusField {
        unsafe { &self.status.status }
    }

    /// The status word as a raw integer, aliasing the record
    #[inline]
    pub fn raw_status(&self) -> &u16 {
        unsafe { &self.status.raw }
    }

    /// Mutable bit-field access, used by whoever fills the record in
    #[inline]
    pub fn status_mut(&mut self) -> &mut NvmeStatusField {
        unsafe { &mut self.status.status }
    }

    /// SCT generic and SC success
    pub fn succeeded(&self) -> bool {
        let status = self.status();
        status.sct() == sct::GENERIC && status.sc() == 0
    }

    pub fn nvme_status(&self) -> NvmeStatus {
        NvmeStatus::from(*self.status())
    }

    /// Build a completion with the given type and code
    pub fn with_status(sct: u8, sc: u8) -> Self {
        let mut cpl = NvmeCpl::default();
        let status = cpl.status_mut();
        status.set_sct(sct);
        status.set_sc(sc);
        cpl
    }
}

impl fmt::Debug for NvmeCpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvmeCpl")
            .field("cdw0", &self.cdw0)
            .field("sqhd", &self.sqhd)
            .field("sqid", &self.sqid)
            .field("cid", &self.cid)
            .field("status", self.status())
            .finish()
    }
}

/// Generic command status codes (SCT 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GenericStatusCode {
    Success,
    InvalidOpcode,
    InvalidField,
    CommandIdConflict,
    DataTransferError,
    AbortedPowerLoss,
    InternalDeviceError,
    AbortedByRequest,
    AbortedSubmissionQueueDeleted,
    CapacityExceeded,
    NamespaceNotReady,
    Other(u8),
}

impl From<u8> for GenericStatusCode {
    fn from(sc: u8) -> Self {
        match sc {
            0x00 => Self::Success,
            0x01 => Self::InvalidOpcode,
            0x02 => Self::InvalidField,
            0x03 => Self::CommandIdConflict,
            0x04 => Self::DataTransferError,
            0x05 => Self::AbortedPowerLoss,
            0x06 => Self::InternalDeviceError,
            0x07 => Self::AbortedByRequest,
            0x08 => Self::AbortedSubmissionQueueDeleted,
            0x81 => Self::CapacityExceeded,
            0x82 => Self::NamespaceNotReady,
            other => Self::Other(other),
        }
    }
}

impl From<GenericStatusCode> for u8 {
    fn from(code: GenericStatusCode) -> Self {
        match code {
            GenericStatusCode::Success => 0x00,
            GenericStatusCode::InvalidOpcode => 0x01,
            GenericStatusCode::InvalidField => 0x02,
            GenericStatusCode::CommandIdConflict => 0x03,
            GenericStatusCode::DataTransferError => 0x04,
            GenericStatusCode::AbortedPowerLoss => 0x05,
            GenericStatusCode::InternalDeviceError => 0x06,
            GenericStatusCode::AbortedByRequest => 0x07,
            GenericStatusCode::AbortedSubmissionQueueDeleted => 0x08,
            GenericStatusCode::CapacityExceeded => 0x81,
            GenericStatusCode::NamespaceNotReady => 0x82,
            GenericStatusCode::Other(sc) => sc,
        }
    }
}

/// Media and data integrity errors (SCT 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaErrorStatusCode {
    WriteFaults,
    UnrecoveredReadError,
    GuardCheckError,
    ApplicationTagCheckError,
    ReferenceTagCheckError,
    CompareFailure,
    AccessDenied,
    DeallocatedOrUnwrittenBlock,
    Other(u8),
}

impl From<u8> for MediaErrorStatusCode {
    fn from(sc: u8) -> Self {
        match sc {
            0x80 => Self::WriteFaults,
            0x81 => Self::UnrecoveredReadError,
            0x82 => Self::GuardCheckError,
            0x83 => Self::ApplicationTagCheckError,
            0x84 => Self::ReferenceTagCheckError,
            0x85 => Self::CompareFailure,
            0x86 => Self::AccessDenied,
            0x87 => Self::DeallocatedOrUnwrittenBlock,
            other => Self::Other(other),
        }
    }
}

/// Decoded completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NvmeStatus {
    Generic(GenericStatusCode),
    CommandSpecific(u8),
    MediaError(MediaErrorStatusCode),
    Path(u8),
    VendorSpecific(u8),
    Reserved { sct: u8, sc: u8 },
}

impl NvmeStatus {
    pub const SUCCESS: Self = Self::Generic(GenericStatusCode::Success);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl From<NvmeStatusField> for NvmeStatus {
    fn from(status: NvmeStatusField) -> Self {
        let sc = status.sc();
        match status.sct() {
            sct::GENERIC => Self::Generic(sc.into()),
            sct::COMMAND_SPECIFIC => Self::CommandSpecific(sc),
            sct::MEDIA_ERROR => Self::MediaError(sc.into()),
            sct::PATH => Self::Path(sc),
            sct::VENDOR_SPECIFIC => Self::VendorSpecific(sc),
            other => Self::Reserved { sct: other, sc },
        }
    }
}

impl fmt::Display for NvmeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NvmeStatus::Generic(code) => write!(f, "generic: {:?}", code),
            NvmeStatus::CommandSpecific(sc) => write!(f, "command specific: 0x{:02x}", sc),
            NvmeStatus::MediaError(code) => write!(f, "media error: {:?}", code),
            NvmeStatus::Path(sc) => write!(f, "path: 0x{:02x}", sc),
            NvmeStatus::VendorSpecific(sc) => write!(f, "vendor specific: 0x{:02x}", sc),
            NvmeStatus::Reserved { sct, sc } => write!(f, "reserved sct {}: 0x{:02x}", sct, sc),
        }
    }
}

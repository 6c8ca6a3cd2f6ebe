//! Zero-copy access to completion records
//!
//! Completion records live inside engine-owned request slots and are recycled
//! as soon as the completion callback returns. Rust callers get a `Completion`
//! borrow whose lifetime is chosen by the engine for each call, so it cannot be
//! stored past the callback. C callers get raw accessors that alias the record
//! and carry the same rule by contract.

use crate::nvme::{NvmeCpl, NvmeStatus, NvmeStatusField};
use std::marker::PhantomData;
use std::ptr;

/// A completion record borrowed for the duration of one callback
#[derive(Debug, Clone, Copy)]
pub struct Completion<'a> {
    cpl: &'a NvmeCpl,
    // not Send: the record belongs to the polling context
    _not_send: PhantomData<*const ()>,
}

impl<'a> Completion<'a> {
    pub(crate) fn new(cpl: &'a NvmeCpl) -> Self {
        Self {
            cpl,
            _not_send: PhantomData,
        }
    }

    /// Bit-field view of the live status word
    pub fn status(&self) -> &'a NvmeStatusField {
        self.cpl.status()
    }

    /// Raw view of the same live status word
    pub fn raw_status(&self) -> &'a u16 {
        self.cpl.raw_status()
    }

    /// Command specific dword 0
    pub fn cdw0(&self) -> u32 {
        self.cpl.cdw0
    }

    pub fn succeeded(&self) -> bool {
        self.cpl.succeeded()
    }

    pub fn nvme_status(&self) -> NvmeStatus {
        self.cpl.nvme_status()
    }

    /// The underlying record
    pub fn record(&self) -> &'a NvmeCpl {
        self.cpl
    }
}

/// Pointer to the bit-field status inside `cpl`
///
/// # Safety
/// `cpl` must point at a live completion record. The result aliases it and is
/// only valid while the record is (for engine completions: until the
/// completion callback returns).
pub unsafe fn status(cpl: *const NvmeCpl) -> *const NvmeStatusField {
    ptr::addr_of!((*cpl).status.status)
}

/// Pointer to the raw 16-bit status inside `cpl`
///
/// # Safety
/// Same contract as [`status`].
pub unsafe fn raw_status(cpl: *const NvmeCpl) -> *const u16 {
    ptr::addr_of!((*cpl).status.raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvme::sct;

    #[test]
    fn test_raw_accessors_alias_record() {
        let cpl = NvmeCpl::with_status(sct::GENERIC, 0x06);
        let base = &cpl as *const NvmeCpl as usize;

        let status_ptr = unsafe { status(&cpl) };
        let raw_ptr = unsafe { raw_status(&cpl) };

        // status word sits at offset 14 of the 16-byte record
        assert_eq!(status_ptr as usize, base + 14);
        assert_eq!(raw_ptr as usize, base + 14);
        assert_eq!(unsafe { *raw_ptr }, 0x06 << 1);
        assert_eq!(unsafe { (*status_ptr).sc() }, 0x06);
    }

    #[test]
    fn test_scoped_accessors_alias_record() {
        let cpl = NvmeCpl::with_status(sct::MEDIA_ERROR, 0x81);
        let completion = Completion::new(&cpl);

        assert!(ptr::eq(completion.status(), cpl.status()));
        assert!(ptr::eq(completion.raw_status(), cpl.raw_status()));
        assert!(!completion.succeeded());
        assert_eq!(completion.status().sct(), sct::MEDIA_ERROR);
    }
}

//! NVMe command and completion structures
//!
//! These are `#[repr(C)]` mirrors of the submission and completion queue
//! entries the engine consumes and produces; their sizes are checked at
//! compile time.

pub mod cmd;
pub mod cpl;

pub use cmd::{admin_opc, DataTransfer, NvmeCmd, IDENTIFY_CNS_CTRLR, IDENTIFY_DATA_LEN};
pub use cpl::{
    sct, CplStatus, GenericStatusCode, MediaErrorStatusCode, NvmeCpl, NvmeStatus,
    NvmeStatusField,
};

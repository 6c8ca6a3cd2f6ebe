//! NVMe submission queue entry

use serde::{Deserialize, Serialize};

/// Admin command opcodes used by the bridge
pub mod admin_opc {
    pub const GET_LOG_PAGE: u8 = 0x02;
    pub const IDENTIFY: u8 = 0x06;
    pub const ABORT: u8 = 0x08;
    pub const SET_FEATURES: u8 = 0x09;
    pub const GET_FEATURES: u8 = 0x0A;
    pub const KEEP_ALIVE: u8 = 0x18;
    pub const FORMAT_NVM: u8 = 0x80;
    pub const SECURITY_SEND: u8 = 0x81;
    /// Vendor specific: take a snapshot, time encoded in cdw10/cdw11
    pub const CREATE_SNAPSHOT: u8 = 0xC0;
}

/// CNS value selecting the controller data structure in IDENTIFY
pub const IDENTIFY_CNS_CTRLR: u32 = 1;

/// Size of the IDENTIFY controller data structure
pub const IDENTIFY_DATA_LEN: usize = 4096;

/// Direction of the data phase, encoded in the low two bits of every opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataTransfer {
    None,
    HostToController,
    ControllerToHost,
    Bidirectional,
}

impl DataTransfer {
    pub fn from_opcode(opc: u8) -> Self {
        match opc & 0x3 {
            0 => DataTransfer::None,
            1 => DataTransfer::HostToController,
            2 => DataTransfer::ControllerToHost,
            _ => DataTransfer::Bidirectional,
        }
    }

    /// True if executing the command may modify the device
    pub fn writes_to_device(self) -> bool {
        matches!(
            self,
            DataTransfer::HostToController | DataTransfer::Bidirectional
        )
    }
}

/// 64-byte NVMe command, laid out exactly as the engine expects it
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NvmeCmd {
    pub opc: u8,
    /// FUSE (bits 0-1) and PSDT (bits 6-7)
    pub fuse_psdt: u8,
    pub cid: u16,
    pub nsid: u32,
    pub rsvd2: u32,
    pub rsvd3: u32,
    pub mptr: u64,
    pub dptr: [u64; 2],
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
}

const _: () = assert!(std::mem::size_of::<NvmeCmd>() == 64);

impl NvmeCmd {
    /// A zeroed command with the given opcode
    pub fn new(opc: u8) -> Self {
        Self {
            opc,
            ..Default::default()
        }
    }

    pub fn opc(&self) -> u8 {
        self.opc
    }

    pub fn set_opc(&mut self, opc: u8) {
        self.opc = opc;
    }

    pub fn with_nsid(mut self, nsid: u32) -> Self {
        self.nsid = nsid;
        self
    }

    pub fn with_cdw10(mut self, cdw10: u32) -> Self {
        self.cdw10 = cdw10;
        self
    }

    pub fn with_cdw11(mut self, cdw11: u32) -> Self {
        self.cdw11 = cdw11;
        self
    }

    pub fn data_transfer(&self) -> DataTransfer {
        DataTransfer::from_opcode(self.opc)
    }

    /// IDENTIFY controller: all namespaces, CNS 1
    pub fn identify_controller() -> Self {
        Self::new(admin_opc::IDENTIFY)
            .with_nsid(0xffff_ffff)
            .with_cdw10(IDENTIFY_CNS_CTRLR)
    }

    /// Vendor snapshot command carrying `secs` since the Unix epoch
    pub fn create_snapshot(secs: u64) -> Self {
        Self::new(admin_opc::CREATE_SNAPSHOT)
            .with_cdw10(secs as u32)
            .with_cdw11((secs >> 32) as u32)
    }

    /// Snapshot time encoded by `create_snapshot`
    pub fn snapshot_time(&self) -> u64 {
        ((self.cdw11 as u64) << 32) | self.cdw10 as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_transfer_from_opcode() {
        assert_eq!(DataTransfer::from_opcode(admin_opc::IDENTIFY), DataTransfer::ControllerToHost);
        assert_eq!(DataTransfer::from_opcode(admin_opc::SECURITY_SEND), DataTransfer::HostToController);
        assert_eq!(DataTransfer::from_opcode(admin_opc::FORMAT_NVM), DataTransfer::None);
        assert_eq!(DataTransfer::from_opcode(0x7F), DataTransfer::Bidirectional);
        assert!(DataTransfer::HostToController.writes_to_device());
        assert!(!DataTransfer::ControllerToHost.writes_to_device());
    }

    #[test]
    fn test_identify_controller_fields() {
        let cmd = NvmeCmd::identify_controller();
        assert_eq!(cmd.opc(), 0x06);
        assert_eq!(cmd.nsid, 0xffff_ffff);
        assert_eq!(cmd.cdw10, 1);
    }

    #[test]
    fn test_snapshot_time_split() {
        let secs = 0x0000_0001_8000_0002u64;
        let cmd = NvmeCmd::create_snapshot(secs);
        assert_eq!(cmd.cdw10, 0x8000_0002);
        assert_eq!(cmd.cdw11, 0x1);
        assert_eq!(cmd.snapshot_time(), secs);
    }
}

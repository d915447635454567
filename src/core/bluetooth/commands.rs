//! JBD battery monitor commands
//! This module builds the read request frames sent to the battery monitor

use crate::core::bluetooth::frame::{FRAME_END, FRAME_START, checksum};

/// Marks a request as a register read
pub const JBD_CMD_READ: u8 = 0xA5;

/// Battery monitor commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmsCommand {
    /// Hardware / status info: voltage, current, capacity, SoC (0x03)
    HardwareInfo,
    /// Per-cell voltages (0x04)
    CellInfo,
}

impl BmsCommand {
    pub const fn code(self) -> u8 {
        match self {
            Self::HardwareInfo => 0x03,
            Self::CellInfo => 0x04,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(Self::HardwareInfo),
            0x04 => Some(Self::CellInfo),
            _ => None,
        }
    }

    /// Convert the command to its read request frame
    ///
    /// `DD A5 <cmd> 00 <crc_hi> <crc_lo> 77`, the checksum covering the
    /// command and length bytes.
    pub fn to_bytes(self) -> [u8; 7] {
        let command = self.code();
        let length = 0x00;
        let [crc_hi, crc_lo] = checksum(&[command, length]).to_be_bytes();
        [FRAME_START, JBD_CMD_READ, command, length, crc_hi, crc_lo, FRAME_END]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_info_request_is_byte_exact() {
        assert_eq!(
            BmsCommand::HardwareInfo.to_bytes(),
            [0xDD, 0xA5, 0x03, 0x00, 0xFF, 0xFD, 0x77]
        );
    }

    #[test]
    fn cell_info_request_is_byte_exact() {
        assert_eq!(
            BmsCommand::CellInfo.to_bytes(),
            [0xDD, 0xA5, 0x04, 0x00, 0xFF, 0xFC, 0x77]
        );
    }

    #[test]
    fn codes_round_trip() {
        assert_eq!(BmsCommand::from_code(0x03), Some(BmsCommand::HardwareInfo));
        assert_eq!(BmsCommand::from_code(0x04), Some(BmsCommand::CellInfo));
        assert_eq!(BmsCommand::from_code(0x05), None);
    }
}

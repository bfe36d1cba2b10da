//! Bulk-Only Transport framing: the CBW and CSW.
//!
//! Both wrappers are little-endian on the wire, even though the SCSI
//! command block they carry is big-endian.

use num_enum::TryFromPrimitive;

/// A Command Block Wrapper is exactly this long.
pub const CBW_SIZE: usize = 31;
/// A Command Status Wrapper is exactly this long.
pub const CSW_SIZE: usize = 13;

/// "USBC"
pub const CBW_SIGNATURE: u32 = 0x4342_5355;
/// "USBS"
pub const CSW_SIGNATURE: u32 = 0x5342_5355;

const MAX_COMMAND_BLOCK: usize = 16;

/// Direction of the data phase a CBW announces.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataDirection {
    Out,
    In,
    /// `dataTransferLength` was zero; the flags bit is meaningless
    NotExpected,
}

/// A parsed Command Block Wrapper (USB MSC BOT s5.1).
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandBlockWrapper {
    pub tag: u32,
    pub data_transfer_length: u32,
    pub direction: DataDirection,
    pub lun: u8,
    cb_length: u8,
    cb: [u8; MAX_COMMAND_BLOCK],
}

impl CommandBlockWrapper {
    /// Parse a CBW. `None` iff the length is not 31 bytes, the
    /// signature is wrong, or the command-block length is outside
    /// 1..=16 (BOT s6.2.1).
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CBW_SIZE {
            return None;
        }
        let signature = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
        if signature != CBW_SIGNATURE {
            return None;
        }
        let data_transfer_length = u32::from_le_bytes(bytes[8..12].try_into().ok()?);
        let cb_length = bytes[14] & 0x1F;
        if !(1..=MAX_COMMAND_BLOCK as u8).contains(&cb_length) {
            return None;
        }
        let direction = if data_transfer_length == 0 {
            DataDirection::NotExpected
        } else if (bytes[12] & 0x80) != 0 {
            DataDirection::In
        } else {
            DataDirection::Out
        };
        let mut cb = [0u8; MAX_COMMAND_BLOCK];
        cb.copy_from_slice(&bytes[15..31]);
        Some(Self {
            tag: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            data_transfer_length,
            direction,
            lun: bytes[13] & 0x0F,
            cb_length,
            cb,
        })
    }

    /// The command descriptor block, truncated to its declared length.
    pub fn command_block(&self) -> &[u8] {
        &self.cb[..self.cb_length as usize]
    }
}

/// CSW status byte (BOT table 5.3).
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CswStatus {
    Good = 0x00,
    Failed = 0x01,
    PhaseError = 0x02,
}

/// A Command Status Wrapper about to go on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandStatusWrapper {
    /// Echo of the CBW tag
    pub tag: u32,
    /// Requested bytes that were not moved
    pub data_residue: u32,
    pub status: CswStatus,
}

impl CommandStatusWrapper {
    pub fn to_bytes(&self) -> [u8; CSW_SIZE] {
        let mut bytes = [0u8; CSW_SIZE];
        bytes[0..4].copy_from_slice(&CSW_SIGNATURE.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.tag.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.data_residue.to_le_bytes());
        bytes[12] = self.status as u8;
        bytes
    }

    /// Parse a CSW (used by tests and host-side tooling).
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CSW_SIZE {
            return None;
        }
        if u32::from_le_bytes(bytes[0..4].try_into().ok()?) != CSW_SIGNATURE {
            return None;
        }
        Some(Self {
            tag: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            data_residue: u32::from_le_bytes(bytes[8..12].try_into().ok()?),
            status: CswStatus::try_from_primitive(bytes[12]).ok()?,
        })
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/wire.rs"]
mod tests;

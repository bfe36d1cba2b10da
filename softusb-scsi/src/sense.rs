//! Latched sense data and its fixed-format encoding.

use num_enum::TryFromPrimitive;

/// Sense keys (SPC-4 table 54; the subset a block gadget reports).
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SenseKey {
    NoSense = 0x0,
    RecoveredError = 0x1,
    NotReady = 0x2,
    MediumError = 0x3,
    HardwareError = 0x4,
    IllegalRequest = 0x5,
    UnitAttention = 0x6,
    DataProtect = 0x7,
    BlankCheck = 0x8,
    AbortedCommand = 0xB,
}

/// Additional sense codes (paired with the key above).
pub mod asc {
    pub const NO_ADDITIONAL_SENSE_INFORMATION: u8 = 0x00;
    pub const WRITE_ERROR: u8 = 0x0C;
    pub const UNRECOVERED_READ_ERROR: u8 = 0x11;
    pub const SYNCHRONIZATION_ERROR: u8 = 0x16;
    pub const INVALID_COMMAND_OPERATION_CODE: u8 = 0x20;
    pub const LBA_OUT_OF_RANGE: u8 = 0x21;
    pub const INVALID_FIELD_IN_CDB: u8 = 0x24;
    pub const WRITE_PROTECTED: u8 = 0x27;
    pub const MEDIUM_NOT_PRESENT: u8 = 0x3A;
}

/// Size of the fixed-format sense data (SPC-4 s4.5.3).
pub const FIXED_SENSE_SIZE: usize = 18;

// response code: current error, fixed format
const RESPONSE_CODE_CURRENT: u8 = 0x70;

/// The latched (key, ASC, ASCQ) triple.
///
/// Held by the transport engine between commands and cleared once a
/// REQUEST SENSE response has been delivered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SenseData {
    pub key: SenseKey,
    pub asc: u8,
    pub ascq: u8,
}

impl SenseData {
    /// "No sense": nothing to report.
    pub const NONE: SenseData = SenseData {
        key: SenseKey::NoSense,
        asc: asc::NO_ADDITIONAL_SENSE_INFORMATION,
        ascq: 0,
    };

    pub const fn new(key: SenseKey, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Emit the 18-byte fixed format; returns 0 if `buf` is too small.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        if buf.len() < FIXED_SENSE_SIZE {
            return 0;
        }
        buf[..FIXED_SENSE_SIZE].fill(0);
        buf[0] = RESPONSE_CODE_CURRENT;
        buf[2] = self.key as u8 & 0x0F;
        // information field (bytes 3..7) stays zero for a block device
        buf[7] = 10; // additional sense length
        buf[12] = self.asc;
        buf[13] = self.ascq;
        FIXED_SENSE_SIZE
    }
}

impl Default for SenseData {
    fn default() -> Self {
        Self::NONE
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/sense.rs"]
mod tests;

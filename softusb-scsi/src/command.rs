//! Command descriptor block parsing for the direct-access block subset.

/* SPC */
pub const TEST_UNIT_READY: u8 = 0x00;
pub const REQUEST_SENSE: u8 = 0x03;
pub const INQUIRY: u8 = 0x12;
pub const MODE_SENSE_6: u8 = 0x1A;
pub const START_STOP_UNIT: u8 = 0x1B;
pub const PREVENT_ALLOW_MEDIUM_REMOVAL: u8 = 0x1E;

/* SBC */
pub const READ_CAPACITY_10: u8 = 0x25;
pub const READ_10: u8 = 0x28;
pub const WRITE_10: u8 = 0x2A;
pub const VERIFY_10: u8 = 0x2F;
pub const SYNCHRONIZE_CACHE_10: u8 = 0x35;
pub const SERVICE_ACTION_IN_16: u8 = 0x9E;

/// Service action under [`SERVICE_ACTION_IN_16`] for READ CAPACITY(16)
pub const SERVICE_ACTION_READ_CAPACITY_16: u8 = 0x10;

/* MMC */
pub const READ_FORMAT_CAPACITIES: u8 = 0x23;

/// A parsed SCSI command.
///
/// Geometry fields are big-endian on the wire; `alloc_len` fields carry
/// the allocation length exactly as the host sent it.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum ScsiCommand {
    /// Anything this device does not implement
    Unknown { opcode: u8 },

    /* SPC */
    TestUnitReady,
    RequestSense {
        alloc_len: u8,
    },
    Inquiry {
        evpd: bool,
        page_code: u8,
        alloc_len: u16,
    },
    ModeSense6 {
        alloc_len: u8,
    },
    StartStopUnit {
        start: bool,
        load_eject: bool,
    },
    PreventAllowRemoval {
        prevent: bool,
    },

    /* SBC */
    ReadCapacity10,
    ReadCapacity16 {
        alloc_len: u32,
    },
    Read10 {
        lba: u32,
        blocks: u16,
    },
    Write10 {
        lba: u32,
        blocks: u16,
    },
    Verify10,
    SynchronizeCache10,

    /* MMC */
    ReadFormatCapacities {
        alloc_len: u16,
    },
}

impl ScsiCommand {
    /// Parse a command block. The CBW layer guarantees at least one
    /// byte; a CDB too short for its opcode parses as `Unknown`.
    pub fn parse(cb: &[u8]) -> ScsiCommand {
        let opcode = cb[0];
        let unknown = ScsiCommand::Unknown { opcode };
        match opcode {
            TEST_UNIT_READY => ScsiCommand::TestUnitReady,
            REQUEST_SENSE if cb.len() >= 5 => ScsiCommand::RequestSense {
                alloc_len: cb[4],
            },
            INQUIRY if cb.len() >= 5 => ScsiCommand::Inquiry {
                evpd: (cb[1] & 0x01) != 0,
                page_code: cb[2],
                alloc_len: u16::from_be_bytes([cb[3], cb[4]]),
            },
            MODE_SENSE_6 if cb.len() >= 5 => ScsiCommand::ModeSense6 {
                alloc_len: cb[4],
            },
            START_STOP_UNIT if cb.len() >= 5 => ScsiCommand::StartStopUnit {
                start: (cb[4] & 0x01) != 0,
                load_eject: (cb[4] & 0x02) != 0,
            },
            PREVENT_ALLOW_MEDIUM_REMOVAL if cb.len() >= 5 => {
                ScsiCommand::PreventAllowRemoval {
                    prevent: (cb[4] & 0x03) != 0,
                }
            }
            READ_CAPACITY_10 => ScsiCommand::ReadCapacity10,
            READ_10 if cb.len() >= 9 => ScsiCommand::Read10 {
                lba: u32::from_be_bytes([cb[2], cb[3], cb[4], cb[5]]),
                blocks: u16::from_be_bytes([cb[7], cb[8]]),
            },
            WRITE_10 if cb.len() >= 9 => ScsiCommand::Write10 {
                lba: u32::from_be_bytes([cb[2], cb[3], cb[4], cb[5]]),
                blocks: u16::from_be_bytes([cb[7], cb[8]]),
            },
            VERIFY_10 => ScsiCommand::Verify10,
            SYNCHRONIZE_CACHE_10 => ScsiCommand::SynchronizeCache10,
            READ_FORMAT_CAPACITIES if cb.len() >= 9 => {
                ScsiCommand::ReadFormatCapacities {
                    alloc_len: u16::from_be_bytes([cb[7], cb[8]]),
                }
            }
            // READ CAPACITY(16) hides behind a service action; any other
            // action under 0x9E is unknown
            SERVICE_ACTION_IN_16
                if cb.len() >= 14
                    && (cb[1] & 0x1F) == SERVICE_ACTION_READ_CAPACITY_16 =>
            {
                ScsiCommand::ReadCapacity16 {
                    alloc_len: u32::from_be_bytes([cb[10], cb[11], cb[12], cb[13]]),
                }
            }
            _ => unknown,
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/command.rs"]
mod tests;

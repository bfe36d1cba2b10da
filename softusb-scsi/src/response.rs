//! Fixed response layouts, one `#[repr(C)]` struct per reply.
//!
//! Numeric fields are big-endian byte arrays (SCSI convention), so
//! `bytemuck::bytes_of` gives the exact wire image.

/// Standard INQUIRY data, the compulsory leading 36 bytes
/// (Seagate SCSI Commands Reference Manual s3.6.2).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct InquiryResponse {
    peripheral_device_type: u8,
    removable: u8,
    version: u8,
    response_format: u8,
    additional_length: u8,
    flags: [u8; 3],
    vendor_id: [u8; 8],
    product_id: [u8; 16],
    product_revision: [u8; 4],
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for InquiryResponse {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for InquiryResponse {}

fn ascii_padded<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [b' '; N];
    for (slot, byte) in out.iter_mut().zip(text.bytes()) {
        *slot = byte;
    }
    out
}

impl InquiryResponse {
    /// Direct-access block device, SPC-4, response format 2.
    pub fn new(vendor: &str, product: &str, revision: &str, removable: bool) -> Self {
        Self {
            peripheral_device_type: 0x00,
            removable: if removable { 0x80 } else { 0x00 },
            version: 0x06,
            response_format: 0x02,
            additional_length: 31,
            flags: [0; 3],
            vendor_id: ascii_padded(vendor),
            product_id: ascii_padded(product),
            product_revision: ascii_padded(revision),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// READ CAPACITY(10) reply (s3.23.2): last LBA and block length.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct ReadCapacity10Response {
    last_lba_be: [u8; 4],
    block_length_be: [u8; 4],
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ReadCapacity10Response {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ReadCapacity10Response {}

impl ReadCapacity10Response {
    /// `last_lba` must already be clamped to `0xFFFF_FFFF` by the caller
    /// (the clamp is what tells the host to try READ CAPACITY(16)).
    pub fn new(last_lba: u32, block_length: u32) -> Self {
        Self {
            last_lba_be: last_lba.to_be_bytes(),
            block_length_be: block_length.to_be_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// READ CAPACITY(16) reply: 64-bit last LBA, 32-bit block length,
/// remainder reserved.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct ReadCapacity16Response {
    last_lba_be: [u8; 8],
    block_length_be: [u8; 4],
    reserved: [u8; 20],
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ReadCapacity16Response {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ReadCapacity16Response {}

impl ReadCapacity16Response {
    pub fn new(last_lba: u64, block_length: u32) -> Self {
        Self {
            last_lba_be: last_lba.to_be_bytes(),
            block_length_be: block_length.to_be_bytes(),
            reserved: [0; 20],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// MODE SENSE(6) header with no mode pages and no block descriptors.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct ModeSense6Header {
    mode_data_length: u8,
    medium_type: u8,
    device_parameter: u8,
    block_descriptor_length: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ModeSense6Header {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ModeSense6Header {}

impl ModeSense6Header {
    pub fn new(write_protected: bool) -> Self {
        Self {
            mode_data_length: 3, // bytes after this field
            medium_type: 0,
            device_parameter: if write_protected { 0x80 } else { 0x00 },
            block_descriptor_length: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

// capacity descriptor type (bits 1:0): formatted media
const DESCRIPTOR_TYPE_FORMATTED: u8 = 0x02;

/// READ FORMAT CAPACITIES reply: the 4-byte header plus one current/
/// maximum capacity descriptor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct FormatCapacityList {
    reserved: [u8; 3],
    capacity_list_length: u8,
    block_count_be: [u8; 4],
    descriptor_type: u8,
    block_length_be: [u8; 3],
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for FormatCapacityList {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for FormatCapacityList {}

impl FormatCapacityList {
    pub fn new(block_count: u64, block_length: u32) -> Self {
        let clamped = block_count.min(u32::MAX as u64) as u32;
        // block length is a 24-bit field
        let length = block_length.min(0x00FF_FFFF).to_be_bytes();
        Self {
            reserved: [0; 3],
            capacity_list_length: 8,
            block_count_be: clamped.to_be_bytes(),
            descriptor_type: DESCRIPTOR_TYPE_FORMATTED,
            block_length_be: [length[1], length[2], length[3]],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/response.rs"]
mod tests;

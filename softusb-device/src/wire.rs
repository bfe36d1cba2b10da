//! Wire-format types: the SETUP packet and the standard descriptors.
//!
//! Every record here is `#[repr(C)]` with multi-byte fields held as
//! little-endian byte arrays, so `encode`/`decode` are bit-exact on any
//! host. Field names follow the USB 2.0 tables they come from.

use crate::types::UsbError;

// For bmRequestType (USB 2.0 table 9-2)
pub const DEVICE_TO_HOST: u8 = 0x80;
pub const HOST_TO_DEVICE: u8 = 0;
pub const STANDARD_REQUEST: u8 = 0;
pub const CLASS_REQUEST: u8 = 0x20;
pub const VENDOR_REQUEST: u8 = 0x40;
pub const RECIPIENT_DEVICE: u8 = 0;
pub const RECIPIENT_INTERFACE: u8 = 1;
pub const RECIPIENT_ENDPOINT: u8 = 2;
pub const RECIPIENT_OTHER: u8 = 3;

// For bRequest (USB 2.0 table 9-4)
pub const GET_STATUS: u8 = 0;
pub const CLEAR_FEATURE: u8 = 1;
pub const SET_FEATURE: u8 = 3;
pub const SET_ADDRESS: u8 = 5;
pub const GET_DESCRIPTOR: u8 = 6;
pub const SET_DESCRIPTOR: u8 = 7;
pub const GET_CONFIGURATION: u8 = 8;
pub const SET_CONFIGURATION: u8 = 9;
pub const GET_INTERFACE: u8 = 10;
pub const SET_INTERFACE: u8 = 11;
pub const SYNCH_FRAME: u8 = 12;

// Descriptor types (USB 2.0 table 9-5)
pub const DEVICE_DESCRIPTOR: u8 = 1;
pub const CONFIGURATION_DESCRIPTOR: u8 = 2;
pub const STRING_DESCRIPTOR: u8 = 3;
pub const INTERFACE_DESCRIPTOR: u8 = 4;
pub const ENDPOINT_DESCRIPTOR: u8 = 5;
pub const INTERFACE_ASSOCIATION_DESCRIPTOR: u8 = 0x0B;

// Feature selectors (USB 2.0 table 9-6)
pub const FEATURE_ENDPOINT_HALT: u16 = 0;
pub const FEATURE_DEVICE_REMOTE_WAKEUP: u16 = 1;

// Class codes (InterfaceDescriptor.bInterfaceClass)
pub const HID_CLASSCODE: u8 = 0x03;
pub const MASS_STORAGE_CLASSCODE: u8 = 0x08;

// Endpoint address/attribute masks (USB 2.0 table 9-13)
pub const ENDPOINT_DIRECTION_MASK: u8 = 0x80;
pub const ENDPOINT_NUMBER_MASK: u8 = 0x0F;
pub const ENDPOINT_TRANSFER_TYPE_MASK: u8 = 0x03;
pub const ENDPOINT_ISO_SYNC_MASK: u8 = 0x0C;
pub const ENDPOINT_ISO_USAGE_MASK: u8 = 0x30;

/// Direction of a request or endpoint, bit 7 of the address byte.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// The request-class bits of bmRequestType (bits 6:5).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum RequestClass {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// The recipient bits of bmRequestType (bits 4:0).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// Endpoint transfer type, bits 1:0 of bmAttributes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum EndpointType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

/// Isochronous synchronization type, bits 3:2 of bmAttributes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum IsoSync {
    None = 0,
    Asynchronous = 1,
    Adaptive = 2,
    Synchronous = 3,
}

/// Isochronous usage type, bits 5:4 of bmAttributes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum IsoUsage {
    Data = 0,
    Feedback = 1,
    ImplicitFeedback = 2,
    Reserved = 3,
}

/// A SETUP packet as received on the control endpoint.
///
/// The format of this packet (and the un-Rust-like names of its fields)
/// are defined in the USB 2.0 specification, section 9.3. On the wire all
/// multi-byte fields are little-endian.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-2
pub struct SetupPacket {
    /// The type and specific target of the request.
    pub bmRequestType: u8,
    /// The particular request.
    pub bRequest: u8,
    /// A parameter to the request.
    pub wValue: u16,
    /// A second parameter to the request.
    pub wIndex: u16,
    /// The length of the subsequent IN or OUT data phase; can be zero
    /// if the setup packet itself contains all the required information.
    pub wLength: u16,
}

impl SetupPacket {
    /// Parse the 8-byte wire form. Fails iff fewer than 8 bytes are given.
    pub fn parse(bytes: &[u8]) -> Result<Self, UsbError> {
        if bytes.len() < 8 {
            return Err(UsbError::BufferTooSmall);
        }
        Ok(Self {
            bmRequestType: bytes[0],
            bRequest: bytes[1],
            wValue: u16::from_le_bytes([bytes[2], bytes[3]]),
            wIndex: u16::from_le_bytes([bytes[4], bytes[5]]),
            wLength: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }

    /// The 8-byte wire form.
    pub fn to_bytes(&self) -> [u8; 8] {
        let v = self.wValue.to_le_bytes();
        let i = self.wIndex.to_le_bytes();
        let l = self.wLength.to_le_bytes();
        [
            self.bmRequestType,
            self.bRequest,
            v[0],
            v[1],
            i[0],
            i[1],
            l[0],
            l[1],
        ]
    }

    pub fn direction(&self) -> Direction {
        if (self.bmRequestType & DEVICE_TO_HOST) != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn request_class(&self) -> RequestClass {
        match (self.bmRequestType >> 5) & 3 {
            0 => RequestClass::Standard,
            1 => RequestClass::Class,
            2 => RequestClass::Vendor,
            _ => RequestClass::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.bmRequestType & 0x1F {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }
}

fn encode_record<T: bytemuck::NoUninit>(record: &T, buf: &mut [u8]) -> usize {
    let bytes = bytemuck::bytes_of(record);
    if buf.len() < bytes.len() {
        return 0;
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    bytes.len()
}

fn decode_record<T: bytemuck::AnyBitPattern>(
    bytes: &[u8],
    descriptor_type: u8,
) -> Result<T, UsbError> {
    let size = core::mem::size_of::<T>();
    if bytes.len() < size {
        return Err(UsbError::DescriptorTooShort);
    }
    if bytes[1] != descriptor_type {
        return Err(UsbError::DescriptorTypeMismatch);
    }
    Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-8
pub struct DeviceDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bcdUSB: [u8; 2],
    pub bDeviceClass: u8,
    pub bDeviceSubClass: u8,
    pub bDeviceProtocol: u8,
    pub bMaxPacketSize0: u8,

    pub idVendor: [u8; 2],
    pub idProduct: [u8; 2],
    pub bcdDevice: [u8; 2],
    pub iManufacturer: u8,
    pub iProduct: u8,
    pub iSerialNumber: u8,
    pub bNumConfigurations: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for DeviceDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for DeviceDescriptor {}

impl DeviceDescriptor {
    /// Write the 18-byte wire form; returns 0 if `buf` is too small.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        encode_record(self, buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, UsbError> {
        decode_record(bytes, DEVICE_DESCRIPTOR)
    }

    pub fn vid(&self) -> u16 {
        u16::from_le_bytes(self.idVendor)
    }

    pub fn pid(&self) -> u16 {
        u16::from_le_bytes(self.idProduct)
    }
}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-10
pub struct ConfigurationDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub wTotalLength: [u8; 2],
    pub bNumInterfaces: u8,
    pub bConfigurationValue: u8,
    pub iConfiguration: u8,
    pub bmAttributes: u8,
    pub bMaxPower: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ConfigurationDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ConfigurationDescriptor {}

impl ConfigurationDescriptor {
    /// Write the 9-byte wire form; returns 0 if `buf` is too small.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        encode_record(self, buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, UsbError> {
        decode_record(bytes, CONFIGURATION_DESCRIPTOR)
    }

    pub fn total_length(&self) -> u16 {
        u16::from_le_bytes(self.wTotalLength)
    }
}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-12
pub struct InterfaceDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bInterfaceNumber: u8,
    pub bAlternateSetting: u8,
    pub bNumEndpoints: u8,
    pub bInterfaceClass: u8,
    pub bInterfaceSubClass: u8,
    pub bInterfaceProtocol: u8,
    pub iInterface: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for InterfaceDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for InterfaceDescriptor {}

impl InterfaceDescriptor {
    /// Write the 9-byte wire form; returns 0 if `buf` is too small.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        encode_record(self, buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, UsbError> {
        decode_record(bytes, INTERFACE_DESCRIPTOR)
    }
}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-13
pub struct EndpointDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bEndpointAddress: u8,
    pub bmAttributes: u8,
    pub wMaxPacketSize: [u8; 2],
    pub bInterval: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for EndpointDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for EndpointDescriptor {}

impl EndpointDescriptor {
    /// Write the 7-byte wire form; returns 0 if `buf` is too small.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        encode_record(self, buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, UsbError> {
        decode_record(bytes, ENDPOINT_DESCRIPTOR)
    }

    pub fn max_packet_size(&self) -> u16 {
        u16::from_le_bytes(self.wMaxPacketSize)
    }
}

/// Groups related interfaces of a composite device (USB IAD ECN).
#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[allow(non_snake_case)] // These names are from the IAD ECN table 9-Z
pub struct InterfaceAssociationDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bFirstInterface: u8,
    pub bInterfaceCount: u8,
    pub bFunctionClass: u8,
    pub bFunctionSubClass: u8,
    pub bFunctionProtocol: u8,
    pub iFunction: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for InterfaceAssociationDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for InterfaceAssociationDescriptor {}

impl InterfaceAssociationDescriptor {
    /// Write the 8-byte wire form; returns 0 if `buf` is too small.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        encode_record(self, buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, UsbError> {
        decode_record(bytes, INTERFACE_ASSOCIATION_DESCRIPTOR)
    }
}

/// Longest string descriptor: the length field is one byte.
pub const MAX_STRING_DESCRIPTOR_SIZE: usize = 255;

/// Encode `text` as a UTF-16LE string descriptor.
///
/// Strings whose encoding would not fit the one-byte length field are
/// truncated at a code-point boundary (a surrogate pair is never split).
/// Returns the number of bytes written, or 0 if `buf` cannot hold the
/// (possibly truncated) descriptor.
pub fn encode_string_descriptor(text: &str, buf: &mut [u8]) -> usize {
    let max_units = (MAX_STRING_DESCRIPTOR_SIZE - 2) / 2;
    let mut units = 0usize;
    for c in text.chars() {
        let n = c.len_utf16();
        if units + n > max_units {
            break;
        }
        units += n;
    }
    let total = 2 + units * 2;
    if buf.len() < total {
        return 0;
    }
    buf[0] = total as u8;
    buf[1] = STRING_DESCRIPTOR;
    let mut offset = 2;
    let mut tmp = [0u16; 2];
    for c in text.chars() {
        let encoded = c.encode_utf16(&mut tmp);
        if offset + encoded.len() * 2 > total {
            break;
        }
        for unit in encoded.iter() {
            buf[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
            offset += 2;
        }
    }
    total
}

/// Walks the descriptors of a serialized configuration.
///
/// Used host-side to understand a peer, and device-side to sanity-check
/// what [`Configuration::encode`](crate::config::Configuration::encode)
/// produced.
pub trait DescriptorVisitor {
    fn on_configuration(&mut self, _c: &ConfigurationDescriptor) {}
    fn on_interface(&mut self, _i: &InterfaceDescriptor) {}
    fn on_endpoint(&mut self, _e: &EndpointDescriptor) {}
    fn on_association(&mut self, _a: &InterfaceAssociationDescriptor) {}
    /// Class- or vendor-specific descriptors this crate does not model.
    fn on_other(&mut self, _bytes: &[u8]) {}
}

/// Walk a configuration blob descriptor by descriptor.
///
/// Stops quietly at the first descriptor whose length field runs past
/// the buffer, which is also how a truncated GET_DESCRIPTOR response
/// ends.
pub fn parse_descriptors(buf: &[u8], visitor: &mut impl DescriptorVisitor) {
    let mut index = 0;
    while buf.len() > index + 2 {
        let length = buf[index] as usize;
        if length < 2 || buf.len() < index + length {
            return;
        }
        let bytes = &buf[index..index + length];
        match buf[index + 1] {
            CONFIGURATION_DESCRIPTOR => {
                if let Ok(c) = ConfigurationDescriptor::decode(bytes) {
                    visitor.on_configuration(&c);
                }
            }
            INTERFACE_DESCRIPTOR => {
                if let Ok(i) = InterfaceDescriptor::decode(bytes) {
                    visitor.on_interface(&i);
                }
            }
            ENDPOINT_DESCRIPTOR => {
                if let Ok(e) = EndpointDescriptor::decode(bytes) {
                    visitor.on_endpoint(&e);
                }
            }
            INTERFACE_ASSOCIATION_DESCRIPTOR => {
                if let Ok(a) = InterfaceAssociationDescriptor::decode(bytes) {
                    visitor.on_association(&a);
                }
            }
            _ => visitor.on_other(bytes),
        }
        index += length;
    }
}

/// Encode the string descriptor at index 0: the list of supported
/// 16-bit LANGID values.
pub fn encode_langid_descriptor(langids: &[u16], buf: &mut [u8]) -> usize {
    let count = langids.len().min((MAX_STRING_DESCRIPTOR_SIZE - 2) / 2);
    let total = 2 + count * 2;
    if buf.len() < total {
        return 0;
    }
    buf[0] = total as u8;
    buf[1] = STRING_DESCRIPTOR;
    for (i, id) in langids[..count].iter().enumerate() {
        buf[2 + i * 2..4 + i * 2].copy_from_slice(&id.to_le_bytes());
    }
    total
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/wire.rs"]
mod tests;

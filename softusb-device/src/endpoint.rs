//! One endpoint of an interface: address, attributes, and runtime state.

use crate::types::UsbError;
use crate::wire::{
    Direction, EndpointDescriptor, EndpointType, IsoSync, IsoUsage,
    ENDPOINT_DESCRIPTOR, ENDPOINT_DIRECTION_MASK, ENDPOINT_ISO_SYNC_MASK,
    ENDPOINT_ISO_USAGE_MASK, ENDPOINT_NUMBER_MASK, ENDPOINT_TRANSFER_TYPE_MASK,
};
use spin::Mutex;

#[derive(Default)]
struct EndpointState {
    halted: bool,
    data_toggle: bool,
    frame_number: u16,
}

/// An endpoint: wire identity plus halt/toggle/frame runtime state.
///
/// The identity fields are fixed at construction; the runtime state is
/// serialized behind the endpoint's own lock, so descriptor serialization
/// and request dispatch can hold the device tree read-only while an
/// endpoint is halted or its toggle flipped.
pub struct Endpoint {
    address: u8,
    attributes: u8,
    max_packet_size: u16,
    interval: u8,
    state: Mutex<EndpointState>,
}

impl Endpoint {
    /// Create an endpoint from raw address and attribute bytes.
    ///
    /// Fails with `InvalidEndpoint` if the address bits outside the
    /// direction and number fields are set.
    pub fn new(
        address: u8,
        attributes: u8,
        max_packet_size: u16,
        interval: u8,
    ) -> Result<Self, UsbError> {
        if (address & !(ENDPOINT_DIRECTION_MASK | ENDPOINT_NUMBER_MASK)) != 0 {
            return Err(UsbError::InvalidEndpoint);
        }
        Ok(Self {
            address,
            attributes,
            max_packet_size,
            interval,
            state: Mutex::new(EndpointState::default()),
        })
    }

    /// The control endpoint; address 0 stands for both directions.
    pub(crate) fn control(max_packet_size: u16) -> Self {
        Self {
            address: 0,
            attributes: EndpointType::Control as u8,
            max_packet_size,
            interval: 0,
            state: Mutex::new(EndpointState::default()),
        }
    }

    /// A bulk endpoint.
    pub fn bulk(address: u8, max_packet_size: u16) -> Result<Self, UsbError> {
        Self::new(address, EndpointType::Bulk as u8, max_packet_size, 0)
    }

    /// An interrupt endpoint with the given polling interval.
    pub fn interrupt(
        address: u8,
        max_packet_size: u16,
        interval: u8,
    ) -> Result<Self, UsbError> {
        Self::new(address, EndpointType::Interrupt as u8, max_packet_size, interval)
    }

    /// An isochronous endpoint.
    pub fn isochronous(
        address: u8,
        max_packet_size: u16,
        interval: u8,
        sync: IsoSync,
        usage: IsoUsage,
    ) -> Result<Self, UsbError> {
        let attributes = EndpointType::Isochronous as u8
            | ((sync as u8) << 2)
            | ((usage as u8) << 4);
        Self::new(address, attributes, max_packet_size, interval)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    pub fn interval(&self) -> u8 {
        self.interval
    }

    pub fn direction(&self) -> Direction {
        if (self.address & ENDPOINT_DIRECTION_MASK) != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn number(&self) -> u8 {
        self.address & ENDPOINT_NUMBER_MASK
    }

    pub fn transfer_type(&self) -> EndpointType {
        match self.attributes & ENDPOINT_TRANSFER_TYPE_MASK {
            0 => EndpointType::Control,
            1 => EndpointType::Isochronous,
            2 => EndpointType::Bulk,
            _ => EndpointType::Interrupt,
        }
    }

    pub fn iso_sync(&self) -> IsoSync {
        match (self.attributes & ENDPOINT_ISO_SYNC_MASK) >> 2 {
            0 => IsoSync::None,
            1 => IsoSync::Asynchronous,
            2 => IsoSync::Adaptive,
            _ => IsoSync::Synchronous,
        }
    }

    pub fn iso_usage(&self) -> IsoUsage {
        match (self.attributes & ENDPOINT_ISO_USAGE_MASK) >> 4 {
            0 => IsoUsage::Data,
            1 => IsoUsage::Feedback,
            2 => IsoUsage::ImplicitFeedback,
            _ => IsoUsage::Reserved,
        }
    }

    pub fn set_halt(&self, halted: bool) {
        self.state.lock().halted = halted;
    }

    pub fn is_halted(&self) -> bool {
        self.state.lock().halted
    }

    /// Flip the DATA0/DATA1 bit.
    pub fn toggle_data(&self) {
        let mut state = self.state.lock();
        state.data_toggle = !state.data_toggle;
    }

    /// Return the toggle to DATA0, as required after
    /// CLEAR_FEATURE(ENDPOINT_HALT).
    pub fn reset_data_toggle(&self) {
        self.state.lock().data_toggle = false;
    }

    /// `false` = DATA0, `true` = DATA1.
    pub fn data_toggle(&self) -> bool {
        self.state.lock().data_toggle
    }

    /// Advance the isochronous frame counter (wrapping).
    pub fn increment_frame(&self) {
        let mut state = self.state.lock();
        state.frame_number = state.frame_number.wrapping_add(1);
    }

    pub fn frame_number(&self) -> u16 {
        self.state.lock().frame_number
    }

    pub fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor {
            bLength: core::mem::size_of::<EndpointDescriptor>() as u8,
            bDescriptorType: ENDPOINT_DESCRIPTOR,
            bEndpointAddress: self.address,
            bmAttributes: self.attributes,
            wMaxPacketSize: self.max_packet_size.to_le_bytes(),
            bInterval: self.interval,
        }
    }
}

/// Map an endpoint address to a pending-table index.
///
/// OUT endpoints `0x00..=0x0F` map to `0..=15`, IN endpoints
/// `0x80..=0x8F` to `16..=31`. Anything else is not a valid endpoint
/// address.
pub fn endpoint_index(address: u8) -> Option<usize> {
    let number = (address & ENDPOINT_NUMBER_MASK) as usize;
    match address & !ENDPOINT_NUMBER_MASK {
        0 => Some(number),
        ENDPOINT_DIRECTION_MASK => Some(number + 16),
        _ => None,
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/endpoint.rs"]
mod tests;

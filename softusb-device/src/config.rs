//! Configurations, interfaces, and the class-driver dispatch seam.

use crate::endpoint::Endpoint;
use crate::types::UsbError;
use crate::wire::{
    ConfigurationDescriptor, EndpointType, InterfaceAssociationDescriptor,
    InterfaceDescriptor, SetupPacket, CONFIGURATION_DESCRIPTOR,
    INTERFACE_ASSOCIATION_DESCRIPTOR, INTERFACE_DESCRIPTOR,
};
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU8, Ordering};
use spin::Mutex;

/// Most endpoints one interface may declare.
pub const MAX_ENDPOINTS: usize = 16;
/// Most interface entries (alternate settings counted individually) per
/// configuration.
pub const MAX_INTERFACES: usize = 8;
/// Most interface associations per configuration.
pub const MAX_ASSOCIATIONS: usize = 4;

/// A class driver's verdict on a control request offered to it.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum ControlReply {
    /// Not a request this driver recognizes; the stack keeps looking.
    Ignored,
    /// Accepted. For IN requests, the first `n` bytes of the scratch
    /// buffer hold the response.
    Accepted(usize),
    /// Recognized but unserviceable; EP0 will be stalled.
    Rejected,
}

/// Class-specific behavior bound to an interface.
///
/// The application (or a class crate such as `softusb-msc`) owns the
/// driver; the interface keeps only a weak dispatch handle, so the driver
/// must outlive the interface binding.
pub trait ClassDriver: Send + Sync {
    /// Offer a class control request addressed to this interface.
    ///
    /// For OUT requests `data` holds the request payload (already read
    /// from EP0); for IN requests `data` is a scratch buffer for the
    /// response.
    fn control(&self, setup: &SetupPacket, data: &mut [u8]) -> ControlReply;

    /// SET_INTERFACE selected a new alternate setting.
    fn set_alternate(&self, _alternate: u8) {}
}

/// One interface (or alternate setting thereof) and its endpoints.
pub struct Interface {
    number: u8,
    alternate: u8,
    class: u8,
    subclass: u8,
    protocol: u8,
    string_index: u8,
    endpoints: [Option<Endpoint>; MAX_ENDPOINTS],
    endpoint_count: usize,
    current_alternate: AtomicU8,
    driver: Mutex<Option<Weak<dyn ClassDriver>>>,
}

impl Interface {
    pub fn new(number: u8, class: u8, subclass: u8, protocol: u8) -> Self {
        Self::with_alternate(number, 0, class, subclass, protocol)
    }

    pub fn with_alternate(
        number: u8,
        alternate: u8,
        class: u8,
        subclass: u8,
        protocol: u8,
    ) -> Self {
        Self {
            number,
            alternate,
            class,
            subclass,
            protocol,
            string_index: 0,
            endpoints: core::array::from_fn(|_| None),
            endpoint_count: 0,
            current_alternate: AtomicU8::new(0),
            driver: Mutex::new(None),
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn alternate(&self) -> u8 {
        self.alternate
    }

    pub fn class_code(&self) -> u8 {
        self.class
    }

    pub fn subclass_code(&self) -> u8 {
        self.subclass
    }

    pub fn protocol_code(&self) -> u8 {
        self.protocol
    }

    pub fn set_string_index(&mut self, index: u8) {
        self.string_index = index;
    }

    /// Add an endpoint. Control endpoints are rejected (EP0 belongs to
    /// the device, not to any interface), duplicates are `Busy`, and the
    /// table holds at most [`MAX_ENDPOINTS`].
    pub fn add_endpoint(&mut self, endpoint: Endpoint) -> Result<(), UsbError> {
        if endpoint.transfer_type() == EndpointType::Control {
            return Err(UsbError::InvalidEndpoint);
        }
        if self.endpoint(endpoint.address()).is_some() {
            return Err(UsbError::Busy);
        }
        if self.endpoint_count == MAX_ENDPOINTS {
            return Err(UsbError::NoMemory);
        }
        self.endpoints[self.endpoint_count] = Some(endpoint);
        self.endpoint_count += 1;
        Ok(())
    }

    pub fn endpoint(&self, address: u8) -> Option<&Endpoint> {
        self.endpoints().find(|e| e.address() == address)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter_map(Option::as_ref)
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoint_count
    }

    /// The alternate setting most recently selected with SET_INTERFACE.
    pub fn current_alternate(&self) -> u8 {
        self.current_alternate.load(Ordering::Relaxed)
    }

    pub(crate) fn set_current_alternate(&self, alternate: u8) {
        self.current_alternate.store(alternate, Ordering::Relaxed);
    }

    /// Bind a class driver. Only a weak handle is kept; the caller's
    /// `Arc` remains the owning reference.
    pub fn bind_driver(&self, driver: &Arc<dyn ClassDriver>) {
        *self.driver.lock() = Some(Arc::downgrade(driver));
    }

    /// The bound driver, if it is still alive.
    pub fn driver(&self) -> Option<Arc<dyn ClassDriver>> {
        self.driver.lock().as_ref()?.upgrade()
    }

    pub fn descriptor(&self) -> InterfaceDescriptor {
        InterfaceDescriptor {
            bLength: core::mem::size_of::<InterfaceDescriptor>() as u8,
            bDescriptorType: INTERFACE_DESCRIPTOR,
            bInterfaceNumber: self.number,
            bAlternateSetting: self.alternate,
            bNumEndpoints: self.endpoint_count as u8,
            bInterfaceClass: self.class,
            bInterfaceSubClass: self.subclass,
            bInterfaceProtocol: self.protocol,
            iInterface: self.string_index,
        }
    }

    fn encoded_length(&self) -> usize {
        core::mem::size_of::<InterfaceDescriptor>()
            + self.endpoint_count * core::mem::size_of::<crate::wire::EndpointDescriptor>()
    }
}

/// Groups a run of interfaces into one function of a composite device.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct InterfaceAssociation {
    pub first_interface: u8,
    pub interface_count: u8,
    pub function_class: u8,
    pub function_subclass: u8,
    pub function_protocol: u8,
    pub string_index: u8,
}

impl InterfaceAssociation {
    pub fn descriptor(&self) -> InterfaceAssociationDescriptor {
        InterfaceAssociationDescriptor {
            bLength: core::mem::size_of::<InterfaceAssociationDescriptor>() as u8,
            bDescriptorType: INTERFACE_ASSOCIATION_DESCRIPTOR,
            bFirstInterface: self.first_interface,
            bInterfaceCount: self.interface_count,
            bFunctionClass: self.function_class,
            bFunctionSubClass: self.function_subclass,
            bFunctionProtocol: self.function_protocol,
            iFunction: self.string_index,
        }
    }
}

// bmAttributes (USB 2.0 table 9-10); bit 7 is reserved-set
const ATTRIBUTE_RESERVED: u8 = 0x80;
const ATTRIBUTE_SELF_POWERED: u8 = 0x40;
const ATTRIBUTE_REMOTE_WAKEUP: u8 = 0x20;

/// One configuration: attributes plus the owned interface tree.
pub struct Configuration {
    value: u8,
    attributes: u8,
    max_power: u8,
    string_index: u8,
    interfaces: [Option<Interface>; MAX_INTERFACES],
    interface_count: usize,
    associations: [Option<InterfaceAssociation>; MAX_ASSOCIATIONS],
    association_count: usize,
}

impl Configuration {
    /// A bus-powered configuration drawing up to 100 mA.
    pub fn new(value: u8) -> Self {
        Self {
            value,
            attributes: ATTRIBUTE_RESERVED,
            max_power: 50,
            string_index: 0,
            interfaces: core::array::from_fn(|_| None),
            interface_count: 0,
            associations: core::array::from_fn(|_| None),
            association_count: 0,
        }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// The raw bmAttributes byte (bit 7 always set).
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    pub fn set_self_powered(&mut self, self_powered: bool) {
        if self_powered {
            self.attributes |= ATTRIBUTE_SELF_POWERED;
        } else {
            self.attributes &= !ATTRIBUTE_SELF_POWERED;
        }
    }

    pub fn is_self_powered(&self) -> bool {
        (self.attributes & ATTRIBUTE_SELF_POWERED) != 0
    }

    pub fn set_remote_wakeup(&mut self, remote_wakeup: bool) {
        if remote_wakeup {
            self.attributes |= ATTRIBUTE_REMOTE_WAKEUP;
        } else {
            self.attributes &= !ATTRIBUTE_REMOTE_WAKEUP;
        }
    }

    pub fn supports_remote_wakeup(&self) -> bool {
        (self.attributes & ATTRIBUTE_REMOTE_WAKEUP) != 0
    }

    /// Maximum bus current draw in milliamps (stored in 2 mA units).
    pub fn set_max_power_ma(&mut self, milliamps: u16) {
        self.max_power = (milliamps / 2).min(255) as u8;
    }

    pub fn max_power(&self) -> u8 {
        self.max_power
    }

    pub fn set_string_index(&mut self, index: u8) {
        self.string_index = index;
    }

    /// Add an interface entry. Each (number, alternate) pair may appear
    /// once (`Busy` otherwise); at most [`MAX_INTERFACES`] entries.
    pub fn add_interface(&mut self, interface: Interface) -> Result<(), UsbError> {
        if self.interfaces().any(|i| {
            i.number() == interface.number() && i.alternate() == interface.alternate()
        }) {
            return Err(UsbError::Busy);
        }
        if self.interface_count == MAX_INTERFACES {
            return Err(UsbError::NoMemory);
        }
        self.interfaces[self.interface_count] = Some(interface);
        self.interface_count += 1;
        Ok(())
    }

    /// Add an interface association. IADs always precede the interfaces
    /// they group in the serialized configuration.
    pub fn add_association(
        &mut self,
        association: InterfaceAssociation,
    ) -> Result<(), UsbError> {
        if self.association_count == MAX_ASSOCIATIONS {
            return Err(UsbError::NoMemory);
        }
        self.associations[self.association_count] = Some(association);
        self.association_count += 1;
        Ok(())
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter().filter_map(Option::as_ref)
    }

    pub fn associations(&self) -> impl Iterator<Item = &InterfaceAssociation> {
        self.associations.iter().filter_map(Option::as_ref)
    }

    /// The entry for `number` whose alternate matches the currently
    /// selected alternate setting.
    pub fn interface(&self, number: u8) -> Option<&Interface> {
        self.interfaces()
            .find(|i| i.number() == number && i.alternate() == i.current_alternate())
    }

    /// Select an alternate setting for interface `number`, updating every
    /// entry that shares the number. `InvalidRequest` if no entry has the
    /// requested alternate.
    pub fn select_alternate(&self, number: u8, alternate: u8) -> Result<(), UsbError> {
        if !self
            .interfaces()
            .any(|i| i.number() == number && i.alternate() == alternate)
        {
            return Err(UsbError::InvalidRequest);
        }
        for interface in self.interfaces().filter(|i| i.number() == number) {
            interface.set_current_alternate(alternate);
        }
        Ok(())
    }

    /// Search every interface entry for an endpoint address.
    pub fn endpoint(&self, address: u8) -> Option<&Endpoint> {
        self.interfaces().find_map(|i| i.endpoint(address))
    }

    fn num_interfaces(&self) -> u8 {
        // distinct interface numbers, not entries
        let mut seen = 0u32;
        for interface in self.interfaces() {
            seen |= 1 << (interface.number() & 31);
        }
        seen.count_ones() as u8
    }

    /// The wTotalLength this configuration serializes to:
    /// `9 + 8·associations + Σ(9 + 7·endpoints)`.
    pub fn total_length(&self) -> u16 {
        let mut total = core::mem::size_of::<ConfigurationDescriptor>()
            + self.association_count
                * core::mem::size_of::<InterfaceAssociationDescriptor>();
        for interface in self.interfaces() {
            total += interface.encoded_length();
        }
        total as u16
    }

    pub fn descriptor(&self) -> ConfigurationDescriptor {
        ConfigurationDescriptor {
            bLength: core::mem::size_of::<ConfigurationDescriptor>() as u8,
            bDescriptorType: CONFIGURATION_DESCRIPTOR,
            wTotalLength: self.total_length().to_le_bytes(),
            bNumInterfaces: self.num_interfaces(),
            bConfigurationValue: self.value,
            iConfiguration: self.string_index,
            bmAttributes: self.attributes,
            bMaxPower: self.max_power,
        }
    }

    /// Serialize the whole configuration: header, then the associations
    /// in declaration order, then each interface followed immediately by
    /// its endpoints. Returns the byte count (always `total_length()`),
    /// or 0 if `buf` cannot hold it.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let total = self.total_length() as usize;
        if buf.len() < total {
            return 0;
        }
        let mut offset = self.descriptor().encode(buf);
        for association in self.associations() {
            offset += association.descriptor().encode(&mut buf[offset..]);
        }
        for interface in self.interfaces() {
            offset += interface.descriptor().encode(&mut buf[offset..]);
            for endpoint in interface.endpoints() {
                offset += endpoint.descriptor().encode(&mut buf[offset..]);
            }
        }
        debug_assert_eq!(offset, total);
        offset
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/config.rs"]
mod tests;

//! The device: descriptor identity, configuration tree, string table,
//! and the lifecycle state machine.

use crate::config::Configuration;
use crate::endpoint::Endpoint;
use crate::types::{DeviceState, Speed, UsbError};
use crate::wire::{
    encode_langid_descriptor, encode_string_descriptor, DeviceDescriptor,
    DEVICE_DESCRIPTOR,
};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use futures::task::AtomicWaker;
use spin::RwLock;

/// Most configurations one device may carry.
pub const MAX_CONFIGURATIONS: usize = 4;
/// String-table capacity, including the reserved LANGID entry at index 0.
pub const MAX_STRINGS: usize = 16;

/// US English, the default LANGID.
pub const LANGID_EN_US: u16 = 0x0409;

type StateChangeFn = Box<dyn Fn(DeviceState, DeviceState) + Send + Sync>;
type EventFn = Box<dyn Fn() + Send + Sync>;
type ByteEventFn = Box<dyn Fn(u8) + Send + Sync>;

#[derive(Default)]
struct EventCallbacks {
    state_change: Option<StateChangeFn>,
    reset: Option<EventFn>,
    suspend: Option<EventFn>,
    resume: Option<EventFn>,
    address: Option<ByteEventFn>,
    configured: Option<ByteEventFn>,
}

struct Identity {
    usb_release: u16,
    class: u8,
    subclass: u8,
    protocol: u8,
    max_packet_0: u8,
    vid: u16,
    pid: u16,
    device_release: u16,
    manufacturer_index: u8,
    product_index: u8,
    serial_index: u8,
}

struct ControlState {
    state: DeviceState,
    previous_state: DeviceState,
    address: u8,
    speed: Speed,
    active_config: Option<u8>,
    remote_wakeup: bool,
}

/// The root of the device tree.
///
/// The configuration tree and string table are fixed once built; runtime
/// state (lifecycle state, address, active configuration) lives behind a
/// reader-writer lock, and event callbacks are always invoked after that
/// lock has been released.
pub struct Device {
    identity: Identity,
    configurations: [Option<Configuration>; MAX_CONFIGURATIONS],
    configuration_count: usize,
    strings: [Option<String>; MAX_STRINGS],
    langids: Vec<u16>,
    ep0: Endpoint,
    control: RwLock<ControlState>,
    callbacks: EventCallbacks,
    state_waker: AtomicWaker,
}

impl Device {
    pub fn state(&self) -> DeviceState {
        self.control.read().state
    }

    /// The assigned bus address; 0 until SET_ADDRESS.
    pub fn address(&self) -> u8 {
        self.control.read().address
    }

    pub fn speed(&self) -> Speed {
        self.control.read().speed
    }

    pub fn set_speed(&self, speed: Speed) {
        self.control.write().speed = speed;
    }

    pub fn remote_wakeup_enabled(&self) -> bool {
        self.control.read().remote_wakeup
    }

    pub fn set_remote_wakeup(&self, enabled: bool) {
        self.control.write().remote_wakeup = enabled;
    }

    /// The value of the active configuration, or 0 when not configured.
    pub fn active_configuration_value(&self) -> u8 {
        self.control.read().active_config.unwrap_or(0)
    }

    /// SET_ADDRESS. Only valid in Default or Address; address 0 returns
    /// to Default, anything else enters Address.
    pub fn set_address(&self, address: u8) -> Result<(), UsbError> {
        let (old, new) = {
            let mut control = self.control.write();
            match control.state {
                DeviceState::Default | DeviceState::Address => {}
                _ => return Err(UsbError::InvalidState),
            }
            control.address = address;
            let old = control.state;
            control.state = if address == 0 {
                DeviceState::Default
            } else {
                DeviceState::Address
            };
            (old, control.state)
        };
        if let Some(callback) = &self.callbacks.address {
            callback(address);
        }
        self.after_transition(old, new);
        Ok(())
    }

    /// SET_CONFIGURATION. Only valid in Address or Configured; value 0
    /// deconfigures, any other value must match a configuration.
    pub fn set_configuration(&self, value: u8) -> Result<(), UsbError> {
        if value != 0 && self.configuration_by_value(value).is_none() {
            return Err(UsbError::InvalidRequest);
        }
        let (old, new) = {
            let mut control = self.control.write();
            match control.state {
                DeviceState::Address | DeviceState::Configured => {}
                _ => return Err(UsbError::InvalidState),
            }
            let old = control.state;
            if value == 0 {
                control.active_config = None;
                control.state = DeviceState::Address;
            } else {
                control.active_config = Some(value);
                control.state = DeviceState::Configured;
            }
            (old, control.state)
        };
        if let Some(callback) = &self.callbacks.configured {
            callback(value);
        }
        self.after_transition(old, new);
        Ok(())
    }

    /// A bus reset returns the device to Default with address 0, no
    /// active configuration, and remote wakeup disabled.
    pub fn bus_reset(&self) {
        let (old, new) = {
            let mut control = self.control.write();
            let old = control.state;
            control.state = DeviceState::Default;
            control.address = 0;
            control.active_config = None;
            control.remote_wakeup = false;
            (old, control.state)
        };
        if let Some(callback) = &self.callbacks.reset {
            callback();
        }
        self.after_transition(old, new);
    }

    /// Enter Suspended, remembering the state to resume into.
    ///
    /// A second suspend overwrites the remembered state with Suspended,
    /// so the following resume stays Suspended. This mirrors the bus
    /// behavior of a device that never saw resume signalling.
    pub fn suspend(&self) {
        let (old, new) = {
            let mut control = self.control.write();
            let old = control.state;
            control.previous_state = old;
            control.state = DeviceState::Suspended;
            (old, control.state)
        };
        if let Some(callback) = &self.callbacks.suspend {
            callback();
        }
        self.after_transition(old, new);
    }

    /// Leave Suspended for the remembered state (Attached/Powered map to
    /// Default). A resume while not suspended does nothing.
    pub fn resume(&self) {
        let (old, new) = {
            let mut control = self.control.write();
            if control.state != DeviceState::Suspended {
                return;
            }
            let old = control.state;
            control.state = match control.previous_state {
                DeviceState::Attached | DeviceState::Powered => DeviceState::Default,
                state => state,
            };
            (old, control.state)
        };
        if let Some(callback) = &self.callbacks.resume {
            callback();
        }
        self.after_transition(old, new);
    }

    fn after_transition(&self, old: DeviceState, new: DeviceState) {
        if old != new {
            if let Some(callback) = &self.callbacks.state_change {
                callback(old, new);
            }
        }
        self.state_waker.wake();
    }

    /// Resolves once the device enters the Configured state.
    pub fn wait_configured(&self) -> WaitConfigured<'_> {
        WaitConfigured { device: self }
    }

    pub fn configuration_by_value(&self, value: u8) -> Option<&Configuration> {
        self.configurations()
            .find(|configuration| configuration.value() == value)
    }

    pub fn configuration_by_index(&self, index: u8) -> Option<&Configuration> {
        self.configurations().nth(index as usize)
    }

    pub fn configurations(&self) -> impl Iterator<Item = &Configuration> {
        self.configurations.iter().filter_map(Option::as_ref)
    }

    pub fn active_configuration(&self) -> Option<&Configuration> {
        let value = self.control.read().active_config?;
        self.configuration_by_value(value)
    }

    /// The control endpoint.
    pub fn ep0(&self) -> &Endpoint {
        &self.ep0
    }

    /// Look up an endpoint by address: EP0 by either direction, data
    /// endpoints in the active configuration.
    pub fn endpoint(&self, address: u8) -> Result<&Endpoint, UsbError> {
        if (address & 0x7F) == 0 {
            return Ok(&self.ep0);
        }
        let configuration = self
            .active_configuration()
            .ok_or(UsbError::InvalidEndpoint)?;
        configuration
            .endpoint(address)
            .ok_or(UsbError::InvalidEndpoint)
    }

    pub fn device_descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            bLength: core::mem::size_of::<DeviceDescriptor>() as u8,
            bDescriptorType: DEVICE_DESCRIPTOR,
            bcdUSB: self.identity.usb_release.to_le_bytes(),
            bDeviceClass: self.identity.class,
            bDeviceSubClass: self.identity.subclass,
            bDeviceProtocol: self.identity.protocol,
            bMaxPacketSize0: self.identity.max_packet_0,
            idVendor: self.identity.vid.to_le_bytes(),
            idProduct: self.identity.pid.to_le_bytes(),
            bcdDevice: self.identity.device_release.to_le_bytes(),
            iManufacturer: self.identity.manufacturer_index,
            iProduct: self.identity.product_index,
            iSerialNumber: self.identity.serial_index,
            bNumConfigurations: self.configuration_count as u8,
        }
    }

    /// Serialize the configuration at `index` (GET_DESCRIPTOR ordering).
    pub fn encode_configuration(
        &self,
        index: u8,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        let configuration = self
            .configuration_by_index(index)
            .ok_or(UsbError::InvalidRequest)?;
        match configuration.encode(buf) {
            0 => Err(UsbError::BufferTooSmall),
            n => Ok(n),
        }
    }

    /// Serialize a string descriptor; index 0 is the LANGID list.
    pub fn encode_string(&self, index: u8, buf: &mut [u8]) -> Result<usize, UsbError> {
        let written = if index == 0 {
            encode_langid_descriptor(&self.langids, buf)
        } else {
            let text = self
                .strings
                .get(index as usize)
                .and_then(Option::as_ref)
                .ok_or(UsbError::InvalidRequest)?;
            encode_string_descriptor(text, buf)
        };
        match written {
            0 => Err(UsbError::BufferTooSmall),
            n => Ok(n),
        }
    }

    pub fn string(&self, index: u8) -> Option<&str> {
        self.strings
            .get(index as usize)
            .and_then(Option::as_ref)
            .map(String::as_str)
    }
}

/// Future returned by [`Device::wait_configured`].
pub struct WaitConfigured<'a> {
    device: &'a Device,
}

impl Future for WaitConfigured<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.device.state_waker.register(cx.waker());
        if self.device.state() == DeviceState::Configured {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Assembles a [`Device`] at configuration time.
///
/// ```
/// use softusb_device::{Configuration, DeviceBuilder};
///
/// let mut configuration = Configuration::new(1);
/// # let _ = &mut configuration;
/// let device = DeviceBuilder::new()
///     .vendor_product(0x1234, 0x5680)
///     .product("softusb gadget")
///     .add_configuration(configuration)
///     .unwrap()
///     .build();
/// assert_eq!(device.device_descriptor().vid(), 0x1234);
/// ```
pub struct DeviceBuilder {
    identity: Identity,
    configurations: [Option<Configuration>; MAX_CONFIGURATIONS],
    configuration_count: usize,
    strings: [Option<String>; MAX_STRINGS],
    next_string: usize,
    langids: Vec<u16>,
    callbacks: EventCallbacks,
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBuilder {
    pub fn new() -> Self {
        Self {
            identity: Identity {
                usb_release: 0x0200,
                class: 0,
                subclass: 0,
                protocol: 0,
                max_packet_0: 64,
                vid: 0,
                pid: 0,
                device_release: 0x0100,
                manufacturer_index: 0,
                product_index: 0,
                serial_index: 0,
            },
            configurations: core::array::from_fn(|_| None),
            configuration_count: 0,
            strings: core::array::from_fn(|_| None),
            next_string: 1,
            langids: alloc::vec![LANGID_EN_US],
            callbacks: EventCallbacks::default(),
        }
    }

    pub fn vendor_product(mut self, vid: u16, pid: u16) -> Self {
        self.identity.vid = vid;
        self.identity.pid = pid;
        self
    }

    /// bcdUSB; defaults to 0x0200.
    pub fn usb_release(mut self, bcd: u16) -> Self {
        self.identity.usb_release = bcd;
        self
    }

    /// bcdDevice; defaults to 0x0100.
    pub fn device_release(mut self, bcd: u16) -> Self {
        self.identity.device_release = bcd;
        self
    }

    /// Device-level class triple (00h means the interfaces decide).
    pub fn device_class(mut self, class: u8, subclass: u8, protocol: u8) -> Self {
        self.identity.class = class;
        self.identity.subclass = subclass;
        self.identity.protocol = protocol;
        self
    }

    /// EP0 maximum packet size; 8, 16, 32, or 64.
    pub fn max_packet_0(mut self, size: u8) -> Result<Self, UsbError> {
        if !matches!(size, 8 | 16 | 32 | 64) {
            return Err(UsbError::InvalidRequest);
        }
        self.identity.max_packet_0 = size;
        Ok(self)
    }

    /// Intern a string, returning its descriptor index.
    pub fn string(&mut self, text: &str) -> Result<u8, UsbError> {
        if self.next_string == MAX_STRINGS {
            return Err(UsbError::NoMemory);
        }
        let index = self.next_string;
        self.strings[index] = Some(String::from(text));
        self.next_string += 1;
        Ok(index as u8)
    }

    pub fn manufacturer(mut self, text: &str) -> Self {
        if let Ok(index) = self.string(text) {
            self.identity.manufacturer_index = index;
        }
        self
    }

    pub fn product(mut self, text: &str) -> Self {
        if let Ok(index) = self.string(text) {
            self.identity.product_index = index;
        }
        self
    }

    pub fn serial_number(mut self, text: &str) -> Self {
        if let Ok(index) = self.string(text) {
            self.identity.serial_index = index;
        }
        self
    }

    /// Replace the LANGID list (defaults to en-US only).
    pub fn langids(mut self, langids: &[u16]) -> Self {
        self.langids = langids.to_vec();
        self
    }

    /// Add a configuration; values must be unique and non-zero.
    pub fn add_configuration(
        mut self,
        configuration: Configuration,
    ) -> Result<Self, UsbError> {
        if configuration.value() == 0 {
            return Err(UsbError::InvalidRequest);
        }
        if self
            .configurations
            .iter()
            .flatten()
            .any(|c| c.value() == configuration.value())
        {
            return Err(UsbError::Busy);
        }
        if self.configuration_count == MAX_CONFIGURATIONS {
            return Err(UsbError::NoMemory);
        }
        self.configurations[self.configuration_count] = Some(configuration);
        self.configuration_count += 1;
        Ok(self)
    }

    pub fn on_state_change(
        mut self,
        callback: impl Fn(DeviceState, DeviceState) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.state_change = Some(Box::new(callback));
        self
    }

    pub fn on_reset(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks.reset = Some(Box::new(callback));
        self
    }

    pub fn on_suspend(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks.suspend = Some(Box::new(callback));
        self
    }

    pub fn on_resume(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks.resume = Some(Box::new(callback));
        self
    }

    pub fn on_address(mut self, callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.callbacks.address = Some(Box::new(callback));
        self
    }

    pub fn on_configured(
        mut self,
        callback: impl Fn(u8) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.configured = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Device {
        let max_packet_0 = self.identity.max_packet_0;
        Device {
            identity: self.identity,
            configurations: self.configurations,
            configuration_count: self.configuration_count,
            strings: self.strings,
            langids: self.langids,
            ep0: Endpoint::control(max_packet_0 as u16),
            control: RwLock::new(ControlState {
                state: DeviceState::Attached,
                previous_state: DeviceState::Attached,
                address: 0,
                speed: Speed::Full,
                active_config: None,
                remote_wakeup: false,
            }),
            callbacks: self.callbacks,
            state_waker: AtomicWaker::new(),
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/device.rs"]
mod tests;

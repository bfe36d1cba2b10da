//! Boot keyboard and mouse: descriptors, reports, EP0 handling.

use core::sync::atomic::{AtomicU8, Ordering};
use softusb_device::wire::{Direction, HID_CLASSCODE};
use softusb_device::{
    ClassDriver, ControlReply, Endpoint, Hal, Interface, SetupPacket, Stack,
    UsbError,
};
use spin::Mutex;

/// Boot-capable devices (HID 1.11 s4.2)
pub const SUBCLASS_BOOT: u8 = 0x01;
/// bInterfaceProtocol for keyboards
pub const PROTOCOL_KEYBOARD: u8 = 0x01;
/// bInterfaceProtocol for mice
pub const PROTOCOL_MOUSE: u8 = 0x02;

// Class requests (HID 1.11 s7.2)
const GET_REPORT: u8 = 0x01;
const GET_IDLE: u8 = 0x02;
const GET_PROTOCOL: u8 = 0x03;
const SET_REPORT: u8 = 0x09;
const SET_IDLE: u8 = 0x0A;
const SET_PROTOCOL: u8 = 0x0B;

// Report types, wValue high byte of GET_REPORT/SET_REPORT
const REPORT_TYPE_INPUT: u8 = 1;
const REPORT_TYPE_OUTPUT: u8 = 2;

/// The 8-byte boot keyboard report: modifiers, reserved, six keycodes
/// (HID 1.11 appendix B.1).
pub const BOOT_KEYBOARD_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0xE0, //   Usage Minimum (Left Control)
    0x29, 0xE7, //   Usage Maximum (Right GUI)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute): modifiers
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Constant): reserved byte
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum (Num Lock)
    0x29, 0x05, //   Usage Maximum (Kana)
    0x91, 0x02, //   Output (Data, Variable, Absolute): LEDs
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x01, //   Output (Constant): LED padding
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x65, //   Logical Maximum (101)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0x65, //   Usage Maximum (101)
    0x81, 0x00, //   Input (Data, Array): keycodes
    0xC0, // End Collection
];

/// The 4-byte boot mouse report: buttons, X, Y, wheel.
pub const BOOT_MOUSE_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x02, // Usage (Mouse)
    0xA1, 0x01, // Collection (Application)
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    0x05, 0x09, //     Usage Page (Buttons)
    0x19, 0x01, //     Usage Minimum (1)
    0x29, 0x03, //     Usage Maximum (3)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x01, //     Logical Maximum (1)
    0x95, 0x03, //     Report Count (3)
    0x75, 0x01, //     Report Size (1)
    0x81, 0x02, //     Input (Data, Variable, Absolute): buttons
    0x95, 0x01, //     Report Count (1)
    0x75, 0x05, //     Report Size (5)
    0x81, 0x01, //     Input (Constant): padding
    0x05, 0x01, //     Usage Page (Generic Desktop)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x09, 0x38, //     Usage (Wheel)
    0x15, 0x81, //     Logical Minimum (-127)
    0x25, 0x7F, //     Logical Maximum (127)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x03, //     Report Count (3)
    0x81, 0x06, //     Input (Data, Variable, Relative)
    0xC0, //   End Collection
    0xC0, // End Collection
];

/// Keyboard modifier bits (HID 1.11 s8.3).
pub mod modifiers {
    pub const LEFT_CTRL: u8 = 0x01;
    pub const LEFT_SHIFT: u8 = 0x02;
    pub const LEFT_ALT: u8 = 0x04;
    pub const LEFT_GUI: u8 = 0x08;
    pub const RIGHT_CTRL: u8 = 0x10;
    pub const RIGHT_SHIFT: u8 = 0x20;
    pub const RIGHT_ALT: u8 = 0x40;
    pub const RIGHT_GUI: u8 = 0x80;
}

/// Keyboard/keypad usage IDs (HID Usage Tables s10); the boot subset.
pub mod usage {
    /// `A`; `B` through `Z` follow contiguously.
    pub const KEY_A: u8 = 0x04;
    /// `1`; `2` through `9` then `0` follow contiguously.
    pub const KEY_1: u8 = 0x1E;
    pub const KEY_ENTER: u8 = 0x28;
    pub const KEY_ESCAPE: u8 = 0x29;
    pub const KEY_BACKSPACE: u8 = 0x2A;
    pub const KEY_TAB: u8 = 0x2B;
    pub const KEY_SPACE: u8 = 0x2C;
    pub const KEY_CAPS_LOCK: u8 = 0x39;
    /// `F1`; `F2` through `F12` follow contiguously.
    pub const KEY_F1: u8 = 0x3A;
    pub const KEY_RIGHT_ARROW: u8 = 0x4F;
    pub const KEY_LEFT_ARROW: u8 = 0x50;
    pub const KEY_DOWN_ARROW: u8 = 0x51;
    pub const KEY_UP_ARROW: u8 = 0x52;
}

/// A boot keyboard input report.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    pub modifiers: u8,
    /// Up to six concurrently held keys, 0 = none
    pub keys: [u8; 6],
}

impl KeyboardReport {
    pub fn encode(&self) -> [u8; 8] {
        let mut report = [0u8; 8];
        report[0] = self.modifiers;
        report[2..8].copy_from_slice(&self.keys);
        report
    }

    /// Add a key to the report. Returns `false` when six keys are
    /// already held (the boot protocol's rollover limit) and the report
    /// is unchanged.
    pub fn press(&mut self, key: u8) -> bool {
        if key == 0 || self.keys.contains(&key) {
            return true;
        }
        match self.keys.iter_mut().find(|slot| **slot == 0) {
            Some(slot) => {
                *slot = key;
                true
            }
            None => false,
        }
    }

    /// Remove a key from the report (a no-op if it is not held).
    pub fn release(&mut self, key: u8) {
        for slot in self.keys.iter_mut() {
            if *slot == key {
                *slot = 0;
            }
        }
    }

    pub fn is_pressed(&self, key: u8) -> bool {
        key != 0 && self.keys.contains(&key)
    }
}

/// A boot mouse input report.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct MouseReport {
    /// Bits 0..3: left, right, middle
    pub buttons: u8,
    pub x: i8,
    pub y: i8,
    pub wheel: i8,
}

impl MouseReport {
    pub fn encode(&self) -> [u8; 4] {
        [
            self.buttons,
            self.x as u8,
            self.y as u8,
            self.wheel as u8,
        ]
    }
}

/// Boot vs report protocol, selected with SET_PROTOCOL.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum HidProtocol {
    Boot,
    Report,
}

const MAX_INPUT_REPORT: usize = 8;

#[derive(Default)]
struct InputLatch {
    bytes: [u8; MAX_INPUT_REPORT],
    len: usize,
}

/// The EP0 side of a HID function.
///
/// Bind an `Arc<HidClass>` to the interface; the application pushes
/// input reports with [`send_report`](HidClass::send_report), and the
/// host's GET_REPORT reads back whatever was pushed last.
pub struct HidClass {
    protocol: AtomicU8,
    idle: AtomicU8,
    input: Mutex<InputLatch>,
    leds: AtomicU8,
}

impl Default for HidClass {
    fn default() -> Self {
        Self::new()
    }
}

impl HidClass {
    pub fn new() -> Self {
        Self {
            protocol: AtomicU8::new(1), // report protocol until told otherwise
            idle: AtomicU8::new(0),
            input: Mutex::new(InputLatch::default()),
            leds: AtomicU8::new(0),
        }
    }

    pub fn protocol(&self) -> HidProtocol {
        if self.protocol.load(Ordering::Relaxed) == 0 {
            HidProtocol::Boot
        } else {
            HidProtocol::Report
        }
    }

    /// Idle duration in 4 ms units; 0 means indefinite.
    pub fn idle_rate(&self) -> u8 {
        self.idle.load(Ordering::Relaxed)
    }

    /// The LED bitmap last written by SET_REPORT(Output).
    pub fn led_state(&self) -> u8 {
        self.leds.load(Ordering::Relaxed)
    }

    /// Remember `report` as the current input report (what GET_REPORT
    /// answers with). Reports longer than 8 bytes are truncated.
    pub fn latch_input(&self, report: &[u8]) {
        let mut input = self.input.lock();
        let len = report.len().min(MAX_INPUT_REPORT);
        input.bytes[..len].copy_from_slice(&report[..len]);
        input.len = len;
    }

    /// Latch and push an input report on the interrupt-IN endpoint.
    pub async fn send_report<H: Hal>(
        &self,
        stack: &Stack<H>,
        endpoint: u8,
        report: &[u8],
    ) -> Result<usize, UsbError> {
        self.latch_input(report);
        stack.write(endpoint, report).await
    }
}

impl ClassDriver for HidClass {
    fn control(&self, setup: &SetupPacket, data: &mut [u8]) -> ControlReply {
        match (setup.direction(), setup.bRequest) {
            (Direction::In, GET_REPORT) => match (setup.wValue >> 8) as u8 {
                REPORT_TYPE_INPUT => {
                    let input = self.input.lock();
                    if data.len() < input.len {
                        return ControlReply::Rejected;
                    }
                    data[..input.len].copy_from_slice(&input.bytes[..input.len]);
                    ControlReply::Accepted(input.len)
                }
                REPORT_TYPE_OUTPUT => {
                    if data.is_empty() {
                        return ControlReply::Rejected;
                    }
                    data[0] = self.led_state();
                    ControlReply::Accepted(1)
                }
                _ => ControlReply::Rejected,
            },
            (Direction::In, GET_IDLE) => {
                if data.is_empty() {
                    return ControlReply::Rejected;
                }
                data[0] = self.idle_rate();
                ControlReply::Accepted(1)
            }
            (Direction::In, GET_PROTOCOL) => {
                if data.is_empty() {
                    return ControlReply::Rejected;
                }
                data[0] = self.protocol.load(Ordering::Relaxed);
                ControlReply::Accepted(1)
            }
            (Direction::Out, SET_REPORT) => {
                // a boot keyboard's only output report is the LED bitmap
                if (setup.wValue >> 8) as u8 != REPORT_TYPE_OUTPUT || data.is_empty() {
                    return ControlReply::Rejected;
                }
                self.leds.store(data[0], Ordering::Relaxed);
                ControlReply::Accepted(0)
            }
            (Direction::Out, SET_IDLE) => {
                self.idle.store((setup.wValue >> 8) as u8, Ordering::Relaxed);
                ControlReply::Accepted(0)
            }
            (Direction::Out, SET_PROTOCOL) => {
                if setup.wValue > 1 {
                    return ControlReply::Rejected;
                }
                self.protocol.store(setup.wValue as u8, Ordering::Relaxed);
                ControlReply::Accepted(0)
            }
            _ => ControlReply::Ignored,
        }
    }
}

/// A boot keyboard interface: class 0x03, boot subclass, one
/// interrupt-IN endpoint.
pub fn keyboard_interface(
    number: u8,
    in_endpoint: u8,
    max_packet_size: u16,
    interval: u8,
) -> Result<Interface, UsbError> {
    let mut interface =
        Interface::new(number, HID_CLASSCODE, SUBCLASS_BOOT, PROTOCOL_KEYBOARD);
    interface.add_endpoint(Endpoint::interrupt(
        in_endpoint,
        max_packet_size,
        interval,
    )?)?;
    Ok(interface)
}

/// A boot mouse interface: class 0x03, boot subclass, one interrupt-IN
/// endpoint.
pub fn mouse_interface(
    number: u8,
    in_endpoint: u8,
    max_packet_size: u16,
    interval: u8,
) -> Result<Interface, UsbError> {
    let mut interface =
        Interface::new(number, HID_CLASSCODE, SUBCLASS_BOOT, PROTOCOL_MOUSE);
    interface.add_endpoint(Endpoint::interrupt(
        in_endpoint,
        max_packet_size,
        interval,
    )?)?;
    Ok(interface)
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/hid.rs"]
mod tests;

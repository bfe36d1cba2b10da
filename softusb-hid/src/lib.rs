//! HID class support for the softusb device stack.
//!
//! Covers the boot-protocol keyboard and mouse: the canonical report
//! descriptors, typed report encoders, and the HID class control
//! requests (GET/SET_REPORT, GET/SET_IDLE, GET/SET_PROTOCOL) serviced
//! on EP0 through the stack's class-dispatch path. Input reports are
//! pushed on the interrupt-IN endpoint by the owning application via
//! [`HidClass::send_report`].

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod hid;

pub use hid::{
    keyboard_interface, mouse_interface, HidClass, HidProtocol, KeyboardReport,
    MouseReport, BOOT_KEYBOARD_REPORT_DESCRIPTOR, BOOT_MOUSE_REPORT_DESCRIPTOR,
};

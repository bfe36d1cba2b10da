use super::*;
use crate::config::{ClassDriver, Configuration, ControlReply, Interface};
use crate::device::DeviceBuilder;
use crate::endpoint::Endpoint;
use crate::types::DeviceState;
use crate::wire::{
    IsoSync, IsoUsage, CLASS_REQUEST, DEVICE_TO_HOST, HOST_TO_DEVICE,
    RECIPIENT_DEVICE, RECIPIENT_ENDPOINT, RECIPIENT_INTERFACE,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

fn in_request(recipient: u8, request: u8, value: u16, index: u16, length: u16) -> SetupPacket {
    SetupPacket {
        bmRequestType: DEVICE_TO_HOST | recipient,
        bRequest: request,
        wValue: value,
        wIndex: index,
        wLength: length,
    }
}

fn out_request(recipient: u8, request: u8, value: u16, index: u16) -> SetupPacket {
    SetupPacket {
        bmRequestType: HOST_TO_DEVICE | recipient,
        bRequest: request,
        wValue: value,
        wIndex: index,
        wLength: 0,
    }
}

fn test_device() -> Device {
    let mut configuration = Configuration::new(1);
    configuration.set_self_powered(true);
    let mut interface = Interface::new(0, 0xFF, 0, 0);
    interface
        .add_endpoint(Endpoint::bulk(0x81, 512).unwrap())
        .unwrap();
    interface
        .add_endpoint(
            Endpoint::isochronous(0x02, 256, 1, IsoSync::None, IsoUsage::Data).unwrap(),
        )
        .unwrap();
    configuration.add_interface(interface).unwrap();
    let mut alt = Interface::with_alternate(0, 1, 0xFF, 0, 0);
    alt.add_endpoint(Endpoint::bulk(0x81, 64).unwrap()).unwrap();
    configuration.add_interface(alt).unwrap();

    let device = DeviceBuilder::new()
        .vendor_product(0x1234, 0x5680)
        .product("softusb")
        .add_configuration(configuration)
        .unwrap()
        .build();
    device.bus_reset();
    device
}

fn configured_device() -> Device {
    let device = test_device();
    device.set_address(5).unwrap();
    device.set_configuration(1).unwrap();
    device
}

#[test]
fn get_device_descriptor() {
    // SETUP 80 06 00 01 00 00 12 00
    let device = test_device();
    let setup = SetupPacket::parse(&[0x80, 6, 0, 1, 0, 0, 0x12, 0]).unwrap();
    let mut data = [0u8; 512];
    let n = handle(&device, &setup, &mut data).unwrap();
    assert_eq!(n, 18);
    assert_eq!(data[0], 18);
    assert_eq!(data[1], 0x01);
    assert_eq!(&data[2..4], &[0x00, 0x02]);
    assert_eq!(data[7], 64);
    assert_eq!(&data[8..10], &[0x34, 0x12]);
    assert_eq!(&data[10..12], &[0x80, 0x56]);
}

#[test]
fn get_configuration_descriptor() {
    let device = test_device();
    let setup = in_request(RECIPIENT_DEVICE, GET_DESCRIPTOR, 0x0200, 0, 255);
    let mut data = [0u8; 512];
    let n = handle(&device, &setup, &mut data).unwrap();
    assert_eq!(n, 9 + (9 + 7 * 2) + (9 + 7));
    assert_eq!(u16::from_le_bytes([data[2], data[3]]) as usize, n);

    let missing = in_request(RECIPIENT_DEVICE, GET_DESCRIPTOR, 0x0201, 0, 255);
    assert_eq!(
        handle(&device, &missing, &mut data).err(),
        Some(UsbError::InvalidRequest)
    );
}

#[test]
fn get_string_descriptor() {
    let device = test_device();
    let mut data = [0u8; 512];
    let langids = in_request(RECIPIENT_DEVICE, GET_DESCRIPTOR, 0x0300, 0, 255);
    assert_eq!(handle(&device, &langids, &mut data).unwrap(), 4);
    let product = in_request(RECIPIENT_DEVICE, GET_DESCRIPTOR, 0x0301, 0, 255);
    assert_eq!(
        handle(&device, &product, &mut data).unwrap(),
        2 + 2 * "softusb".len()
    );
    let missing = in_request(RECIPIENT_DEVICE, GET_DESCRIPTOR, 0x0309, 0, 255);
    assert_eq!(
        handle(&device, &missing, &mut data).err(),
        Some(UsbError::InvalidRequest)
    );
}

#[test]
fn unsupported_descriptor_type_is_rejected() {
    let device = test_device();
    let mut data = [0u8; 512];
    // 0x06 = device qualifier, not supported by a USB 2.0-only stack
    let setup = in_request(RECIPIENT_DEVICE, GET_DESCRIPTOR, 0x0600, 0, 10);
    assert_eq!(
        handle(&device, &setup, &mut data).err(),
        Some(UsbError::InvalidRequest)
    );
}

#[test]
fn device_status() {
    let device = configured_device();
    let mut data = [0u8; 512];
    let setup = in_request(RECIPIENT_DEVICE, GET_STATUS, 0, 0, 2);
    assert_eq!(handle(&device, &setup, &mut data).unwrap(), 2);
    assert_eq!(data[0], 1); // self-powered
    assert_eq!(data[1], 0);

    device.set_remote_wakeup(true);
    assert_eq!(handle(&device, &setup, &mut data).unwrap(), 2);
    assert_eq!(data[0], 3);

    let short = in_request(RECIPIENT_DEVICE, GET_STATUS, 0, 0, 1);
    assert_eq!(
        handle(&device, &short, &mut data).err(),
        Some(UsbError::InvalidRequest)
    );
}

#[test]
fn remote_wakeup_feature() {
    let device = test_device();
    let mut data = [0u8; 512];
    let enable = out_request(RECIPIENT_DEVICE, SET_FEATURE, FEATURE_DEVICE_REMOTE_WAKEUP, 0);
    assert_eq!(handle(&device, &enable, &mut data).unwrap(), 0);
    assert!(device.remote_wakeup_enabled());
    let disable =
        out_request(RECIPIENT_DEVICE, CLEAR_FEATURE, FEATURE_DEVICE_REMOTE_WAKEUP, 0);
    assert_eq!(handle(&device, &disable, &mut data).unwrap(), 0);
    assert!(!device.remote_wakeup_enabled());

    // TEST_MODE and friends are not supported
    let other = out_request(RECIPIENT_DEVICE, SET_FEATURE, 2, 0);
    assert_eq!(
        handle(&device, &other, &mut data).err(),
        Some(UsbError::InvalidRequest)
    );
}

#[test]
fn set_address_masks_value() {
    let device = test_device();
    let mut data = [0u8; 512];
    let setup = out_request(RECIPIENT_DEVICE, SET_ADDRESS, 0x0185, 0);
    assert_eq!(handle(&device, &setup, &mut data).unwrap(), 0);
    assert_eq!(device.address(), 5);
}

#[test]
fn get_set_configuration() {
    let device = test_device();
    device.set_address(5).unwrap();
    let mut data = [0u8; 512];

    let get = in_request(RECIPIENT_DEVICE, GET_CONFIGURATION, 0, 0, 1);
    assert_eq!(handle(&device, &get, &mut data).unwrap(), 1);
    assert_eq!(data[0], 0);

    let set = out_request(RECIPIENT_DEVICE, SET_CONFIGURATION, 1, 0);
    assert_eq!(handle(&device, &set, &mut data).unwrap(), 0);
    assert_eq!(device.state(), DeviceState::Configured);
    assert_eq!(handle(&device, &get, &mut data).unwrap(), 1);
    assert_eq!(data[0], 1);

    let bad = out_request(RECIPIENT_DEVICE, SET_CONFIGURATION, 9, 0);
    assert_eq!(
        handle(&device, &bad, &mut data).err(),
        Some(UsbError::InvalidRequest)
    );
}

#[test]
fn interface_status_and_alternates() {
    let device = configured_device();
    let mut data = [0u8; 512];

    let status = in_request(RECIPIENT_INTERFACE, GET_STATUS, 0, 0, 2);
    assert_eq!(handle(&device, &status, &mut data).unwrap(), 2);
    assert_eq!(&data[..2], &[0, 0]);

    let get = in_request(RECIPIENT_INTERFACE, GET_INTERFACE, 0, 0, 1);
    assert_eq!(handle(&device, &get, &mut data).unwrap(), 1);
    assert_eq!(data[0], 0);

    let set = out_request(RECIPIENT_INTERFACE, SET_INTERFACE, 1, 0);
    assert_eq!(handle(&device, &set, &mut data).unwrap(), 0);
    assert_eq!(handle(&device, &get, &mut data).unwrap(), 1);
    assert_eq!(data[0], 1);

    let unknown = in_request(RECIPIENT_INTERFACE, GET_INTERFACE, 0, 4, 1);
    assert_eq!(
        handle(&device, &unknown, &mut data).err(),
        Some(UsbError::InvalidRequest)
    );
}

struct AlternateDriver {
    selected: AtomicU8,
}

impl ClassDriver for AlternateDriver {
    fn control(&self, _setup: &SetupPacket, _data: &mut [u8]) -> ControlReply {
        ControlReply::Ignored
    }

    fn set_alternate(&self, alternate: u8) {
        self.selected.store(alternate, Ordering::Relaxed);
    }
}

#[test]
fn set_interface_notifies_driver() {
    let device = configured_device();
    let driver = Arc::new(AlternateDriver {
        selected: AtomicU8::new(0xFF),
    });
    let handle_arc: Arc<dyn ClassDriver> = driver.clone();
    device
        .active_configuration()
        .unwrap()
        .interface(0)
        .unwrap()
        .bind_driver(&handle_arc);

    let mut data = [0u8; 512];
    let set = out_request(RECIPIENT_INTERFACE, SET_INTERFACE, 1, 0);
    handle(&device, &set, &mut data).unwrap();
    assert_eq!(driver.selected.load(Ordering::Relaxed), 1);
}

#[test]
fn endpoint_halt() {
    let device = configured_device();
    let mut data = [0u8; 512];

    let status = in_request(RECIPIENT_ENDPOINT, GET_STATUS, 0, 0x81, 2);
    assert_eq!(handle(&device, &status, &mut data).unwrap(), 2);
    assert_eq!(data[0], 0);

    let halt = out_request(RECIPIENT_ENDPOINT, SET_FEATURE, FEATURE_ENDPOINT_HALT, 0x81);
    assert_eq!(handle(&device, &halt, &mut data).unwrap(), 0);
    assert_eq!(handle(&device, &status, &mut data).unwrap(), 2);
    assert_eq!(data[0], 1);

    // clearing the halt also returns the toggle to DATA0
    let endpoint = device.endpoint(0x81).unwrap();
    endpoint.toggle_data();
    let clear =
        out_request(RECIPIENT_ENDPOINT, CLEAR_FEATURE, FEATURE_ENDPOINT_HALT, 0x81);
    assert_eq!(handle(&device, &clear, &mut data).unwrap(), 0);
    assert!(!device.endpoint(0x81).unwrap().is_halted());
    assert!(!device.endpoint(0x81).unwrap().data_toggle());

    let missing = in_request(RECIPIENT_ENDPOINT, GET_STATUS, 0, 0x87, 2);
    assert_eq!(
        handle(&device, &missing, &mut data).err(),
        Some(UsbError::InvalidEndpoint)
    );
}

#[test]
fn synch_frame_is_iso_only() {
    let device = configured_device();
    let mut data = [0u8; 512];

    let endpoint = device.endpoint(0x02).unwrap();
    endpoint.increment_frame();
    endpoint.increment_frame();

    let iso = in_request(RECIPIENT_ENDPOINT, SYNCH_FRAME, 0, 0x02, 2);
    assert_eq!(handle(&device, &iso, &mut data).unwrap(), 2);
    assert_eq!(u16::from_le_bytes([data[0], data[1]]), 2);

    let bulk = in_request(RECIPIENT_ENDPOINT, SYNCH_FRAME, 0, 0x81, 2);
    assert_eq!(
        handle(&device, &bulk, &mut data).err(),
        Some(UsbError::InvalidRequest)
    );
}

#[test]
fn non_standard_requests_fall_through() {
    let device = configured_device();
    let mut data = [0u8; 512];
    let setup = SetupPacket {
        bmRequestType: DEVICE_TO_HOST | CLASS_REQUEST | RECIPIENT_INTERFACE,
        bRequest: 0xFE,
        wValue: 0,
        wIndex: 0,
        wLength: 1,
    };
    assert_eq!(
        handle(&device, &setup, &mut data).err(),
        Some(UsbError::InvalidRequest)
    );
}

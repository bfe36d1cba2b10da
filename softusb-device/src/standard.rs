//! The USB Chapter 9 standard-request handler.

use crate::device::Device;
use crate::endpoint::Endpoint;
use crate::types::UsbError;
use crate::wire::{
    EndpointType, Recipient, RequestClass, SetupPacket, CLEAR_FEATURE,
    CONFIGURATION_DESCRIPTOR, DEVICE_DESCRIPTOR, FEATURE_DEVICE_REMOTE_WAKEUP,
    FEATURE_ENDPOINT_HALT, GET_CONFIGURATION, GET_DESCRIPTOR, GET_INTERFACE,
    GET_STATUS, SET_ADDRESS, SET_CONFIGURATION, SET_FEATURE, SET_INTERFACE,
    STRING_DESCRIPTOR, SYNCH_FRAME,
};

/// Handle a standard request against the device tree.
///
/// For IN requests the response is written to `data` and its full length
/// returned (the stack truncates to wLength); OUT requests take effect on
/// the tree and return 0. Non-standard requests fail with
/// `InvalidRequest` so the stack can try class dispatch next.
pub fn handle(
    device: &Device,
    setup: &SetupPacket,
    data: &mut [u8],
) -> Result<usize, UsbError> {
    if setup.request_class() != RequestClass::Standard {
        return Err(UsbError::InvalidRequest);
    }
    match setup.recipient() {
        Recipient::Device => device_request(device, setup, data),
        Recipient::Interface => interface_request(device, setup, data),
        Recipient::Endpoint => endpoint_request(device, setup, data),
        _ => Err(UsbError::InvalidRequest),
    }
}

fn device_request(
    device: &Device,
    setup: &SetupPacket,
    data: &mut [u8],
) -> Result<usize, UsbError> {
    match setup.bRequest {
        GET_STATUS => {
            if setup.wLength < 2 {
                return Err(UsbError::InvalidRequest);
            }
            let self_powered = device
                .active_configuration()
                .is_some_and(|c| c.is_self_powered());
            data[0] = u8::from(self_powered)
                | (u8::from(device.remote_wakeup_enabled()) << 1);
            data[1] = 0;
            Ok(2)
        }
        CLEAR_FEATURE | SET_FEATURE => {
            if setup.wValue != FEATURE_DEVICE_REMOTE_WAKEUP {
                return Err(UsbError::InvalidRequest);
            }
            device.set_remote_wakeup(setup.bRequest == SET_FEATURE);
            Ok(0)
        }
        SET_ADDRESS => {
            device.set_address((setup.wValue & 0x7F) as u8)?;
            Ok(0)
        }
        GET_DESCRIPTOR => {
            let index = (setup.wValue & 0xFF) as u8;
            match (setup.wValue >> 8) as u8 {
                DEVICE_DESCRIPTOR => {
                    match device.device_descriptor().encode(data) {
                        0 => Err(UsbError::BufferTooSmall),
                        n => Ok(n),
                    }
                }
                CONFIGURATION_DESCRIPTOR => device.encode_configuration(index, data),
                STRING_DESCRIPTOR => device.encode_string(index, data),
                _ => Err(UsbError::InvalidRequest),
            }
        }
        GET_CONFIGURATION => {
            data[0] = device.active_configuration_value();
            Ok(1)
        }
        SET_CONFIGURATION => {
            device.set_configuration((setup.wValue & 0xFF) as u8)?;
            Ok(0)
        }
        _ => Err(UsbError::InvalidRequest),
    }
}

fn interface_request(
    device: &Device,
    setup: &SetupPacket,
    data: &mut [u8],
) -> Result<usize, UsbError> {
    let number = (setup.wIndex & 0xFF) as u8;
    let configuration = device
        .active_configuration()
        .ok_or(UsbError::InvalidRequest)?;
    let interface = configuration
        .interface(number)
        .ok_or(UsbError::InvalidRequest)?;
    match setup.bRequest {
        GET_STATUS => {
            if setup.wLength < 2 {
                return Err(UsbError::InvalidRequest);
            }
            data[0] = 0;
            data[1] = 0;
            Ok(2)
        }
        GET_INTERFACE => {
            data[0] = interface.current_alternate();
            Ok(1)
        }
        SET_INTERFACE => {
            let alternate = (setup.wValue & 0xFF) as u8;
            configuration.select_alternate(number, alternate)?;
            if let Some(driver) = interface.driver() {
                driver.set_alternate(alternate);
            }
            Ok(0)
        }
        _ => Err(UsbError::InvalidRequest),
    }
}

fn endpoint_request(
    device: &Device,
    setup: &SetupPacket,
    data: &mut [u8],
) -> Result<usize, UsbError> {
    let address = (setup.wIndex & 0xFF) as u8;
    let endpoint: &Endpoint = device.endpoint(address)?;
    match setup.bRequest {
        GET_STATUS => {
            if setup.wLength < 2 {
                return Err(UsbError::InvalidRequest);
            }
            data[0] = u8::from(endpoint.is_halted());
            data[1] = 0;
            Ok(2)
        }
        CLEAR_FEATURE => {
            if setup.wValue != FEATURE_ENDPOINT_HALT {
                return Err(UsbError::InvalidRequest);
            }
            endpoint.set_halt(false);
            endpoint.reset_data_toggle();
            Ok(0)
        }
        SET_FEATURE => {
            if setup.wValue != FEATURE_ENDPOINT_HALT {
                return Err(UsbError::InvalidRequest);
            }
            endpoint.set_halt(true);
            Ok(0)
        }
        SYNCH_FRAME => {
            if endpoint.transfer_type() != EndpointType::Isochronous {
                return Err(UsbError::InvalidRequest);
            }
            data[..2].copy_from_slice(&endpoint.frame_number().to_le_bytes());
            Ok(2)
        }
        _ => Err(UsbError::InvalidRequest),
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/standard.rs"]
mod tests;

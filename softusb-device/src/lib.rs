#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

mod debug;

pub mod config;
pub mod device;
pub mod endpoint;
pub mod hal;
#[cfg(feature = "std")]
pub mod mocks;
pub mod stack;
pub mod standard;
pub mod transfer;
pub mod types;
pub mod wire;

pub use config::{
    ClassDriver, Configuration, ControlReply, Interface, InterfaceAssociation,
};
pub use device::{Device, DeviceBuilder};
pub use endpoint::{endpoint_index, Endpoint};
pub use hal::{EndpointConfig, Hal};
pub use stack::Stack;
pub use transfer::{Transfer, TransferStatus};
pub use types::{DeviceState, Speed, UsbError};
pub use wire::SetupPacket;

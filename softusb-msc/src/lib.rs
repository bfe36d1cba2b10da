//! USB Mass Storage Class, Bulk-Only Transport, for the softusb device
//! stack.
//!
//! The [`MscEngine`] reads 31-byte Command Block Wrappers from the
//! bulk-OUT endpoint, dispatches the SCSI command inside to a
//! [`Storage`](softusb_scsi::Storage) backend, drives the data phase,
//! and answers with a 13-byte Command Status Wrapper. [`MscClass`]
//! handles the two class control requests (Get Max LUN and Bulk-Only
//! Mass Storage Reset) on EP0.

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

mod debug;

pub mod engine;
pub mod wire;

pub use engine::{msc_interface, MscClass, MscEngine};
pub use wire::{
    CommandBlockWrapper, CommandStatusWrapper, CswStatus, DataDirection,
};

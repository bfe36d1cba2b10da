#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

/// Parsing command descriptor blocks into typed commands
pub mod command;
pub use command::ScsiCommand;

/// Fixed response layouts for the commands a block device answers
pub mod response;

/// The (key, ASC, ASCQ) sense model and its 18-byte fixed format
pub mod sense;
pub use sense::{SenseData, SenseKey};

/// The block-storage contract and its bundled backends
pub mod storage;
pub use storage::{MemoryStorage, Storage, StorageError};
#[cfg(feature = "std")]
pub use storage::FileStorage;

//! The block-storage contract and the two bundled backends.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::RwLock;

/// Errors a storage backend may report.
///
/// The transport engine translates these into sense data; they never
/// reach the USB wire as transport failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// The underlying medium failed
    Io,
    /// Writing to read-only storage, or ejecting fixed storage
    Permission,
    /// The access runs past the last block
    OutOfRange,
    /// No medium (it was ejected)
    NotPresent,
    /// The caller's buffer cannot hold the requested blocks
    BufferTooSmall,
}

/// A linear array of fixed-size blocks.
///
/// All calls are synchronous: the transport engine's only suspension
/// points are HAL calls, so backends must not block longer than a disk
/// access. Backends define their own mutual exclusion; the engine issues
/// one command at a time.
pub trait Storage: Send + Sync {
    fn block_size(&self) -> u32;

    fn block_count(&self) -> u64;

    /// Read `blocks` blocks starting at `lba` into `buf`, returning the
    /// number of blocks read.
    fn read(&self, lba: u64, blocks: u32, buf: &mut [u8]) -> Result<u32, StorageError>;

    /// Write `blocks` blocks starting at `lba` from `data`, returning
    /// the number of blocks written.
    fn write(&self, lba: u64, blocks: u32, data: &[u8]) -> Result<u32, StorageError>;

    /// Flush any cached writes to the medium.
    fn sync(&self) -> Result<(), StorageError>;

    fn is_read_only(&self) -> bool;

    fn is_removable(&self) -> bool;

    fn is_present(&self) -> bool;

    /// Eject the medium; `Permission` for fixed storage.
    fn eject(&self) -> Result<(), StorageError>;
}

/// RAM-backed storage, mostly for tests and demos.
///
/// Readers interleave freely; a writer is exclusive.
pub struct MemoryStorage {
    data: RwLock<Vec<u8>>,
    block_size: u32,
    read_only: AtomicBool,
    removable: AtomicBool,
    present: AtomicBool,
}

impl MemoryStorage {
    /// A zero-filled disk of `capacity` bytes, rounded down to a whole
    /// number of `block_size` blocks.
    pub fn new(capacity: usize, block_size: u32) -> Self {
        let blocks = capacity / block_size as usize;
        Self {
            data: RwLock::new(vec![0; blocks * block_size as usize]),
            block_size,
            read_only: AtomicBool::new(false),
            removable: AtomicBool::new(false),
            present: AtomicBool::new(true),
        }
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    pub fn set_removable(&self, removable: bool) {
        self.removable.store(removable, Ordering::Relaxed);
    }

    /// Re-insert an ejected medium.
    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::Relaxed);
    }

    fn check_range(
        &self,
        lba: u64,
        blocks: u32,
        available: usize,
    ) -> Result<(usize, usize), StorageError> {
        if !self.is_present() {
            return Err(StorageError::NotPresent);
        }
        let end = lba
            .checked_add(blocks as u64)
            .ok_or(StorageError::OutOfRange)?;
        if end > self.block_count() {
            return Err(StorageError::OutOfRange);
        }
        let bytes = blocks as usize * self.block_size as usize;
        if available < bytes {
            return Err(StorageError::BufferTooSmall);
        }
        Ok((lba as usize * self.block_size as usize, bytes))
    }
}

impl Storage for MemoryStorage {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        (self.data.read().len() / self.block_size as usize) as u64
    }

    fn read(&self, lba: u64, blocks: u32, buf: &mut [u8]) -> Result<u32, StorageError> {
        let (offset, bytes) = self.check_range(lba, blocks, buf.len())?;
        let data = self.data.read();
        buf[..bytes].copy_from_slice(&data[offset..offset + bytes]);
        Ok(blocks)
    }

    fn write(&self, lba: u64, blocks: u32, data: &[u8]) -> Result<u32, StorageError> {
        if self.is_read_only() {
            return Err(StorageError::Permission);
        }
        let (offset, bytes) = self.check_range(lba, blocks, data.len())?;
        let mut stored = self.data.write();
        stored[offset..offset + bytes].copy_from_slice(&data[..bytes]);
        Ok(blocks)
    }

    fn sync(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Relaxed)
    }

    fn is_removable(&self) -> bool {
        self.removable.load(Ordering::Relaxed)
    }

    fn is_present(&self) -> bool {
        self.present.load(Ordering::Relaxed)
    }

    fn eject(&self) -> Result<(), StorageError> {
        if !self.is_removable() {
            return Err(StorageError::Permission);
        }
        self.present.store(false, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(feature = "std")]
mod file {
    use super::{Storage, StorageError};
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::path::Path;
    use std::sync::Mutex;

    /// Storage backed by a regular file.
    ///
    /// The file length fixes the geometry: `block_count` is the length
    /// divided by the block size, with any tail fragment ignored. File
    /// storage is never removable and always present.
    pub struct FileStorage {
        file: Mutex<File>,
        block_size: u32,
        block_count: u64,
        read_only: bool,
    }

    impl FileStorage {
        /// Open `path` as a disk of `block_size`-byte blocks.
        pub fn open(
            path: impl AsRef<Path>,
            block_size: u32,
            read_only: bool,
        ) -> std::io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(!read_only)
                .open(path)?;
            let block_count = file.metadata()?.len() / block_size as u64;
            Ok(Self {
                file: Mutex::new(file),
                block_size,
                block_count,
                read_only,
            })
        }

        fn check_range(
            &self,
            lba: u64,
            blocks: u32,
            available: usize,
        ) -> Result<(u64, usize), StorageError> {
            let end = lba
                .checked_add(blocks as u64)
                .ok_or(StorageError::OutOfRange)?;
            if end > self.block_count {
                return Err(StorageError::OutOfRange);
            }
            let bytes = blocks as usize * self.block_size as usize;
            if available < bytes {
                return Err(StorageError::BufferTooSmall);
            }
            Ok((lba * self.block_size as u64, bytes))
        }
    }

    impl Storage for FileStorage {
        fn block_size(&self) -> u32 {
            self.block_size
        }

        fn block_count(&self) -> u64 {
            self.block_count
        }

        fn read(
            &self,
            lba: u64,
            blocks: u32,
            buf: &mut [u8],
        ) -> Result<u32, StorageError> {
            let (offset, bytes) = self.check_range(lba, blocks, buf.len())?;
            let mut file = self.file.lock().map_err(|_| StorageError::Io)?;
            file.seek(SeekFrom::Start(offset))
                .map_err(|_| StorageError::Io)?;
            file.read_exact(&mut buf[..bytes])
                .map_err(|_| StorageError::Io)?;
            Ok(blocks)
        }

        fn write(
            &self,
            lba: u64,
            blocks: u32,
            data: &[u8],
        ) -> Result<u32, StorageError> {
            if self.read_only {
                return Err(StorageError::Permission);
            }
            let (offset, bytes) = self.check_range(lba, blocks, data.len())?;
            let mut file = self.file.lock().map_err(|_| StorageError::Io)?;
            file.seek(SeekFrom::Start(offset))
                .map_err(|_| StorageError::Io)?;
            file.write_all(&data[..bytes]).map_err(|_| StorageError::Io)?;
            Ok(blocks)
        }

        fn sync(&self) -> Result<(), StorageError> {
            let file = self.file.lock().map_err(|_| StorageError::Io)?;
            file.sync_data().map_err(|_| StorageError::Io)
        }

        fn is_read_only(&self) -> bool {
            self.read_only
        }

        fn is_removable(&self) -> bool {
            false
        }

        fn is_present(&self) -> bool {
            true
        }

        fn eject(&self) -> Result<(), StorageError> {
            Err(StorageError::Permission)
        }
    }
}

#[cfg(feature = "std")]
pub use file::FileStorage;

#[cfg(all(test, feature = "std"))]
#[path = "tests/storage.rs"]
mod tests;

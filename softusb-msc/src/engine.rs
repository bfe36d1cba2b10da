//! The Bulk-Only Transport engine and its EP0 class handler.

use crate::debug;
use crate::wire::{
    CommandBlockWrapper, CommandStatusWrapper, CswStatus, CBW_SIZE,
};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use softusb_device::wire::{Direction, MASS_STORAGE_CLASSCODE};
use softusb_device::{
    ClassDriver, ControlReply, Endpoint, Hal, Interface, SetupPacket, Stack,
    UsbError,
};
use softusb_scsi::response::{
    FormatCapacityList, InquiryResponse, ModeSense6Header,
    ReadCapacity10Response, ReadCapacity16Response,
};
use softusb_scsi::sense::{asc, FIXED_SENSE_SIZE};
use softusb_scsi::{ScsiCommand, SenseData, SenseKey, Storage};
use spin::Mutex;

/// SCSI transparent command set
pub const SUBCLASS_SCSI: u8 = 0x06;
/// Bulk-Only Transport
pub const PROTOCOL_BULK_ONLY: u8 = 0x50;

// Class control requests (BOT s3.1, s3.2)
const BULK_ONLY_MASS_STORAGE_RESET: u8 = 0xFF;
const GET_MAX_LUN: u8 = 0xFE;

const MAX_LUN_LIMIT: u8 = 0x0F;

// one data phase fits here; larger transfers stream in chunks
const DATA_BUFFER_SIZE: usize = 64 * 1024;

struct Shared {
    max_lun: u8,
    sense: Mutex<SenseData>,
}

/// Build the standard MSC interface: class 0x08, SCSI transparent,
/// Bulk-Only Transport, one bulk-IN and one bulk-OUT endpoint.
pub fn msc_interface(
    number: u8,
    bulk_in: u8,
    bulk_out: u8,
    max_packet_size: u16,
) -> Result<Interface, UsbError> {
    let mut interface = Interface::new(
        number,
        MASS_STORAGE_CLASSCODE,
        SUBCLASS_SCSI,
        PROTOCOL_BULK_ONLY,
    );
    interface.add_endpoint(Endpoint::bulk(bulk_in, max_packet_size)?)?;
    interface.add_endpoint(Endpoint::bulk(bulk_out, max_packet_size)?)?;
    Ok(interface)
}

/// The EP0 side of the class: Get Max LUN and Bulk-Only Reset.
///
/// Bind an `Arc<MscClass>` to the MSC interface and hand the same
/// instance to [`MscEngine::new`]; the two share the sense latch.
pub struct MscClass {
    shared: Arc<Shared>,
}

impl MscClass {
    /// `max_lun` is the highest LUN index, 0..=15.
    pub fn new(max_lun: u8) -> Result<Self, UsbError> {
        if max_lun > MAX_LUN_LIMIT {
            return Err(UsbError::InvalidRequest);
        }
        Ok(Self {
            shared: Arc::new(Shared {
                max_lun,
                sense: Mutex::new(SenseData::NONE),
            }),
        })
    }

    pub fn max_lun(&self) -> u8 {
        self.shared.max_lun
    }
}

impl ClassDriver for MscClass {
    fn control(&self, setup: &SetupPacket, data: &mut [u8]) -> ControlReply {
        match setup.bRequest {
            GET_MAX_LUN if setup.direction() == Direction::In => {
                if data.is_empty() {
                    return ControlReply::Rejected;
                }
                data[0] = self.shared.max_lun;
                ControlReply::Accepted(1)
            }
            // the host follows this with CLEAR_FEATURE on both bulk
            // endpoints; our side only forgets latched sense
            BULK_ONLY_MASS_STORAGE_RESET if setup.direction() == Direction::Out => {
                *self.shared.sense.lock() = SenseData::NONE;
                ControlReply::Accepted(0)
            }
            _ => ControlReply::Ignored,
        }
    }
}

/// The CBW/CSW loop over a [`Storage`] backend.
pub struct MscEngine<'a, H: Hal, S: Storage> {
    stack: &'a Stack<H>,
    storage: S,
    shared: Arc<Shared>,
    bulk_in: u8,
    bulk_out: u8,
    vendor: String,
    product: String,
    revision: String,
    cbw_buf: [u8; CBW_SIZE],
    data_buf: Box<[u8]>,
}

impl<'a, H: Hal, S: Storage> MscEngine<'a, H, S> {
    pub fn new(
        stack: &'a Stack<H>,
        class: &MscClass,
        storage: S,
        bulk_in: u8,
        bulk_out: u8,
    ) -> Self {
        Self {
            stack,
            storage,
            shared: class.shared.clone(),
            bulk_in,
            bulk_out,
            vendor: String::from("softusb"),
            product: String::from("Virtual Disk"),
            revision: String::from("1.0"),
            cbw_buf: [0; CBW_SIZE],
            data_buf: vec![0; DATA_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    /// INQUIRY identity; vendor/product/revision are ASCII, padded (or
    /// truncated) to 8/16/4 characters on the wire.
    pub fn set_identity(&mut self, vendor: &str, product: &str, revision: &str) {
        self.vendor = String::from(vendor);
        self.product = String::from(product);
        self.revision = String::from(revision);
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Run the CBW/CSW loop until the stack shuts down.
    ///
    /// Per-command errors are reported to the host through sense data
    /// and a `Failed` CSW; they never terminate the loop. Malformed
    /// CBWs are logged and skipped (the host recovers with a reset).
    pub async fn run(&mut self) -> Result<(), UsbError> {
        loop {
            let received = match self.stack.read(self.bulk_out, &mut self.cbw_buf).await
            {
                Ok(received) => received,
                Err(UsbError::NotConfigured) => {
                    self.stack.device().wait_configured().await;
                    continue;
                }
                Err(UsbError::Cancelled) | Err(UsbError::Shutdown) => return Ok(()),
                Err(e) => {
                    debug::println!("msc: CBW read failed: {:?}", e);
                    continue;
                }
            };
            let Some(cbw) = CommandBlockWrapper::parse(&self.cbw_buf[..received])
            else {
                debug::println!("msc: bad CBW ({} bytes)", received);
                continue;
            };

            let (status, residue) = if cbw.lun > self.shared.max_lun {
                self.latch_sense(SenseKey::IllegalRequest, asc::INVALID_FIELD_IN_CDB);
                (CswStatus::Failed, cbw.data_transfer_length)
            } else {
                match self.dispatch(&cbw).await {
                    Ok(outcome) => outcome,
                    Err(UsbError::Cancelled) | Err(UsbError::Shutdown) => {
                        return Ok(())
                    }
                    Err(e) => {
                        debug::println!("msc: data phase failed: {:?}", e);
                        (CswStatus::PhaseError, cbw.data_transfer_length)
                    }
                }
            };

            match self.send_csw(cbw.tag, residue, status).await {
                Ok(()) => {}
                Err(UsbError::Cancelled) | Err(UsbError::Shutdown) => return Ok(()),
                Err(e) => debug::println!("msc: CSW write failed: {:?}", e),
            }
        }
    }

    async fn dispatch(
        &mut self,
        cbw: &CommandBlockWrapper,
    ) -> Result<(CswStatus, u32), UsbError> {
        match ScsiCommand::parse(cbw.command_block()) {
            ScsiCommand::TestUnitReady => Ok(self.test_unit_ready(cbw)),
            ScsiCommand::RequestSense { alloc_len } => {
                self.request_sense(cbw, alloc_len).await
            }
            ScsiCommand::Inquiry { alloc_len, .. } => {
                let inquiry = InquiryResponse::new(
                    &self.vendor,
                    &self.product,
                    &self.revision,
                    self.storage.is_removable(),
                );
                self.respond(cbw, inquiry.as_bytes(), alloc_len as usize).await
            }
            ScsiCommand::ModeSense6 { alloc_len } => {
                let header = ModeSense6Header::new(self.storage.is_read_only());
                self.respond(cbw, header.as_bytes(), alloc_len as usize).await
            }
            ScsiCommand::StartStopUnit { start, load_eject } => {
                Ok(self.start_stop_unit(cbw, start, load_eject))
            }
            ScsiCommand::PreventAllowRemoval { .. } => {
                Ok((CswStatus::Good, cbw.data_transfer_length))
            }
            ScsiCommand::ReadFormatCapacities { alloc_len } => {
                let list = FormatCapacityList::new(
                    self.storage.block_count(),
                    self.storage.block_size(),
                );
                self.respond(cbw, list.as_bytes(), alloc_len as usize).await
            }
            ScsiCommand::ReadCapacity10 => {
                let last_lba = self
                    .storage
                    .block_count()
                    .saturating_sub(1)
                    .min(u32::MAX as u64) as u32;
                let reply =
                    ReadCapacity10Response::new(last_lba, self.storage.block_size());
                self.respond(cbw, reply.as_bytes(), reply.as_bytes().len()).await
            }
            ScsiCommand::ReadCapacity16 { alloc_len } => {
                let reply = ReadCapacity16Response::new(
                    self.storage.block_count().saturating_sub(1),
                    self.storage.block_size(),
                );
                self.respond(cbw, reply.as_bytes(), alloc_len as usize).await
            }
            ScsiCommand::Read10 { lba, blocks } => self.read10(cbw, lba, blocks).await,
            ScsiCommand::Write10 { lba, blocks } => {
                self.write10(cbw, lba, blocks).await
            }
            ScsiCommand::Verify10 => Ok((CswStatus::Good, cbw.data_transfer_length)),
            ScsiCommand::SynchronizeCache10 => Ok(self.synchronize_cache(cbw)),
            ScsiCommand::Unknown { opcode } => {
                debug::println!("msc: unsupported opcode {:#x}", opcode);
                self.latch_sense(
                    SenseKey::IllegalRequest,
                    asc::INVALID_COMMAND_OPERATION_CODE,
                );
                Ok((CswStatus::Failed, cbw.data_transfer_length))
            }
            // ScsiCommand is non_exhaustive; anything the parser learns
            // before this engine does is unsupported here
            _ => {
                self.latch_sense(
                    SenseKey::IllegalRequest,
                    asc::INVALID_COMMAND_OPERATION_CODE,
                );
                Ok((CswStatus::Failed, cbw.data_transfer_length))
            }
        }
    }

    fn test_unit_ready(&self, cbw: &CommandBlockWrapper) -> (CswStatus, u32) {
        if self.storage.is_present() {
            (CswStatus::Good, cbw.data_transfer_length)
        } else {
            self.latch_sense(SenseKey::NotReady, asc::MEDIUM_NOT_PRESENT);
            (CswStatus::Failed, cbw.data_transfer_length)
        }
    }

    async fn request_sense(
        &mut self,
        cbw: &CommandBlockWrapper,
        alloc_len: u8,
    ) -> Result<(CswStatus, u32), UsbError> {
        let sense = *self.shared.sense.lock();
        let mut bytes = [0u8; FIXED_SENSE_SIZE];
        sense.encode(&mut bytes);
        let outcome = self.respond(cbw, &bytes, alloc_len as usize).await?;
        // a delivered response clears the latch
        *self.shared.sense.lock() = SenseData::NONE;
        Ok(outcome)
    }

    fn start_stop_unit(
        &self,
        cbw: &CommandBlockWrapper,
        start: bool,
        load_eject: bool,
    ) -> (CswStatus, u32) {
        if load_eject && !start && self.storage.is_removable() {
            if self.storage.eject().is_err() {
                self.latch_sense(SenseKey::IllegalRequest, asc::INVALID_FIELD_IN_CDB);
                return (CswStatus::Failed, cbw.data_transfer_length);
            }
        }
        // a load request (start with eject) is accepted without action
        (CswStatus::Good, cbw.data_transfer_length)
    }

    fn synchronize_cache(&self, cbw: &CommandBlockWrapper) -> (CswStatus, u32) {
        if self.storage.sync().is_err() {
            self.latch_sense(SenseKey::MediumError, asc::SYNCHRONIZATION_ERROR);
            return (CswStatus::Failed, cbw.data_transfer_length);
        }
        (CswStatus::Good, cbw.data_transfer_length)
    }

    async fn read10(
        &mut self,
        cbw: &CommandBlockWrapper,
        lba: u32,
        blocks: u16,
    ) -> Result<(CswStatus, u32), UsbError> {
        let transfer_length = cbw.data_transfer_length;
        if blocks == 0 {
            return Ok((CswStatus::Good, 0));
        }
        if !self.storage.is_present() {
            self.latch_sense(SenseKey::NotReady, asc::MEDIUM_NOT_PRESENT);
            return Ok((CswStatus::Failed, transfer_length));
        }
        let Some(chunk_blocks) = self.chunk_blocks() else {
            self.latch_sense(SenseKey::IllegalRequest, asc::INVALID_FIELD_IN_CDB);
            return Ok((CswStatus::Failed, transfer_length));
        };
        if lba as u64 + blocks as u64 > self.storage.block_count() {
            self.latch_sense(SenseKey::IllegalRequest, asc::LBA_OUT_OF_RANGE);
            return Ok((CswStatus::Failed, transfer_length));
        }

        let block_size = self.storage.block_size() as usize;
        let mut lba = lba as u64;
        let mut remaining = blocks as u32;
        let mut moved = 0u32;
        while remaining > 0 {
            let this = remaining.min(chunk_blocks);
            let bytes = this as usize * block_size;
            if self
                .storage
                .read(lba, this, &mut self.data_buf[..bytes])
                .is_err()
            {
                self.latch_sense(SenseKey::MediumError, asc::UNRECOVERED_READ_ERROR);
                return Ok((CswStatus::Failed, transfer_length - moved));
            }
            let to_send = bytes.min((transfer_length - moved) as usize);
            if to_send == 0 {
                break;
            }
            let sent = self.stack.write(self.bulk_in, &self.data_buf[..to_send]).await?;
            moved += sent as u32;
            lba += this as u64;
            remaining -= this;
        }
        Ok((CswStatus::Good, transfer_length - moved))
    }

    async fn write10(
        &mut self,
        cbw: &CommandBlockWrapper,
        lba: u32,
        blocks: u16,
    ) -> Result<(CswStatus, u32), UsbError> {
        let transfer_length = cbw.data_transfer_length;
        if blocks == 0 {
            return Ok((CswStatus::Good, 0));
        }
        if !self.storage.is_present() {
            self.latch_sense(SenseKey::NotReady, asc::MEDIUM_NOT_PRESENT);
            return Ok((CswStatus::Failed, transfer_length));
        }
        // refuse before accepting any data
        if self.storage.is_read_only() {
            self.latch_sense(SenseKey::DataProtect, asc::WRITE_PROTECTED);
            return Ok((CswStatus::Failed, transfer_length));
        }
        let Some(chunk_blocks) = self.chunk_blocks() else {
            self.latch_sense(SenseKey::IllegalRequest, asc::INVALID_FIELD_IN_CDB);
            return Ok((CswStatus::Failed, transfer_length));
        };
        if lba as u64 + blocks as u64 > self.storage.block_count() {
            self.latch_sense(SenseKey::IllegalRequest, asc::LBA_OUT_OF_RANGE);
            return Ok((CswStatus::Failed, transfer_length));
        }

        let block_size = self.storage.block_size() as usize;
        let mut lba = lba as u64;
        let mut remaining = blocks as u32;
        let mut moved = 0u32;
        while remaining > 0 {
            let this = remaining.min(chunk_blocks);
            let bytes = this as usize * block_size;
            let received =
                self.stack.read(self.bulk_out, &mut self.data_buf[..bytes]).await?;
            moved += received as u32;
            if self
                .storage
                .write(lba, this, &self.data_buf[..bytes])
                .is_err()
            {
                self.latch_sense(SenseKey::MediumError, asc::WRITE_ERROR);
                return Ok((CswStatus::Failed, transfer_length - moved));
            }
            lba += this as u64;
            remaining -= this;
        }
        Ok((CswStatus::Good, transfer_length - moved))
    }

    /// Whole blocks that fit the scratch buffer; `None` if even one
    /// block does not.
    fn chunk_blocks(&self) -> Option<u32> {
        let block_size = self.storage.block_size() as usize;
        if block_size == 0 || block_size > DATA_BUFFER_SIZE {
            return None;
        }
        Some((DATA_BUFFER_SIZE / block_size) as u32)
    }

    /// Send an IN response, capped by the allocation length and the
    /// CBW's transfer length; the residue is against the latter.
    async fn respond(
        &self,
        cbw: &CommandBlockWrapper,
        bytes: &[u8],
        alloc_len: usize,
    ) -> Result<(CswStatus, u32), UsbError> {
        let limit = bytes
            .len()
            .min(alloc_len)
            .min(cbw.data_transfer_length as usize);
        if limit > 0 {
            self.stack.write(self.bulk_in, &bytes[..limit]).await?;
        }
        Ok((CswStatus::Good, cbw.data_transfer_length - limit as u32))
    }

    async fn send_csw(
        &self,
        tag: u32,
        data_residue: u32,
        status: CswStatus,
    ) -> Result<(), UsbError> {
        let csw = CommandStatusWrapper {
            tag,
            data_residue,
            status,
        };
        self.stack.write(self.bulk_in, &csw.to_bytes()).await?;
        Ok(())
    }

    fn latch_sense(&self, key: SenseKey, asc: u8) {
        *self.shared.sense.lock() = SenseData::new(key, asc, 0);
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/engine.rs"]
mod tests;

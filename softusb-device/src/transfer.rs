//! One in-flight request on a data endpoint (or EP0).

use crate::types::UsbError;
use crate::wire::{EndpointType, SetupPacket};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll};
use futures::task::AtomicWaker;
use spin::Mutex;

/// Most per-packet descriptors an isochronous transfer may carry.
pub const MAX_ISO_PACKETS: usize = 256;

/// Outcome of a transfer.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Not yet completed
    Pending,
    Success,
    Stall,
    Nak,
    Timeout,
    Cancelled,
    Overrun,
    Underrun,
    /// Any transport error without a more specific status
    Error,
}

impl From<UsbError> for TransferStatus {
    fn from(error: UsbError) -> Self {
        match error {
            UsbError::Stall => TransferStatus::Stall,
            UsbError::Nak => TransferStatus::Nak,
            UsbError::Timeout => TransferStatus::Timeout,
            UsbError::Cancelled => TransferStatus::Cancelled,
            UsbError::Overrun => TransferStatus::Overrun,
            UsbError::Underrun => TransferStatus::Underrun,
            _ => TransferStatus::Error,
        }
    }
}

/// One packet of an isochronous transfer.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub struct IsoPacket {
    /// Offset of this packet's slice within the transfer buffer.
    pub offset: u32,
    /// Bytes reserved for this packet.
    pub length: u32,
    /// Bytes actually moved.
    pub actual: u32,
    pub status: TransferStatus,
}

type CompletionFn = Box<dyn FnOnce(&Transfer) + Send>;

struct TransferState {
    status: TransferStatus,
    actual_length: usize,
    error: Option<UsbError>,
    buffer: Option<Vec<u8>>,
    callback: Option<CompletionFn>,
}

/// A transfer on a bulk, interrupt, isochronous, or control endpoint.
///
/// The buffer is moved in at construction and recovered with
/// [`take_buffer`](Transfer::take_buffer) after completion, so no data is
/// copied. Completion and cancellation are both idempotent: whichever
/// happens first decides the final status, and the completion callback
/// runs exactly once.
pub struct Transfer {
    endpoint: u8,
    kind: EndpointType,
    setup: Option<SetupPacket>,
    expected: usize,
    cancelled: AtomicBool,
    completed: AtomicBool,
    waker: AtomicWaker,
    state: Mutex<TransferState>,
    iso: Option<Mutex<Box<[IsoPacket]>>>,
}

impl Transfer {
    fn new(
        endpoint: u8,
        kind: EndpointType,
        setup: Option<SetupPacket>,
        buffer: Vec<u8>,
        iso: Option<Box<[IsoPacket]>>,
    ) -> Self {
        Self {
            endpoint,
            kind,
            setup,
            expected: buffer.len(),
            cancelled: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            waker: AtomicWaker::new(),
            state: Mutex::new(TransferState {
                status: TransferStatus::Pending,
                actual_length: 0,
                error: None,
                buffer: Some(buffer),
                callback: None,
            }),
            iso: iso.map(Mutex::new),
        }
    }

    pub fn bulk(endpoint: u8, buffer: Vec<u8>) -> Self {
        Self::new(endpoint, EndpointType::Bulk, None, buffer, None)
    }

    pub fn interrupt(endpoint: u8, buffer: Vec<u8>) -> Self {
        Self::new(endpoint, EndpointType::Interrupt, None, buffer, None)
    }

    pub fn control(setup: SetupPacket, buffer: Vec<u8>) -> Self {
        Self::new(0, EndpointType::Control, Some(setup), buffer, None)
    }

    /// An isochronous transfer with one `(offset, length)` slice of the
    /// buffer per packet; at most [`MAX_ISO_PACKETS`] packets.
    pub fn isochronous(
        endpoint: u8,
        buffer: Vec<u8>,
        packets: &[(u32, u32)],
    ) -> Result<Self, UsbError> {
        if packets.len() > MAX_ISO_PACKETS {
            return Err(UsbError::NoMemory);
        }
        let table: Box<[IsoPacket]> = packets
            .iter()
            .map(|&(offset, length)| IsoPacket {
                offset,
                length,
                actual: 0,
                status: TransferStatus::Pending,
            })
            .collect();
        Ok(Self::new(
            endpoint,
            EndpointType::Isochronous,
            None,
            buffer,
            Some(table),
        ))
    }

    pub fn endpoint_address(&self) -> u8 {
        self.endpoint
    }

    pub fn kind(&self) -> EndpointType {
        self.kind
    }

    pub fn setup(&self) -> Option<&SetupPacket> {
        self.setup.as_ref()
    }

    pub fn expected_length(&self) -> usize {
        self.expected
    }

    pub fn status(&self) -> TransferStatus {
        self.state.lock().status
    }

    pub fn actual_length(&self) -> usize {
        self.state.lock().actual_length
    }

    pub fn error(&self) -> Option<UsbError> {
        self.state.lock().error
    }

    /// Register a completion callback. Must be called before the
    /// transfer is submitted.
    pub fn on_complete(&self, callback: impl FnOnce(&Transfer) + Send + 'static) {
        self.state.lock().callback = Some(Box::new(callback));
    }

    /// Recover the buffer. Returns `None` while the transfer still owns
    /// it (i.e. until the executing task has settled).
    pub fn take_buffer(&self) -> Option<Vec<u8>> {
        self.state.lock().buffer.take()
    }

    pub(crate) fn restore_buffer(&self, buffer: Vec<u8>) {
        self.state.lock().buffer = Some(buffer);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Record the outcome. The first call wins; later calls (including a
    /// racing `cancel`) are no-ops. Runs the callback outside the state
    /// lock.
    pub fn complete(
        &self,
        status: TransferStatus,
        actual_length: usize,
        error: Option<UsbError>,
    ) {
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        let callback = {
            let mut state = self.state.lock();
            state.status = status;
            state.actual_length = actual_length;
            state.error = error;
            state.callback.take()
        };
        self.waker.wake();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Request cancellation and, if the transfer has not already
    /// completed, complete it with status `Cancelled`. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.waker.wake();
        self.complete(TransferStatus::Cancelled, 0, Some(UsbError::Cancelled));
    }

    /// Resolves once `cancel` has been called.
    pub fn cancelled_future(&self) -> CancelledFuture<'_> {
        CancelledFuture { transfer: self }
    }

    pub fn iso_packet_count(&self) -> usize {
        self.iso.as_ref().map_or(0, |table| table.lock().len())
    }

    pub fn iso_packet(&self, index: usize) -> Option<IsoPacket> {
        self.iso.as_ref()?.lock().get(index).copied()
    }

    pub(crate) fn set_iso_result(
        &self,
        index: usize,
        actual: u32,
        status: TransferStatus,
    ) {
        if let Some(table) = &self.iso {
            if let Some(packet) = table.lock().get_mut(index) {
                packet.actual = actual;
                packet.status = status;
            }
        }
    }
}

/// Future returned by [`Transfer::cancelled_future`].
pub struct CancelledFuture<'a> {
    transfer: &'a Transfer,
}

impl Future for CancelledFuture<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.transfer.waker.register(cx.waker());
        if self.transfer.is_cancelled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/transfer.rs"]
mod tests;

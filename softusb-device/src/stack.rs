//! The control loop: SETUP dispatch, control-transfer phases, and
//! data-endpoint transfer scheduling.

use crate::debug;
use crate::device::Device;
use crate::endpoint::endpoint_index;
use crate::hal::{EndpointConfig, Hal};
use crate::standard;
use crate::transfer::{Transfer, TransferStatus};
use crate::types::{DeviceState, UsbError};
use crate::wire::{
    Direction, Recipient, RequestClass, SetupPacket, ENDPOINT_DIRECTION_MASK,
    SET_ADDRESS, SET_CONFIGURATION,
};
use crate::ControlReply;
use alloc::sync::Arc;
use core::future::Future;
use core::pin::pin;
use futures::future::{select, Either};
use spin::Mutex;

/// Longest OUT control-transfer payload the stack will accept.
pub const MAX_CONTROL_DATA_SIZE: usize = 512;

// IN responses are built here before truncation to wLength; big enough
// for the largest configuration the tree can hold (8 interfaces of 16
// endpoints plus 4 associations)
const EP0_SCRATCH_SIZE: usize = 1024;

/// Transfers that may be queued per endpoint address.
pub const MAX_PENDING_TRANSFERS: usize = 8;

// one slot per endpoint index (16 OUT + 16 IN)
const PENDING_SLOTS: usize = 32;

type PendingSlot = [Option<Arc<Transfer>>; MAX_PENDING_TRANSFERS];

/// The stack: owns the HAL and drives the device's control traffic.
///
/// [`run`](Stack::run) is the control loop; [`read`](Stack::read),
/// [`write`](Stack::write) and [`submit_transfer`](Stack::submit_transfer)
/// are the data-endpoint paths. The futures this type returns are
/// executor-agnostic; an application typically spawns `run` alongside its
/// class-engine loops.
pub struct Stack<H: Hal> {
    hal: H,
    device: Arc<Device>,
    pending: Mutex<[PendingSlot; PENDING_SLOTS]>,
}

impl<H: Hal> Stack<H> {
    pub fn new(hal: H, device: Arc<Device>) -> Self {
        Self {
            hal,
            device,
            pending: Mutex::new(core::array::from_fn(|_| {
                core::array::from_fn(|_| None)
            })),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Run the control loop until the HAL shuts down or the loop is
    /// cancelled.
    ///
    /// Per-request failures stall EP0 and the loop continues; a bus reset
    /// resets the device state machine and the loop continues. On exit,
    /// every pending data-endpoint transfer is cancelled and the HAL is
    /// stopped.
    pub async fn run(&self) -> Result<(), UsbError> {
        self.hal.init()?;
        self.hal.start()?;
        self.device.set_speed(self.hal.speed());
        let mut setup_bytes = [0u8; 8];
        let mut data = [0u8; EP0_SCRATCH_SIZE];
        let result = loop {
            match self.hal.read_setup(&mut setup_bytes).await {
                Ok(()) => {}
                Err(UsbError::Reset) => {
                    self.device.bus_reset();
                    continue;
                }
                Err(UsbError::Cancelled) | Err(UsbError::Shutdown) => break Ok(()),
                Err(e) => {
                    debug::println!("usb: read_setup failed: {:?}", e);
                    continue;
                }
            }
            let setup = match SetupPacket::parse(&setup_bytes) {
                Ok(setup) => setup,
                Err(_) => continue,
            };
            match self.control_request(&setup, &mut data).await {
                Ok(()) => {}
                Err(UsbError::Cancelled) | Err(UsbError::Shutdown) => break Ok(()),
                Err(_) => {
                    // Universal failure response; no retries on EP0
                    let _ = self.hal.stall_ep0();
                }
            }
        };
        self.cancel_all_transfers();
        self.hal.stop()?;
        result
    }

    async fn control_request(
        &self,
        setup: &SetupPacket,
        data: &mut [u8],
    ) -> Result<(), UsbError> {
        let length = match setup.request_class() {
            RequestClass::Standard => standard::handle(&self.device, setup, data)?,
            RequestClass::Class if setup.recipient() == Recipient::Interface => {
                self.class_request(setup, data).await?
            }
            _ => return Err(UsbError::InvalidRequest),
        };
        if setup.direction() == Direction::In {
            let length = length.min(setup.wLength as usize);
            if length > 0 {
                self.hal.write_ep0(&data[..length]).await?;
            }
            // zero-length OUT status phase
            self.hal.read_ep0(&mut []).await?;
        } else {
            self.hal.ack_ep0().await?;
            self.after_status(setup)?;
        }
        Ok(())
    }

    async fn class_request(
        &self,
        setup: &SetupPacket,
        data: &mut [u8],
    ) -> Result<usize, UsbError> {
        let driver = {
            let number = (setup.wIndex & 0xFF) as u8;
            self.device
                .active_configuration()
                .and_then(|configuration| configuration.interface(number))
                .and_then(|interface| interface.driver())
                .ok_or(UsbError::InvalidRequest)?
        };
        let reply = if setup.direction() == Direction::Out {
            let length = (setup.wLength as usize).min(MAX_CONTROL_DATA_SIZE);
            let received = if length > 0 {
                self.hal.read_ep0(&mut data[..length]).await?
            } else {
                0
            };
            driver.control(setup, &mut data[..received])
        } else {
            driver.control(setup, data)
        };
        match reply {
            ControlReply::Accepted(length) => Ok(length),
            ControlReply::Ignored | ControlReply::Rejected => {
                Err(UsbError::InvalidRequest)
            }
        }
    }

    /// HAL side effects that must wait for the status phase.
    fn after_status(&self, setup: &SetupPacket) -> Result<(), UsbError> {
        if setup.request_class() != RequestClass::Standard
            || setup.recipient() != Recipient::Device
        {
            return Ok(());
        }
        match setup.bRequest {
            SET_ADDRESS => self.hal.set_address(self.device.address()),
            SET_CONFIGURATION => {
                let mut endpoints = [EndpointConfig {
                    address: 0,
                    attributes: 0,
                    max_packet_size: 0,
                    interval: 0,
                }; PENDING_SLOTS];
                let mut count = 0;
                if let Some(configuration) = self.device.active_configuration() {
                    for interface in configuration.interfaces() {
                        for endpoint in interface.endpoints() {
                            if count == endpoints.len() {
                                break;
                            }
                            endpoints[count] = EndpointConfig {
                                address: endpoint.address(),
                                attributes: endpoint.attributes(),
                                max_packet_size: endpoint.max_packet_size(),
                                interval: endpoint.interval(),
                            };
                            count += 1;
                        }
                    }
                }
                self.hal.configure_endpoints(&endpoints[..count])
            }
            _ => Ok(()),
        }
    }

    /// Cancel in-flight transfers whenever the cable goes away.
    ///
    /// Runs alongside [`run`](Stack::run); returns once the HAL shuts
    /// down.
    pub async fn watch_disconnect(&self) -> Result<(), UsbError> {
        loop {
            match self.hal.wait_disconnect().await {
                Ok(()) => {}
                Err(UsbError::Cancelled) | Err(UsbError::Shutdown) => return Ok(()),
                Err(e) => return Err(e),
            }
            self.cancel_all_transfers();
            match self.hal.wait_connect().await {
                Ok(()) => {}
                Err(UsbError::Cancelled) | Err(UsbError::Shutdown) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Blocking read from an OUT data endpoint.
    pub async fn read(&self, endpoint: u8, buf: &mut [u8]) -> Result<usize, UsbError> {
        if self.device.state() != DeviceState::Configured {
            return Err(UsbError::NotConfigured);
        }
        self.hal.read(endpoint, buf).await
    }

    /// Blocking write to an IN data endpoint.
    pub async fn write(&self, endpoint: u8, data: &[u8]) -> Result<usize, UsbError> {
        if self.device.state() != DeviceState::Configured {
            return Err(UsbError::NotConfigured);
        }
        self.hal.write(endpoint, data).await
    }

    /// Queue a transfer and hand back its execution future.
    ///
    /// The transfer enters the per-endpoint pending set immediately (at
    /// most [`MAX_PENDING_TRANSFERS`] each, else `NoResources`); the
    /// returned future performs the I/O and must be spawned (or polled
    /// to completion) by the caller. Submission order is execution
    /// order only if the caller drives the futures that way; there is no
    /// cross-endpoint ordering.
    pub fn submit_transfer(
        &self,
        transfer: Arc<Transfer>,
    ) -> Result<impl Future<Output = ()> + '_, UsbError> {
        let index = endpoint_index(transfer.endpoint_address())
            .ok_or(UsbError::InvalidEndpoint)?;
        {
            let mut pending = self.pending.lock();
            let slot = pending[index]
                .iter_mut()
                .find(|slot| slot.is_none())
                .ok_or(UsbError::NoResources)?;
            *slot = Some(transfer.clone());
        }
        Ok(async move { self.execute_transfer(index, transfer).await })
    }

    /// How many transfers are pending on an endpoint.
    pub fn pending_transfers(&self, endpoint: u8) -> usize {
        match endpoint_index(endpoint) {
            Some(index) => self.pending.lock()[index]
                .iter()
                .filter(|slot| slot.is_some())
                .count(),
            None => 0,
        }
    }

    /// Cancel every pending transfer on an endpoint.
    ///
    /// The pending set is drained under the lock; the cancellations (and
    /// therefore the completion callbacks) run outside it.
    pub fn cancel_transfers(&self, endpoint: u8) {
        let Some(index) = endpoint_index(endpoint) else {
            return;
        };
        let drained: PendingSlot = {
            let mut pending = self.pending.lock();
            core::mem::replace(&mut pending[index], core::array::from_fn(|_| None))
        };
        for transfer in drained.into_iter().flatten() {
            transfer.cancel();
        }
    }

    fn cancel_all_transfers(&self) {
        for number in 0..16u8 {
            self.cancel_transfers(number);
            self.cancel_transfers(number | ENDPOINT_DIRECTION_MASK);
        }
    }

    async fn execute_transfer(&self, index: usize, transfer: Arc<Transfer>) {
        let result = self.perform(&transfer).await;
        self.remove_pending(index, &transfer);
        match result {
            Ok(actual) => {
                if let Ok(endpoint) =
                    self.device.endpoint(transfer.endpoint_address())
                {
                    endpoint.toggle_data();
                }
                transfer.complete(TransferStatus::Success, actual, None);
            }
            Err(e) => transfer.complete(TransferStatus::from(e), 0, Some(e)),
        }
    }

    async fn perform(&self, transfer: &Transfer) -> Result<usize, UsbError> {
        if transfer.is_cancelled() {
            return Err(UsbError::Cancelled);
        }
        let mut buf = transfer.take_buffer().ok_or(UsbError::Busy)?;
        let address = transfer.endpoint_address();
        let result = if transfer.iso_packet_count() > 0 {
            self.perform_iso(transfer, &mut buf).await
        } else if (address & ENDPOINT_DIRECTION_MASK) != 0 {
            self.race_cancel(transfer, self.hal.write(address, &buf)).await
        } else {
            self.race_cancel(transfer, self.hal.read(address, &mut buf)).await
        };
        transfer.restore_buffer(buf);
        result
    }

    async fn perform_iso(
        &self,
        transfer: &Transfer,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        let address = transfer.endpoint_address();
        let mut total = 0;
        for index in 0..transfer.iso_packet_count() {
            if transfer.is_cancelled() {
                return Err(UsbError::Cancelled);
            }
            let Some(packet) = transfer.iso_packet(index) else {
                break;
            };
            let start = (packet.offset as usize).min(buf.len());
            let end = (start + packet.length as usize).min(buf.len());
            let result = if (address & ENDPOINT_DIRECTION_MASK) != 0 {
                self.race_cancel(transfer, self.hal.write(address, &buf[start..end]))
                    .await
            } else {
                self.race_cancel(
                    transfer,
                    self.hal.read(address, &mut buf[start..end]),
                )
                .await
            };
            match result {
                Ok(actual) => {
                    transfer.set_iso_result(index, actual as u32, TransferStatus::Success);
                    total += actual;
                    if let Ok(endpoint) = self.device.endpoint(address) {
                        endpoint.increment_frame();
                    }
                }
                Err(UsbError::Cancelled) => return Err(UsbError::Cancelled),
                Err(e) => transfer.set_iso_result(index, 0, TransferStatus::from(e)),
            }
        }
        Ok(total)
    }

    async fn race_cancel<F>(
        &self,
        transfer: &Transfer,
        io: F,
    ) -> Result<usize, UsbError>
    where
        F: Future<Output = Result<usize, UsbError>>,
    {
        let io = pin!(io);
        let cancelled = pin!(transfer.cancelled_future());
        match select(io, cancelled).await {
            Either::Left((result, _)) => result,
            Either::Right(_) => Err(UsbError::Cancelled),
        }
    }

    fn remove_pending(&self, index: usize, transfer: &Arc<Transfer>) {
        let mut pending = self.pending.lock();
        for slot in pending[index].iter_mut() {
            if slot
                .as_ref()
                .is_some_and(|queued| Arc::ptr_eq(queued, transfer))
            {
                *slot = None;
            }
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/stack.rs"]
mod tests;

//! The seam between the stack and the USB controller hardware.

use crate::types::{Speed, UsbError};
use core::future::Future;

/// What the HAL needs to know to arm one endpoint.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

/// A USB device controller.
///
/// Implementations own the controller registers and endpoint FIFOs; the
/// stack owns everything above them. Every potentially-blocking call is
/// an `async` method, and all of them resolve with `Err(Cancelled)` when
/// the operation is abandoned and `Err(Shutdown)` once [`stop`](Hal::stop)
/// has been called. `read_setup` additionally resolves with `Err(Reset)`
/// when a bus reset is seen, which the stack turns into a state-machine
/// reset rather than a failure.
pub trait Hal {
    fn init(&self) -> Result<(), UsbError>;

    fn start(&self) -> Result<(), UsbError>;

    fn stop(&self) -> Result<(), UsbError>;

    /// Latch the bus address (called after the SET_ADDRESS status phase).
    fn set_address(&self, address: u8) -> Result<(), UsbError>;

    /// Arm the data endpoints of the newly-active configuration; an
    /// empty slice disarms everything but EP0.
    fn configure_endpoints(&self, endpoints: &[EndpointConfig]) -> Result<(), UsbError>;

    /// Block until the next SETUP packet arrives.
    fn read_setup(
        &self,
        setup: &mut [u8; 8],
    ) -> impl Future<Output = Result<(), UsbError>>;

    /// Send an IN data phase on EP0.
    fn write_ep0(&self, data: &[u8]) -> impl Future<Output = Result<(), UsbError>>;

    /// Receive an OUT data phase on EP0 (an empty buffer reads the
    /// zero-length status packet).
    fn read_ep0(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize, UsbError>>;

    /// Halt EP0; the universal failure response to a bad request.
    fn stall_ep0(&self) -> Result<(), UsbError>;

    /// Send a zero-length IN status packet on EP0.
    fn ack_ep0(&self) -> impl Future<Output = Result<(), UsbError>>;

    /// Receive on an OUT data endpoint.
    fn read(
        &self,
        address: u8,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, UsbError>>;

    /// Send on an IN data endpoint.
    fn write(
        &self,
        address: u8,
        data: &[u8],
    ) -> impl Future<Output = Result<usize, UsbError>>;

    fn stall(&self, address: u8) -> Result<(), UsbError>;

    fn clear_stall(&self, address: u8) -> Result<(), UsbError>;

    fn is_connected(&self) -> bool;

    fn speed(&self) -> Speed;

    fn wait_connect(&self) -> impl Future<Output = Result<(), UsbError>>;

    fn wait_disconnect(&self) -> impl Future<Output = Result<(), UsbError>>;
}

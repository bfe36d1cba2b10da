//! A mockall-based HAL for tests.

use crate::hal::{EndpointConfig, Hal};
use crate::types::{Speed, UsbError};
use core::future::Future;
use mockall::mock;

mock! {
    pub HalInner {
        pub fn init(&self) -> Result<(), UsbError>;
        pub fn start(&self) -> Result<(), UsbError>;
        pub fn stop(&self) -> Result<(), UsbError>;
        pub fn set_address(&self, address: u8) -> Result<(), UsbError>;
        pub fn configure_endpoints(
            &self,
            endpoints: &[EndpointConfig],
        ) -> Result<(), UsbError>;

        pub fn read_setup(
            &self,
            setup: &mut [u8; 8],
        ) -> impl core::future::Future<Output = Result<(), UsbError>>;

        pub fn write_ep0(
            &self,
            data: &[u8],
        ) -> impl core::future::Future<Output = Result<(), UsbError>>;

        pub fn read_ep0(
            &self,
            buf: &mut [u8],
        ) -> impl core::future::Future<Output = Result<usize, UsbError>>;

        pub fn stall_ep0(&self) -> Result<(), UsbError>;

        pub fn ack_ep0(&self) -> impl core::future::Future<Output = Result<(), UsbError>>;

        pub fn read(
            &self,
            address: u8,
            buf: &mut [u8],
        ) -> impl core::future::Future<Output = Result<usize, UsbError>>;

        pub fn write(
            &self,
            address: u8,
            data: &[u8],
        ) -> impl core::future::Future<Output = Result<usize, UsbError>>;

        pub fn stall(&self, address: u8) -> Result<(), UsbError>;
        pub fn clear_stall(&self, address: u8) -> Result<(), UsbError>;
        pub fn is_connected(&self) -> bool;
        pub fn speed(&self) -> Speed;

        pub fn wait_connect(&self) -> impl core::future::Future<Output = Result<(), UsbError>>;
        pub fn wait_disconnect(&self) -> impl core::future::Future<Output = Result<(), UsbError>>;
    }
}

/// The mock HAL handed to [`Stack`](crate::stack::Stack) in tests.
///
/// Expectations go on `inner`; the trait methods delegate.
pub struct MockHal {
    pub inner: MockHalInner,
}

impl Default for MockHal {
    fn default() -> Self {
        Self {
            inner: MockHalInner::new(),
        }
    }
}

impl Hal for MockHal {
    fn init(&self) -> Result<(), UsbError> {
        self.inner.init()
    }

    fn start(&self) -> Result<(), UsbError> {
        self.inner.start()
    }

    fn stop(&self) -> Result<(), UsbError> {
        self.inner.stop()
    }

    fn set_address(&self, address: u8) -> Result<(), UsbError> {
        self.inner.set_address(address)
    }

    fn configure_endpoints(
        &self,
        endpoints: &[EndpointConfig],
    ) -> Result<(), UsbError> {
        self.inner.configure_endpoints(endpoints)
    }

    fn read_setup(
        &self,
        setup: &mut [u8; 8],
    ) -> impl Future<Output = Result<(), UsbError>> {
        self.inner.read_setup(setup)
    }

    fn write_ep0(&self, data: &[u8]) -> impl Future<Output = Result<(), UsbError>> {
        self.inner.write_ep0(data)
    }

    fn read_ep0(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, UsbError>> {
        self.inner.read_ep0(buf)
    }

    fn stall_ep0(&self) -> Result<(), UsbError> {
        self.inner.stall_ep0()
    }

    fn ack_ep0(&self) -> impl Future<Output = Result<(), UsbError>> {
        self.inner.ack_ep0()
    }

    fn read(
        &self,
        address: u8,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, UsbError>> {
        self.inner.read(address, buf)
    }

    fn write(
        &self,
        address: u8,
        data: &[u8],
    ) -> impl Future<Output = Result<usize, UsbError>> {
        self.inner.write(address, data)
    }

    fn stall(&self, address: u8) -> Result<(), UsbError> {
        self.inner.stall(address)
    }

    fn clear_stall(&self, address: u8) -> Result<(), UsbError> {
        self.inner.clear_stall(address)
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn speed(&self) -> Speed {
        self.inner.speed()
    }

    fn wait_connect(&self) -> impl Future<Output = Result<(), UsbError>> {
        self.inner.wait_connect()
    }

    fn wait_disconnect(&self) -> impl Future<Output = Result<(), UsbError>> {
        self.inner.wait_disconnect()
    }
}

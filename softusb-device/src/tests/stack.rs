use super::*;
use crate::config::{ClassDriver, Configuration, ControlReply, Interface};
use crate::device::DeviceBuilder;
use crate::endpoint::Endpoint;
use crate::mocks::MockHal;
use crate::types::Speed;
use futures::future;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

struct NoOpWaker;

impl Wake for NoOpWaker {
    fn wake(self: Arc<Self>) {}
}

fn poll_once<F: core::future::Future>(fut: std::pin::Pin<&mut F>) -> Poll<F::Output> {
    let waker = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&waker);
    fut.poll(&mut cx)
}

fn test_device() -> Arc<Device> {
    let mut configuration = Configuration::new(1);
    let mut interface = Interface::new(0, 0xFF, 0, 0);
    interface
        .add_endpoint(Endpoint::bulk(0x81, 512).unwrap())
        .unwrap();
    interface
        .add_endpoint(Endpoint::bulk(0x01, 512).unwrap())
        .unwrap();
    configuration.add_interface(interface).unwrap();
    Arc::new(
        DeviceBuilder::new()
            .vendor_product(0x1234, 0x5680)
            .add_configuration(configuration)
            .unwrap()
            .build(),
    )
}

fn configured_device() -> Arc<Device> {
    let device = test_device();
    device.bus_reset();
    device.set_address(5).unwrap();
    device.set_configuration(1).unwrap();
    device
}

fn hal_for_run() -> MockHal {
    let mut hal = MockHal::default();
    hal.inner.expect_init().returning(|| Ok(()));
    hal.inner.expect_start().returning(|| Ok(()));
    hal.inner.expect_speed().returning(|| Speed::High);
    hal.inner.expect_stop().returning(|| Ok(()));
    hal
}

fn expect_setup(hal: &mut MockHal, bytes: [u8; 8]) {
    hal.inner
        .expect_read_setup()
        .times(1)
        .returning(move |setup| {
            setup.copy_from_slice(&bytes);
            Box::pin(future::ready(Ok(())))
        });
}

fn expect_shutdown(hal: &mut MockHal) {
    hal.inner
        .expect_read_setup()
        .times(1)
        .returning(|_| Box::pin(future::ready(Err(UsbError::Shutdown))));
}

fn run_to_completion<H: Hal>(stack: &Stack<H>) {
    let mut fut = pin!(stack.run());
    match poll_once(fut.as_mut()) {
        Poll::Ready(Ok(())) => {}
        Poll::Ready(Err(e)) => panic!("run failed: {:?}", e),
        Poll::Pending => panic!("run did not finish"),
    }
}

#[test]
fn get_device_descriptor_flow() {
    let mut hal = hal_for_run();
    // GET_DESCRIPTOR(Device), wLength 18
    expect_setup(&mut hal, [0x80, 6, 0, 1, 0, 0, 0x12, 0]);
    hal.inner
        .expect_write_ep0()
        .times(1)
        .withf(|data| data.len() == 18 && data[0] == 18 && data[1] == 1)
        .returning(|_| Box::pin(future::ready(Ok(()))));
    hal.inner
        .expect_read_ep0()
        .times(1)
        .withf(|buf| buf.is_empty())
        .returning(|_| Box::pin(future::ready(Ok(0))));
    expect_shutdown(&mut hal);

    let device = test_device();
    device.bus_reset();
    let stack = Stack::new(hal, device.clone());
    run_to_completion(&stack);
    assert_eq!(device.speed(), Speed::High);
}

#[test]
fn in_responses_truncate_to_wlength() {
    let mut hal = hal_for_run();
    expect_setup(&mut hal, [0x80, 6, 0, 1, 0, 0, 8, 0]);
    hal.inner
        .expect_write_ep0()
        .times(1)
        .withf(|data| data.len() == 8)
        .returning(|_| Box::pin(future::ready(Ok(()))));
    hal.inner
        .expect_read_ep0()
        .times(1)
        .withf(|buf| buf.is_empty())
        .returning(|_| Box::pin(future::ready(Ok(0))));
    expect_shutdown(&mut hal);

    let device = test_device();
    device.bus_reset();
    let stack = Stack::new(hal, device);
    run_to_completion(&stack);
}

#[test]
fn unknown_requests_stall_ep0() {
    let mut hal = hal_for_run();
    // vendor request nobody handles
    expect_setup(&mut hal, [0xC0, 0x13, 0, 0, 0, 0, 6, 0]);
    hal.inner
        .expect_stall_ep0()
        .times(1)
        .returning(|| Ok(()));
    expect_shutdown(&mut hal);

    let device = test_device();
    device.bus_reset();
    let stack = Stack::new(hal, device);
    run_to_completion(&stack);
}

#[test]
fn unsupported_descriptor_stalls_then_recovers() {
    let mut hal = hal_for_run();
    // device qualifier: stall...
    expect_setup(&mut hal, [0x80, 6, 0, 6, 0, 0, 10, 0]);
    hal.inner
        .expect_stall_ep0()
        .times(1)
        .returning(|| Ok(()));
    // ...and the next SETUP proceeds normally
    expect_setup(&mut hal, [0x80, 6, 0, 1, 0, 0, 0x12, 0]);
    hal.inner
        .expect_write_ep0()
        .times(1)
        .withf(|data| data.len() == 18)
        .returning(|_| Box::pin(future::ready(Ok(()))));
    hal.inner
        .expect_read_ep0()
        .times(1)
        .withf(|buf| buf.is_empty())
        .returning(|_| Box::pin(future::ready(Ok(0))));
    expect_shutdown(&mut hal);

    let device = test_device();
    device.bus_reset();
    let stack = Stack::new(hal, device);
    run_to_completion(&stack);
}

#[test]
fn bus_reset_resets_the_state_machine() {
    let mut hal = hal_for_run();
    hal.inner
        .expect_read_setup()
        .times(1)
        .returning(|_| Box::pin(future::ready(Err(UsbError::Reset))));
    expect_shutdown(&mut hal);

    let device = configured_device();
    device.set_remote_wakeup(true);
    let stack = Stack::new(hal, device.clone());
    run_to_completion(&stack);

    assert_eq!(device.state(), DeviceState::Default);
    assert_eq!(device.address(), 0);
    assert_eq!(device.active_configuration_value(), 0);
    assert!(!device.remote_wakeup_enabled());
}

#[test]
fn set_address_reaches_the_hal_after_the_status_phase() {
    let mut hal = hal_for_run();
    expect_setup(&mut hal, [0x00, 5, 5, 0, 0, 0, 0, 0]);
    hal.inner
        .expect_ack_ep0()
        .times(1)
        .returning(|| Box::pin(future::ready(Ok(()))));
    hal.inner
        .expect_set_address()
        .times(1)
        .withf(|&address| address == 5)
        .returning(|_| Ok(()));
    expect_shutdown(&mut hal);

    let device = test_device();
    device.bus_reset();
    let stack = Stack::new(hal, device.clone());
    run_to_completion(&stack);
    assert_eq!(device.address(), 5);
    assert_eq!(device.state(), DeviceState::Address);
}

#[test]
fn set_configuration_arms_the_endpoints() {
    let mut hal = hal_for_run();
    expect_setup(&mut hal, [0x00, 9, 1, 0, 0, 0, 0, 0]);
    hal.inner
        .expect_ack_ep0()
        .times(1)
        .returning(|| Box::pin(future::ready(Ok(()))));
    hal.inner
        .expect_configure_endpoints()
        .times(1)
        .withf(|endpoints| {
            endpoints.len() == 2
                && endpoints.iter().any(|e| e.address == 0x81)
                && endpoints.iter().any(|e| e.address == 0x01)
        })
        .returning(|_| Ok(()));
    expect_shutdown(&mut hal);

    let device = test_device();
    device.bus_reset();
    device.set_address(5).unwrap();
    let stack = Stack::new(hal, device.clone());
    run_to_completion(&stack);
    assert_eq!(device.state(), DeviceState::Configured);
}

struct RecordingDriver {
    payloads: Mutex<Vec<Vec<u8>>>,
    reply: Vec<u8>,
}

impl ClassDriver for RecordingDriver {
    fn control(&self, setup: &SetupPacket, data: &mut [u8]) -> ControlReply {
        if setup.direction() == crate::wire::Direction::Out {
            self.payloads.lock().unwrap().push(data.to_vec());
            ControlReply::Accepted(0)
        } else {
            data[..self.reply.len()].copy_from_slice(&self.reply);
            ControlReply::Accepted(self.reply.len())
        }
    }
}

#[test]
fn class_requests_reach_the_bound_driver() {
    let device = configured_device();
    let driver = Arc::new(RecordingDriver {
        payloads: Mutex::new(Vec::new()),
        reply: vec![0xAA, 0xBB],
    });
    let bound: Arc<dyn ClassDriver> = driver.clone();
    device
        .active_configuration()
        .unwrap()
        .interface(0)
        .unwrap()
        .bind_driver(&bound);

    let mut hal = hal_for_run();
    // class OUT with a 3-byte payload
    expect_setup(&mut hal, [0x21, 0x0B, 0, 0, 0, 0, 3, 0]);
    hal.inner
        .expect_read_ep0()
        .times(1)
        .withf(|buf| buf.len() == 3)
        .returning(|buf| {
            buf.copy_from_slice(&[1, 2, 3]);
            Box::pin(future::ready(Ok(3)))
        });
    hal.inner
        .expect_ack_ep0()
        .times(1)
        .returning(|| Box::pin(future::ready(Ok(()))));
    // class IN wanting 2 bytes back
    expect_setup(&mut hal, [0xA1, 0x0C, 0, 0, 0, 0, 2, 0]);
    hal.inner
        .expect_write_ep0()
        .times(1)
        .withf(|data| data[..] == [0xAA, 0xBB][..])
        .returning(|_| Box::pin(future::ready(Ok(()))));
    hal.inner
        .expect_read_ep0()
        .times(1)
        .withf(|buf| buf.is_empty())
        .returning(|_| Box::pin(future::ready(Ok(0))));
    expect_shutdown(&mut hal);

    let stack = Stack::new(hal, device);
    run_to_completion(&stack);
    assert_eq!(driver.payloads.lock().unwrap().as_slice(), &[vec![1, 2, 3]]);
}

#[test]
fn data_endpoints_require_configured_state() {
    let device = test_device();
    device.bus_reset();
    let stack = Stack::new(MockHal::default(), device);

    let mut buf = [0u8; 8];
    let mut read = pin!(stack.read(0x01, &mut buf));
    assert_eq!(
        poll_once(read.as_mut()),
        Poll::Ready(Err(UsbError::NotConfigured))
    );
    let mut write = pin!(stack.write(0x81, &[0u8; 8]));
    assert_eq!(
        poll_once(write.as_mut()),
        Poll::Ready(Err(UsbError::NotConfigured))
    );
}

#[test]
fn read_and_write_delegate_when_configured() {
    let mut hal = MockHal::default();
    hal.inner
        .expect_read()
        .times(1)
        .withf(|&address, buf| address == 0x01 && buf.len() == 8)
        .returning(|_, _| Box::pin(future::ready(Ok(8))));
    hal.inner
        .expect_write()
        .times(1)
        .withf(|&address, data| address == 0x81 && data.len() == 4)
        .returning(|_, _| Box::pin(future::ready(Ok(4))));

    let stack = Stack::new(hal, configured_device());
    let mut buf = [0u8; 8];
    let mut read = pin!(stack.read(0x01, &mut buf));
    assert_eq!(poll_once(read.as_mut()), Poll::Ready(Ok(8)));
    let mut write = pin!(stack.write(0x81, &[0u8; 4]));
    assert_eq!(poll_once(write.as_mut()), Poll::Ready(Ok(4)));
}

#[test]
fn pending_sets_are_bounded_per_endpoint() {
    let stack = Stack::new(MockHal::default(), configured_device());
    for _ in 0..MAX_PENDING_TRANSFERS {
        // queue without driving
        drop(
            stack
                .submit_transfer(Arc::new(Transfer::bulk(0x81, vec![0u8; 8])))
                .unwrap(),
        );
    }
    assert_eq!(stack.pending_transfers(0x81), MAX_PENDING_TRANSFERS);
    // the other direction is a different queue
    assert_eq!(stack.pending_transfers(0x01), 0);

    let overflow = Arc::new(Transfer::bulk(0x81, vec![0u8; 8]));
    match stack.submit_transfer(overflow) {
        Ok(_) => panic!("ninth transfer should not fit"),
        Err(e) => assert_eq!(e, UsbError::NoResources),
    }

    stack.cancel_transfers(0x81);
    assert_eq!(stack.pending_transfers(0x81), 0);
    assert!(stack
        .submit_transfer(Arc::new(Transfer::bulk(0x81, vec![0u8; 8])))
        .is_ok());
}

#[test]
fn submit_rejects_bad_addresses() {
    let stack = Stack::new(MockHal::default(), configured_device());
    match stack.submit_transfer(Arc::new(Transfer::bulk(0x42, vec![0u8; 8]))) {
        Ok(_) => panic!("0x42 is not an endpoint address"),
        Err(e) => assert_eq!(e, UsbError::InvalidEndpoint),
    };
}

#[test]
fn completed_transfer_flips_the_data_toggle() {
    let mut hal = MockHal::default();
    hal.inner
        .expect_write()
        .times(1)
        .returning(|_, data| Box::pin(future::ready(Ok(data.len()))));

    let device = configured_device();
    let stack = Stack::new(hal, device.clone());

    let calls = Arc::new(AtomicUsize::new(0));
    let transfer = Arc::new(Transfer::bulk(0x81, vec![0u8; 64]));
    {
        let calls = calls.clone();
        transfer.on_complete(move |t| {
            assert_eq!(t.status(), TransferStatus::Success);
            assert_eq!(t.actual_length(), 64);
            calls.fetch_add(1, Ordering::Relaxed);
        });
    }

    let task = stack.submit_transfer(transfer.clone()).unwrap();
    assert_eq!(stack.pending_transfers(0x81), 1);
    let mut task = pin!(task);
    assert_eq!(poll_once(task.as_mut()), Poll::Ready(()));

    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert!(transfer.is_completed());
    assert_eq!(stack.pending_transfers(0x81), 0);
    assert!(device.endpoint(0x81).unwrap().data_toggle());
}

#[test]
fn transfer_errors_map_to_statuses() {
    let mut hal = MockHal::default();
    hal.inner
        .expect_read()
        .times(1)
        .returning(|_, _| Box::pin(future::ready(Err(UsbError::Timeout))));

    let device = configured_device();
    let stack = Stack::new(hal, device.clone());
    let transfer = Arc::new(Transfer::bulk(0x01, vec![0u8; 64]));
    let mut task = pin!(stack.submit_transfer(transfer.clone()).unwrap());
    assert_eq!(poll_once(task.as_mut()), Poll::Ready(()));

    assert_eq!(transfer.status(), TransferStatus::Timeout);
    assert_eq!(transfer.error(), Some(UsbError::Timeout));
    // failures do not advance the toggle
    assert!(!device.endpoint(0x01).unwrap().data_toggle());
}

#[test]
fn cancellation_unblocks_inflight_io() {
    let mut hal = MockHal::default();
    hal.inner
        .expect_read()
        .times(1)
        .returning(|_, _| Box::pin(future::pending()));

    let stack = Stack::new(hal, configured_device());
    let calls = Arc::new(AtomicUsize::new(0));
    let transfer = Arc::new(Transfer::bulk(0x01, vec![0u8; 64]));
    {
        let calls = calls.clone();
        transfer.on_complete(move |t| {
            assert_eq!(t.status(), TransferStatus::Cancelled);
            calls.fetch_add(1, Ordering::Relaxed);
        });
    }

    let mut task = pin!(stack.submit_transfer(transfer.clone()).unwrap());
    assert_eq!(poll_once(task.as_mut()), Poll::Pending);

    stack.cancel_transfers(0x01);
    assert_eq!(poll_once(task.as_mut()), Poll::Ready(()));
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(transfer.status(), TransferStatus::Cancelled);
    assert_eq!(transfer.error(), Some(UsbError::Cancelled));
    assert_eq!(stack.pending_transfers(0x01), 0);
}

#[test]
fn disconnect_cancels_inflight_transfers() {
    let mut hal = MockHal::default();
    hal.inner
        .expect_read()
        .times(1)
        .returning(|_, _| Box::pin(future::pending()));
    hal.inner
        .expect_wait_disconnect()
        .times(1)
        .returning(|| Box::pin(future::ready(Ok(()))));
    hal.inner
        .expect_wait_connect()
        .times(1)
        .returning(|| Box::pin(future::ready(Err(UsbError::Shutdown))));

    let stack = Stack::new(hal, configured_device());
    let transfer = Arc::new(Transfer::bulk(0x01, vec![0u8; 8]));
    let mut task = pin!(stack.submit_transfer(transfer.clone()).unwrap());
    assert_eq!(poll_once(task.as_mut()), Poll::Pending);

    let mut watch = pin!(stack.watch_disconnect());
    assert_eq!(poll_once(watch.as_mut()), Poll::Ready(Ok(())));

    assert_eq!(poll_once(task.as_mut()), Poll::Ready(()));
    assert_eq!(transfer.status(), TransferStatus::Cancelled);
}

#[test]
fn iso_transfers_move_packet_by_packet() {
    let mut hal = MockHal::default();
    hal.inner
        .expect_write()
        .times(3)
        .returning(|_, data| Box::pin(future::ready(Ok(data.len()))));

    let mut configuration = Configuration::new(1);
    let mut interface = Interface::new(0, 0xFF, 0, 0);
    interface
        .add_endpoint(
            Endpoint::isochronous(
                0x83,
                256,
                1,
                crate::wire::IsoSync::None,
                crate::wire::IsoUsage::Data,
            )
            .unwrap(),
        )
        .unwrap();
    configuration.add_interface(interface).unwrap();
    let device = Arc::new(
        DeviceBuilder::new()
            .add_configuration(configuration)
            .unwrap()
            .build(),
    );
    device.bus_reset();
    device.set_address(1).unwrap();
    device.set_configuration(1).unwrap();

    let stack = Stack::new(hal, device.clone());
    let transfer = Arc::new(
        Transfer::isochronous(0x83, vec![0u8; 300], &[(0, 100), (100, 100), (200, 100)])
            .unwrap(),
    );
    let mut task = pin!(stack.submit_transfer(transfer.clone()).unwrap());
    assert_eq!(poll_once(task.as_mut()), Poll::Ready(()));

    assert_eq!(transfer.status(), TransferStatus::Success);
    assert_eq!(transfer.actual_length(), 300);
    for index in 0..3 {
        assert_eq!(
            transfer.iso_packet(index).unwrap().status,
            TransferStatus::Success
        );
    }
    assert_eq!(device.endpoint(0x83).unwrap().frame_number(), 3);
}

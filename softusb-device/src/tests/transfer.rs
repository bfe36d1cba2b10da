use super::*;
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

struct NoOpWaker;

impl Wake for NoOpWaker {
    fn wake(self: Arc<Self>) {}
}

#[test]
fn status_mapping() {
    assert_eq!(TransferStatus::from(UsbError::Stall), TransferStatus::Stall);
    assert_eq!(TransferStatus::from(UsbError::Nak), TransferStatus::Nak);
    assert_eq!(TransferStatus::from(UsbError::Timeout), TransferStatus::Timeout);
    assert_eq!(
        TransferStatus::from(UsbError::Cancelled),
        TransferStatus::Cancelled
    );
    assert_eq!(TransferStatus::from(UsbError::Overrun), TransferStatus::Overrun);
    assert_eq!(
        TransferStatus::from(UsbError::Underrun),
        TransferStatus::Underrun
    );
    assert_eq!(TransferStatus::from(UsbError::Protocol), TransferStatus::Error);
    assert_eq!(TransferStatus::from(UsbError::Reset), TransferStatus::Error);
}

#[test]
fn complete_is_idempotent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let transfer = Transfer::bulk(0x81, vec![0u8; 64]);
    {
        let calls = calls.clone();
        transfer.on_complete(move |t| {
            assert_eq!(t.status(), TransferStatus::Success);
            calls.fetch_add(1, Ordering::Relaxed);
        });
    }

    transfer.complete(TransferStatus::Success, 64, None);
    transfer.complete(TransferStatus::Error, 0, Some(UsbError::Protocol));
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(transfer.status(), TransferStatus::Success);
    assert_eq!(transfer.actual_length(), 64);
    assert_eq!(transfer.error(), None);
}

#[test]
fn cancel_is_idempotent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let transfer = Transfer::bulk(0x01, vec![0u8; 8]);
    {
        let calls = calls.clone();
        transfer.on_complete(move |_| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
    }

    transfer.cancel();
    transfer.cancel();
    transfer.cancel();
    assert!(transfer.is_cancelled());
    assert!(transfer.is_completed());
    assert_eq!(transfer.status(), TransferStatus::Cancelled);
    assert_eq!(transfer.error(), Some(UsbError::Cancelled));
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn cancel_after_complete_keeps_first_outcome() {
    let transfer = Transfer::bulk(0x81, vec![0u8; 8]);
    transfer.complete(TransferStatus::Success, 8, None);
    transfer.cancel();
    assert!(transfer.is_cancelled());
    assert_eq!(transfer.status(), TransferStatus::Success);
    assert_eq!(transfer.actual_length(), 8);
}

#[test]
fn buffer_moves_not_copies() {
    let transfer = Transfer::bulk(0x81, vec![7u8; 16]);
    assert_eq!(transfer.expected_length(), 16);
    let buf = transfer.take_buffer().unwrap();
    assert_eq!(buf, vec![7u8; 16]);
    // the transfer no longer owns it
    assert!(transfer.take_buffer().is_none());
    transfer.restore_buffer(buf);
    assert!(transfer.take_buffer().is_some());
}

#[test]
fn control_transfer_keeps_setup() {
    let setup = SetupPacket {
        bmRequestType: 0x80,
        bRequest: 6,
        wValue: 0x0100,
        wIndex: 0,
        wLength: 18,
    };
    let transfer = Transfer::control(setup, vec![0u8; 18]);
    assert_eq!(transfer.kind(), crate::wire::EndpointType::Control);
    assert_eq!(transfer.setup().unwrap().wLength, 18);
}

#[test]
fn iso_packet_table() {
    let transfer =
        Transfer::isochronous(0x83, vec![0u8; 300], &[(0, 100), (100, 100), (200, 100)])
            .unwrap();
    assert_eq!(transfer.iso_packet_count(), 3);
    assert_eq!(transfer.iso_packet(1).unwrap().offset, 100);
    assert_eq!(transfer.iso_packet(1).unwrap().status, TransferStatus::Pending);
    transfer.set_iso_result(1, 60, TransferStatus::Success);
    assert_eq!(transfer.iso_packet(1).unwrap().actual, 60);
    assert_eq!(transfer.iso_packet(1).unwrap().status, TransferStatus::Success);
    assert!(transfer.iso_packet(3).is_none());
}

#[test]
fn iso_packet_table_is_bounded() {
    let packets: Vec<(u32, u32)> = (0..257).map(|i| (i * 4, 4)).collect();
    assert!(Transfer::isochronous(0x83, vec![0u8; 2048], &packets).is_err());
}

#[test]
fn cancelled_future_wakes_on_cancel() {
    let transfer = Arc::new(Transfer::bulk(0x01, vec![0u8; 8]));
    let waker = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&waker);

    let mut fut = pin!(transfer.cancelled_future());
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Pending);
    transfer.cancel();
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(()));
}

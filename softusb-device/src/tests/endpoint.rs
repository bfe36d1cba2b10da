use super::*;
use crate::wire::EndpointType;

#[test]
fn address_accessors() {
    let e = Endpoint::bulk(0x81, 512).unwrap();
    assert_eq!(e.address(), 0x81);
    assert_eq!(e.direction(), Direction::In);
    assert_eq!(e.number(), 1);
    assert_eq!(e.transfer_type(), EndpointType::Bulk);

    let e = Endpoint::interrupt(0x02, 64, 10).unwrap();
    assert_eq!(e.direction(), Direction::Out);
    assert_eq!(e.number(), 2);
    assert_eq!(e.transfer_type(), EndpointType::Interrupt);
    assert_eq!(e.interval(), 10);
}

#[test]
fn reserved_address_bits_rejected() {
    assert_eq!(Endpoint::bulk(0x10, 64).err(), Some(UsbError::InvalidEndpoint));
    assert_eq!(Endpoint::bulk(0x70, 64).err(), Some(UsbError::InvalidEndpoint));
}

#[test]
fn iso_attributes() {
    let e = Endpoint::isochronous(0x83, 1023, 1, IsoSync::Adaptive, IsoUsage::Feedback)
        .unwrap();
    assert_eq!(e.transfer_type(), EndpointType::Isochronous);
    assert_eq!(e.iso_sync(), IsoSync::Adaptive);
    assert_eq!(e.iso_usage(), IsoUsage::Feedback);
}

#[test]
fn halt_and_toggle() {
    let e = Endpoint::bulk(0x01, 64).unwrap();
    assert!(!e.is_halted());
    e.set_halt(true);
    assert!(e.is_halted());
    e.set_halt(false);
    assert!(!e.is_halted());

    assert!(!e.data_toggle());
    e.toggle_data();
    assert!(e.data_toggle());
    e.toggle_data();
    assert!(!e.data_toggle());
    e.toggle_data();
    e.reset_data_toggle();
    assert!(!e.data_toggle());
}

#[test]
fn frame_counter_wraps() {
    let e = Endpoint::isochronous(0x03, 256, 1, IsoSync::None, IsoUsage::Data).unwrap();
    assert_eq!(e.frame_number(), 0);
    e.increment_frame();
    assert_eq!(e.frame_number(), 1);
    for _ in 0..0xFFFF {
        e.increment_frame();
    }
    assert_eq!(e.frame_number(), 0);
}

#[test]
fn descriptor_reflects_endpoint() {
    let e = Endpoint::interrupt(0x84, 8, 10).unwrap();
    let d = e.descriptor();
    assert_eq!(d.bEndpointAddress, 0x84);
    assert_eq!(d.bmAttributes, EndpointType::Interrupt as u8);
    assert_eq!(d.max_packet_size(), 8);
    assert_eq!(d.bInterval, 10);
}

#[test]
fn index_covers_all_endpoints_once() {
    let mut seen = [false; 32];
    for number in 0u8..16 {
        for address in [number, number | 0x80] {
            let index = endpoint_index(address).unwrap();
            assert!(index < 32);
            assert!(!seen[index], "index {} reused", index);
            seen[index] = true;
        }
    }
    assert!(seen.iter().all(|&s| s));
}

#[test]
fn index_rejects_non_endpoint_addresses() {
    assert_eq!(endpoint_index(0x10), None);
    assert_eq!(endpoint_index(0x7F), None);
    assert_eq!(endpoint_index(0x90), None);
    assert_eq!(endpoint_index(0xFF), None);
}

// Lifecycle, dispatch and hook behaviour of the driver facade

mod common;

use common::{eth_frame, ipv4_packet, MockBackend};
use std::sync::{Arc, Mutex};

use link::{
    DriverConfig, DriverState, HwAddr, LinkAddress, LinkDriver, LinkError, MediumClass,
    PppoeSession, Protocol, ReceiveMode,
};

const LOCAL: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

fn eth_driver() -> (LinkDriver, Arc<Mutex<common::BackendLog>>) {
    let (backend, log) = MockBackend::ethernet();
    let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());
    driver.init().unwrap();
    (driver, log)
}

#[test]
fn broadcast_send_pads_to_the_ethernet_minimum() {
    let (mut driver, log) = eth_driver();

    let broadcast = *driver.broadcast_address();
    let frame = driver.format(Some(&broadcast), Protocol::Ipv4).unwrap();
    assert_eq!(frame.payload_offset(), 14);

    // A 46-byte zeroed payload exactly fills the 60-byte minimum frame.
    let sent = frame.send(46, 0).unwrap();
    assert_eq!(sent, 46);

    let log = log.lock().unwrap();
    assert_eq!(log.sent.len(), 1);
    let wire = &log.sent[0];
    assert_eq!(wire.len(), 60);
    assert_eq!(&wire[0..6], &[0xFF; 6]);
    assert_eq!(&wire[6..12], &LOCAL);
    assert_eq!(&wire[12..14], &[0x08, 0x00]);
    assert!(wire[14..].iter().all(|&b| b == 0));
}

#[test]
fn oversize_payload_is_truncated_to_the_maximum_frame() {
    let (mut driver, log) = eth_driver();

    let broadcast = *driver.broadcast_address();
    let frame = driver.format(Some(&broadcast), Protocol::Ipv4).unwrap();
    let sent = frame.send(1600, 0).unwrap();
    assert_eq!(sent, 1500);
    assert_eq!(log.lock().unwrap().sent[0].len(), 1514);
}

#[test]
fn operations_fail_fast_before_init() {
    let (backend, _log) = MockBackend::ethernet();
    let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());

    assert_eq!(driver.state(), DriverState::Uninitialized);
    assert!(matches!(
        driver.format(None, Protocol::Ipv4),
        Err(LinkError::NotInitialized)
    ));
    assert!(driver.poll_arrived().is_none());
    assert!(matches!(
        driver.set_address(&LinkAddress::new(&LOCAL)),
        Err(LinkError::NotInitialized)
    ));
}

#[test]
fn init_is_idempotent_and_release_is_terminal() {
    let (mut driver, log) = eth_driver();
    driver.init().unwrap();

    driver.release();
    assert_eq!(driver.state(), DriverState::Released);
    assert_eq!(log.lock().unwrap().teardowns, 1);

    // Releasing again is a no-op; re-initialisation is not supported.
    driver.release();
    assert_eq!(log.lock().unwrap().teardowns, 1);
    assert_eq!(driver.init(), Err(LinkError::Released));
}

#[test]
fn no_driver_falls_back_to_loopback_only_mode() {
    let (mut backend, log) = MockBackend::ethernet();
    backend.init_error = Some(LinkError::NoDriver);
    let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());

    assert_eq!(driver.init(), Err(LinkError::NoDriver));
    assert_eq!(driver.state(), DriverState::Initialized);
    assert_eq!(driver.medium(), None);
    assert_eq!(driver.hw_addr(), None);

    // Loopback traffic still flows.
    let packet = ipv4_packet([127, 0, 0, 1]);
    let mut frame = driver.format(None, Protocol::Ipv4).unwrap();
    frame.payload_mut()[..packet.len()].copy_from_slice(&packet);
    assert_eq!(frame.send(packet.len(), 0).unwrap(), packet.len());
    assert_eq!(driver.poll_arrived().unwrap().payload(), &packet[..]);

    // Anything else silently goes nowhere.
    let packet = ipv4_packet([192, 168, 0, 9]);
    let mut frame = driver.format(None, Protocol::Ipv4).unwrap();
    frame.payload_mut()[..packet.len()].copy_from_slice(&packet);
    assert_eq!(frame.send(packet.len(), 0).unwrap(), packet.len());
    assert!(log.lock().unwrap().sent.is_empty());
}

#[test]
fn set_address_updates_only_on_backend_success() {
    let (mut driver, log) = eth_driver();
    let new_addr = LinkAddress::new(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

    driver.set_address(&new_addr).unwrap();
    assert_eq!(driver.local_address(), &new_addr);
    assert_eq!(log.lock().unwrap().addr, new_addr);
}

#[test]
fn set_address_is_rejected_on_fixed_address_media() {
    for medium in [MediumClass::Ppp, MediumClass::Arcnet] {
        let (backend, _log) = MockBackend::new(medium, &[0x2A]);
        let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());
        driver.init().unwrap();
        assert_eq!(
            driver.set_address(&LinkAddress::new(&[0x01])),
            Err(LinkError::AddressRejected)
        );
    }
}

#[test]
fn refused_address_change_leaves_the_local_copy_alone() {
    let (mut backend, _log) = MockBackend::ethernet();
    backend.refuse_set_address = true;
    let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());
    driver.init().unwrap();

    let new_addr = LinkAddress::new(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    assert!(matches!(
        driver.set_address(&new_addr),
        Err(LinkError::Backend(_))
    ));
    assert_eq!(driver.local_address().as_bytes(), &LOCAL);
}

#[test]
fn release_restores_address_and_receive_mode() {
    let (mut driver, log) = eth_driver();

    driver
        .set_address(&LinkAddress::new(&[0x02, 0, 0, 0, 0, 1]))
        .unwrap();
    driver
        .join_multicast(&LinkAddress::new(&[0x01, 0x00, 0x5E, 0, 0, 1]))
        .unwrap();
    assert_eq!(log.lock().unwrap().mode, ReceiveMode::MulticastList);

    driver.release();

    let log = log.lock().unwrap();
    assert_eq!(log.addr.as_bytes(), &LOCAL);
    assert_eq!(log.mode, ReceiveMode::Broadcast);
    assert_eq!(log.teardowns, 1);
}

#[test]
fn fatal_error_skips_the_hardware_restore() {
    let (mut driver, log) = eth_driver();
    let new_addr = LinkAddress::new(&[0x02, 0, 0, 0, 0, 1]);
    driver.set_address(&new_addr).unwrap();

    driver.set_fatal_error();
    driver.release();

    let log = log.lock().unwrap();
    // The address stays as-is, but the backend still went down.
    assert_eq!(log.addr, new_addr);
    assert_eq!(log.teardowns, 1);
}

#[test]
fn dropping_the_driver_releases_it() {
    let (backend, log) = MockBackend::ethernet();
    {
        let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());
        driver.init().unwrap();
    }
    assert_eq!(log.lock().unwrap().teardowns, 1);
}

#[test]
fn queued_frames_arrive_in_order_with_classification() {
    let (mut driver, _log) = eth_driver();
    let producer = driver.rx_producer();

    producer.push(
        eth_frame([0xFF; 6], [2; 6], 0x0806, &[0u8; 46]),
        100,
    );
    producer.push(
        eth_frame(LOCAL, [2; 6], 0x0800, &ipv4_packet([10, 0, 0, 2])),
        200,
    );

    let first = driver.poll_arrived().unwrap();
    assert_eq!(first.protocol, Protocol::Arp);
    assert!(first.is_broadcast);
    assert_eq!(first.tstamp_ms, 100);

    let second = driver.poll_arrived().unwrap();
    assert_eq!(second.protocol, Protocol::Ipv4);
    assert!(!second.is_broadcast);
    assert_eq!(driver.last().rx.size, second.frame().len());

    assert!(driver.poll_arrived().is_none());
}

#[test]
fn free_without_a_frame_flushes_the_queue() {
    let (mut driver, _log) = eth_driver();
    let producer = driver.rx_producer();
    producer.push(eth_frame([0xFF; 6], [2; 6], 0x0806, &[0u8; 46]), 0);
    producer.push(eth_frame([0xFF; 6], [2; 6], 0x0806, &[0u8; 46]), 0);

    driver.free(None);
    assert!(driver.poll_arrived().is_none());
}

#[test]
fn recursion_guard_drops_ip_frames_until_released() {
    let (mut driver, _log) = eth_driver();
    let producer = driver.rx_producer();

    let ip = eth_frame(LOCAL, [2; 6], 0x0800, &ipv4_packet([10, 0, 0, 2]));
    let arp = eth_frame([0xFF; 6], [2; 6], 0x0806, &[0u8; 46]);

    let token = driver.ip_recursion_token();

    producer.push(ip.clone(), 0);
    assert!(driver.poll_arrived().is_none());
    assert_eq!(driver.stats().recursion_dropped, 1);

    // Non-IP frames still flow while the guard is held.
    producer.push(arp, 0);
    assert_eq!(driver.poll_arrived().unwrap().protocol, Protocol::Arp);

    drop(token);
    producer.push(ip, 0);
    assert_eq!(driver.poll_arrived().unwrap().protocol, Protocol::Ipv4);
}

#[test]
fn llc_encapsulation_is_dropped_and_counted() {
    let (mut driver, _log) = eth_driver();
    let producer = driver.rx_producer();

    // A type field below 0x600 is an 802.3 length, not an EtherType.
    producer.push(eth_frame(LOCAL, [2; 6], 0x0100, &[0u8; 46]), 0);
    assert!(driver.poll_arrived().is_none());
    assert_eq!(driver.stats().llc_dropped, 1);
}

#[test]
fn transmit_failure_is_surfaced_and_recorded() {
    let (mut backend, _log) = MockBackend::ethernet();
    backend.fail_send = true;
    let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());
    driver.init().unwrap();

    let broadcast = *driver.broadcast_address();
    let frame = driver.format(Some(&broadcast), Protocol::Arp).unwrap();
    assert_eq!(frame.send(46, 9), Err(LinkError::TransmitFailed));
    assert_eq!(driver.last().tx.size, 0);
}

#[test]
fn xmit_hook_replaces_the_backend_path() {
    let (mut driver, log) = eth_driver();
    let captured: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    driver.set_xmit_hook(Some(Box::new(move |frame: &[u8]| {
        sink.lock().unwrap().push(frame.to_vec());
        frame.len()
    })));

    let broadcast = *driver.broadcast_address();
    let frame = driver.format(Some(&broadcast), Protocol::Arp).unwrap();
    assert_eq!(frame.send(46, 0).unwrap(), 46);

    assert_eq!(captured.lock().unwrap().len(), 1);
    assert_eq!(captured.lock().unwrap()[0].len(), 60);
    assert!(log.lock().unwrap().sent.is_empty());
}

#[test]
fn recv_hook_replaces_the_queue_and_owns_buffers() {
    let (mut driver, _log) = eth_driver();
    let producer = driver.rx_producer();
    producer.push(eth_frame([0xFF; 6], [2; 6], 0x0806, &[0u8; 46]), 0);

    let supplied = eth_frame(LOCAL, [2; 6], 0x0800, &ipv4_packet([10, 0, 0, 2]));
    let mut frames = vec![(supplied.clone(), Protocol::Ipv4)];
    driver.set_recv_hook(Some(Box::new(move || frames.pop())));

    let arrived = driver.poll_arrived().unwrap();
    assert_eq!(arrived.protocol, Protocol::Ipv4);
    assert_eq!(arrived.frame(), &supplied[..]);

    // With a hook active, free() must not touch the internal queue.
    driver.free(None);
    assert!(driver.poll_arrived().is_none()); // hook is drained

    driver.set_recv_hook(None);
    assert_eq!(driver.poll_arrived().unwrap().protocol, Protocol::Arp);
}

#[test]
fn recv_peek_may_consume_frames() {
    let (mut driver, _log) = eth_driver();
    let producer = driver.rx_producer();

    driver.set_recv_peek(Some(Box::new(|frame: &mut [u8]| {
        // Consume ARP, pass everything else.
        frame[12..14] != [0x08, 0x06]
    })));

    producer.push(eth_frame([0xFF; 6], [2; 6], 0x0806, &[0u8; 46]), 0);
    assert!(driver.poll_arrived().is_none());

    producer.push(
        eth_frame(LOCAL, [2; 6], 0x0800, &ipv4_packet([10, 0, 0, 2])),
        0,
    );
    assert!(driver.poll_arrived().is_some());
}

#[test]
fn pppoe_session_wraps_ipv4_and_patches_the_length() {
    let (mut driver, log) = eth_driver();
    let ac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
    driver.set_pppoe_session(Some(PppoeSession::new(0x1234, ac)));

    let gateway = LinkAddress::new(&[0x0E; 6]);
    let mut frame = driver.format(Some(&gateway), Protocol::Ipv4).unwrap();
    assert_eq!(frame.payload_offset(), 22);

    let packet = ipv4_packet([8, 8, 8, 8]);
    frame.payload_mut()[..packet.len()].copy_from_slice(&packet);
    // 60-byte minimum frame minus the 22-byte session framing.
    assert_eq!(frame.send(packet.len(), 0).unwrap(), 38);

    let snapshot = log.lock().unwrap();
    let wire = &snapshot.sent[0];
    assert_eq!(&wire[0..6], &ac);
    assert_eq!(&wire[12..14], &[0x88, 0x64]);
    assert_eq!(wire[14], 0x11);
    assert_eq!(wire[15], 0x00);
    assert_eq!(&wire[16..18], &0x1234u16.to_be_bytes());
    // Length covers the PPP protocol field plus the IP packet.
    assert_eq!(&wire[18..20], &22u16.to_be_bytes());
    assert_eq!(&wire[20..22], &[0x00, 0x21]);
    assert_eq!(&wire[22..42], &packet[..]);
    drop(snapshot);

    // Non-IPv4 traffic is framed normally even while the session is up.
    let frame = driver.format(Some(&gateway), Protocol::Arp).unwrap();
    assert_eq!(frame.payload_offset(), 14);
}

#[test]
fn hardware_types_follow_the_medium() {
    let cases = [
        (MediumClass::Ethernet, &[0xAA; 6][..], Some(HwAddr { hw_type: 1, hw_len: 6 })),
        (MediumClass::TokenRing, &[0xAA; 6][..], Some(HwAddr { hw_type: 6, hw_len: 6 })),
        (MediumClass::Arcnet, &[0x2A][..], Some(HwAddr { hw_type: 7, hw_len: 1 })),
        (MediumClass::Ppp, &[][..], None),
    ];
    for (medium, addr, expected) in cases {
        let (backend, _log) = MockBackend::new(medium, addr);
        let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());
        driver.init().unwrap();
        assert_eq!(driver.hw_addr(), expected, "{:?}", medium);
    }
}

#[test]
fn token_ring_driver_frames_and_receives() {
    let (backend, log) = MockBackend::new(MediumClass::TokenRing, &[0xAA; 6]);
    let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());
    driver.init().unwrap();

    let broadcast = *driver.broadcast_address();
    let frame = driver.format(Some(&broadcast), Protocol::Ipv4).unwrap();
    assert_eq!(frame.payload_offset(), 22);
    // No minimum on this medium: 22-byte header plus payload, as-is.
    assert_eq!(frame.send(46, 0).unwrap(), 46);
    assert_eq!(log.lock().unwrap().sent[0].len(), 68);
}

#[test]
fn arcnet_driver_round_trip() {
    let (backend, log) = MockBackend::new(MediumClass::Arcnet, &[0x2A]);
    let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());
    driver.init().unwrap();

    let broadcast = *driver.broadcast_address();
    let frame = driver.format(Some(&broadcast), Protocol::Ipv4).unwrap();
    assert_eq!(frame.payload_offset(), 6);
    assert_eq!(frame.send(46, 0).unwrap(), 46);

    {
        let snapshot = log.lock().unwrap();
        let wire = &snapshot.sent[0];
        assert_eq!(wire.len(), 52);
        assert_eq!(wire[0], 0x2A); // source station
        assert_eq!(wire[1], 0x00); // broadcast station
        assert_eq!(wire[2], 0xD4); // DataPoint IP identifier
    }

    // Inbound: a broadcast ARP frame in the 1201 identifier space.
    let producer = driver.rx_producer();
    let mut inbound = vec![0x07, 0x00, 0xD5, 0x00, 0x00, 0x00];
    inbound.extend_from_slice(&[0u8; 28]);
    producer.push(inbound, 7);

    let arrived = driver.poll_arrived().unwrap();
    assert_eq!(arrived.protocol, Protocol::Arp);
    assert!(arrived.is_broadcast);

    // Exception frames are rejected and counted.
    producer.push(vec![0x07, 0x00, 0xD4, 0xFF, 0x00, 0x00], 8);
    assert!(driver.poll_arrived().is_none());
    assert_eq!(driver.stats().rejected, 1);
}

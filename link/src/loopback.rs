// Loopback short-circuit for self-addressed IP traffic
//
// Packets for the loopback network never touch the physical medium; they
// re-enter the receive queue wearing a synthetic link header so the
// layers above cannot tell them from real arrivals.

use alloc::boxed::Box;
use alloc::vec::Vec;

use smoltcp::wire::{Ipv4Packet, Ipv6Packet};

use crate::proto::Protocol;
use crate::types::LinkAddress;

/// Source address stamped on reinjected loopback frames.
pub const LOOPBACK_SRC: [u8; 6] = [0xCF, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Optional rewrite hook applied to the IP packet before reinjection.
/// The loopback device may modify the packet in place (an embedded echo
/// responder, for instance); the vector length after the call is the new
/// packet length.
pub type LoopbackHook = Box<dyn FnMut(&mut Vec<u8>) + Send>;

/// The loopback pseudo device address as a [`LinkAddress`].
pub fn loopback_addr() -> LinkAddress {
    LinkAddress::new(&LOOPBACK_SRC)
}

/// Whether an outbound IP packet is addressed to the loopback network
/// (127/8 for IPv4, ::1 for IPv6).
pub fn is_loopback_dest(protocol: Protocol, packet: &[u8]) -> bool {
    match protocol {
        Protocol::Ipv4 => Ipv4Packet::new_checked(packet)
            .map(|p| p.dst_addr().is_loopback())
            .unwrap_or(false),
        Protocol::Ipv6 => Ipv6Packet::new_checked(packet)
            .map(|p| p.dst_addr().is_loopback())
            .unwrap_or(false),
        _ => false,
    }
}

// Packet back-end abstraction
//
// The hardware-facing side of the driver: packet-driver shims, NIC
// drivers and capture libraries all sit behind this trait. Everything
// above it speaks link frames and knows nothing about the device.

use crate::error::LinkError;
use crate::multicast::McastList;
use crate::types::{LinkAddress, MediumClass};

/// Hardware receive filter modes, from narrowest to widest.
///
/// The ordering is meaningful: a mode accepts everything the modes below
/// it accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReceiveMode {
    Off,
    /// Frames addressed to the station only.
    Direct,
    /// Direct plus link broadcast.
    Broadcast,
    /// Broadcast plus a programmable multicast filter list.
    MulticastList,
    /// Broadcast plus every multicast frame, unfiltered.
    AllMulticast,
    /// Everything on the wire.
    Promiscuous,
}

/// What the back-end reports at initialisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendInfo {
    pub medium: MediumClass,
    pub address: LinkAddress,
}

/// Failures of the multicast filter primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MulticastError {
    /// The hardware has no multicast filter at all.
    NotSupported,
    /// No free filter slots left.
    NoSpace,
    /// Any other back-end failure.
    Backend,
}

/// Trait for packet back-ends
///
/// All hardware back-ends must implement this trait to be driven by the
/// link layer. Inbound frames are delivered out-of-band through the
/// driver's [`RxProducer`](crate::rxqueue::RxProducer) handle.
pub trait PacketBackend: Send {
    /// Bring the device up and report its medium class and station
    /// address.
    ///
    /// # Errors
    /// * [`LinkError::NoDriver`] if no usable device exists. The caller
    ///   falls back to a degraded loopback-only mode.
    /// * Any other error is fatal for networking.
    fn init(&mut self) -> Result<BackendInfo, LinkError>;

    /// Send a fully formatted link frame.
    ///
    /// # Returns
    /// The number of bytes put on the wire; 0 or an error both count as
    /// transmit failure.
    fn raw_send(&mut self, frame: &[u8]) -> Result<usize, LinkError>;

    /// Program a new station address.
    ///
    /// # Returns
    /// `true` if the hardware accepted the address.
    fn set_address(&mut self, addr: &LinkAddress) -> bool;

    /// Current hardware receive filter mode.
    fn receive_mode(&self) -> ReceiveMode;

    /// Switch the hardware receive filter mode.
    ///
    /// # Returns
    /// `true` if the mode was accepted.
    fn set_receive_mode(&mut self, mode: ReceiveMode) -> bool;

    /// Fetch the currently programmed multicast filter list.
    fn multicast_list(&self) -> Result<McastList, MulticastError>;

    /// Reprogram the multicast filter list.
    fn set_multicast_list(&mut self, list: &[LinkAddress]) -> Result<(), MulticastError>;

    /// Total inbound frames the device itself dropped. Reported for
    /// diagnostics when the driver is released.
    fn dropped(&self) -> u64 {
        0
    }

    /// Shut the device down. Called exactly once from release.
    fn teardown(&mut self);
}

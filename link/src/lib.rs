#![no_std]

// Link-layer driver core
// Presents the protocol engines a single uniform contract - format a
// frame, send it, poll for arrivals - while dispatching to per-medium
// framing rules, a shared transmit buffer, a bounded receive queue,
// loopback short-circuiting and multicast filter management.
//
// The TCP code above uses Ethernet constants for protocol numbers and
// an all-ones pattern for broadcast; each codec translates to the real
// wire layout of its medium. New media are implemented at this level,
// against these constants, never against device-dependent ones. The
// packet back-end (NIC driver or capture library) lies below this crate,
// behind the PacketBackend trait.

extern crate alloc;

pub mod backend;
pub mod codec;
pub mod driver;
pub mod error;
pub mod loopback;
pub mod multicast;
pub mod pppoe;
pub mod proto;
pub mod rxqueue;
pub mod txbuf;
pub mod types;

// Re-export commonly used types
pub use backend::{BackendInfo, MulticastError, PacketBackend, ReceiveMode};
pub use codec::{Classified, Formatted, FrameCodec};
pub use driver::{
    Arrived, DriverConfig, DriverState, IpRecursionToken, LastInfo, LinkDriver, LinkStats,
    TxFrame,
};
pub use error::LinkError;
pub use loopback::LoopbackHook;
pub use multicast::{McastList, MulticastMembership, MAX_MCAST_GROUPS};
pub use pppoe::PppoeSession;
pub use proto::Protocol;
pub use rxqueue::{ReceiveQueue, RxFrame, RxProducer};
pub use types::{HwAddr, LinkAddress, MediumClass};

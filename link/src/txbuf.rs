// Single shared transmit buffer
//
// We maintain only a single output buffer, and it gets used quickly then
// released. A second `format` before the previous `send` completes reuses
// the same region; the facade's `TxFrame` borrow makes that sequence
// impossible to express from safe code.

use alloc::boxed::Box;
use alloc::vec;

use crate::codec::{FrameCodec, TX_BUF_LEN};
use crate::pppoe::PppoeSession;
use crate::proto::Protocol;
use crate::types::LinkAddress;

pub struct TxBuffer {
    buf: Box<[u8]>,
    /// Protocol recorded by the last `format`, consulted by `send`.
    protocol: Protocol,
    /// Where the network payload starts behind the link header.
    payload_ofs: usize,
}

impl TxBuffer {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; TX_BUF_LEN].into_boxed_slice(),
            protocol: Protocol::Ipv4,
            payload_ofs: 0,
        }
    }

    /// Zero the whole buffer. Done once at driver initialisation.
    pub fn wipe(&mut self) {
        self.buf.fill(0);
    }

    /// Write the link header for the next outbound frame and remember the
    /// chosen protocol and payload offset for `send`.
    pub fn format(
        &mut self,
        codec: &FrameCodec,
        local: &LinkAddress,
        dest: Option<&LinkAddress>,
        protocol: Protocol,
        pppoe: Option<&PppoeSession>,
    ) -> usize {
        let formatted = codec.format(&mut self.buf, local, dest, protocol, pppoe);
        self.protocol = formatted.protocol;
        self.payload_ofs = formatted.payload_offset;
        self.payload_ofs
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn payload_ofs(&self) -> usize {
        self.payload_ofs
    }

    /// Reset the cached payload offset. Ethernet-class sends do this so
    /// the next frame starts from the standard header size even after a
    /// PPPoE rewrite.
    pub fn reset_payload_ofs(&mut self, ofs: usize) {
        self.payload_ofs = ofs;
    }

    pub fn frame(&self) -> &[u8] {
        &self.buf
    }

    pub fn frame_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// The writable payload region behind the formatted header.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let ofs = self.payload_ofs;
        &mut self.buf[ofs..]
    }
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// Driver lifecycle and dispatch facade
//
// The four operations the protocol engines actually use - format, send,
// poll_arrived, free - plus initialisation, address management and the
// hook points that let an external capture library substitute its own
// send/receive path.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::backend::{PacketBackend, ReceiveMode};
use crate::codec::{Classified, FrameCodec};
use crate::error::LinkError;
use crate::loopback::{self, LoopbackHook};
use crate::multicast::MulticastMembership;
use crate::pppoe::PppoeSession;
use crate::proto::{Protocol, ETH_II_BOUNDARY};
use crate::rxqueue::{ReceiveQueue, RxProducer};
use crate::txbuf::TxBuffer;
use crate::types::{HwAddr, LinkAddress, MediumClass};

/// Embedder-supplied driver settings.
#[derive(Clone, Copy, Debug)]
pub struct DriverConfig {
    /// Receive queue depth in frames.
    pub rx_queue_len: usize,
    /// MTU for header-less serial media; also bounds loopback packets.
    pub mtu: usize,
    /// Hand loopback-destined traffic to the back-end anyway instead of
    /// short-circuiting it. Useful when a capture stack below provides
    /// its own loopback device.
    pub loopback_to_driver: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            rx_queue_len: 32,
            mtu: 1500,
            loopback_to_driver: false,
        }
    }
}

/// Driver lifecycle states. `Released` is terminal; a driver is never
/// re-initialised within the same process run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Initialized,
    Released,
}

/// Size and timestamp of one direction's most recent traffic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrafficRecord {
    pub size: usize,
    pub tstamp_ms: i64,
}

/// Sizes and timestamps of the last frame sent and received.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LastInfo {
    pub tx: TrafficRecord,
    pub rx: TrafficRecord,
}

/// Drop and rejection counters. All silent paths are observable here.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkStats {
    /// IPv4 loopback packets dropped on the output side.
    pub ipv4_output_dropped: u64,
    /// IPv6 loopback packets dropped on the output side.
    pub ipv6_output_dropped: u64,
    /// IP-class frames dropped while the recursion guard was set.
    pub recursion_dropped: u64,
    /// Frames dropped as unsupported 802.3/LLC encapsulation.
    pub llc_dropped: u64,
    /// Frames the codec rejected outright.
    pub rejected: u64,
}

/// Supplies raw frames in place of the internal receive queue.
/// Non-serial suppliers must also report the frame's protocol.
pub type RecvHook = Box<dyn FnMut() -> Option<(Vec<u8>, Protocol)> + Send>;
/// Peeks at (and may consume, by returning `false`) each arrived frame.
pub type RecvPeek = Box<dyn FnMut(&mut [u8]) -> bool + Send>;
/// Transmits in place of the back-end; returns bytes sent, 0 on failure.
pub type XmitHook = Box<dyn FnMut(&[u8]) -> usize + Send>;

/// Clears the IP-recursion guard when dropped.
///
/// The protocol engine holds one of these while inside non-reentrant
/// IP-handling code; `poll_arrived` drops IP-class frames in the
/// meantime. Only one token should be live at a time.
pub struct IpRecursionToken {
    flag: Arc<AtomicBool>,
}

impl Drop for IpRecursionToken {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// An inbound frame as handed to the protocol engines.
#[derive(Debug)]
pub struct Arrived {
    data: Vec<u8>,
    header_offset: usize,
    payload_offset: usize,
    pub protocol: Protocol,
    pub is_broadcast: bool,
    /// Arrival timestamp in milliseconds since boot (0 for hook frames).
    pub tstamp_ms: i64,
}

impl Arrived {
    /// The network-layer payload behind the link header.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.payload_offset..]
    }

    /// The normalised link frame, header included.
    pub fn frame(&self) -> &[u8] {
        &self.data[self.header_offset..]
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// A formatted outbound frame, ready for its payload.
///
/// There is only one transmit buffer; holding this borrow is what keeps
/// a second `format` from clobbering the frame before `send` runs.
pub struct TxFrame<'a> {
    driver: &'a mut LinkDriver,
}

impl TxFrame<'_> {
    /// Offset of the payload behind the link header.
    pub fn payload_offset(&self) -> usize {
        self.driver.tx.payload_ofs()
    }

    /// The writable payload region.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        self.driver.tx.payload_mut()
    }

    /// Transmit the frame.
    ///
    /// # Arguments
    /// * `payload_len` - Network-layer payload length in bytes
    /// * `now_ms` - Current timestamp in milliseconds since boot
    ///
    /// # Returns
    /// Network-layer bytes sent. Loopback packets dropped on a full queue
    /// report `Ok(0)` and bump a drop counter.
    pub fn send(self, payload_len: usize, now_ms: i64) -> Result<usize, LinkError> {
        self.driver.send_formatted(payload_len, now_ms)
    }
}

/// The link-layer driver.
pub struct LinkDriver {
    backend: Box<dyn PacketBackend>,
    config: DriverConfig,
    state: DriverState,
    /// `None` only in the degraded no-driver fallback mode.
    medium: Option<MediumClass>,
    codec: FrameCodec,
    local_addr: LinkAddress,
    /// Station address at initialisation, restored at release.
    original_addr: LinkAddress,
    broadcast: LinkAddress,
    /// Receive mode at initialisation, restored at release.
    original_mode: Option<ReceiveMode>,
    tx: TxBuffer,
    rx: Arc<ReceiveQueue>,
    mcast: MulticastMembership,
    pppoe: Option<PppoeSession>,
    recv_hook: Option<RecvHook>,
    recv_peek: Option<RecvPeek>,
    xmit_hook: Option<XmitHook>,
    loopback_hook: Option<LoopbackHook>,
    ip_recursion: Arc<AtomicBool>,
    fatal_error: bool,
    stats: LinkStats,
    last: LastInfo,
}

impl LinkDriver {
    pub fn new(backend: Box<dyn PacketBackend>, config: DriverConfig) -> Self {
        Self {
            backend,
            config,
            state: DriverState::Uninitialized,
            medium: None,
            codec: FrameCodec::Null,
            local_addr: LinkAddress::EMPTY,
            original_addr: LinkAddress::EMPTY,
            broadcast: LinkAddress::EMPTY,
            original_mode: None,
            tx: TxBuffer::new(),
            rx: ReceiveQueue::new(config.rx_queue_len),
            mcast: MulticastMembership::new(),
            pppoe: None,
            recv_hook: None,
            recv_peek: None,
            xmit_hook: None,
            loopback_hook: None,
            ip_recursion: Arc::new(AtomicBool::new(false)),
            fatal_error: false,
            stats: LinkStats::default(),
            last: LastInfo::default(),
        }
    }

    /// Initialize the driver.
    ///
    /// Idempotent while initialised. When the back-end reports that no
    /// device exists the driver stays usable in a degraded loopback-only
    /// mode (null codec) and the error is still reported so the caller
    /// can treat networking as down.
    ///
    /// # Errors
    /// * [`LinkError::Released`] after release; re-initialisation within
    ///   the same process run is not supported.
    /// * [`LinkError::NoDriver`] if no device was found.
    pub fn init(&mut self) -> Result<(), LinkError> {
        match self.state {
            DriverState::Initialized => return Ok(()),
            DriverState::Released => return Err(LinkError::Released),
            DriverState::Uninitialized => {}
        }

        let info = match self.backend.init() {
            Ok(info) => info,
            Err(e) => {
                if e == LinkError::NoDriver {
                    // Initialize to some sane default: loopback keeps
                    // working, transmits silently go nowhere.
                    self.codec = FrameCodec::Null;
                    self.medium = None;
                    self.tx.wipe();
                    self.state = DriverState::Initialized;
                    log::warn!("no packet driver found, loopback-only mode");
                }
                return Err(e);
            }
        };

        self.medium = Some(info.medium);
        self.codec = FrameCodec::for_medium(info.medium);
        self.local_addr = info.address;
        // Save the station address in case we change it; changed back at
        // release.
        self.original_addr = info.address;
        self.broadcast = info.medium.broadcast();
        self.original_mode = Some(self.backend.receive_mode());
        self.tx.wipe();
        self.rx.wipe();
        self.state = DriverState::Initialized;
        log::info!("link up: {:?}, station {}", info.medium, self.local_addr);
        Ok(())
    }

    /// Release the driver.
    ///
    /// Idempotent. Restores the original station address and receive
    /// mode unless the fatal-error flag is set (the process is dying and
    /// the hardware may be in an unknown state). Always tears the
    /// back-end down.
    pub fn release(&mut self) {
        if self.state != DriverState::Initialized {
            return;
        }

        if !self.fatal_error {
            if let Some(medium) = self.medium {
                if !medium.is_serial() {
                    if self.local_addr != self.original_addr {
                        self.backend.set_address(&self.original_addr);
                    }
                    if let Some(mode) = self.original_mode {
                        if self.backend.receive_mode() != mode {
                            self.backend.set_receive_mode(mode);
                        }
                    }
                }
            }
            let drops = self.backend.dropped() + self.rx.dropped();
            if drops > 0 {
                log::info!("{} inbound frames dropped", drops);
            }
        }

        self.state = DriverState::Released;
        self.backend.teardown();
    }

    /// Format the link header for the next outbound frame.
    ///
    /// # Arguments
    /// * `dest` - Destination station; `None` keeps the previous bytes
    /// * `protocol` - Protocol the payload carries
    ///
    /// # Returns
    /// A [`TxFrame`] whose payload region the caller fills before
    /// consuming it with [`TxFrame::send`].
    pub fn format(
        &mut self,
        dest: Option<&LinkAddress>,
        protocol: Protocol,
    ) -> Result<TxFrame<'_>, LinkError> {
        if self.state != DriverState::Initialized {
            return Err(LinkError::NotInitialized);
        }
        self.tx.format(
            &self.codec,
            &self.local_addr,
            dest,
            protocol,
            self.pppoe.as_ref(),
        );
        Ok(TxFrame { driver: self })
    }

    fn send_formatted(&mut self, payload_len: usize, now_ms: i64) -> Result<usize, LinkError> {
        if self.state != DriverState::Initialized {
            return Err(LinkError::NotInitialized);
        }

        let protocol = self.tx.protocol();
        let ofs = self.tx.payload_ofs();

        if protocol.is_ip() && !self.config.loopback_to_driver {
            let frame = self.tx.frame();
            let end = (ofs + payload_len).min(frame.len());
            if loopback::is_loopback_dest(protocol, &frame[ofs..end]) {
                let sent = self.send_via_loopback(protocol, payload_len, now_ms);
                self.reset_after_send(protocol);
                return Ok(sent);
            }
        }

        if protocol == Protocol::PppoeSession {
            PppoeSession::patch_length(self.tx.frame_mut(), payload_len);
        }

        let total = self
            .codec
            .clamp_frame_len(ofs + payload_len, self.config.mtu)
            .min(self.tx.frame().len());

        let sent = if self.codec == FrameCodec::Null {
            // No hardware below; pretend the bytes left.
            total
        } else if let Some(hook) = self.xmit_hook.as_mut() {
            hook(&self.tx.frame()[..total])
        } else {
            self.backend.raw_send(&self.tx.frame()[..total]).unwrap_or(0)
        };

        self.reset_after_send(protocol);

        if sent > ofs {
            self.last.tx = TrafficRecord {
                size: sent,
                tstamp_ms: now_ms,
            };
            Ok(sent - ofs)
        } else {
            self.last.tx = TrafficRecord {
                size: 0,
                tstamp_ms: now_ms,
            };
            log::debug!("transmit failed ({} bytes on {:?})", total, self.codec);
            Err(LinkError::TransmitFailed)
        }
    }

    /// Hand the IP packet in the transmit buffer to the loopback device
    /// and reinject the result as a fresh arrival.
    fn send_via_loopback(&mut self, protocol: Protocol, payload_len: usize, now_ms: i64) -> usize {
        let ofs = self.tx.payload_ofs();
        let frame = self.tx.frame();
        let end = (ofs + payload_len).min(frame.len());
        let mut ip: Vec<u8> = frame[ofs..end].to_vec();

        if let Some(hook) = self.loopback_hook.as_mut() {
            hook(&mut ip);
        }
        let ip_len = ip.len();
        if ip_len == 0 || ip_len > self.config.mtu {
            return self.count_loopback_drop(protocol);
        }

        let data = if self.codec.is_headerless() {
            ip
        } else {
            // Wrap the packet in a header that reads as "sent to us by
            // the loopback device".
            let header_len = self.codec.header_len();
            let len = header_len + ip_len;
            let mut buf = vec![0u8; len.max(self.codec.min_frame_len())];
            let local = self.local_addr;
            let formatted = self.codec.format(&mut buf, &local, Some(&local), protocol, None);
            self.codec.set_source(&mut buf, &loopback::loopback_addr());
            buf[formatted.payload_offset..formatted.payload_offset + ip_len]
                .copy_from_slice(&ip);
            buf.truncate(formatted.payload_offset + ip_len);
            buf
        };

        if self.rx.push(data, now_ms) {
            ip_len
        } else {
            self.count_loopback_drop(protocol)
        }
    }

    fn count_loopback_drop(&mut self, protocol: Protocol) -> usize {
        if protocol == Protocol::Ipv6 {
            self.stats.ipv6_output_dropped += 1;
        } else {
            self.stats.ipv4_output_dropped += 1;
        }
        log::debug!("loopback packet dropped ({:?})", protocol);
        0
    }

    /// The next `format` must start from the standard header size even
    /// after a PPPoE session rewrite moved the payload offset.
    fn reset_after_send(&mut self, protocol: Protocol) {
        if protocol == Protocol::PppoeSession || self.codec == FrameCodec::Ethernet {
            self.tx.reset_payload_ofs(self.codec.header_len());
        }
    }

    /// Poll for an arrived frame.
    ///
    /// Returns the oldest pending frame classified by the active codec,
    /// or `None` if nothing is pending (or the driver is not
    /// initialised). Frames rejected by the codec, caught by the
    /// IP-recursion guard or carrying 802.3/LLC encapsulation are
    /// dropped and counted, not delivered.
    pub fn poll_arrived(&mut self) -> Option<Arrived> {
        if self.state != DriverState::Initialized {
            return None;
        }

        let (mut data, cls, tstamp_ms) = if self.recv_hook.is_some() {
            let (data, protocol) = (self.recv_hook.as_mut().unwrap())()?;
            let cls = self.classify_hook_frame(&data, protocol)?;
            (data, cls, 0)
        } else {
            let frame = self.rx.poll()?;
            let mut data = frame.data;
            let cls = match self.codec.classify(&mut data) {
                Ok(cls) => cls,
                Err(_) => {
                    self.stats.rejected += 1;
                    log::debug!("inbound frame rejected on {:?}", self.codec);
                    return None;
                }
            };
            (data, cls, frame.tstamp_ms)
        };

        if let Some(peek) = self.recv_peek.as_mut() {
            if !peek(&mut data[cls.header_offset..]) {
                // The peek hook consumed the frame.
                return None;
            }
        }

        // If the IP handlers cannot be re-entered, only accept non-IP
        // frames. PPPoE session frames are assumed to carry only IP.
        if self.ip_recursion.load(Ordering::Acquire)
            && matches!(
                cls.protocol,
                Protocol::Ipv4 | Protocol::Ipv6 | Protocol::PppoeSession
            )
        {
            self.stats.recursion_dropped += 1;
            return None;
        }

        // 802.3/LLC length-field encapsulation is not handled yet.
        // ARCNET identifiers are single bytes, always below the
        // boundary, so the test does not apply there.
        if self.codec != FrameCodec::Arcnet && cls.protocol.ether_type() < ETH_II_BOUNDARY {
            self.stats.llc_dropped += 1;
            log::debug!(
                "unsupported LLC frame dropped (type {:#06x})",
                cls.protocol.ether_type()
            );
            return None;
        }

        self.last.rx = TrafficRecord {
            size: data.len(),
            tstamp_ms,
        };

        Some(Arrived {
            data,
            header_offset: cls.header_offset,
            payload_offset: cls.payload_offset,
            protocol: cls.protocol,
            is_broadcast: cls.is_broadcast,
            tstamp_ms,
        })
    }

    /// Hook-supplied frames bypass the codec's queue-side fix-ups; they
    /// arrive pre-normalised with their protocol already known.
    fn classify_hook_frame(&self, data: &[u8], protocol: Protocol) -> Option<Classified> {
        if self.codec.is_headerless() {
            let first = *data.first()?;
            let protocol = if first >> 4 == 4 {
                Protocol::Ipv4
            } else {
                Protocol::Ipv6
            };
            Some(Classified {
                header_offset: 0,
                payload_offset: 0,
                protocol,
                is_broadcast: false,
            })
        } else {
            let header_len = self.codec.header_len();
            if data.len() < header_len {
                return None;
            }
            Some(Classified {
                header_offset: 0,
                payload_offset: header_len,
                protocol,
                is_broadcast: self.codec.wire_broadcast(data),
            })
        }
    }

    /// Free an arrived frame once it is no longer needed.
    ///
    /// `None` resets the whole receive queue, recovering from a desync.
    /// A no-op while a receive hook is active: the hook owns its own
    /// buffer lifecycle.
    pub fn free(&mut self, frame: Option<Arrived>) {
        if self.recv_hook.is_some() {
            return;
        }
        match frame {
            None => self.rx.wipe(),
            Some(frame) => drop(frame),
        }
    }

    /// Program a new station address.
    ///
    /// # Errors
    /// * [`LinkError::AddressRejected`] on serial and ARCNET media,
    ///   whose addresses are fixed.
    /// * [`LinkError::Backend`] if the hardware refused the address; the
    ///   local copy is left unchanged.
    pub fn set_address(&mut self, addr: &LinkAddress) -> Result<(), LinkError> {
        if self.state != DriverState::Initialized {
            return Err(LinkError::NotInitialized);
        }
        match self.medium {
            None => Err(LinkError::NoDriver),
            Some(m) if m.is_serial() || m == MediumClass::Arcnet => {
                Err(LinkError::AddressRejected)
            }
            Some(_) => {
                if self.backend.set_address(addr) {
                    self.local_addr = *addr;
                    Ok(())
                } else {
                    Err(LinkError::Backend("address change refused".into()))
                }
            }
        }
    }

    /// Hardware address type/length for ARP and BOOTP framing.
    /// `None` on serial media and in no-driver fallback mode.
    pub fn hw_addr(&self) -> Option<HwAddr> {
        self.medium.and_then(MediumClass::hw_addr)
    }

    /// Join a multicast group at the physical layer.
    pub fn join_multicast(&mut self, addr: &LinkAddress) -> Result<(), LinkError> {
        self.check_multicast_capable()?;
        self.mcast.join(self.backend.as_mut(), addr)
    }

    /// Leave a multicast group at the physical layer.
    pub fn leave_multicast(&mut self, addr: &LinkAddress) -> Result<(), LinkError> {
        self.check_multicast_capable()?;
        self.mcast.leave(self.backend.as_mut(), addr)
    }

    fn check_multicast_capable(&self) -> Result<(), LinkError> {
        if self.state != DriverState::Initialized {
            return Err(LinkError::NotInitialized);
        }
        match self.medium {
            None => Err(LinkError::NoDriver),
            Some(m) if m.is_serial() => Err(LinkError::UnsupportedMedium),
            Some(_) => Ok(()),
        }
    }

    /// Groups upper layers are logically joined to.
    pub fn multicast_groups(&self) -> &[LinkAddress] {
        self.mcast.groups()
    }

    /// Producer handle for the back-end/interrupt side to feed arrived
    /// frames into the receive queue.
    pub fn rx_producer(&self) -> RxProducer {
        RxProducer::new(self.rx.clone())
    }

    /// Set the guard that keeps `poll_arrived` from delivering IP-class
    /// frames while the protocol engine is inside non-reentrant code.
    /// The guard clears when the token drops.
    pub fn ip_recursion_token(&self) -> IpRecursionToken {
        self.ip_recursion.store(true, Ordering::Release);
        IpRecursionToken {
            flag: self.ip_recursion.clone(),
        }
    }

    /// Mark the process as dying: release will skip hardware restore.
    pub fn set_fatal_error(&mut self) {
        self.fatal_error = true;
    }

    /// Configure (or clear) the active PPPoE session. While set, IPv4
    /// traffic on Ethernet leaves inside PPPoE session frames.
    pub fn set_pppoe_session(&mut self, session: Option<PppoeSession>) {
        self.pppoe = session;
    }

    /// Replace the polling path with an external frame supplier.
    pub fn set_recv_hook(&mut self, hook: Option<RecvHook>) {
        self.recv_hook = hook;
    }

    /// Install a peek filter over arrived frames.
    pub fn set_recv_peek(&mut self, hook: Option<RecvPeek>) {
        self.recv_peek = hook;
    }

    /// Replace the back-end transmit path.
    pub fn set_xmit_hook(&mut self, hook: Option<XmitHook>) {
        self.xmit_hook = hook;
    }

    /// Install the loopback device's packet rewrite hook.
    pub fn set_loopback_hook(&mut self, hook: Option<LoopbackHook>) {
        self.loopback_hook = hook;
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Medium class reported by the back-end; `None` in no-driver
    /// fallback mode or before initialisation.
    pub fn medium(&self) -> Option<MediumClass> {
        self.medium
    }

    pub fn local_address(&self) -> &LinkAddress {
        &self.local_addr
    }

    pub fn broadcast_address(&self) -> &LinkAddress {
        &self.broadcast
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn last(&self) -> &LastInfo {
        &self.last
    }

    /// Frames the receive queue dropped because it was full.
    pub fn rx_dropped(&self) -> u64 {
        self.rx.dropped()
    }
}

impl Drop for LinkDriver {
    // Deferred release: the driver restores the hardware even when the
    // embedder forgets to call release() on the way out.
    fn drop(&mut self) {
        self.release();
    }
}

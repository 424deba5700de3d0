// Shared mock back-end for the integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use link::{
    BackendInfo, LinkAddress, LinkError, McastList, MediumClass, MulticastError, PacketBackend,
    ReceiveMode,
};

/// Everything the mock back-end observed, shared with the test body.
pub struct BackendLog {
    pub sent: Vec<Vec<u8>>,
    pub mode: ReceiveMode,
    pub filter: Vec<LinkAddress>,
    pub addr: LinkAddress,
    pub teardowns: usize,
}

/// Behaviour knobs for the mock back-end.
pub struct MockBackend {
    pub medium: MediumClass,
    pub init_error: Option<LinkError>,
    pub filter_slots: usize,
    pub multicast_supported: bool,
    pub allow_multicast_list_mode: bool,
    pub allow_promiscuous: bool,
    pub refuse_set_address: bool,
    pub fail_send: bool,
    pub log: Arc<Mutex<BackendLog>>,
}

impl MockBackend {
    pub fn new(medium: MediumClass, addr: &[u8]) -> (Self, Arc<Mutex<BackendLog>>) {
        let log = Arc::new(Mutex::new(BackendLog {
            sent: Vec::new(),
            mode: ReceiveMode::Broadcast,
            filter: Vec::new(),
            addr: LinkAddress::new(addr),
            teardowns: 0,
        }));
        let backend = MockBackend {
            medium,
            init_error: None,
            filter_slots: 4,
            multicast_supported: true,
            allow_multicast_list_mode: true,
            allow_promiscuous: true,
            refuse_set_address: false,
            fail_send: false,
            log: log.clone(),
        };
        (backend, log)
    }

    pub fn ethernet() -> (Self, Arc<Mutex<BackendLog>>) {
        Self::new(MediumClass::Ethernet, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF])
    }
}

impl PacketBackend for MockBackend {
    fn init(&mut self) -> Result<BackendInfo, LinkError> {
        if let Some(e) = self.init_error.clone() {
            return Err(e);
        }
        Ok(BackendInfo {
            medium: self.medium,
            address: self.log.lock().unwrap().addr,
        })
    }

    fn raw_send(&mut self, frame: &[u8]) -> Result<usize, LinkError> {
        if self.fail_send {
            return Ok(0);
        }
        let mut log = self.log.lock().unwrap();
        log.sent.push(frame.to_vec());
        Ok(frame.len())
    }

    fn set_address(&mut self, addr: &LinkAddress) -> bool {
        if self.refuse_set_address {
            return false;
        }
        self.log.lock().unwrap().addr = *addr;
        true
    }

    fn receive_mode(&self) -> ReceiveMode {
        self.log.lock().unwrap().mode
    }

    fn set_receive_mode(&mut self, mode: ReceiveMode) -> bool {
        if mode == ReceiveMode::MulticastList && !self.allow_multicast_list_mode {
            return false;
        }
        if mode == ReceiveMode::Promiscuous && !self.allow_promiscuous {
            return false;
        }
        self.log.lock().unwrap().mode = mode;
        true
    }

    fn multicast_list(&self) -> Result<McastList, MulticastError> {
        if !self.multicast_supported {
            return Err(MulticastError::NotSupported);
        }
        let mut list = McastList::new();
        for addr in &self.log.lock().unwrap().filter {
            list.push(*addr).map_err(|_| MulticastError::Backend)?;
        }
        Ok(list)
    }

    fn set_multicast_list(&mut self, list: &[LinkAddress]) -> Result<(), MulticastError> {
        if !self.multicast_supported {
            return Err(MulticastError::NotSupported);
        }
        if list.len() > self.filter_slots {
            return Err(MulticastError::NoSpace);
        }
        self.log.lock().unwrap().filter = list.to_vec();
        Ok(())
    }

    fn teardown(&mut self) {
        self.log.lock().unwrap().teardowns += 1;
    }
}

/// A minimal well-formed IPv4 header with the given destination.
pub fn ipv4_packet(dst: [u8; 4]) -> Vec<u8> {
    let mut packet = vec![0u8; 20];
    packet[0] = 0x45; // version 4, IHL 5
    packet[2..4].copy_from_slice(&20u16.to_be_bytes());
    packet[8] = 64; // TTL
    packet[9] = 17; // UDP
    packet[12..16].copy_from_slice(&[10, 0, 0, 1]);
    packet[16..20].copy_from_slice(&dst);
    packet
}

/// A minimal IPv6 header (no payload) with the given destination.
pub fn ipv6_packet(dst: [u8; 16]) -> Vec<u8> {
    let mut packet = vec![0u8; 40];
    packet[0] = 0x60;
    packet[6] = 17; // UDP
    packet[7] = 64; // hop limit
    packet[8] = 0xFE;
    packet[9] = 0x80;
    packet[24..40].copy_from_slice(&dst);
    packet
}

/// A raw Ethernet frame carrying `payload` with the given type field.
pub fn eth_frame(dst: [u8; 6], src: [u8; 6], ether_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(&dst);
    frame.extend_from_slice(&src);
    frame.extend_from_slice(&ether_type.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

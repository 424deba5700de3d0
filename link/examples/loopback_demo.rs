// Example: driving the link layer against a trivial in-memory back-end
//
// Initialises an Ethernet driver, sends one packet to the wire and one to
// the loopback network, then polls both arrivals back. Run with:
//
//     cargo run --example loopback_demo

use link::{
    BackendInfo, DriverConfig, LinkAddress, LinkDriver, LinkError, McastList, MediumClass,
    MulticastError, PacketBackend, Protocol, ReceiveMode,
};

/// A back-end that prints what it is asked to transmit.
struct DemoBackend {
    mode: ReceiveMode,
}

impl PacketBackend for DemoBackend {
    fn init(&mut self) -> Result<BackendInfo, LinkError> {
        Ok(BackendInfo {
            medium: MediumClass::Ethernet,
            address: LinkAddress::new(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
        })
    }

    fn raw_send(&mut self, frame: &[u8]) -> Result<usize, LinkError> {
        println!("wire <- {} bytes, type {:02x}{:02x}", frame.len(), frame[12], frame[13]);
        Ok(frame.len())
    }

    fn set_address(&mut self, _addr: &LinkAddress) -> bool {
        true
    }

    fn receive_mode(&self) -> ReceiveMode {
        self.mode
    }

    fn set_receive_mode(&mut self, mode: ReceiveMode) -> bool {
        self.mode = mode;
        true
    }

    fn multicast_list(&self) -> Result<McastList, MulticastError> {
        Ok(McastList::new())
    }

    fn set_multicast_list(&mut self, _list: &[LinkAddress]) -> Result<(), MulticastError> {
        Ok(())
    }

    fn teardown(&mut self) {
        println!("backend down");
    }
}

fn ipv4_packet(dst: [u8; 4]) -> Vec<u8> {
    let mut packet = vec![0u8; 20];
    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&20u16.to_be_bytes());
    packet[8] = 64;
    packet[9] = 17;
    packet[12..16].copy_from_slice(&[10, 0, 0, 1]);
    packet[16..20].copy_from_slice(&dst);
    packet
}

fn main() {
    let backend = DemoBackend {
        mode: ReceiveMode::Broadcast,
    };
    let mut driver = LinkDriver::new(Box::new(backend), DriverConfig::default());
    driver.init().expect("driver init");
    println!("station {}", driver.local_address());

    // One packet to the wire...
    let packet = ipv4_packet([192, 168, 1, 1]);
    let broadcast = *driver.broadcast_address();
    let mut frame = driver.format(Some(&broadcast), Protocol::Ipv4).expect("format");
    frame.payload_mut()[..packet.len()].copy_from_slice(&packet);
    let sent = frame.send(packet.len(), 0).expect("send");
    println!("sent {} payload bytes", sent);

    // ...and one to ourselves.
    let packet = ipv4_packet([127, 0, 0, 1]);
    let mut frame = driver.format(None, Protocol::Ipv4).expect("format");
    frame.payload_mut()[..packet.len()].copy_from_slice(&packet);
    frame.send(packet.len(), 1).expect("send");

    while let Some(arrived) = driver.poll_arrived() {
        println!(
            "arrived: {:?}, {} payload bytes, broadcast: {}",
            arrived.protocol,
            arrived.payload().len(),
            arrived.is_broadcast
        );
        driver.free(Some(arrived));
    }

    driver.release();
}

//! Frame decoding down to the UDP header.

use pnet_packet::ethernet::{EtherType, EtherTypes, EthernetPacket};
use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::ipv6::Ipv6Packet;
use pnet_packet::udp::UdpPacket;
use pnet_packet::vlan::VlanPacket;
use pnet_packet::{Packet, PacketSize};
use std::net::IpAddr;

/// Linux cooked capture header length
const SLL_HEADER_LEN: usize = 16;

/// Link-layer framing of captured bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// DLT_EN10MB
    Ethernet,
    /// DLT_LINUX_SLL ("any" device)
    LinuxSll,
    /// Bare IPv4/IPv6 (tunnels, `DLT_RAW`)
    RawIp,
}

impl LinkType {
    /// Map a pcap data link type number
    #[must_use]
    pub const fn from_dlt(dlt: i32) -> Option<Self> {
        match dlt {
            1 => Some(Self::Ethernet),
            113 => Some(Self::LinuxSll),
            12 | 14 | 101 => Some(Self::RawIp),
            _ => None,
        }
    }
}

/// Addresses and port of a decoded UDP datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFlow {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub dst_port: u16,
}

/// Decode a captured frame into a UDP flow to `port`.
///
/// Anything else (other protocols, other ports, truncated frames, non-first
/// IPv4 fragments) yields `None`.
#[must_use]
pub fn decode_frame(link: LinkType, frame: &[u8], port: u16) -> Option<DecodedFlow> {
    let flow = match link {
        LinkType::Ethernet => ethernet(frame)?,
        LinkType::LinuxSll => sll(frame)?,
        LinkType::RawIp => raw_ip(frame)?,
    };
    (flow.dst_port == port).then_some(flow)
}

fn ethernet(frame: &[u8]) -> Option<DecodedFlow> {
    let eth = EthernetPacket::new(frame)?;
    let mut ethertype = eth.get_ethertype();
    let mut payload = eth.payload();

    while ethertype == EtherTypes::Vlan {
        let vlan = VlanPacket::new(payload)?;
        ethertype = vlan.get_ethertype();
        payload = &payload[vlan.packet_size()..];
    }

    by_ethertype(ethertype, payload)
}

fn sll(frame: &[u8]) -> Option<DecodedFlow> {
    let header = frame.get(..SLL_HEADER_LEN)?;
    let ethertype = EtherType(u16::from_be_bytes([header[14], header[15]]));
    by_ethertype(ethertype, &frame[SLL_HEADER_LEN..])
}

fn raw_ip(frame: &[u8]) -> Option<DecodedFlow> {
    match frame.first()? >> 4 {
        4 => ipv4(frame),
        6 => ipv6(frame),
        _ => None,
    }
}

fn by_ethertype(ethertype: EtherType, payload: &[u8]) -> Option<DecodedFlow> {
    match ethertype {
        EtherTypes::Ipv4 => ipv4(payload),
        EtherTypes::Ipv6 => ipv6(payload),
        _ => None,
    }
}

fn ipv4(payload: &[u8]) -> Option<DecodedFlow> {
    let ip = Ipv4Packet::new(payload)?;
    if ip.get_fragment_offset() != 0 {
        return None;
    }
    udp(
        ip.get_next_level_protocol(),
        ip.payload(),
        IpAddr::V4(ip.get_source()),
        IpAddr::V4(ip.get_destination()),
    )
}

fn ipv6(payload: &[u8]) -> Option<DecodedFlow> {
    let ip = Ipv6Packet::new(payload)?;
    udp(
        ip.get_next_header(),
        ip.payload(),
        IpAddr::V6(ip.get_source()),
        IpAddr::V6(ip.get_destination()),
    )
}

fn udp(
    protocol: IpNextHeaderProtocol,
    payload: &[u8],
    src: IpAddr,
    dst: IpAddr,
) -> Option<DecodedFlow> {
    if protocol != IpNextHeaderProtocols::Udp {
        return None;
    }
    let udp = UdpPacket::new(payload)?;
    Some(DecodedFlow {
        src,
        dst,
        dst_port: udp.get_destination(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pnet_packet::ethernet::MutableEthernetPacket;
    use pnet_packet::ipv4::MutableIpv4Packet;
    use pnet_packet::ipv6::MutableIpv6Packet;
    use pnet_packet::udp::MutableUdpPacket;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const UDP_LEN: usize = 8;

    pub(crate) fn ipv4_udp(src: Ipv4Addr, dst: Ipv4Addr, dst_port: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 20 + UDP_LEN];
        {
            let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length(28);
            ip.set_ttl(64);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
            ip.set_source(src);
            ip.set_destination(dst);
        }
        let mut udp = MutableUdpPacket::new(&mut buf[20..]).unwrap();
        udp.set_source(51820);
        udp.set_destination(dst_port);
        udp.set_length(8);
        buf
    }

    pub(crate) fn ethernet_frame(ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 14 + payload.len()];
        let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
        eth.set_ethertype(ethertype);
        eth.set_payload(payload);
        buf
    }

    fn src() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 5)
    }

    fn dst() -> Ipv4Addr {
        Ipv4Addr::new(198, 51, 100, 7)
    }

    #[test]
    fn test_link_types() {
        assert_eq!(LinkType::from_dlt(1), Some(LinkType::Ethernet));
        assert_eq!(LinkType::from_dlt(113), Some(LinkType::LinuxSll));
        assert_eq!(LinkType::from_dlt(101), Some(LinkType::RawIp));
        assert_eq!(LinkType::from_dlt(105), None);
    }

    #[test]
    fn test_decode_ethernet_ipv4() {
        let frame = ethernet_frame(EtherTypes::Ipv4, &ipv4_udp(src(), dst(), 3544));
        let flow = decode_frame(LinkType::Ethernet, &frame, 3544).unwrap();
        assert_eq!(flow.src, IpAddr::V4(src()));
        assert_eq!(flow.dst, IpAddr::V4(dst()));
        assert_eq!(flow.dst_port, 3544);
    }

    #[test]
    fn test_other_port_is_ignored() {
        let frame = ethernet_frame(EtherTypes::Ipv4, &ipv4_udp(src(), dst(), 53));
        assert!(decode_frame(LinkType::Ethernet, &frame, 3544).is_none());
    }

    #[test]
    fn test_decode_vlan_tagged() {
        let ip = ipv4_udp(src(), dst(), 3544);
        let mut tagged = vec![0u8, 10, 0x08, 0x00];
        tagged.extend_from_slice(&ip);
        let frame = ethernet_frame(EtherTypes::Vlan, &tagged);
        assert!(decode_frame(LinkType::Ethernet, &frame, 3544).is_some());
    }

    #[test]
    fn test_decode_sll_and_raw() {
        let ip = ipv4_udp(src(), dst(), 3544);
        let mut sll = vec![0u8; SLL_HEADER_LEN];
        sll[14] = 0x08;
        sll[15] = 0x00;
        sll.extend_from_slice(&ip);
        assert!(decode_frame(LinkType::LinuxSll, &sll, 3544).is_some());
        assert!(decode_frame(LinkType::RawIp, &ip, 3544).is_some());
    }

    #[test]
    fn test_decode_ipv6() {
        let mut buf = vec![0u8; 40 + UDP_LEN];
        {
            let mut ip = MutableIpv6Packet::new(&mut buf).unwrap();
            ip.set_version(6);
            ip.set_payload_length(8);
            ip.set_next_header(IpNextHeaderProtocols::Udp);
            ip.set_hop_limit(64);
            ip.set_source(Ipv6Addr::LOCALHOST);
            ip.set_destination("2001:0:4136:e378::1".parse().unwrap());
        }
        {
            let mut udp = MutableUdpPacket::new(&mut buf[40..]).unwrap();
            udp.set_destination(3544);
            udp.set_length(8);
        }
        let flow = decode_frame(LinkType::RawIp, &buf, 3544).unwrap();
        assert_eq!(flow.dst.to_string(), "2001:0:4136:e378::1");
    }

    #[test]
    fn test_truncated_and_non_first_fragment() {
        let ip = ipv4_udp(src(), dst(), 3544);
        assert!(decode_frame(LinkType::RawIp, &ip[..12], 3544).is_none());
        assert!(decode_frame(LinkType::RawIp, &[], 3544).is_none());

        let mut fragment = ip;
        MutableIpv4Packet::new(&mut fragment)
            .unwrap()
            .set_fragment_offset(185);
        assert!(decode_frame(LinkType::RawIp, &fragment, 3544).is_none());
    }
}

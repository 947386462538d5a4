use crate::interface::InterfaceId;

use std::fmt::Debug;
use std::net::Ipv6Addr;

/// Largest datagram a raw socket can hand us.
pub const MAX_PACKET_LEN: usize = 65536;

#[derive(Debug, Clone, Copy)]
pub struct PacketInfo {
    /// source address for sending, or destination address for receiving
    pub addr: Ipv6Addr,

    /// interface where the packet is sent or received
    pub if_id: InterfaceId,
}

#[derive(Debug, Clone, Copy)]
pub struct PacketHopLimit {
    pub hop_limit: u8,
}

/// Buffer exchanged with the raw socket.
pub struct Packet {
    /// destination address for sending, or source address for receiving
    pub peer_addr: Ipv6Addr,

    /// packet data
    pub data: Vec<u8>,

    /// length of packet data
    pub data_len: usize,

    /// packet information
    pub info: Option<PacketInfo>,

    /// hop limit
    pub hop_limit: Option<PacketHopLimit>,
}

impl Packet {
    pub fn new() -> Self {
        Self {
            peer_addr: Ipv6Addr::UNSPECIFIED,
            data: vec![0; MAX_PACKET_LEN],
            data_len: 0,
            info: None,
            hop_limit: None,
        }
    }

    /// An outbound packet carrying `payload`.
    pub fn outbound(dst: Ipv6Addr, src: Ipv6Addr, if_id: InterfaceId, hop_limit: u8, payload: &[u8]) -> Self {
        Self {
            peer_addr: dst,
            data: payload.to_vec(),
            data_len: payload.len(),
            info: Some(PacketInfo { addr: src, if_id }),
            hop_limit: Some(PacketHopLimit { hop_limit }),
        }
    }

    pub fn data(&self) -> &[u8] {
        let len = self.data_len;
        if len > self.data.len() {
            &self.data
        } else {
            &self.data[..len]
        }
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Packet");
        let mut debug = debug.field("peer_addr", &self.peer_addr)
            .field("data_len", &self.data_len);
        if let Some(info) = &self.info {
            debug = debug.field("info", &info);
        }
        if let Some(hop_limit) = &self.hop_limit {
            debug = debug.field("hop_limit", &hop_limit);
        }
        debug.finish()
    }
}

/// How the packet reached us, as seen by the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Addressed to this host.
    Host,
    /// Sent to a multicast group we are in.
    Multicast,
    /// Our own transmission looped back.
    Loopback,
    /// Addressed to another host.
    OtherHost,
}

/// A received ICMPv6 message together with the IPv6 header fields the
/// engine checks.
#[derive(Clone)]
pub struct InboundPacket {
    pub if_id: InterfaceId,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub hop_limit: u8,
    pub pkt_type: PacketType,
    /// Replayed from the proxy delay queue.
    pub locally_enqueued: bool,
    /// The ICMPv6 message, starting at its type byte.
    pub data: Vec<u8>,
}

impl InboundPacket {
    /// `pkt_type` follows from the destination address.
    pub fn new(if_id: InterfaceId, src: Ipv6Addr, dst: Ipv6Addr, hop_limit: u8, data: Vec<u8>) -> Self {
        let pkt_type = if dst.is_multicast() { PacketType::Multicast } else { PacketType::Host };
        Self { if_id, src, dst, hop_limit, pkt_type, locally_enqueued: false, data }
    }

    /// Builds from a raw socket receive. Packets without PKTINFO cannot be
    /// attributed to an interface and yield `None`.
    pub fn from_received(packet: &Packet) -> Option<Self> {
        let info = packet.info?;
        let hop_limit = packet.hop_limit.map(|h| h.hop_limit)?;
        Some(Self::new(info.if_id, packet.peer_addr, info.addr, hop_limit, packet.data().to_vec()))
    }

    pub fn with_pkt_type(mut self, pkt_type: PacketType) -> Self {
        self.pkt_type = pkt_type;
        self
    }

    pub fn icmp6_type(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub fn icmp6_code(&self) -> Option<u8> {
        self.data.get(1).copied()
    }
}

impl Debug for InboundPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundPacket")
            .field("if_id", &self.if_id)
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("hop_limit", &self.hop_limit)
            .field("pkt_type", &self.pkt_type)
            .field("locally_enqueued", &self.locally_enqueued)
            .field("len", &self.data.len())
            .finish()
    }
}

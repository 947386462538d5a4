#![allow(dead_code)]

use std::net::Ipv6Addr;
use std::sync::Arc;

use ndiscd::config::InterfaceConfig;
use ndiscd::icmp6::ndp;
use ndiscd::icmp6::packet::InboundPacket;
use ndiscd::interface::InterfaceId;
use ndiscd::interface::LinkAddr;
use ndiscd::memory::MemoryStack;
use ndiscd::memory::RecordingDeferredQueue;
use ndiscd::memory::RecordingNotifier;
use ndiscd::memory::RecordingTransmitter;
use ndiscd::ndisc::collab::AddrFlags;
use ndiscd::ndisc::collab::OutboundMessage;
use ndiscd::ndisc::link::LinkInfo;
use ndiscd::ndisc::NdiscContext;
use ndiscd::ndisc::NdiscError;

pub const IF_ID: InterfaceId = InterfaceId::new(2);
pub const OUR_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];
pub const PEER_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x02];

pub fn addr(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

pub fn mac(bytes: [u8; 6]) -> LinkAddr {
    LinkAddr::ethernet(bytes)
}

/// A context serving one interface with fe80::1, wired to in-memory
/// collaborators.
pub struct Harness {
    pub ctx: NdiscContext,
    pub stack: MemoryStack,
    pub link: LinkInfo,
    pub link_local: Ipv6Addr,
    pub transmitter: Arc<RecordingTransmitter>,
    pub notifier: Arc<RecordingNotifier>,
    pub deferred: Arc<RecordingDeferredQueue>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(InterfaceConfig::default())
    }

    pub fn with_config(cnf: InterfaceConfig) -> Self {
        Self::with_link("eth0", LinkInfo::ethernet(OUR_MAC, 1500), cnf)
    }

    /// A point-to-point uplink without hardware addresses.
    pub fn headerless(cnf: InterfaceConfig) -> Self {
        Self::with_link("ppp0", LinkInfo::headerless(1492), cnf)
    }

    pub fn with_link(name: &str, link: LinkInfo, cnf: InterfaceConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let stack = MemoryStack::new();
        let transmitter = Arc::new(RecordingTransmitter::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let deferred = Arc::new(RecordingDeferredQueue::new());
        let ctx = NdiscContext::new(stack.collaborators(transmitter.clone(), notifier.clone(), deferred.clone()));

        stack.neighbors.register_device(IF_ID, link.clone());
        ctx.add_interface(IF_ID, name, link.clone(), cnf);

        let link_local = addr("fe80::1");
        stack.addrconf.add_address(IF_ID, link_local, AddrFlags::NONE);

        Self { ctx, stack, link, link_local, transmitter, notifier, deferred }
    }

    /// Receives `data` on the served interface with a hop limit of 255.
    pub fn deliver(&self, src: Ipv6Addr, dst: Ipv6Addr, data: Vec<u8>) -> Result<(), NdiscError> {
        self.ctx.receive(&InboundPacket::new(IF_ID, src, dst, 255, data))
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.transmitter.take()
    }
}

pub fn lladdr_option(kind: u8, mac: [u8; 6]) -> Vec<u8> {
    let mut opt = vec![kind, 1];
    opt.extend_from_slice(&mac);
    opt
}

pub fn sllao(mac: [u8; 6]) -> Vec<u8> {
    lladdr_option(1, mac)
}

pub fn tllao(mac: [u8; 6]) -> Vec<u8> {
    lladdr_option(2, mac)
}

/// Source link-layer option as sent on links without hardware addresses.
pub fn empty_sllao() -> Vec<u8> {
    vec![1, 1, 0, 0, 0, 0, 0, 0]
}

pub fn mtu_option(mtu: u32) -> Vec<u8> {
    let mut opt = vec![5, 1, 0, 0];
    opt.extend_from_slice(&mtu.to_be_bytes());
    opt
}

pub fn prefix_option(prefix: Ipv6Addr, prefix_len: u8, flags: u8, valid: u32, preferred: u32) -> Vec<u8> {
    let mut opt = vec![3, 4, prefix_len, flags];
    opt.extend_from_slice(&valid.to_be_bytes());
    opt.extend_from_slice(&preferred.to_be_bytes());
    opt.extend_from_slice(&[0; 4]);
    opt.extend_from_slice(&prefix.octets());
    opt
}

pub fn route_info_option(prefix: Ipv6Addr, prefix_len: u8, pref: ndp::RouterPreference, lifetime: u32) -> Vec<u8> {
    let mut opt = vec![24, 3, prefix_len, pref.bits() << 3];
    opt.extend_from_slice(&lifetime.to_be_bytes());
    opt.extend_from_slice(&prefix.octets());
    opt
}

pub fn rdnss_option(lifetime: u32, server: Ipv6Addr) -> Vec<u8> {
    let mut opt = vec![25, 3, 0, 0];
    opt.extend_from_slice(&lifetime.to_be_bytes());
    opt.extend_from_slice(&server.octets());
    opt
}

/// Redirected Header carrying `packet`, padded to the option unit.
pub fn redirected_header_option(packet: &[u8]) -> Vec<u8> {
    let len = (packet.len() + 8 + 7) & !7;
    let mut opt = vec![4, (len / 8) as u8, 0, 0, 0, 0, 0, 0];
    opt.extend_from_slice(packet);
    opt.resize(len, 0);
    opt
}

pub fn ns(target: Ipv6Addr, options: &[u8]) -> Vec<u8> {
    let mut msg = vec![ndp::NEIGHBOR_SOLICITATION, 0, 0, 0, 0, 0, 0, 0];
    msg.extend_from_slice(&target.octets());
    msg.extend_from_slice(options);
    msg
}

pub fn na(flags: u8, target: Ipv6Addr, options: &[u8]) -> Vec<u8> {
    let mut msg = vec![ndp::NEIGHBOR_ADVERTISEMENT, 0, 0, 0, flags, 0, 0, 0];
    msg.extend_from_slice(&target.octets());
    msg.extend_from_slice(options);
    msg
}

pub fn rs(options: &[u8]) -> Vec<u8> {
    let mut msg = vec![ndp::ROUTER_SOLICITATION, 0, 0, 0, 0, 0, 0, 0];
    msg.extend_from_slice(options);
    msg
}

/// Fixed RA fields; options are appended by [`Ra::build`].
#[derive(Debug, Clone, Copy)]
pub struct Ra {
    pub hop_limit: u8,
    pub managed: bool,
    pub other: bool,
    pub preference: ndp::RouterPreference,
    pub lifetime: u16,
    pub reachable_ms: u32,
    pub retrans_ms: u32,
}

impl Default for Ra {
    fn default() -> Self {
        Self {
            hop_limit: 64,
            managed: false,
            other: false,
            preference: ndp::RouterPreference::Medium,
            lifetime: 1800,
            reachable_ms: 0,
            retrans_ms: 0,
        }
    }
}

impl Ra {
    pub fn build(&self, options: &[u8]) -> Vec<u8> {
        let mut flags = self.preference.bits() << 3;
        if self.managed {
            flags |= ndp::RA_FLAG_MANAGED;
        }
        if self.other {
            flags |= ndp::RA_FLAG_OTHER;
        }
        let mut msg = vec![ndp::ROUTER_ADVERTISEMENT, 0, 0, 0, self.hop_limit, flags];
        msg.extend_from_slice(&self.lifetime.to_be_bytes());
        msg.extend_from_slice(&self.reachable_ms.to_be_bytes());
        msg.extend_from_slice(&self.retrans_ms.to_be_bytes());
        msg.extend_from_slice(options);
        msg
    }
}

pub fn redirect(target: Ipv6Addr, destination: Ipv6Addr, options: &[u8]) -> Vec<u8> {
    let mut msg = vec![ndp::REDIRECT, 0, 0, 0, 0, 0, 0, 0];
    msg.extend_from_slice(&target.octets());
    msg.extend_from_slice(&destination.octets());
    msg.extend_from_slice(options);
    msg
}

/// An IPv6 packet with a UDP next header and `payload_len` zero bytes.
pub fn ipv6_packet(src: Ipv6Addr, dst: Ipv6Addr, payload_len: usize) -> Vec<u8> {
    let mut pkt = vec![0x60, 0, 0, 0];
    pkt.extend_from_slice(&(payload_len as u16).to_be_bytes());
    pkt.extend_from_slice(&[17, 64]);
    pkt.extend_from_slice(&src.octets());
    pkt.extend_from_slice(&dst.octets());
    pkt.resize(40 + payload_len, 0);
    pkt
}

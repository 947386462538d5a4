mod common;

use common::*;

use ndiscd::icmp6::packet::InboundPacket;
use ndiscd::icmp6::packet::PacketType;
use ndiscd::interface::InterfaceId;
use ndiscd::ndisc::addr::solicited_node_multicast;
use ndiscd::ndisc::addr::ALL_NODES;
use ndiscd::ndisc::collab::NudState;
use ndiscd::ndisc::link::LinkInfo;
use ndiscd::ndisc::NdiscError;

fn solicitation(h: &Harness) -> Vec<u8> {
    ns(h.link_local, &sllao(PEER_MAC))
}

#[test]
fn hop_limit_below_255_is_dropped() {
    let h = Harness::new();
    let packet = InboundPacket::new(IF_ID, addr("fe80::2"), solicited_node_multicast(&h.link_local), 254, solicitation(&h));

    let result = h.ctx.receive(&packet);

    assert!(matches!(result, Err(NdiscError::ProtocolViolation(_))));
    assert!(h.stack.neighbors.is_empty());
    assert!(h.sent().is_empty());
}

#[test]
fn nonzero_code_is_dropped() {
    let h = Harness::new();
    let mut data = solicitation(&h);
    data[1] = 1;

    let result = h.deliver(addr("fe80::2"), solicited_node_multicast(&h.link_local), data);

    assert!(matches!(result, Err(NdiscError::ProtocolViolation(_))));
    assert!(h.sent().is_empty());
}

#[test]
fn other_icmp_types_pass_through() {
    let h = Harness::new();
    h.deliver(addr("fe80::2"), h.link_local, vec![128, 0, 0, 0, 0, 1, 0, 1]).unwrap();
    assert!(h.sent().is_empty());
}

#[test]
fn short_messages_are_truncated() {
    let h = Harness::new();
    let result = h.deliver(addr("fe80::2"), h.link_local, vec![135, 0]);
    assert!(matches!(result, Err(NdiscError::Truncated(_))));

    let result = h.deliver(addr("fe80::2"), h.link_local, vec![135, 0, 0, 0, 0, 0, 0, 0, 0xfe, 0x80]);
    assert!(matches!(result, Err(NdiscError::Truncated(_))));
}

#[test]
fn unknown_interface_is_unavailable() {
    let h = Harness::new();
    let packet = InboundPacket::new(InterfaceId::new(9), addr("fe80::2"), solicited_node_multicast(&h.link_local), 255, solicitation(&h));
    assert!(matches!(h.ctx.receive(&packet), Err(NdiscError::Unavailable(_))));
}

#[test]
fn handle_inbound_swallows_errors() {
    let h = Harness::new();
    let packet = InboundPacket::new(IF_ID, addr("fe80::2"), ALL_NODES, 1, solicitation(&h));
    h.ctx.handle_inbound(&packet);
    assert!(h.sent().is_empty());
}

#[test]
fn looped_back_advertisement_is_not_a_conflict() {
    let h = Harness::new();
    let packet = InboundPacket::new(IF_ID, h.link_local, ALL_NODES, 255, na(0x20, h.link_local, &tllao(OUR_MAC)))
        .with_pkt_type(PacketType::Loopback);
    h.ctx.receive(&packet).unwrap();
}

#[test]
fn interface_down_flushes_neighbors() {
    let h = Harness::new();
    h.stack.neighbors.insert(addr("fe80::2"), IF_ID, Some(mac(PEER_MAC)), NudState::Reachable, false);
    h.stack.neighbors.insert(addr("fe80::3"), IF_ID, Some(mac(PEER_MAC)), NudState::Stale, true);

    h.ctx.on_interface_down(IF_ID);

    assert!(h.stack.neighbors.is_empty());
}

#[test]
fn address_change_announces_when_configured() {
    let h = Harness::with_config(ndiscd::config::InterfaceConfig {
        ndisc_notify: true,
        ..Default::default()
    });
    h.stack.neighbors.insert(addr("fe80::2"), IF_ID, Some(mac(PEER_MAC)), NudState::Reachable, false);

    h.ctx.on_address_changed(IF_ID);

    assert!(h.stack.neighbors.is_empty());
    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dst, ALL_NODES);
}

#[test]
fn address_change_is_quiet_by_default() {
    let h = Harness::new();
    h.ctx.on_address_changed(IF_ID);
    assert!(h.sent().is_empty());
}

#[test]
fn new_hardware_address_is_announced() {
    let h = Harness::with_config(ndiscd::config::InterfaceConfig {
        ndisc_notify: true,
        ..Default::default()
    });
    let moved = [0x02, 0, 0, 0, 0, 0x44];

    h.ctx.on_link_changed(IF_ID, LinkInfo::ethernet(moved, 1500));

    assert_eq!(h.ctx.interface(IF_ID).unwrap().link().addr, Some(mac(moved)));
    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    let opts = ndiscd::ndisc::options::parse(&sent[0].payload[24..]).unwrap();
    let tllao = opts.target_link_addr().unwrap();
    assert_eq!(&tllao.bytes()[2..8], &moved);
}

#[test]
fn smaller_link_mtu_caps_learned_mtu() {
    let h = Harness::new();
    h.deliver(addr("fe80::9"), ALL_NODES, Ra::default().build(&mtu_option(1500))).unwrap();

    h.ctx.on_link_changed(IF_ID, LinkInfo::ethernet(OUR_MAC, 1400));

    assert_eq!(h.ctx.interface(IF_ID).unwrap().ra_state().mtu6, 1400);
}

#[test]
fn transmit_failure_is_reported() {
    let stack = ndiscd::memory::MemoryStack::new();
    let transmitter = std::sync::Arc::new(ndiscd::memory::RecordingTransmitter::with_capacity(0));
    let ctx = ndiscd::ndisc::NdiscContext::new(stack.collaborators(
        transmitter,
        std::sync::Arc::new(ndiscd::memory::RecordingNotifier::new()),
        std::sync::Arc::new(ndiscd::memory::RecordingDeferredQueue::new()),
    ));
    let link = LinkInfo::ethernet(OUR_MAC, 1500);
    stack.neighbors.register_device(IF_ID, link.clone());
    ctx.add_interface(IF_ID, "eth0", link, Default::default());
    stack.addrconf.add_address(IF_ID, addr("fe80::1"), Default::default());

    let result = ctx.send_ns(IF_ID, &addr("fe80::2"), &solicited_node_multicast(&addr("fe80::2")), None);
    assert!(matches!(result, Err(NdiscError::ResourceExhaustion(_))));
}

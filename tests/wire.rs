mod common;

use common::*;

use smoltcp::wire;

use ndiscd::icmp6::ndp::NdMessage;
use ndiscd::ndisc::addr::solicited_node_multicast;
use ndiscd::ndisc::addr::ALL_NODES;
use ndiscd::ndisc::builder;
use ndiscd::ndisc::collab::NudState;
use ndiscd::ndisc::options;
use ndiscd::ndisc::options::NdOptionType;
use ndiscd::ndisc::options::OptionError;
use ndiscd::ndisc::options::OptionIter;

fn smol_addr(addr: std::net::Ipv6Addr) -> wire::IpAddress {
    wire::IpAddress::Ipv6(wire::Ipv6Address::from_bytes(&addr.octets()))
}

fn checksum_ok(src: std::net::Ipv6Addr, dst: std::net::Ipv6Addr, payload: &[u8]) -> bool {
    let packet = wire::Icmpv6Packet::new_checked(payload).unwrap();
    packet.verify_checksum(&smol_addr(src), &smol_addr(dst))
}

#[test]
fn solicitation_round_trips_its_source_link_address() {
    let h = Harness::new();
    let target = addr("fe80::2");

    let payload = builder::neighbor_solicitation(&h.link, &target, true).unwrap();
    let ns = match NdMessage::parse(&payload).unwrap() {
        NdMessage::NeighborSolicitation(ns) => ns,
        other => panic!("not an NS: {:?}", other),
    };
    assert_eq!(ns.target, target);

    let opts = options::parse(ns.options).unwrap();
    let sllao: Vec<_> = OptionIter::new(ns.options)
        .filter(|o| o.kind() == Some(NdOptionType::SourceLinkAddr))
        .collect();
    assert_eq!(sllao.len(), 1);
    assert_eq!(opts.source_link_addr(), Some(sllao[0]));
    assert_eq!(h.link.link_addr_from_option(&sllao[0]), Some(mac(OUR_MAC)));
}

#[test]
fn option_chain_is_consumed_exactly() {
    let chain = [sllao(PEER_MAC), mtu_option(1400), rdnss_option(60, addr("2001:db8::53"))].concat();

    let parsed = options::parse(&chain).unwrap();
    let total: usize = OptionIter::new(&chain).map(|o| o.len()).sum();
    assert_eq!(total, chain.len());
    assert_eq!(parsed.raw().len(), chain.len());
    assert_eq!(parsed.mtu().and_then(|o| o.mtu()), Some(1400));
    assert_eq!(parsed.user_options().count(), 1);

    let mut truncated = chain.clone();
    truncated.push(1);
    assert!(matches!(options::parse(&truncated), Err(OptionError::Truncated { .. })));

    let mut zero = chain.clone();
    zero.extend_from_slice(&[5, 0, 0, 0, 0, 0, 0, 0]);
    assert!(matches!(options::parse(&zero), Err(OptionError::ZeroLength { .. })));

    let mut overflow = chain;
    overflow.extend_from_slice(&[25, 3, 0, 0, 0, 0, 0, 0]);
    assert!(matches!(options::parse(&overflow), Err(OptionError::Overflow { .. })));
}

#[test]
fn sent_solicitation_checks_out() {
    let h = Harness::new();
    let target = addr("fe80::2");
    let group = solicited_node_multicast(&target);

    h.ctx.send_ns(IF_ID, &target, &group, None).unwrap();

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert!(checksum_ok(sent[0].src, sent[0].dst, &sent[0].payload));

    let packet = wire::Icmpv6Packet::new_checked(&sent[0].payload[..]).unwrap();
    assert_eq!(packet.msg_type(), wire::Icmpv6Message::NeighborSolicit);
    match wire::NdiscRepr::parse(&packet).unwrap() {
        wire::NdiscRepr::NeighborSolicit { target_addr, .. } => {
            assert_eq!(target_addr, wire::Ipv6Address::from_bytes(&target.octets()));
        }
        other => panic!("not an NS: {:?}", other),
    }
}

#[test]
fn answered_solicitation_checks_out() {
    let h = Harness::new();
    let peer = addr("fe80::2");

    h.deliver(peer, solicited_node_multicast(&h.link_local), ns(h.link_local, &sllao(PEER_MAC)))
        .unwrap();

    let sent = h.sent();
    assert!(checksum_ok(sent[0].src, sent[0].dst, &sent[0].payload));
    let packet = wire::Icmpv6Packet::new_checked(&sent[0].payload[..]).unwrap();
    assert_eq!(packet.msg_type(), wire::Icmpv6Message::NeighborAdvert);
}

#[test]
fn unsolicited_advertisements_check_out() {
    let h = Harness::new();
    h.stack.addrconf.add_address(IF_ID, addr("2001:db8::1"), Default::default());

    h.ctx.on_peer_notify(IF_ID);

    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    for msg in sent.iter() {
        assert_eq!(msg.dst, ALL_NODES);
        assert!(checksum_ok(msg.src, msg.dst, &msg.payload));
    }
}

#[test]
fn redirect_checks_out() {
    let h = Harness::new();
    h.stack.routes.add_route(addr("2001:db8::"), 64, None, IF_ID);
    h.stack
        .neighbors
        .insert(addr("fe80::7"), IF_ID, Some(mac(PEER_MAC)), NudState::Reachable, true);

    let original = ipv6_packet(addr("2001:db8::5"), addr("2001:db8:1::1"), 200);
    h.ctx.send_redirect(IF_ID, &original, &addr("fe80::7")).unwrap();

    let sent = h.sent();
    assert!(checksum_ok(sent[0].src, sent[0].dst, &sent[0].payload));
    let packet = wire::Icmpv6Packet::new_checked(&sent[0].payload[..]).unwrap();
    assert_eq!(packet.msg_type(), wire::Icmpv6Message::Redirect);
}

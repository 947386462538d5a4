mod common;

use common::*;

use ndiscd::config::AcceptRa;
use ndiscd::config::InterfaceConfig;
use ndiscd::icmp6::ndp;
use ndiscd::icmp6::ndp::RouterPreference;
use ndiscd::memory::NotifierEvent;
use ndiscd::ndisc::addr::ALL_NODES;
use ndiscd::ndisc::addr::ALL_ROUTERS;
use ndiscd::ndisc::collab::NudState;
use ndiscd::ndisc::collab::RoutingTable;
use ndiscd::ndisc::params::Ticks;
use ndiscd::ndisc::NdiscError;

fn router() -> std::net::Ipv6Addr {
    addr("fe80::9")
}

fn accept_routes() -> InterfaceConfig {
    InterfaceConfig {
        accept_ra_rt_info_max_plen: 64,
        ..Default::default()
    }
}

#[test]
fn advertisement_installs_default_router() {
    let h = Harness::new();

    h.deliver(router(), ALL_NODES, Ra::default().build(&sllao(PEER_MAC))).unwrap();

    let routers = h.stack.routes.default_routers(IF_ID);
    assert_eq!(routers.len(), 1);
    assert_eq!(routers[0].gateway, Some(router()));
    assert_eq!(routers[0].preference, RouterPreference::Medium);
    assert_eq!(routers[0].lifetime, Some(Ticks::from_secs(1800)));
    assert_eq!(routers[0].hop_limit, Some(64));

    let neigh = h.stack.neighbors.get(&router(), IF_ID).unwrap();
    assert!(neigh.is_router);
    assert_eq!(neigh.state, NudState::Stale);
    assert_eq!(neigh.lladdr, Some(mac(PEER_MAC)));
}

#[test]
fn later_advertisement_refreshes_router_in_place() {
    let h = Harness::new();

    h.deliver(router(), ALL_NODES, Ra::default().build(&[])).unwrap();
    let id = h.stack.routes.default_router(&router(), IF_ID).unwrap();

    let second = Ra {
        preference: RouterPreference::High,
        lifetime: 900,
        ..Default::default()
    };
    h.deliver(router(), ALL_NODES, second.build(&[])).unwrap();

    assert_eq!(h.stack.routes.default_router(&router(), IF_ID), Some(id));
    assert_eq!(h.stack.routes.routes().len(), 1);
    let entry = h.stack.routes.get(id).unwrap();
    assert_eq!(entry.preference, RouterPreference::High);
    assert_eq!(entry.lifetime, Some(Ticks::from_secs(900)));
}

#[test]
fn zero_lifetime_withdraws_router() {
    let h = Harness::new();

    h.deliver(router(), ALL_NODES, Ra::default().build(&[])).unwrap();
    assert_eq!(h.stack.routes.default_routers(IF_ID).len(), 1);

    let withdraw = Ra { lifetime: 0, ..Default::default() };
    h.deliver(router(), ALL_NODES, withdraw.build(&[])).unwrap();

    assert!(h.stack.routes.default_routers(IF_ID).is_empty());
    assert!(h.stack.routes.routes().is_empty());
}

#[test]
fn zero_lifetime_from_unknown_router_adds_nothing() {
    let h = Harness::new();
    let ra = Ra { lifetime: 0, ..Default::default() };
    h.deliver(router(), ALL_NODES, ra.build(&sllao(PEER_MAC))).unwrap();

    assert!(h.stack.routes.routes().is_empty());
    assert_eq!(h.stack.neighbors.get(&router(), IF_ID).unwrap().state, NudState::NoArp);
}

#[test]
fn reserved_preference_counts_as_medium() {
    let h = Harness::new();
    let ra = Ra { preference: RouterPreference::Invalid, ..Default::default() };
    h.deliver(router(), ALL_NODES, ra.build(&[])).unwrap();
    assert_eq!(h.stack.routes.default_routers(IF_ID)[0].preference, RouterPreference::Medium);
}

#[test]
fn preference_ignored_when_not_accepted() {
    let h = Harness::with_config(InterfaceConfig {
        accept_ra_rtr_pref: false,
        ..Default::default()
    });
    let ra = Ra { preference: RouterPreference::High, ..Default::default() };
    h.deliver(router(), ALL_NODES, ra.build(&[])).unwrap();
    assert_eq!(h.stack.routes.default_routers(IF_ID)[0].preference, RouterPreference::Medium);
}

#[test]
fn advertisement_from_global_source_is_rejected() {
    let h = Harness::new();
    let result = h.deliver(addr("2001:db8::1"), ALL_NODES, Ra::default().build(&sllao(PEER_MAC)));

    assert!(matches!(result, Err(NdiscError::ProtocolViolation(_))));
    assert!(h.stack.routes.routes().is_empty());
    assert!(h.stack.neighbors.is_empty());
}

#[test]
fn malformed_options_drop_the_advertisement() {
    let h = Harness::new();
    let result = h.deliver(router(), ALL_NODES, Ra::default().build(&[5, 0, 0, 0, 0, 0, 5, 0]));

    assert!(matches!(result, Err(NdiscError::MalformedOptions(_))));
    assert!(h.stack.routes.routes().is_empty());
    assert_eq!(h.ctx.interface(IF_ID).unwrap().ra_state().ra_seen, 0);
}

#[test]
fn our_own_advertisement_adds_no_router() {
    let h = Harness::new();
    h.deliver(h.link_local, ALL_NODES, Ra::default().build(&[])).unwrap();
    assert!(h.stack.routes.routes().is_empty());
}

#[test]
fn disabled_acceptance_still_records_the_advertisement() {
    let h = Harness::with_config(InterfaceConfig {
        accept_ra: AcceptRa::Never,
        ..Default::default()
    });
    h.ctx.send_rs(IF_ID, &h.link_local, &ALL_ROUTERS).unwrap();
    h.sent();

    let ra = Ra {
        managed: true,
        hop_limit: 32,
        ..Default::default()
    };
    h.deliver(router(), ALL_NODES, ra.build(&[sllao(PEER_MAC), mtu_option(1400)].concat()))
        .unwrap();

    let state = h.ctx.interface(IF_ID).unwrap().ra_state();
    assert_eq!(state.ra_seen, 1);
    assert!(state.ra_rcvd);
    assert!(!state.managed);
    assert_eq!(state.mtu6, 1500);
    assert!(h.stack.routes.routes().is_empty());
    assert!(h.stack.routes.mtu_events().is_empty());

    // the sender is still known to be a router
    let neigh = h.stack.neighbors.get(&router(), IF_ID).unwrap();
    assert!(neigh.is_router);
    assert_eq!(neigh.lladdr, Some(mac(PEER_MAC)));
}

#[test]
fn config_flags_follow_the_latest_advertisement() {
    let h = Harness::new();
    let iface = h.ctx.interface(IF_ID).unwrap();

    let first = Ra { managed: true, other: true, ..Default::default() };
    h.deliver(router(), ALL_NODES, first.build(&[])).unwrap();
    assert!(iface.ra_state().managed);
    assert!(iface.ra_state().other);

    let second = Ra { managed: false, other: true, ..Default::default() };
    h.deliver(router(), ALL_NODES, second.build(&[])).unwrap();
    assert!(!iface.ra_state().managed);
    assert!(iface.ra_state().other);
}

#[test]
fn hop_limit_applies_to_interface_and_route() {
    let h = Harness::new();
    let ra = Ra { hop_limit: 42, ..Default::default() };
    h.deliver(router(), ALL_NODES, ra.build(&[])).unwrap();

    assert_eq!(h.ctx.interface(IF_ID).unwrap().ra_state().hop_limit, 42);
    assert_eq!(h.stack.routes.default_routers(IF_ID)[0].hop_limit, Some(42));

    let unspecified = Ra { hop_limit: 0, ..Default::default() };
    h.deliver(router(), ALL_NODES, unspecified.build(&[])).unwrap();
    assert_eq!(h.ctx.interface(IF_ID).unwrap().ra_state().hop_limit, 42);
}

#[test]
fn timers_are_applied_when_they_change() {
    let h = Harness::new();
    let ra = Ra {
        retrans_ms: 2_000,
        reachable_ms: 45_000,
        ..Default::default()
    };

    h.deliver(router(), ALL_NODES, ra.build(&[])).unwrap();
    let params = h.ctx.interface(IF_ID).unwrap().params();
    assert_eq!(params.retrans_time, Ticks::from_millis(2_000));
    assert_eq!(params.base_reachable_time, Ticks::from_millis(45_000));
    assert_eq!(h.notifier.take(), vec![NotifierEvent::LinkParamsChanged(IF_ID)]);

    h.deliver(router(), ALL_NODES, ra.build(&[])).unwrap();
    assert!(h.notifier.take().is_empty());
}

#[test]
fn out_of_range_mtu_is_ignored() {
    let h = Harness::new();

    h.deliver(router(), ALL_NODES, Ra::default().build(&mtu_option(1279))).unwrap();
    h.deliver(router(), ALL_NODES, Ra::default().build(&mtu_option(9000))).unwrap();

    assert_eq!(h.ctx.interface(IF_ID).unwrap().ra_state().mtu6, 1500);
    assert!(h.stack.routes.mtu_events().is_empty());
    assert_eq!(h.stack.routes.default_routers(IF_ID)[0].mtu, None);
}

#[test]
fn valid_mtu_reaches_routing_table() {
    let h = Harness::new();

    h.deliver(router(), ALL_NODES, Ra::default().build(&mtu_option(1400))).unwrap();

    assert_eq!(h.ctx.interface(IF_ID).unwrap().ra_state().mtu6, 1400);
    assert_eq!(h.stack.routes.mtu_events(), vec![(IF_ID, 1400)]);
    assert_eq!(h.stack.routes.default_routers(IF_ID)[0].mtu, Some(1400));

    // unchanged: nothing reported again
    h.deliver(router(), ALL_NODES, Ra::default().build(&mtu_option(1400))).unwrap();
    assert_eq!(h.stack.routes.mtu_events().len(), 1);
}

#[test]
fn prefixes_are_imported_in_order() {
    let h = Harness::new();
    let options = [
        sllao(PEER_MAC),
        prefix_option(addr("2001:db8:1::"), 64, 0xc0, 86_400, 14_400),
        prefix_option(addr("2001:db8:2::"), 64, 0x80, 3_600, 0),
    ]
    .concat();

    h.deliver(router(), ALL_NODES, Ra::default().build(&options)).unwrap();

    let prefixes = h.stack.addrconf.prefixes();
    assert_eq!(prefixes.len(), 2);
    assert_eq!(prefixes[0].prefix, addr("2001:db8:1::"));
    assert!(prefixes[0].autonomous);
    assert_eq!(prefixes[0].valid_lifetime, 86_400);
    assert_eq!(prefixes[1].prefix, addr("2001:db8:2::"));
    assert!(!prefixes[1].autonomous);
    assert!(prefixes.iter().all(|p| p.sllao_present && p.on_link));
}

#[test]
fn prefixes_are_skipped_when_not_accepted() {
    let h = Harness::with_config(InterfaceConfig {
        accept_ra_pinfo: false,
        ..Default::default()
    });
    let options = prefix_option(addr("2001:db8:1::"), 64, 0xc0, 86_400, 14_400);
    h.deliver(router(), ALL_NODES, Ra::default().build(&options)).unwrap();
    assert!(h.stack.addrconf.prefixes().is_empty());
}

#[test]
fn route_information_respects_prefix_length_limit() {
    let h = Harness::with_config(accept_routes());
    let options = [
        route_info_option(addr("2001:db8:100::"), 48, RouterPreference::High, 600),
        route_info_option(addr("2001:db8:200::1"), 96, RouterPreference::High, 600),
    ]
    .concat();

    h.deliver(router(), ALL_NODES, Ra::default().build(&options)).unwrap();

    let specific: Vec<_> = h.stack.routes.routes().into_iter().filter(|r| r.prefix_len > 0).collect();
    assert_eq!(specific.len(), 1);
    assert_eq!(specific[0].dst, addr("2001:db8:100::"));
    assert_eq!(specific[0].prefix_len, 48);
    assert_eq!(specific[0].gateway, Some(router()));
    assert_eq!(specific[0].preference, RouterPreference::High);
}

#[test]
fn default_route_information_needs_default_router_acceptance() {
    let h = Harness::with_config(InterfaceConfig {
        accept_ra_defrtr: false,
        ..accept_routes()
    });
    let options = [
        route_info_option(std::net::Ipv6Addr::UNSPECIFIED, 0, RouterPreference::High, 600),
        route_info_option(addr("2001:db8:100::"), 48, RouterPreference::High, 600),
    ]
    .concat();

    h.deliver(router(), ALL_NODES, Ra::default().build(&options)).unwrap();

    let routes = h.stack.routes.routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].dst, addr("2001:db8:100::"));
    assert_eq!(routes[0].prefix_len, 48);
}

#[test]
fn default_route_information_is_imported_when_accepted() {
    let h = Harness::with_config(accept_routes());
    let options = route_info_option(std::net::Ipv6Addr::UNSPECIFIED, 0, RouterPreference::High, 600);

    h.deliver(router(), ALL_NODES, Ra { lifetime: 0, ..Default::default() }.build(&options)).unwrap();

    let routes = h.stack.routes.routes();
    assert_eq!(routes.len(), 1);
    assert!(routes[0].is_default());
    assert_eq!(routes[0].gateway, Some(router()));
}

#[test]
fn headerless_uplink_accepts_empty_source_link_address() {
    let h = Harness::headerless(InterfaceConfig::default());
    let options = [empty_sllao(), prefix_option(addr("2001:db8:1::"), 64, 0xc0, 86_400, 14_400)].concat();

    h.deliver(router(), ALL_NODES, Ra::default().build(&options)).unwrap();

    let prefixes = h.stack.addrconf.prefixes();
    assert_eq!(prefixes.len(), 1);
    assert_eq!(prefixes[0].prefix, addr("2001:db8:1::"));
    assert!(prefixes[0].sllao_present);
    assert_eq!(h.stack.routes.default_routers(IF_ID).len(), 1);
    assert_eq!(h.stack.neighbors.get(&router(), IF_ID).unwrap().state, NudState::NoArp);
}

#[test]
fn headerless_uplink_rejects_oversized_source_link_address() {
    let h = Harness::headerless(InterfaceConfig::default());
    let mut long_sllao = vec![1, 2];
    long_sllao.extend_from_slice(&[0; 14]);
    let options = [long_sllao, prefix_option(addr("2001:db8:1::"), 64, 0xc0, 86_400, 14_400)].concat();

    let result = h.deliver(router(), ALL_NODES, Ra::default().build(&options));

    assert!(matches!(result, Err(NdiscError::MalformedOptions(_))));
    assert!(h.stack.addrconf.prefixes().is_empty());
}

#[test]
fn route_information_off_by_default() {
    let h = Harness::new();
    let options = route_info_option(addr("2001:db8:100::"), 48, RouterPreference::High, 600);
    h.deliver(router(), ALL_NODES, Ra::default().build(&options)).unwrap();
    assert!(h.stack.routes.routes().iter().all(|r| r.prefix_len == 0));
}

#[test]
fn user_options_go_to_the_notifier() {
    let h = Harness::new();
    let dns = rdnss_option(600, addr("2001:db8::53"));

    h.deliver(router(), ALL_NODES, Ra::default().build(&dns)).unwrap();

    assert_eq!(
        h.notifier.take(),
        vec![NotifierEvent::UserOption {
            if_id: IF_ID,
            icmp6_type: ndp::ROUTER_ADVERTISEMENT,
            icmp6_code: 0,
            option: dns,
            router: router(),
        }]
    );
}

#[test]
fn redirect_only_options_are_tolerated() {
    let h = Harness::new();
    h.deliver(router(), ALL_NODES, Ra::default().build(&tllao(PEER_MAC))).unwrap();
    assert_eq!(h.stack.routes.default_routers(IF_ID).len(), 1);
}

#[test]
fn solicitation_is_recorded() {
    let h = Harness::new();
    h.ctx.send_rs(IF_ID, &h.link_local, &ALL_ROUTERS).unwrap();

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dst, ALL_ROUTERS);
    assert_eq!(sent[0].icmp6_type(), ndp::ROUTER_SOLICITATION);
    assert!(h.ctx.interface(IF_ID).unwrap().ra_state().rs_sent);
}

//! Router Solicitation and Router Advertisement processing.
//!
//! An RA is validated once (link-local source, well-formed options) and
//! then applied in stages: link parameters and the default router, the
//! sender's neighbor entry, and finally the options destined for the
//! routing table, address configuration and the management plane. The
//! first stage is skipped when the interface does not accept RAs; the
//! neighbor entry is refreshed either way.

use crate::icmp6::ndp;
use crate::icmp6::ndp::RouterAdvertisement;
use crate::icmp6::ndp::RouterPreference;
use crate::icmp6::ndp::RouterSolicitation;
use crate::icmp6::packet::InboundPacket;
use crate::icmp6::IPV6_MIN_MTU;
use crate::nd_log;

use super::addr;
use super::collab::NeighborUpdate;
use super::collab::NudState;
use super::collab::RouteId;
use super::collab::RouteMetric;
use super::collab::UpdateFlags;
use super::context::NdInterface;
use super::options;
use super::options::ParsedOptions;
use super::params::Ticks;
use super::resolve::link_addr;
use super::NdiscContext;
use super::NdiscError;

/// The reserved encoding counts as medium (RFC 4191 §2.2), and so does
/// every value when preferences are not accepted.
pub fn effective_preference(pref: RouterPreference, accept_rtr_pref: bool) -> RouterPreference {
    if pref == RouterPreference::Invalid || !accept_rtr_pref {
        RouterPreference::Medium
    } else {
        pref
    }
}

impl NdiscContext {
    pub(crate) fn recv_rs(&self, iface: &NdInterface, packet: &InboundPacket, rs: &RouterSolicitation<'_>) -> Result<(), NdiscError> {
        // only routers answer solicitations
        if !iface.config().forwarding {
            return Ok(());
        }

        // the sender has no address yet
        if packet.src.is_unspecified() {
            return Ok(());
        }

        let opts = options::parse(rs.options).map_err(|e| {
            nd_log!(self.log_limit(), log::Level::Info, "RS: invalid ND option, ignored");
            NdiscError::from(e)
        })?;

        let lladdr = link_addr(iface, opts.source_link_addr(), "RS: invalid link-layer address length")?;

        if let Some(mut entry) = self.neighbors().lookup_or_create(&packet.src, iface.if_id(), true) {
            entry.update(&NeighborUpdate {
                lladdr,
                state: NudState::Stale,
                flags: UpdateFlags {
                    override_: true,
                    weak_override: true,
                    override_is_router: true,
                    is_router: false,
                },
            });
        }
        Ok(())
    }

    pub(crate) fn recv_ra(&self, iface: &NdInterface, packet: &InboundPacket, ra: &RouterAdvertisement<'_>) -> Result<(), NdiscError> {
        let if_id = iface.if_id();
        let saddr = packet.src;

        if !addr::is_link_local_unicast(&saddr) {
            nd_log!(self.log_limit(), log::Level::Warn, "RA: source address is not link-local");
            return Err(NdiscError::ProtocolViolation("RA: source address is not link-local"));
        }

        let opts = options::parse(ra.options).map_err(|e| {
            nd_log!(self.log_limit(), log::Level::Warn, "RA: invalid ND options");
            NdiscError::from(e)
        })?;

        let cnf = iface.config();
        let accept = cnf.accepts_ra();
        iface.with_ra_state(|state| {
            state.ra_seen += 1;
            if state.rs_sent {
                state.ra_rcvd = true;
            }
        });

        let mut route = None;
        if accept {
            route = self.apply_link_params(iface, &saddr, ra)?;
        } else {
            log::debug!("RA: not accepted on {}", iface.name());
        }

        let lladdr = link_addr(iface, opts.source_link_addr(), "RA: invalid link-layer address length").map_err(|e| {
            nd_log!(self.log_limit(), log::Level::Warn, "RA: invalid link-layer address length");
            e
        })?;

        if let Some(mut entry) = self.neighbors().lookup_or_create(&saddr, if_id, true) {
            entry.update(&NeighborUpdate {
                lladdr,
                state: NudState::Stale,
                flags: UpdateFlags {
                    override_: true,
                    weak_override: true,
                    override_is_router: true,
                    is_router: true,
                },
            });
        }

        if !accept {
            return Ok(());
        }

        self.apply_ra_options(iface, packet, &opts, route);
        Ok(())
    }

    /// Flags, default router, hop limit and timers. Returns the default
    /// route for the sender, if there is one now.
    fn apply_link_params(
        &self,
        iface: &NdInterface,
        saddr: &std::net::Ipv6Addr,
        ra: &RouterAdvertisement<'_>,
    ) -> Result<Option<RouteId>, NdiscError> {
        let if_id = iface.if_id();
        let cnf = iface.config();

        let flags_changed = iface.with_ra_state(|state| {
            let changed = state.managed != ra.managed || state.other != ra.other;
            state.managed = ra.managed;
            state.other = ra.other;
            changed
        });
        if flags_changed {
            log::debug!("RA: {} managed={} other={}", iface.name(), ra.managed, ra.other);
        }

        let mut route = None;
        if !cnf.accept_ra_defrtr {
            log::debug!("RA: default routers not accepted on {}", iface.name());
        } else if self.addrconf().is_local_unicast(saddr, None) {
            // our own RA
            log::debug!("RA: from local address {} on {}", saddr, iface.name());
        } else {
            route = self.update_default_router(iface, saddr, ra)?;
        }

        let mut changed = false;
        if let Some(retrans) = Ticks::from_ra_millis(ra.retrans_timer, 1) {
            changed |= iface.with_params(|params| params.set_retrans_time(retrans));
        }
        if let Some(reachable) = Ticks::from_ra_millis(ra.reachable_time, 3) {
            changed |= iface.with_params(|params| params.set_base_reachable_time(reachable));
        }
        if changed {
            self.notifier().link_params_changed(if_id);
        }
        Ok(route)
    }

    fn update_default_router(
        &self,
        iface: &NdInterface,
        saddr: &std::net::Ipv6Addr,
        ra: &RouterAdvertisement<'_>,
    ) -> Result<Option<RouteId>, NdiscError> {
        let if_id = iface.if_id();
        let cnf = iface.config();
        let lifetime = ra.router_lifetime;
        let pref = effective_preference(ra.preference, cnf.accept_ra_rtr_pref);

        let mut route = self.routes().default_router(saddr, if_id);
        if let Some(existing) = route {
            if lifetime == 0 {
                log::info!("RA: {} on {} withdrew as default router", saddr, iface.name());
                self.routes().delete_route(existing);
                route = None;
            }
        }

        match route {
            None if lifetime != 0 => {
                log::debug!("RA: adding default router {} on {}", saddr, iface.name());
                let added = match self.routes().add_default_router(saddr, if_id, pref) {
                    Some(added) => added,
                    None => {
                        log::error!("RA: failed to add default route via {} on {}", saddr, iface.name());
                        return Err(NdiscError::ResourceExhaustion("RA: failed to add default route"));
                    }
                };
                match self.neighbors().lookup_or_create(saddr, if_id, true) {
                    Some(mut entry) => entry.set_router(true),
                    None => {
                        log::error!("RA: default router {} without neighbour", saddr);
                        return Err(NdiscError::ResourceExhaustion("RA: default router without neighbour"));
                    }
                }
                route = Some(added);
            }
            Some(existing) => self.routes().set_route_preference(existing, pref),
            None => {}
        }

        if let Some(route) = route {
            self.routes().set_route_expiry(route, Ticks::from_secs(lifetime as u64));
        }

        if ra.hop_limit != 0 {
            iface.with_ra_state(|state| state.hop_limit = ra.hop_limit);
            if let Some(route) = route {
                self.routes().set_route_metric(route, RouteMetric::HopLimit, ra.hop_limit as u32);
            }
        }
        Ok(route)
    }

    fn apply_ra_options(&self, iface: &NdInterface, packet: &InboundPacket, opts: &ParsedOptions<'_>, route: Option<RouteId>) {
        let if_id = iface.if_id();
        let cnf = iface.config();
        let saddr = packet.src;

        if self.addrconf().is_local_unicast(&saddr, None) {
            log::debug!("RA: route information from local address {} ignored", saddr);
        } else if cnf.accept_ra_rtr_pref {
            for ri in opts.route_info() {
                match ri.route_prefix_len() {
                    // a default route is refused along with the default router
                    Some(0) if !cnf.accept_ra_defrtr => log::trace!("RA: default route information skipped"),
                    Some(plen) if plen <= cnf.accept_ra_rt_info_max_plen => {
                        self.routes().import_route_info(if_id, ri.bytes(), &saddr);
                    }
                    _ => log::trace!("RA: route information skipped: {:?}", ri),
                }
            }
        }

        if cnf.accept_ra_pinfo {
            let sllao_present = opts.source_link_addr().is_some();
            for pi in opts.prefix_info() {
                self.addrconf().import_prefix_info(if_id, pi.bytes(), sllao_present);
            }
        }

        if let Some(mtu) = opts.mtu().and_then(|opt| opt.mtu()) {
            let link_mtu = iface.link().mtu;
            if mtu < IPV6_MIN_MTU || mtu > link_mtu {
                nd_log!(self.log_limit(), log::Level::Warn, "RA: invalid mtu: {}", mtu);
            } else {
                let changed = iface.with_ra_state(|state| {
                    let changed = state.mtu6 != mtu;
                    state.mtu6 = mtu;
                    changed
                });
                if changed {
                    if let Some(route) = route {
                        self.routes().set_route_metric(route, RouteMetric::Mtu, mtu);
                    }
                    self.routes().mtu_changed(if_id, mtu);
                }
            }
        }

        for opt in opts.user_options() {
            self.notifier().user_option(if_id, ndp::ROUTER_ADVERTISEMENT, 0, opt.bytes(), &saddr);
        }

        if opts.target_link_addr().is_some() || opts.redirected_header().is_some() {
            nd_log!(self.log_limit(), log::Level::Warn, "RA: invalid RA options");
        }
    }
}

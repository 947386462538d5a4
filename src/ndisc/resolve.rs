//! Neighbor Solicitation and Neighbor Advertisement processing.

use std::net::Ipv6Addr;

use crate::icmp6::ndp::NeighborAdvertisement;
use crate::icmp6::ndp::NeighborSolicitation;
use crate::icmp6::packet::InboundPacket;
use crate::icmp6::packet::PacketType;
use crate::interface::LinkAddr;
use crate::nd_log;

use super::addr;
use super::collab::NeighborUpdate;
use super::collab::NudState;
use super::collab::UpdateFlags;
use super::context::NdInterface;
use super::options;
use super::options::NdOption;
use super::NdiscContext;
use super::NdiscError;

/// What a Neighbor Solicitation is for. Nothing in the message says so;
/// it follows from its addresses (RFC 4861 §7.2.3, RFC 4862 §5.4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolicitationKind {
    /// Unspecified source: the sender is verifying a tentative address.
    DuplicateAddressDetection,
    /// Unicast destination: a reachability probe for a known neighbor.
    UnicastProbe,
    /// Multicast destination: address resolution.
    MulticastResolution,
}

impl SolicitationKind {
    pub fn classify(src: &Ipv6Addr, dst: &Ipv6Addr) -> Self {
        if is_dad_probe(src) {
            SolicitationKind::DuplicateAddressDetection
        } else if dst.is_multicast() {
            SolicitationKind::MulticastResolution
        } else {
            SolicitationKind::UnicastProbe
        }
    }
}

pub fn is_dad_probe(src: &Ipv6Addr) -> bool {
    src.is_unspecified()
}

/// A DAD probe must go to the solicited-node group of the address it
/// checks.
pub fn is_valid_dad_destination(dst: &Ipv6Addr, target: &Ipv6Addr) -> bool {
    addr::is_solicited_node_multicast(dst) && *dst == addr::solicited_node_multicast(target)
}

/// A solicited advertisement answers a unicast or multicast NS and is
/// always sent unicast.
pub fn is_misdirected_solicited_na(solicited: bool, dst: &Ipv6Addr) -> bool {
    solicited && dst.is_multicast()
}

/// Address carried by a link-layer option. A well-formed option on a
/// link without hardware addresses yields `None`.
pub(crate) fn link_addr(iface: &NdInterface, opt: Option<NdOption<'_>>, what: &'static str) -> Result<Option<LinkAddr>, NdiscError> {
    match opt {
        None => Ok(None),
        Some(opt) => {
            let link = iface.link();
            if !link.addr_option_fits(&opt) {
                return Err(NdiscError::MalformedOptions(what));
            }
            Ok(link.link_addr_from_option(&opt))
        }
    }
}

impl NdiscContext {
    pub(crate) fn recv_ns(&self, iface: &NdInterface, packet: &InboundPacket, ns: &NeighborSolicitation<'_>) -> Result<(), NdiscError> {
        let if_id = iface.if_id();
        let saddr = packet.src;
        let daddr = packet.dst;
        let target = ns.target;
        let kind = SolicitationKind::classify(&saddr, &daddr);
        let dad = kind == SolicitationKind::DuplicateAddressDetection;

        if target.is_multicast() {
            nd_log!(self.log_limit(), log::Level::Warn, "NS: multicast target address");
            return Err(NdiscError::ProtocolViolation("NS: multicast target"));
        }

        if dad && !is_valid_dad_destination(&daddr, &target) {
            nd_log!(self.log_limit(), log::Level::Warn, "NS: bad DAD packet (wrong destination)");
            return Err(NdiscError::ProtocolViolation("NS: DAD probe to wrong destination"));
        }

        let opts = options::parse(ns.options)?;

        let lladdr = link_addr(iface, opts.source_link_addr(), "NS: invalid link-layer address length")?;
        if opts.source_link_addr().is_some() && dad {
            nd_log!(self.log_limit(), log::Level::Warn, "NS: bad DAD packet (link-layer address option)");
            return Err(NdiscError::ProtocolViolation("NS: DAD probe with source link-layer address"));
        }

        let inc = daddr.is_multicast();
        let cnf = iface.config();
        let mut is_router: Option<bool> = None;

        let local = self.addrconf().local_address(&target, if_id);
        match local {
            Some(local) => {
                if local.is_tentative() {
                    if dad {
                        // Someone else runs DAD on an address we are still
                        // verifying.
                        log::warn!("ndisc: DAD collision on {} ({})", target, iface.name());
                        self.addrconf().dad_failed(&local);
                        return Err(NdiscError::Conflict(target));
                    } else if !local.is_optimistic() {
                        return Ok(());
                    }
                }
            }
            None => {
                let eligible = if self.addrconf().is_anycast(&target, if_id) {
                    true
                } else if cnf.forwarding && (self.global().proxy_ndp || cnf.proxy_ndp) {
                    match self.neighbors().proxy_lookup(&target, if_id) {
                        Some(entry) => {
                            is_router = Some(entry.is_router);
                            true
                        }
                        None => false,
                    }
                } else {
                    false
                };

                if !eligible {
                    log::trace!("NS: {} is not ours on {}", target, iface.name());
                    return Ok(());
                }

                let params = iface.params();
                if !packet.locally_enqueued && packet.pkt_type != PacketType::Host && inc && !params.proxy_delay.is_zero() {
                    // Anycast and proxy answers are delayed at random
                    // (RFC 4861 §7.2.7, §7.2.8).
                    if !self.deferred().enqueue(packet.clone(), params.proxy_delay.as_duration(), params.proxy_qlen) {
                        log::debug!("NS: proxy queue full on {}, dropping solicitation for {}", iface.name(), target);
                    }
                    return Err(NdiscError::RateLimited);
                }
            }
        }

        let is_router = is_router.unwrap_or(cnf.forwarding);

        if dad {
            return self.send_na(if_id, &addr::ALL_NODES, &target, is_router, false, local.is_some(), true);
        }

        let link = iface.link();
        let create = !inc || lladdr.is_some() || link.addr_len() == 0;
        let found = match self.neighbors().lookup_or_create(&saddr, if_id, create) {
            Some(mut entry) => {
                entry.update(&NeighborUpdate {
                    lladdr,
                    state: NudState::Stale,
                    flags: UpdateFlags { override_: true, weak_override: true, ..Default::default() },
                });
                true
            }
            None => false,
        };

        if found || !link.link_type.has_link_header() {
            self.send_na(if_id, &saddr, &target, is_router, true, local.is_some() && inc, inc)?;
        }
        Ok(())
    }

    pub(crate) fn recv_na(&self, iface: &NdInterface, packet: &InboundPacket, na: &NeighborAdvertisement<'_>) -> Result<(), NdiscError> {
        let if_id = iface.if_id();
        let target = na.target;

        if target.is_multicast() {
            nd_log!(self.log_limit(), log::Level::Warn, "NA: target address is multicast");
            return Err(NdiscError::ProtocolViolation("NA: multicast target"));
        }

        if is_misdirected_solicited_na(na.solicited, &packet.dst) {
            nd_log!(self.log_limit(), log::Level::Warn, "NA: solicited NA is multicasted");
            return Err(NdiscError::ProtocolViolation("NA: solicited NA to multicast destination"));
        }

        let opts = options::parse(na.options)?;
        let lladdr = link_addr(iface, opts.target_link_addr(), "NA: invalid link-layer address length")?;

        if let Some(local) = self.addrconf().local_address(&target, if_id) {
            let looped = packet.pkt_type == PacketType::Loopback;
            if !looped && local.is_tentative() {
                log::warn!("ndisc: DAD failed for {} on {}: NA from {}", target, iface.name(), packet.src);
                self.addrconf().dad_failed(&local);
                return Err(NdiscError::Conflict(target));
            }
            if looped {
                // our own unsolicited advertisement
                return Ok(());
            }
            match lladdr {
                Some(lladdr) => log::warn!("NA: {} advertised our address {} on {}!", lladdr, target, iface.name()),
                None => log::warn!("NA: someone advertised our address {} on {}!", target, iface.name()),
            }
            return Err(NdiscError::Conflict(target));
        }

        let mut entry = match self.neighbors().lookup(&target, if_id) {
            Some(entry) => entry,
            None => return Ok(()),
        };

        let before = entry.snapshot();
        if before.state == NudState::Failed {
            return Ok(());
        }

        // A proxy NA from ourselves: the proxied node is off link or has
        // already answered.
        let global = self.global();
        if let Some(lladdr) = lladdr {
            if Some(lladdr) == iface.link().addr
                && global.forwarding
                && global.proxy_ndp
                && self.neighbors().proxy_lookup(&target, if_id).is_some()
            {
                return Ok(());
            }
        }

        entry.update(&NeighborUpdate {
            lladdr,
            state: if na.solicited { NudState::Reachable } else { NudState::Stale },
            flags: UpdateFlags {
                override_: na.override_,
                weak_override: true,
                override_is_router: true,
                is_router: na.router,
            },
        });
        let now_router = entry.is_router();
        drop(entry);

        if before.is_router && !now_router {
            log::debug!("ndisc: {} on {} is no longer a router", target, iface.name());
            if let Some(route) = self.routes().default_router(&target, if_id) {
                self.routes().delete_route(route);
            }
        }
        Ok(())
    }
}

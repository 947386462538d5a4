//! Outbound NS, NA and RS, plus the probe entry point used by the
//! neighbor cache timers.

use std::net::Ipv6Addr;

use crate::icmp6;
use crate::interface::InterfaceId;

use super::addr;
use super::builder;
use super::builder::NaFlags;
use super::collab::AddrFlags;
use super::collab::NeighborSnapshot;
use super::collab::OutboundMessage;
use super::collab::RouteId;
use super::context::NdInterface;
use super::NdiscContext;
use super::NdiscError;

impl NdiscContext {
    pub(crate) fn interface_or_err(&self, if_id: InterfaceId) -> Result<std::sync::Arc<NdInterface>, NdiscError> {
        self.interface(if_id).ok_or(NdiscError::Unavailable("interface is not served"))
    }

    /// Fills the checksum and hands the message to the transmitter.
    pub(crate) fn send_nd(
        &self,
        if_id: InterfaceId,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        mut payload: Vec<u8>,
        route: Option<RouteId>,
    ) -> Result<(), NdiscError> {
        icmp6::fill_checksum(&src, &dst, &mut payload);
        let message = OutboundMessage {
            if_id,
            src,
            dst,
            hop_limit: self.hop_limit(),
            payload,
            route,
        };
        log::trace!("ndisc: {} -> {} on {} type={}", src, dst, if_id, message.icmp6_type());
        self.transmitter().transmit(message)
    }

    /// Sends a Neighbor Solicitation for `target` to `dst`.
    ///
    /// With `src` left out, a link-local address of the interface that is
    /// neither tentative nor optimistic is used, and nothing is sent if
    /// there is none. An unspecified `src` (DAD) never carries a source
    /// link-layer option.
    pub fn send_ns(&self, if_id: InterfaceId, target: &Ipv6Addr, dst: &Ipv6Addr, src: Option<Ipv6Addr>) -> Result<(), NdiscError> {
        let iface = self.interface_or_err(if_id)?;
        let src = match src {
            Some(src) => src,
            None => self
                .addrconf()
                .link_local_source(if_id, AddrFlags::TENTATIVE_OR_OPTIMISTIC)
                .ok_or(NdiscError::Unavailable("no link-local source address"))?,
        };

        let link = iface.link();
        let include_sllao = !src.is_unspecified() && link.addr_len() > 0;
        let payload = builder::neighbor_solicitation(&link, target, include_sllao)?;
        self.send_nd(if_id, src, *dst, payload, None)
    }

    /// Sends a Neighbor Advertisement for `target` to `dst`.
    ///
    /// When `target` is one of our addresses it is also the source; an
    /// optimistic owner never claims override (RFC 4429 §3.3) and
    /// `force_tllao` forces the option. Anything else, proxy and anycast
    /// answers included, gets its source from address selection.
    #[allow(clippy::too_many_arguments)]
    pub fn send_na(
        &self,
        if_id: InterfaceId,
        dst: &Ipv6Addr,
        target: &Ipv6Addr,
        router: bool,
        solicited: bool,
        mut override_: bool,
        mut include_tllao: bool,
    ) -> Result<(), NdiscError> {
        let iface = self.interface_or_err(if_id)?;

        let src = match self.addrconf().local_address(target, if_id) {
            Some(local) => {
                if local.is_optimistic() {
                    override_ = false;
                }
                include_tllao |= iface.config().force_tllao;
                local.addr
            }
            None => self
                .addrconf()
                .source_for(if_id, dst)
                .ok_or(NdiscError::Unavailable("no source address for NA"))?,
        };

        let link = iface.link();
        if link.addr_len() == 0 {
            include_tllao = false;
        }

        let flags = NaFlags { router, solicited, override_ };
        let payload = builder::neighbor_advertisement(&link, target, flags, include_tllao)?;
        self.send_nd(if_id, src, *dst, payload, None)
    }

    /// Sends a Router Solicitation and records that one went out.
    pub fn send_rs(&self, if_id: InterfaceId, src: &Ipv6Addr, dst: &Ipv6Addr) -> Result<(), NdiscError> {
        let iface = self.interface_or_err(if_id)?;

        let mut include_sllao = !src.is_unspecified();
        if include_sllao {
            // RFC 4429 §2.2: an optimistic or unknown source must not
            // pollute the routers' caches.
            match self.addrconf().local_address(src, if_id) {
                Some(local) if !local.is_optimistic() => {}
                _ => include_sllao = false,
            }
        }

        let link = iface.link();
        if link.addr_len() == 0 {
            include_sllao = false;
        }

        let payload = builder::router_solicitation(&link, include_sllao)?;
        self.send_nd(if_id, *src, *dst, payload, None)?;
        iface.with_ra_state(|ra| ra.rs_sent = true);
        Ok(())
    }

    /// Advertises every usable address of the interface to all-nodes with
    /// override set, so peers drop a stale link-layer address.
    pub fn send_unsolicited_na(&self, if_id: InterfaceId) -> Result<(), NdiscError> {
        let iface = self.interface_or_err(if_id)?;
        let router = iface.config().forwarding;

        for target in self.addrconf().addresses(if_id) {
            if let Some(local) = self.addrconf().local_address(&target, if_id) {
                if local.is_tentative() && !local.is_optimistic() {
                    continue;
                }
            }
            if let Err(e) = self.send_na(if_id, &addr::ALL_NODES, &target, router, false, true, true) {
                log::debug!("ndisc: unsolicited NA for {} on {} not sent: {}", target, if_id, e);
            }
        }
        Ok(())
    }

    /// Probe step for an entry being resolved or verified. `trigger_src`
    /// is the source of the packet that caused resolution; it is reused
    /// when it is one of our usable addresses on the interface.
    ///
    /// The first `ucast_probes` probes go unicast to the cached address,
    /// the next `app_probes` belong to a userspace resolver, and the rest
    /// go to the target's solicited-node group.
    pub fn solicit(&self, neigh: &NeighborSnapshot, trigger_src: Option<Ipv6Addr>) -> Result<(), NdiscError> {
        let iface = self.interface_or_err(neigh.if_id)?;
        let params = iface.params();
        let target = neigh.addr;

        let src = trigger_src.filter(|src| self.addrconf().is_local_unicast(src, Some(neigh.if_id)));

        let probes = neigh.probes;
        if probes < params.ucast_probes {
            if !neigh.state.is_valid() {
                log::debug!("ndisc: trying to ucast probe in NUD_INVALID: {}", target);
            }
            self.send_ns(neigh.if_id, &target, &target, src)
        } else if probes < params.ucast_probes + params.app_probes {
            log::debug!("ndisc: {} left to the application resolver", target);
            Ok(())
        } else {
            let group = addr::solicited_node_multicast(&target);
            self.send_ns(neigh.if_id, &target, &group, src)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp6::ndp::NdMessage;
    use crate::memory::test_context;
    use crate::ndisc::collab::NudState;
    use crate::ndisc::options;

    #[test]
    fn ns_uses_link_local_source() {
        let t = test_context();
        let target: Ipv6Addr = "fe80::99".parse().unwrap();
        t.ctx.send_ns(t.if_id, &target, &addr::solicited_node_multicast(&target), None).unwrap();

        let sent = t.transmitter.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].src, t.link_local);
        assert_eq!(sent[0].hop_limit, 255);
        assert!(icmp6::verify_checksum(&sent[0].src, &sent[0].dst, &sent[0].payload));
    }

    #[test]
    fn dad_ns_has_no_sllao() {
        let t = test_context();
        let target: Ipv6Addr = "fe80::42".parse().unwrap();
        let group = addr::solicited_node_multicast(&target);
        t.ctx.send_ns(t.if_id, &target, &group, Some(Ipv6Addr::UNSPECIFIED)).unwrap();

        let sent = t.transmitter.take();
        let msg = NdMessage::parse(&sent[0].payload).unwrap();
        assert!(msg.options().is_empty());
    }

    #[test]
    fn optimistic_target_never_overrides() {
        let t = test_context();
        let optimistic: Ipv6Addr = "2001:db8::5".parse().unwrap();
        t.addrconf.add_address(t.if_id, optimistic, AddrFlags::OPTIMISTIC);
        t.ctx.send_na(t.if_id, &addr::ALL_NODES, &optimistic, false, false, true, true).unwrap();

        let sent = t.transmitter.take();
        assert_eq!(sent[0].src, optimistic);
        match NdMessage::parse(&sent[0].payload).unwrap() {
            NdMessage::NeighborAdvertisement(na) => assert!(!na.override_),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rs_from_optimistic_source_omits_sllao() {
        let t = test_context();
        let optimistic: Ipv6Addr = "fe80::77".parse().unwrap();
        t.addrconf.add_address(t.if_id, optimistic, AddrFlags::OPTIMISTIC);
        t.ctx.send_rs(t.if_id, &optimistic, &addr::ALL_ROUTERS).unwrap();
        t.ctx.send_rs(t.if_id, &t.link_local, &addr::ALL_ROUTERS).unwrap();

        let sent = t.transmitter.take();
        assert_eq!(sent[0].payload.len(), 8);
        let parsed = options::parse(&sent[1].payload[8..]).unwrap();
        assert!(parsed.source_link_addr().is_some());
        assert!(t.ctx.interface(t.if_id).unwrap().ra_state().rs_sent);
    }

    #[test]
    fn solicit_moves_from_unicast_to_multicast() {
        let t = test_context();
        let target: Ipv6Addr = "fe80::1234".parse().unwrap();
        let mut neigh = NeighborSnapshot {
            addr: target,
            if_id: t.if_id,
            lladdr: None,
            state: NudState::Probe,
            is_router: false,
            probes: 0,
        };

        t.ctx.solicit(&neigh, None).unwrap();
        neigh.probes = 3;
        t.ctx.solicit(&neigh, None).unwrap();

        let sent = t.transmitter.take();
        assert_eq!(sent[0].dst, target);
        assert_eq!(sent[1].dst, addr::solicited_node_multicast(&target));
    }

    #[test]
    fn solicit_reuses_usable_trigger_source() {
        let t = test_context();
        let global: Ipv6Addr = "2001:db8::1".parse().unwrap();
        t.addrconf.add_address(t.if_id, global, AddrFlags::NONE);
        let foreign: Ipv6Addr = "2001:db8::dead".parse().unwrap();
        let neigh = NeighborSnapshot {
            addr: "2001:db8::2".parse().unwrap(),
            if_id: t.if_id,
            lladdr: None,
            state: NudState::Incomplete,
            is_router: false,
            probes: 5,
        };

        t.ctx.solicit(&neigh, Some(global)).unwrap();
        t.ctx.solicit(&neigh, Some(foreign)).unwrap();

        let sent = t.transmitter.take();
        assert_eq!(sent[0].src, global);
        assert_eq!(sent[1].src, t.link_local);
    }

    #[test]
    fn unsolicited_na_skips_tentative() {
        let t = test_context();
        let tentative: Ipv6Addr = "2001:db8::9".parse().unwrap();
        t.addrconf.add_address(t.if_id, tentative, AddrFlags::TENTATIVE);
        t.ctx.send_unsolicited_na(t.if_id).unwrap();

        let sent = t.transmitter.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].src, t.link_local);
        assert_eq!(sent[0].dst, addr::ALL_NODES);
    }
}

use std::net::Ipv6Addr;
use std::time::Duration;

use crate::icmp6::ndp;
use crate::icmp6::ndp::Redirect;
use crate::icmp6::packet::InboundPacket;
use crate::icmp6::IPV6_HEADER_LEN;
use crate::interface::InterfaceId;
use crate::nd_log;

use super::addr;
use super::builder;
use super::collab::AddrFlags;
use super::collab::RedirectNotice;
use super::context::NdInterface;
use super::options;
use super::NdiscContext;
use super::NdiscError;

/// Source and destination of the IPv6 packet a redirect is about.
fn original_addrs(original: &[u8]) -> Option<(Ipv6Addr, Ipv6Addr)> {
    if original.len() < IPV6_HEADER_LEN {
        return None;
    }
    Some((ndp::read_addr(original, 8), ndp::read_addr(original, 24)))
}

impl NdiscContext {
    pub(crate) fn recv_redirect(&self, iface: &NdInterface, packet: &InboundPacket, rd: &Redirect<'_>) -> Result<(), NdiscError> {
        if !addr::is_link_local_unicast(&packet.src) {
            nd_log!(self.log_limit(), log::Level::Warn, "Redirect: source address is not link-local");
            return Err(NdiscError::ProtocolViolation("Redirect: source address is not link-local"));
        }

        let opts = options::parse(rd.options)?;
        let original = opts
            .redirected_header()
            .and_then(|opt| opt.redirected_packet())
            .ok_or(NdiscError::ProtocolViolation("Redirect: no redirected header"))?;

        self.notifier().redirect(RedirectNotice {
            if_id: iface.if_id(),
            router: packet.src,
            target: rd.target,
            destination: rd.destination,
            original: original.to_vec(),
        });
        Ok(())
    }

    /// Tells the sender of `original` (an IPv6 packet received on
    /// `if_id`, header included) that `target` is a better first hop.
    ///
    /// Only on-link destinations are redirected, at most once per
    /// `redirect_interval_ms` and destination in steady state. The
    /// target's link-layer address is included only if the cache already
    /// holds a valid one.
    pub fn send_redirect(&self, if_id: InterfaceId, original: &[u8], target: &Ipv6Addr) -> Result<(), NdiscError> {
        let iface = self.interface_or_err(if_id)?;

        let saddr = match self.addrconf().link_local_source(if_id, AddrFlags::TENTATIVE) {
            Some(saddr) => saddr,
            None => {
                nd_log!(self.log_limit(), log::Level::Warn, "Redirect: no link-local address on {}", iface.name());
                return Err(NdiscError::Unavailable("Redirect: no link-local address"));
            }
        };

        let (orig_src, orig_dst) = original_addrs(original).ok_or(NdiscError::ProtocolViolation("Redirect: original packet too short"))?;

        if orig_dst != *target && !addr::is_link_local_unicast(target) {
            nd_log!(self.log_limit(), log::Level::Warn, "Redirect: target address is not link-local unicast");
            return Err(NdiscError::ProtocolViolation("Redirect: target is not link-local unicast"));
        }

        let route = self
            .routes()
            .lookup_route(&orig_src, if_id)
            .ok_or(NdiscError::Unavailable("Redirect: no route to sender"))?;
        if route.is_gateway {
            nd_log!(self.log_limit(), log::Level::Warn, "Redirect: destination is not a neighbour");
            return Err(NdiscError::ProtocolViolation("Redirect: destination is not a neighbour"));
        }

        let interval = Duration::from_millis(iface.config().redirect_interval_ms as u64);
        if !self.redirect_limiter().allow(route.dst, interval) {
            return Err(NdiscError::RateLimited);
        }

        let link = iface.link();
        let mut lladdr = None;
        if link.addr_len() > 0 {
            let entry = match self.neighbors().lookup(target, if_id) {
                Some(entry) => entry,
                None => {
                    nd_log!(self.log_limit(), log::Level::Warn, "Redirect: no neigh for target address");
                    return Err(NdiscError::Unavailable("Redirect: no neighbour for target"));
                }
            };
            let snapshot = entry.snapshot();
            drop(entry);
            if snapshot.state.is_valid() {
                lladdr = snapshot.lladdr;
            }
        }

        let payload = builder::redirect(&link, target, &orig_dst, lladdr.as_ref(), original)?;
        self.send_nd(if_id, saddr, orig_src, payload, Some(route.id))
    }
}

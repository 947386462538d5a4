//! Entry points: the receive gate for inbound ND messages and the device
//! event handlers.

use crate::icmp6::ndp;
use crate::icmp6::ndp::NdMessage;
use crate::icmp6::packet::InboundPacket;
use crate::interface::InterfaceId;
use crate::nd_log;

use super::context::ND_HOP_LIMIT;
use super::link::LinkInfo;
use super::NdiscContext;
use super::NdiscError;

impl NdiscContext {
    /// Processes one received ICMPv6 message. Failures are logged (rate
    /// limited) and otherwise swallowed; nothing is ever sent back about
    /// a rejected message.
    pub fn handle_inbound(&self, packet: &InboundPacket) {
        match self.receive(packet) {
            Ok(()) => {}
            // already reported where it was detected
            Err(NdiscError::Conflict(_)) => {}
            Err(NdiscError::RateLimited) => {
                log::trace!("ndisc: deferred or throttled message from {}", packet.src);
            }
            Err(e) => {
                nd_log!(self.log_limit(), log::Level::Debug, "ndisc: dropped message from {} on {}: {}", packet.src, packet.if_id, e);
            }
        }
    }

    /// Like [`NdiscContext::handle_inbound`], but reports what became of
    /// the message.
    pub fn receive(&self, packet: &InboundPacket) -> Result<(), NdiscError> {
        let (icmp6_type, code) = match (packet.icmp6_type(), packet.icmp6_code()) {
            (Some(t), Some(c)) if packet.data.len() >= 4 => (t, c),
            _ => return Err(NdiscError::Truncated(crate::icmp6::Icmp6Error::new("ICMPv6 packet too short"))),
        };

        if packet.hop_limit != ND_HOP_LIMIT {
            nd_log!(self.log_limit(), log::Level::Warn, "NDISC: invalid hop-limit: {}", packet.hop_limit);
            return Err(NdiscError::ProtocolViolation("hop limit is not 255"));
        }

        if code != 0 {
            nd_log!(self.log_limit(), log::Level::Warn, "NDISC: invalid ICMPv6 code: {}", code);
            return Err(NdiscError::ProtocolViolation("ICMPv6 code is not 0"));
        }

        if !ndp::is_nd_type(icmp6_type) {
            return Ok(());
        }

        let iface = self.interface(packet.if_id).ok_or(NdiscError::Unavailable("interface is not served"))?;

        match NdMessage::parse(&packet.data)? {
            NdMessage::NeighborSolicitation(ns) => self.recv_ns(&iface, packet, &ns),
            NdMessage::NeighborAdvertisement(na) => self.recv_na(&iface, packet, &na),
            NdMessage::RouterSolicitation(rs) => self.recv_rs(&iface, packet, &rs),
            NdMessage::RouterAdvertisement(ra) => self.recv_ra(&iface, packet, &ra),
            NdMessage::Redirect(rd) => self.recv_redirect(&iface, packet, &rd),
        }
    }

    /// The interface's link-layer address changed.
    pub fn on_address_changed(&self, if_id: InterfaceId) {
        self.neighbors().change_addr(if_id);
        self.routes().run_gc();
        if let Some(iface) = self.interface(if_id) {
            if iface.config().ndisc_notify {
                if let Err(e) = self.send_unsolicited_na(if_id) {
                    log::debug!("ndisc: unsolicited NA on {} failed: {}", iface.name(), e);
                }
            }
        }
    }

    pub fn on_interface_down(&self, if_id: InterfaceId) {
        self.neighbors().flush_interface(if_id);
        self.routes().run_gc();
    }

    /// Peers should refresh their cached address for us, e.g. after a
    /// failover.
    pub fn on_peer_notify(&self, if_id: InterfaceId) {
        if let Err(e) = self.send_unsolicited_na(if_id) {
            log::debug!("ndisc: peer notification on {} failed: {}", if_id, e);
        }
    }

    /// New link parameters for a served interface. A changed hardware
    /// address is handled like [`NdiscContext::on_address_changed`].
    pub fn on_link_changed(&self, if_id: InterfaceId, link: LinkInfo) {
        let iface = match self.interface(if_id) {
            Some(iface) => iface,
            None => return,
        };
        let old = iface.link();
        if old == link {
            return;
        }
        let addr_changed = old.addr != link.addr;
        if old.mtu != link.mtu {
            log::info!("ndisc: {} mtu {} -> {}", iface.name(), old.mtu, link.mtu);
            iface.with_ra_state(|state| {
                if state.mtu6 > link.mtu {
                    state.mtu6 = link.mtu;
                }
            });
        }
        iface.set_link(link);
        if addr_changed {
            self.on_address_changed(if_id);
        }
    }
}

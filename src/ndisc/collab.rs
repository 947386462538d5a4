//! What the engine needs from the rest of the stack.
//!
//! The neighbor cache, routing table, address configuration, transmit
//! path, management-plane notifications and the deferred proxy queue all
//! live outside the engine. Each is an object-safe trait so a context can
//! be wired to the kernel, to a daemon, or to the in-memory versions in
//! [`crate::memory`].

use std::net::Ipv6Addr;
use std::time::Duration;

use crate::icmp6::ndp::RouterPreference;
use crate::icmp6::packet::InboundPacket;
use crate::interface::InterfaceId;
use crate::interface::LinkAddr;

use super::params::Ticks;
use super::NdiscError;

/// Neighbor Unreachability Detection state (RFC 4861 §7.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NudState {
    Incomplete,
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
    /// No resolution needed on this link.
    NoArp,
    /// Administratively configured.
    Permanent,
}

impl NudState {
    /// A usable link-layer address is known.
    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            NudState::Permanent | NudState::NoArp | NudState::Reachable | NudState::Probe | NudState::Stale | NudState::Delay
        )
    }

    /// Reachability is confirmed (or never needs to be).
    pub fn is_connected(&self) -> bool {
        matches!(self, NudState::Permanent | NudState::NoArp | NudState::Reachable)
    }

    /// States driven by a timer in the cache.
    pub fn in_timer(&self) -> bool {
        matches!(self, NudState::Incomplete | NudState::Reachable | NudState::Delay | NudState::Probe)
    }
}

/// How much authority an update carries (RFC 4861 §7.2.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateFlags {
    /// Replace a cached link-layer address that differs.
    pub override_: bool,
    /// If the address differs and may not be overridden, demote a
    /// connected entry to STALE instead of ignoring the update.
    pub weak_override: bool,
    /// Let this update set or clear the router flag.
    pub override_is_router: bool,
    /// The router flag to apply when `override_is_router` holds.
    pub is_router: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborUpdate {
    pub lladdr: Option<LinkAddr>,
    pub state: NudState,
    pub flags: UpdateFlags,
}

/// A copy of an entry taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborSnapshot {
    pub addr: Ipv6Addr,
    pub if_id: InterfaceId,
    pub lladdr: Option<LinkAddr>,
    pub state: NudState,
    pub is_router: bool,
    /// Solicitations sent since the entry last became valid.
    pub probes: u32,
}

/// A locked neighbor cache entry. Dropping it releases the lock.
pub trait NeighborEntry {
    fn snapshot(&self) -> NeighborSnapshot;

    fn state(&self) -> NudState {
        self.snapshot().state
    }

    fn is_router(&self) -> bool {
        self.snapshot().is_router
    }

    fn lladdr(&self) -> Option<LinkAddr> {
        self.snapshot().lladdr
    }

    fn update(&mut self, update: &NeighborUpdate);

    fn set_router(&mut self, is_router: bool);
}

/// A published proxy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyEntry {
    pub addr: Ipv6Addr,
    pub if_id: InterfaceId,
    pub is_router: bool,
}

pub trait NeighborCache: Send + Sync {
    fn lookup(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> Option<Box<dyn NeighborEntry + '_>>;

    /// With `create`, a missing entry is inserted first. `None` when the
    /// entry neither exists nor could be created.
    fn lookup_or_create(&self, addr: &Ipv6Addr, if_id: InterfaceId, create: bool) -> Option<Box<dyn NeighborEntry + '_>>;

    fn proxy_lookup(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> Option<ProxyEntry>;

    /// The interface went down: drop its entries and proxy entries.
    fn flush_interface(&self, if_id: InterfaceId);

    /// The interface's link-layer address changed.
    fn change_addr(&self, if_id: InterfaceId);
}

/// Identity of a route; stays the same for the route's whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMetric {
    HopLimit,
    Mtu,
}

/// Result of a route lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLookup {
    pub id: RouteId,
    /// Destination prefix of the matching route.
    pub dst: Ipv6Addr,
    pub prefix_len: u8,
    pub if_id: InterfaceId,
    /// The destination is reached through a gateway.
    pub is_gateway: bool,
}

pub trait RoutingTable: Send + Sync {
    fn default_router(&self, gateway: &Ipv6Addr, if_id: InterfaceId) -> Option<RouteId>;

    fn add_default_router(&self, gateway: &Ipv6Addr, if_id: InterfaceId, pref: RouterPreference) -> Option<RouteId>;

    fn delete_route(&self, route: RouteId);

    fn set_route_preference(&self, route: RouteId, pref: RouterPreference);

    fn set_route_metric(&self, route: RouteId, metric: RouteMetric, value: u32);

    fn set_route_expiry(&self, route: RouteId, lifetime: Ticks);

    /// Applies one Route Information option (RFC 4191 §2.3), header included.
    fn import_route_info(&self, if_id: InterfaceId, option: &[u8], router: &Ipv6Addr);

    fn lookup_route(&self, dst: &Ipv6Addr, if_id: InterfaceId) -> Option<RouteLookup>;

    fn mtu_changed(&self, if_id: InterfaceId, mtu: u32);

    fn run_gc(&self);
}

/// Address state flags used to filter candidate addresses. An optimistic
/// address (RFC 4429) is still under DAD and carries both flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddrFlags {
    pub tentative: bool,
    pub optimistic: bool,
}

impl AddrFlags {
    pub const NONE: Self = Self { tentative: false, optimistic: false };
    pub const TENTATIVE: Self = Self { tentative: true, optimistic: false };
    pub const OPTIMISTIC: Self = Self { tentative: true, optimistic: true };
    pub const TENTATIVE_OR_OPTIMISTIC: Self = Self { tentative: true, optimistic: true };

    pub fn intersects(&self, other: &AddrFlags) -> bool {
        (self.tentative && other.tentative) || (self.optimistic && other.optimistic)
    }
}

/// An address assigned to one of our interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAddress {
    pub addr: Ipv6Addr,
    pub if_id: InterfaceId,
    pub flags: AddrFlags,
}

impl LocalAddress {
    pub fn is_tentative(&self) -> bool {
        self.flags.tentative
    }

    pub fn is_optimistic(&self) -> bool {
        self.flags.optimistic
    }
}

pub trait AddressConfig: Send + Sync {
    /// The address as assigned to `if_id`, whatever its DAD state.
    fn local_address(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> Option<LocalAddress>;

    /// All unicast addresses on `if_id`.
    fn addresses(&self, if_id: InterfaceId) -> Vec<Ipv6Addr>;

    /// Whether `addr` is a usable unicast address (DAD done, or
    /// optimistic), on `if_id` or on any interface.
    fn is_local_unicast(&self, addr: &Ipv6Addr, if_id: Option<InterfaceId>) -> bool;

    fn is_anycast(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> bool;

    /// A link-local address of `if_id` carrying none of `banned`.
    fn link_local_source(&self, if_id: InterfaceId, banned: AddrFlags) -> Option<Ipv6Addr>;

    /// Source address selection towards `dst`.
    fn source_for(&self, if_id: InterfaceId, dst: &Ipv6Addr) -> Option<Ipv6Addr>;

    fn dad_failed(&self, addr: &LocalAddress);

    /// Applies one Prefix Information option, header included.
    fn import_prefix_info(&self, if_id: InterfaceId, option: &[u8], sllao_present: bool);
}

/// An ND message ready to leave, checksum filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub if_id: InterfaceId,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub hop_limit: u8,
    /// The ICMPv6 message.
    pub payload: Vec<u8>,
    /// Pre-resolved route; the transmitter resolves one when absent.
    pub route: Option<RouteId>,
}

impl OutboundMessage {
    pub fn icmp6_type(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }
}

pub trait Transmitter: Send + Sync {
    /// Enqueues without blocking.
    fn transmit(&self, message: OutboundMessage) -> Result<(), NdiscError>;
}

/// A received Redirect, trimmed to the original packet it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectNotice {
    pub if_id: InterfaceId,
    pub router: Ipv6Addr,
    pub target: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub original: Vec<u8>,
}

pub trait NdiscNotifier: Send + Sync {
    /// An RDNSS/DNSSL option from a Router Advertisement, header included.
    fn user_option(&self, if_id: InterfaceId, icmp6_type: u8, icmp6_code: u8, option: &[u8], router: &Ipv6Addr);

    /// Retransmit or reachable time of the interface changed.
    fn link_params_changed(&self, if_id: InterfaceId);

    fn redirect(&self, notice: RedirectNotice);
}

pub trait DeferredQueue: Send + Sync {
    /// Schedules `packet` to be handed back to the engine after a random
    /// delay below `max_delay`. Returns false if the queue already holds
    /// `qlen` packets.
    fn enqueue(&self, packet: InboundPacket, max_delay: Duration, qlen: usize) -> bool;
}

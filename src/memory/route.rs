use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use parking_lot::Mutex;
use parking_lot::RwLock;

use crate::icmp6::ndp::RouterPreference;
use crate::interface::InterfaceId;
use crate::ndisc::collab::RouteId;
use crate::ndisc::collab::RouteLookup;
use crate::ndisc::collab::RouteMetric;
use crate::ndisc::collab::RoutingTable;
use crate::ndisc::params::Ticks;

/// Route Information lifetime meaning "forever" (RFC 4191 §2.3).
const INFINITE_LIFETIME: u32 = 0xffff_ffff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub id: RouteId,
    pub dst: Ipv6Addr,
    pub prefix_len: u8,
    pub gateway: Option<Ipv6Addr>,
    pub if_id: InterfaceId,
    pub preference: RouterPreference,
    /// Last lifetime set; `None` for routes that never expire.
    pub lifetime: Option<Ticks>,
    pub expires_at: Option<Instant>,
    pub hop_limit: Option<u32>,
    pub mtu: Option<u32>,
}

impl RouteEntry {
    pub fn is_default(&self) -> bool {
        self.prefix_len == 0
    }

    fn matches(&self, dst: &Ipv6Addr) -> bool {
        mask(dst, self.prefix_len) == self.dst
    }
}

fn mask(addr: &Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    let bits = u128::from(*addr);
    let masked = match prefix_len {
        0 => 0,
        n if n >= 128 => bits,
        n => bits & (u128::MAX << (128 - n as u32)),
    };
    Ipv6Addr::from(masked)
}

/// Routing table kept in process memory.
#[derive(Debug, Default)]
pub struct MemRoutingTable {
    next_id: AtomicU64,
    routes: RwLock<BTreeMap<RouteId, RouteEntry>>,
    mtu_events: Mutex<Vec<(InterfaceId, u32)>>,
}

impl MemRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route and returns its id. The destination is masked to
    /// `prefix_len`.
    pub fn add_route(&self, dst: Ipv6Addr, prefix_len: u8, gateway: Option<Ipv6Addr>, if_id: InterfaceId) -> RouteId {
        let id = RouteId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let entry = RouteEntry {
            id,
            dst: mask(&dst, prefix_len),
            prefix_len: prefix_len.min(128),
            gateway,
            if_id,
            preference: RouterPreference::Medium,
            lifetime: None,
            expires_at: None,
            hop_limit: None,
            mtu: None,
        };
        self.routes.write().insert(id, entry);
        id
    }

    pub fn get(&self, id: RouteId) -> Option<RouteEntry> {
        self.routes.read().get(&id).cloned()
    }

    pub fn routes(&self) -> Vec<RouteEntry> {
        self.routes.read().values().cloned().collect()
    }

    pub fn default_routers(&self, if_id: InterfaceId) -> Vec<RouteEntry> {
        self.routes
            .read()
            .values()
            .filter(|r| r.is_default() && r.gateway.is_some() && r.if_id == if_id)
            .cloned()
            .collect()
    }

    /// MTU changes reported so far, oldest first.
    pub fn mtu_events(&self) -> Vec<(InterfaceId, u32)> {
        self.mtu_events.lock().clone()
    }

    fn find(&self, dst: &Ipv6Addr, prefix_len: u8, gateway: &Ipv6Addr, if_id: InterfaceId) -> Option<RouteId> {
        self.routes
            .read()
            .values()
            .find(|r| r.dst == *dst && r.prefix_len == prefix_len && r.gateway.as_ref() == Some(gateway) && r.if_id == if_id)
            .map(|r| r.id)
    }

    fn with_route(&self, id: RouteId, f: impl FnOnce(&mut RouteEntry)) {
        match self.routes.write().get_mut(&id) {
            Some(entry) => f(entry),
            None => log::debug!("route: {:?} is gone", id),
        }
    }
}

impl RoutingTable for MemRoutingTable {
    fn default_router(&self, gateway: &Ipv6Addr, if_id: InterfaceId) -> Option<RouteId> {
        self.find(&Ipv6Addr::UNSPECIFIED, 0, gateway, if_id)
    }

    fn add_default_router(&self, gateway: &Ipv6Addr, if_id: InterfaceId, pref: RouterPreference) -> Option<RouteId> {
        let id = self.add_route(Ipv6Addr::UNSPECIFIED, 0, Some(*gateway), if_id);
        self.with_route(id, |r| r.preference = pref);
        log::debug!("route: default via {} dev {} ({:?})", gateway, if_id, pref);
        Some(id)
    }

    fn delete_route(&self, route: RouteId) {
        if let Some(entry) = self.routes.write().remove(&route) {
            log::debug!("route: deleted {}/{} via {:?}", entry.dst, entry.prefix_len, entry.gateway);
        }
    }

    fn set_route_preference(&self, route: RouteId, pref: RouterPreference) {
        self.with_route(route, |r| r.preference = pref);
    }

    fn set_route_metric(&self, route: RouteId, metric: RouteMetric, value: u32) {
        self.with_route(route, |r| match metric {
            RouteMetric::HopLimit => r.hop_limit = Some(value),
            RouteMetric::Mtu => r.mtu = Some(value),
        });
    }

    fn set_route_expiry(&self, route: RouteId, lifetime: Ticks) {
        let expires_at = Instant::now() + lifetime.as_duration();
        self.with_route(route, |r| {
            r.lifetime = Some(lifetime);
            r.expires_at = Some(expires_at);
        });
    }

    fn import_route_info(&self, if_id: InterfaceId, option: &[u8], router: &Ipv6Addr) {
        if option.len() < 8 {
            return;
        }
        let units = option[1];
        let prefix_len = option[2];
        if units > 3 || prefix_len > 128 || (prefix_len > 64 && units < 2) || (prefix_len > 0 && units < 1) {
            log::debug!("route: malformed route information option from {}", router);
            return;
        }

        let pref = RouterPreference::from_bits(option[3] >> 3);
        if pref == RouterPreference::Invalid {
            return;
        }

        let lifetime = u32::from_be_bytes([option[4], option[5], option[6], option[7]]);

        let mut prefix = [0u8; 16];
        let present = (option.len() - 8).min(16);
        prefix[..present].copy_from_slice(&option[8..8 + present]);
        let prefix = mask(&Ipv6Addr::from(prefix), prefix_len);

        let existing = self.find(&prefix, prefix_len, router, if_id);
        if lifetime == 0 {
            if let Some(id) = existing {
                self.delete_route(id);
            }
            return;
        }

        let id = match existing {
            Some(id) => id,
            None => self.add_route(prefix, prefix_len, Some(*router), if_id),
        };
        let lifetime = if lifetime == INFINITE_LIFETIME {
            None
        } else {
            Some(Ticks::from_secs(lifetime as u64))
        };
        self.with_route(id, |r| {
            r.preference = pref;
            r.lifetime = lifetime;
            r.expires_at = lifetime.map(|l| Instant::now() + l.as_duration());
        });
        log::debug!("route: {}/{} via {} dev {} ({:?})", prefix, prefix_len, router, if_id, pref);
    }

    fn lookup_route(&self, dst: &Ipv6Addr, if_id: InterfaceId) -> Option<RouteLookup> {
        self.routes
            .read()
            .values()
            .filter(|r| r.if_id == if_id && r.matches(dst))
            .max_by_key(|r| r.prefix_len)
            .map(|r| RouteLookup {
                id: r.id,
                dst: r.dst,
                prefix_len: r.prefix_len,
                if_id: r.if_id,
                is_gateway: r.gateway.is_some(),
            })
    }

    fn mtu_changed(&self, if_id: InterfaceId, mtu: u32) {
        self.mtu_events.lock().push((if_id, mtu));
        for entry in self.routes.write().values_mut() {
            if entry.if_id == if_id && entry.mtu.map_or(false, |m| m > mtu) {
                entry.mtu = Some(mtu);
            }
        }
    }

    fn run_gc(&self) {
        let now = Instant::now();
        self.routes.write().retain(|_, r| r.expires_at.map_or(true, |at| at > now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IF: InterfaceId = InterfaceId::new(2);

    fn router() -> Ipv6Addr {
        "fe80::1".parse().unwrap()
    }

    fn rio(prefix_len: u8, units: u8, pref: RouterPreference, lifetime: u32, prefix: &[u8]) -> Vec<u8> {
        let mut opt = vec![24, units, prefix_len, pref.bits() << 3];
        opt.extend_from_slice(&lifetime.to_be_bytes());
        opt.extend_from_slice(prefix);
        opt.resize(units as usize * 8, 0);
        opt
    }

    #[test]
    fn longest_prefix_wins() {
        let table = MemRoutingTable::new();
        table.add_route(Ipv6Addr::UNSPECIFIED, 0, Some(router()), IF);
        let onlink = table.add_route("2001:db8::".parse().unwrap(), 64, None, IF);

        let hit = table.lookup_route(&"2001:db8::5".parse().unwrap(), IF).unwrap();
        assert_eq!(hit.id, onlink);
        assert!(!hit.is_gateway);

        let hit = table.lookup_route(&"2001:db9::5".parse().unwrap(), IF).unwrap();
        assert!(hit.is_gateway);
        assert!(table.lookup_route(&"2001:db8::5".parse().unwrap(), InterfaceId::new(7)).is_none());
    }

    #[test]
    fn route_information_is_imported() {
        let table = MemRoutingTable::new();
        let opt = rio(48, 2, RouterPreference::High, 600, &[0x20, 0x01, 0x0d, 0xb8, 0x00, 0x01, 0xff]);
        table.import_route_info(IF, &opt, &router());

        let routes = table.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].dst, "2001:db8:1::".parse::<Ipv6Addr>().unwrap());
        assert_eq!(routes[0].preference, RouterPreference::High);
        assert!(routes[0].expires_at.is_some());

        let withdraw = rio(48, 2, RouterPreference::High, 0, &[0x20, 0x01, 0x0d, 0xb8, 0x00, 0x01]);
        table.import_route_info(IF, &withdraw, &router());
        assert!(table.routes().is_empty());
    }

    #[test]
    fn route_information_checks_length() {
        let table = MemRoutingTable::new();
        table.import_route_info(IF, &rio(96, 1, RouterPreference::Medium, 60, &[]), &router());
        table.import_route_info(IF, &rio(64, 1, RouterPreference::Invalid, 60, &[]), &router());
        assert!(table.routes().is_empty());

        table.import_route_info(IF, &rio(0, 1, RouterPreference::Low, INFINITE_LIFETIME, &[]), &router());
        let id = table.default_router(&router(), IF).unwrap();
        assert_eq!(table.get(id).unwrap().expires_at, None);
    }

    #[test]
    fn gc_drops_expired_routes() {
        let table = MemRoutingTable::new();
        let id = table.add_default_router(&router(), IF, RouterPreference::Medium).unwrap();
        table.set_route_expiry(id, Ticks::ZERO);
        std::thread::sleep(std::time::Duration::from_millis(5));
        table.run_gc();
        assert!(table.get(id).is_none());
    }
}

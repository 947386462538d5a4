use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::Mutex;
use parking_lot::RawMutex;
use parking_lot::RwLock;

use crate::interface::InterfaceId;
use crate::interface::LinkAddr;
use crate::ndisc::addr;
use crate::ndisc::collab::NeighborCache;
use crate::ndisc::collab::NeighborEntry;
use crate::ndisc::collab::NeighborSnapshot;
use crate::ndisc::collab::NeighborUpdate;
use crate::ndisc::collab::NudState;
use crate::ndisc::collab::ProxyEntry;
use crate::ndisc::link::LinkInfo;
use crate::ndisc::params::NdParams;

#[derive(Debug, Clone)]
pub struct NeighborRecord {
    addr: Ipv6Addr,
    if_id: InterfaceId,
    /// Hardware address length of the device when the entry was made;
    /// zero for links without link-layer addresses.
    dev_addr_len: usize,
    lladdr: Option<LinkAddr>,
    state: NudState,
    is_router: bool,
    probes: u32,
    updated: Instant,
    confirmed: Instant,
}

impl NeighborRecord {
    fn new(addr: Ipv6Addr, if_id: InterfaceId, link: &LinkInfo) -> Self {
        let now = Instant::now();
        let (state, lladdr) = if !link.link_type.has_link_header() {
            (NudState::NoArp, None)
        } else if addr.is_multicast() {
            (NudState::NoArp, link.multicast_map(&addr, true))
        } else if link.flags.noarp || link.flags.loopback {
            (NudState::NoArp, link.addr)
        } else if link.flags.pointopoint {
            (NudState::NoArp, link.broadcast)
        } else {
            (NudState::Incomplete, None)
        };

        Self {
            addr,
            if_id,
            dev_addr_len: link.addr_len(),
            lladdr,
            state,
            is_router: false,
            probes: 0,
            updated: now,
            confirmed: now,
        }
    }

    fn snapshot(&self) -> NeighborSnapshot {
        NeighborSnapshot {
            addr: self.addr,
            if_id: self.if_id,
            lladdr: self.lladdr,
            state: self.state,
            is_router: self.is_router,
            probes: self.probes,
        }
    }

    /// RFC 4861 §7.2.5 and appendix C, as the kernel's `neigh_update`
    /// applies them.
    fn apply(&mut self, update: &NeighborUpdate) {
        let old = self.state;
        let mut new = update.state;
        let flags = update.flags;

        if matches!(old, NudState::NoArp | NudState::Permanent) {
            return;
        }

        if !new.is_valid() {
            self.state = new;
            return;
        }

        let lladdr = if self.dev_addr_len == 0 {
            self.lladdr
        } else if let Some(proposed) = update.lladdr {
            Some(proposed)
        } else {
            if !old.is_valid() {
                return;
            }
            self.lladdr
        };

        let now = Instant::now();
        if new.is_connected() {
            self.confirmed = now;
        }
        self.updated = now;

        let mut update_isrouter = flags.override_is_router;
        let mut lladdr = lladdr;
        if old.is_valid() {
            if lladdr != self.lladdr && !flags.override_ {
                update_isrouter = false;
                if flags.weak_override && old.is_connected() {
                    lladdr = self.lladdr;
                    new = NudState::Stale;
                } else {
                    return;
                }
            } else if lladdr == self.lladdr && new == NudState::Stale && (flags.weak_override || old.is_connected()) {
                new = old;
            }
        }

        if new != old {
            self.state = new;
            if new.is_valid() {
                self.probes = 0;
            }
        }

        if lladdr != self.lladdr {
            self.lladdr = lladdr;
        }

        if update_isrouter {
            self.is_router = flags.is_router;
        }
    }
}

/// A locked entry. The lock is held until the handle is dropped.
pub struct MemNeighborEntry {
    guard: ArcMutexGuard<RawMutex, NeighborRecord>,
}

impl NeighborEntry for MemNeighborEntry {
    fn snapshot(&self) -> NeighborSnapshot {
        self.guard.snapshot()
    }

    fn update(&mut self, update: &NeighborUpdate) {
        self.guard.apply(update);
    }

    fn set_router(&mut self, is_router: bool) {
        self.guard.is_router = is_router;
    }
}

type Key = (Ipv6Addr, InterfaceId);

/// Neighbor cache kept in process memory. Entries are individually
/// locked; the table lock is only held to find or insert an entry.
#[derive(Debug, Default)]
pub struct MemNeighborCache {
    entries: RwLock<HashMap<Key, Arc<Mutex<NeighborRecord>>>>,
    proxies: RwLock<HashMap<Key, ProxyEntry>>,
    devices: RwLock<HashMap<InterfaceId, LinkInfo>>,
}

impl MemNeighborCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries can only be created on registered devices.
    pub fn register_device(&self, if_id: InterfaceId, link: LinkInfo) {
        self.devices.write().insert(if_id, link);
    }

    pub fn unregister_device(&self, if_id: InterfaceId) {
        self.devices.write().remove(&if_id);
        self.flush_interface(if_id);
    }

    /// Publishes a proxy entry and returns the solicited-node group the
    /// caller has to join on `if_id`.
    pub fn publish_proxy(&self, addr: Ipv6Addr, if_id: InterfaceId, is_router: bool) -> Ipv6Addr {
        self.proxies.write().insert((addr, if_id), ProxyEntry { addr, if_id, is_router });
        log::debug!("proxy: publishing {} on {}", addr, if_id);
        addr::solicited_node_multicast(&addr)
    }

    /// Returns the group to leave, unless another entry still needs it.
    pub fn unpublish_proxy(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> Option<Ipv6Addr> {
        let mut proxies = self.proxies.write();
        proxies.remove(&(*addr, if_id))?;
        let group = addr::solicited_node_multicast(addr);
        let shared = proxies
            .values()
            .any(|p| p.if_id == if_id && addr::solicited_node_multicast(&p.addr) == group);
        if shared {
            None
        } else {
            Some(group)
        }
    }

    pub fn proxies(&self) -> Vec<ProxyEntry> {
        self.proxies.read().values().copied().collect()
    }

    /// Inserts or replaces an entry as given.
    pub fn insert(&self, addr: Ipv6Addr, if_id: InterfaceId, lladdr: Option<LinkAddr>, state: NudState, is_router: bool) {
        let link = self.devices.read().get(&if_id).cloned().unwrap_or_else(|| LinkInfo::headerless(1280));
        let mut record = NeighborRecord::new(addr, if_id, &link);
        record.lladdr = lladdr;
        record.state = state;
        record.is_router = is_router;
        self.entries.write().insert((addr, if_id), Arc::new(Mutex::new(record)));
    }

    pub fn get(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> Option<NeighborSnapshot> {
        let record = self.entries.read().get(&(*addr, if_id)).cloned()?;
        let snapshot = record.lock().snapshot();
        Some(snapshot)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops FAILED entries and entries untouched for `stale_after`,
    /// except administrative ones. Returns how many went away.
    pub fn expire(&self, stale_after: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, record| {
            let record = record.lock();
            match record.state {
                NudState::Permanent | NudState::NoArp => true,
                NudState::Failed => false,
                _ => now.saturating_duration_since(record.updated) < stale_after,
            }
        });
        before - entries.len()
    }

    /// Advances the NUD timers and returns the entries that need a
    /// solicitation now, each as it was before the probe was counted.
    ///
    /// REACHABLE entries whose confirmation is older than the reachable
    /// time go STALE. INCOMPLETE and PROBE entries are probed once per
    /// retransmit interval and go FAILED once all probes are spent.
    /// Unresolved entries skip the unicast probes. Interfaces `params`
    /// knows nothing about are left alone.
    pub fn run_timers(&self, params: impl Fn(InterfaceId) -> Option<NdParams>) -> Vec<NeighborSnapshot> {
        let now = Instant::now();
        let records: Vec<_> = self.entries.read().values().cloned().collect();
        let mut due = Vec::new();
        for record in records {
            let mut record = record.lock();
            let params = match params(record.if_id) {
                Some(params) => params,
                None => continue,
            };
            match record.state {
                NudState::Reachable => {
                    if now.saturating_duration_since(record.confirmed) >= params.reachable_time.as_duration() {
                        record.state = NudState::Stale;
                        record.updated = now;
                    }
                }
                NudState::Incomplete | NudState::Probe => {
                    if record.state == NudState::Incomplete && record.probes < params.ucast_probes {
                        record.probes = params.ucast_probes;
                    } else if now.saturating_duration_since(record.updated) < params.retrans_time.as_duration() {
                        continue;
                    }
                    let max_probes = params.ucast_probes + params.app_probes + params.mcast_probes;
                    if record.probes >= max_probes {
                        log::debug!("neigh: {} on {} failed after {} probes", record.addr, record.if_id, record.probes);
                        record.state = NudState::Failed;
                        record.updated = now;
                        continue;
                    }
                    due.push(record.snapshot());
                    record.probes += 1;
                    record.updated = now;
                }
                _ => {}
            }
        }
        due
    }

    fn flush_entries(&self, if_id: InterfaceId) {
        self.entries.write().retain(|(_, id), _| *id != if_id);
    }
}

impl NeighborCache for MemNeighborCache {
    fn lookup(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> Option<Box<dyn NeighborEntry + '_>> {
        self.lookup_or_create(addr, if_id, false)
    }

    fn lookup_or_create(&self, addr: &Ipv6Addr, if_id: InterfaceId, create: bool) -> Option<Box<dyn NeighborEntry + '_>> {
        let key = (*addr, if_id);
        let existing = self.entries.read().get(&key).cloned();
        let record = match existing {
            Some(record) => record,
            None if create => {
                let link = self.devices.read().get(&if_id).cloned()?;
                let mut entries = self.entries.write();
                entries
                    .entry(key)
                    .or_insert_with(|| Arc::new(Mutex::new(NeighborRecord::new(*addr, if_id, &link))))
                    .clone()
            }
            None => return None,
        };
        Some(Box::new(MemNeighborEntry { guard: record.lock_arc() }))
    }

    fn proxy_lookup(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> Option<ProxyEntry> {
        let proxies = self.proxies.read();
        proxies
            .get(&(*addr, if_id))
            .or_else(|| proxies.get(&(*addr, InterfaceId::UNSPECIFIED)))
            .copied()
    }

    fn flush_interface(&self, if_id: InterfaceId) {
        self.flush_entries(if_id);
        self.proxies.write().retain(|(_, id), _| *id != if_id);
    }

    fn change_addr(&self, if_id: InterfaceId) {
        self.flush_entries(if_id);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;

use crate::config::Config;
use crate::config::InterfaceConfig;
use crate::interface::InterfaceId;

use super::collab::AddressConfig;
use super::collab::DeferredQueue;
use super::collab::NdiscNotifier;
use super::collab::NeighborCache;
use super::collab::RoutingTable;
use super::collab::Transmitter;
use super::link::LinkInfo;
use super::params::NdParams;
use super::ratelimit::LogLimit;
use super::ratelimit::PeerRateLimiter;

/// Hop limit of every ND message we send (RFC 4861 §6.1).
pub const ND_HOP_LIMIT: u8 = 255;

/// Default hop limit for outgoing unicast traffic until an RA says otherwise.
pub const DEFAULT_HOP_LIMIT: u8 = 64;

#[derive(Clone)]
pub struct Collaborators {
    pub neighbors: Arc<dyn NeighborCache>,
    pub routes: Arc<dyn RoutingTable>,
    pub addrconf: Arc<dyn AddressConfig>,
    pub transmitter: Arc<dyn Transmitter>,
    pub notifier: Arc<dyn NdiscNotifier>,
    pub deferred: Arc<dyn DeferredQueue>,
}

/// Router discovery state learned from RAs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaState {
    /// A Router Solicitation went out on this interface.
    pub rs_sent: bool,
    /// An RA arrived after `rs_sent`.
    pub ra_rcvd: bool,
    /// RAs seen, accepted or not.
    pub ra_seen: u64,
    pub managed: bool,
    pub other: bool,
    pub hop_limit: u8,
    /// MTU learned from the last RA carrying a valid MTU option.
    pub mtu6: u32,
}

impl RaState {
    fn new(mtu: u32) -> Self {
        Self {
            rs_sent: false,
            ra_rcvd: false,
            ra_seen: 0,
            managed: false,
            other: false,
            hop_limit: DEFAULT_HOP_LIMIT,
            mtu6: mtu,
        }
    }
}

/// Per-interface ND state.
#[derive(Debug)]
pub struct NdInterface {
    if_id: InterfaceId,
    name: String,
    link: RwLock<LinkInfo>,
    cnf: RwLock<InterfaceConfig>,
    params: Mutex<NdParams>,
    ra: Mutex<RaState>,
}

impl NdInterface {
    pub fn new(if_id: InterfaceId, name: &str, link: LinkInfo, cnf: InterfaceConfig) -> Self {
        let params = NdParams::from_config(&cnf);
        let ra = RaState::new(link.mtu);
        Self {
            if_id,
            name: name.to_owned(),
            link: RwLock::new(link),
            cnf: RwLock::new(cnf),
            params: Mutex::new(params),
            ra: Mutex::new(ra),
        }
    }

    pub fn if_id(&self) -> InterfaceId {
        self.if_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn link(&self) -> LinkInfo {
        self.link.read().clone()
    }

    pub fn set_link(&self, link: LinkInfo) {
        *self.link.write() = link;
    }

    pub fn config(&self) -> InterfaceConfig {
        self.cnf.read().clone()
    }

    /// Replaces the configuration; timers are re-derived only for the
    /// values that actually changed.
    pub fn set_config(&self, cnf: InterfaceConfig) {
        let mut current = self.cnf.write();
        if *current == cnf {
            return;
        }
        let fresh = NdParams::from_config(&cnf);
        {
            let mut params = self.params.lock();
            if current.base_reachable_time_ms != cnf.base_reachable_time_ms {
                params.set_base_reachable_time(fresh.base_reachable_time);
            }
            if current.retrans_time_ms != cnf.retrans_time_ms {
                params.set_retrans_time(fresh.retrans_time);
            }
            params.ucast_probes = fresh.ucast_probes;
            params.app_probes = fresh.app_probes;
            params.mcast_probes = fresh.mcast_probes;
            params.proxy_delay = fresh.proxy_delay;
            params.proxy_qlen = fresh.proxy_qlen;
        }
        *current = cnf;
    }

    pub fn params(&self) -> NdParams {
        self.params.lock().clone()
    }

    pub(crate) fn with_params<R>(&self, f: impl FnOnce(&mut NdParams) -> R) -> R {
        f(&mut self.params.lock())
    }

    pub fn ra_state(&self) -> RaState {
        self.ra.lock().clone()
    }

    pub(crate) fn with_ra_state<R>(&self, f: impl FnOnce(&mut RaState) -> R) -> R {
        f(&mut self.ra.lock())
    }
}

/// The "all" switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalSwitches {
    pub forwarding: bool,
    pub proxy_ndp: bool,
}

/// One ND instance: its collaborators, its interfaces and its limiters.
/// Every entry point takes `&self`; the context is shared across
/// packet-processing tasks behind an `Arc`.
pub struct NdiscContext {
    collab: Collaborators,
    interfaces: RwLock<HashMap<InterfaceId, Arc<NdInterface>>>,
    global: RwLock<GlobalSwitches>,
    redirect_limiter: PeerRateLimiter,
    log_limit: LogLimit,
    hop_limit: u8,
}

impl NdiscContext {
    pub fn new(collab: Collaborators) -> Self {
        Self {
            collab,
            interfaces: RwLock::new(HashMap::new()),
            global: RwLock::new(GlobalSwitches::default()),
            redirect_limiter: PeerRateLimiter::new(),
            log_limit: LogLimit::default(),
            hop_limit: ND_HOP_LIMIT,
        }
    }

    pub fn add_interface(&self, if_id: InterfaceId, name: &str, link: LinkInfo, cnf: InterfaceConfig) -> Arc<NdInterface> {
        let iface = Arc::new(NdInterface::new(if_id, name, link, cnf));
        self.interfaces.write().insert(if_id, iface.clone());
        log::debug!("ndisc: serving {} ({})", name, if_id);
        iface
    }

    pub fn remove_interface(&self, if_id: InterfaceId) -> Option<Arc<NdInterface>> {
        self.interfaces.write().remove(&if_id)
    }

    pub fn interface(&self, if_id: InterfaceId) -> Option<Arc<NdInterface>> {
        self.interfaces.read().get(&if_id).cloned()
    }

    pub fn interface_ids(&self) -> Vec<InterfaceId> {
        self.interfaces.read().keys().copied().collect()
    }

    pub fn global(&self) -> GlobalSwitches {
        *self.global.read()
    }

    pub fn set_global(&self, global: GlobalSwitches) {
        *self.global.write() = global;
    }

    /// Pushes a (re)loaded configuration to the global switches and to
    /// every known interface.
    pub fn apply_config(&self, config: &Config) {
        self.set_global(GlobalSwitches {
            forwarding: config.global.forwarding,
            proxy_ndp: config.global.proxy_ndp,
        });
        for iface in self.interfaces.read().values() {
            iface.set_config(config.interface(iface.name()));
        }
    }

    pub fn neighbors(&self) -> &dyn NeighborCache {
        self.collab.neighbors.as_ref()
    }

    pub fn routes(&self) -> &dyn RoutingTable {
        self.collab.routes.as_ref()
    }

    pub fn addrconf(&self) -> &dyn AddressConfig {
        self.collab.addrconf.as_ref()
    }

    pub(crate) fn transmitter(&self) -> &dyn Transmitter {
        self.collab.transmitter.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn NdiscNotifier {
        self.collab.notifier.as_ref()
    }

    pub(crate) fn deferred(&self) -> &dyn DeferredQueue {
        self.collab.deferred.as_ref()
    }

    pub(crate) fn redirect_limiter(&self) -> &PeerRateLimiter {
        &self.redirect_limiter
    }

    pub fn log_limit(&self) -> &LogLimit {
        &self.log_limit
    }

    pub fn hop_limit(&self) -> u8 {
        self.hop_limit
    }
}

impl std::fmt::Debug for NdiscContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdiscContext")
            .field("interfaces", &self.interface_ids())
            .field("global", &self.global())
            .finish()
    }
}

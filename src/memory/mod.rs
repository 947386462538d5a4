//! In-process implementations of the collaborator traits.
//!
//! The daemon uses these as its own neighbor cache, routing table and
//! address state; the recording variants in [`events`] capture what the
//! engine sends and reports.

pub mod addrconf;
pub mod events;
pub mod neighbor;
pub mod route;

use std::sync::Arc;

use crate::ndisc::collab::DeferredQueue;
use crate::ndisc::collab::NdiscNotifier;
use crate::ndisc::collab::Transmitter;
use crate::ndisc::context::Collaborators;

pub use addrconf::MemAddressConfig;
pub use addrconf::PrefixImport;
pub use events::LogNotifier;
pub use events::NotifierEvent;
pub use events::RecordingDeferredQueue;
pub use events::RecordingNotifier;
pub use events::RecordingTransmitter;
pub use neighbor::MemNeighborCache;
pub use route::MemRoutingTable;

/// The in-memory state a context works on.
#[derive(Debug, Clone, Default)]
pub struct MemoryStack {
    pub neighbors: Arc<MemNeighborCache>,
    pub routes: Arc<MemRoutingTable>,
    pub addrconf: Arc<MemAddressConfig>,
}

impl MemoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(
        &self,
        transmitter: Arc<dyn Transmitter>,
        notifier: Arc<dyn NdiscNotifier>,
        deferred: Arc<dyn DeferredQueue>,
    ) -> Collaborators {
        Collaborators {
            neighbors: self.neighbors.clone(),
            routes: self.routes.clone(),
            addrconf: self.addrconf.clone(),
            transmitter,
            notifier,
            deferred,
        }
    }
}

#[cfg(test)]
pub(crate) struct TestContext {
    pub ctx: crate::ndisc::NdiscContext,
    pub if_id: crate::interface::InterfaceId,
    pub link_local: std::net::Ipv6Addr,
    pub neighbors: Arc<MemNeighborCache>,
    pub routes: Arc<MemRoutingTable>,
    pub addrconf: Arc<MemAddressConfig>,
    pub transmitter: Arc<RecordingTransmitter>,
    pub notifier: Arc<RecordingNotifier>,
    pub deferred: Arc<RecordingDeferredQueue>,
}

/// One Ethernet interface, eth0 (if#2), with fe80::1 assigned and the
/// default configuration.
#[cfg(test)]
pub(crate) fn test_context() -> TestContext {
    use crate::config::InterfaceConfig;
    use crate::interface::InterfaceId;
    use crate::ndisc::collab::AddrFlags;
    use crate::ndisc::link::LinkInfo;
    use crate::ndisc::NdiscContext;

    let stack = MemoryStack::new();
    let transmitter = Arc::new(RecordingTransmitter::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let deferred = Arc::new(RecordingDeferredQueue::new());
    let ctx = NdiscContext::new(stack.collaborators(transmitter.clone(), notifier.clone(), deferred.clone()));

    let if_id = InterfaceId::new(2);
    let link = LinkInfo::ethernet([0x02, 0, 0, 0, 0, 0x01], 1500);
    stack.neighbors.register_device(if_id, link.clone());
    ctx.add_interface(if_id, "eth0", link, InterfaceConfig::default());

    let link_local: std::net::Ipv6Addr = "fe80::1".parse().unwrap();
    stack.addrconf.add_address(if_id, link_local, AddrFlags::NONE);

    TestContext {
        ctx,
        if_id,
        link_local,
        neighbors: stack.neighbors,
        routes: stack.routes,
        addrconf: stack.addrconf,
        transmitter,
        notifier,
        deferred,
    }
}

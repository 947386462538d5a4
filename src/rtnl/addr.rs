use futures::TryStreamExt;

use netlink_packet_route::address::AddressAttribute;
use netlink_packet_route::address::AddressHeaderFlag;
use netlink_packet_route::address::AddressScope;
use netlink_packet_route::AddressFamily;

use crate::interface::InterfaceId;
use crate::ndisc::collab::AddrFlags;

#[derive(Debug, Clone, Copy)]
pub enum V6AddressRequestScope {
    Global,
    LinkLocal,
}

impl V6AddressRequestScope {
    fn matches(&self, scope: AddressScope) -> bool {
        match self {
            V6AddressRequestScope::Global => scope == AddressScope::Universe,
            V6AddressRequestScope::LinkLocal => scope == AddressScope::Link,
        }
    }
}

/// An IPv6 address as the kernel reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelAddress {
    pub addr: std::net::Ipv6Addr,
    pub flags: AddrFlags,
}

pub struct AddressManager {
    handle: rtnetlink::AddressHandle,
}

impl AddressManager {
    pub(crate) fn new(handle: &super::RtnetlinkConnection) -> Self {
        Self { handle: handle.handle.address() }
    }

    pub async fn get_v6(&self, if_id: InterfaceId, scope: V6AddressRequestScope) -> Result<Vec<KernelAddress>, std::io::Error> {
        log::trace!("get_v6: if_id={}, scope={:?}", if_id, scope);
        let mut addrs = Vec::new();
        let mut req = self.handle.get();
        if !if_id.is_unspecified() {
            req = req.set_link_index_filter(if_id.inner_unchecked());
        }
        let response = req.execute();

        futures::pin_mut!(response);
        while let Some(response) = response.try_next().await.map_err(std::io::Error::other)? {
            if response.header.family != AddressFamily::Inet6 || !scope.matches(response.header.scope) {
                continue;
            }
            let header_flags = &response.header.flags;
            let flags = AddrFlags {
                tentative: header_flags.contains(&AddressHeaderFlag::Tentative),
                optimistic: header_flags.contains(&AddressHeaderFlag::Optimistic),
            };
            for attr in response.attributes.iter() {
                if let AddressAttribute::Address(std::net::IpAddr::V6(addr)) = attr {
                    addrs.push(KernelAddress { addr: *addr, flags });
                }
            }
        }
        Ok(addrs)
    }
}

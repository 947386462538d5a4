use std::collections::HashSet;
use std::net::Ipv6Addr;

use parking_lot::Mutex;
use parking_lot::RwLock;

use crate::interface::InterfaceId;
use crate::ndisc::addr;
use crate::ndisc::collab::AddrFlags;
use crate::ndisc::collab::AddressConfig;
use crate::ndisc::collab::LocalAddress;

/// Length of a Prefix Information option (RFC 4861 §4.6.2).
const PREFIX_INFO_LEN: usize = 32;

/// A Prefix Information option as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixImport {
    pub if_id: InterfaceId,
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
    pub on_link: bool,
    pub autonomous: bool,
    /// Seconds.
    pub valid_lifetime: u32,
    /// Seconds.
    pub preferred_lifetime: u32,
    pub sllao_present: bool,
}

impl PrefixImport {
    fn parse(if_id: InterfaceId, option: &[u8], sllao_present: bool) -> Option<Self> {
        if option.len() < PREFIX_INFO_LEN {
            return None;
        }
        let mut prefix = [0u8; 16];
        prefix.copy_from_slice(&option[16..32]);
        Some(Self {
            if_id,
            prefix: Ipv6Addr::from(prefix),
            prefix_len: option[2],
            on_link: option[3] & 0x80 != 0,
            autonomous: option[3] & 0x40 != 0,
            valid_lifetime: u32::from_be_bytes([option[4], option[5], option[6], option[7]]),
            preferred_lifetime: u32::from_be_bytes([option[8], option[9], option[10], option[11]]),
            sllao_present,
        })
    }
}

/// Address configuration kept in process memory.
#[derive(Debug, Default)]
pub struct MemAddressConfig {
    addresses: RwLock<Vec<LocalAddress>>,
    anycast: RwLock<HashSet<(Ipv6Addr, InterfaceId)>>,
    dad_failures: Mutex<Vec<LocalAddress>>,
    prefixes: Mutex<Vec<PrefixImport>>,
}

impl MemAddressConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an address on `if_id`.
    pub fn add_address(&self, if_id: InterfaceId, addr: Ipv6Addr, flags: AddrFlags) {
        let mut addresses = self.addresses.write();
        addresses.retain(|a| !(a.addr == addr && a.if_id == if_id));
        addresses.push(LocalAddress { addr, if_id, flags });
    }

    pub fn remove_address(&self, if_id: InterfaceId, addr: &Ipv6Addr) -> bool {
        let mut addresses = self.addresses.write();
        let before = addresses.len();
        addresses.retain(|a| !(a.addr == *addr && a.if_id == if_id));
        addresses.len() != before
    }

    /// DAD succeeded.
    pub fn mark_valid(&self, if_id: InterfaceId, addr: &Ipv6Addr) {
        for a in self.addresses.write().iter_mut() {
            if a.addr == *addr && a.if_id == if_id {
                a.flags = AddrFlags::NONE;
            }
        }
    }

    pub fn add_anycast(&self, if_id: InterfaceId, addr: Ipv6Addr) {
        self.anycast.write().insert((addr, if_id));
    }

    /// Addresses given up after a duplicate was detected.
    pub fn dad_failures(&self) -> Vec<LocalAddress> {
        self.dad_failures.lock().clone()
    }

    pub fn prefixes(&self) -> Vec<PrefixImport> {
        self.prefixes.lock().clone()
    }

    fn usable(a: &LocalAddress) -> bool {
        !a.is_tentative() || a.is_optimistic()
    }
}

impl AddressConfig for MemAddressConfig {
    fn local_address(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> Option<LocalAddress> {
        self.addresses.read().iter().find(|a| a.addr == *addr && a.if_id == if_id).copied()
    }

    fn addresses(&self, if_id: InterfaceId) -> Vec<Ipv6Addr> {
        self.addresses.read().iter().filter(|a| a.if_id == if_id).map(|a| a.addr).collect()
    }

    fn is_local_unicast(&self, addr: &Ipv6Addr, if_id: Option<InterfaceId>) -> bool {
        self.addresses
            .read()
            .iter()
            .any(|a| a.addr == *addr && if_id.map_or(true, |id| id == a.if_id) && Self::usable(a))
    }

    fn is_anycast(&self, addr: &Ipv6Addr, if_id: InterfaceId) -> bool {
        self.anycast.read().contains(&(*addr, if_id))
    }

    fn link_local_source(&self, if_id: InterfaceId, banned: AddrFlags) -> Option<Ipv6Addr> {
        self.addresses
            .read()
            .iter()
            .find(|a| a.if_id == if_id && addr::is_link_local_unicast(&a.addr) && !a.flags.intersects(&banned))
            .map(|a| a.addr)
    }

    fn source_for(&self, if_id: InterfaceId, dst: &Ipv6Addr) -> Option<Ipv6Addr> {
        let addresses = self.addresses.read();
        let candidates = || addresses.iter().filter(|a| a.if_id == if_id && Self::usable(a));
        let link_scope = addr::is_link_local_unicast(dst) || (dst.is_multicast() && dst.segments()[0] & 0x000f <= 2);
        candidates()
            .find(|a| addr::is_link_local_unicast(&a.addr) == link_scope)
            .or_else(|| candidates().next())
            .map(|a| a.addr)
    }

    fn dad_failed(&self, addr: &LocalAddress) {
        log::warn!("addrconf: {} on {} is a duplicate, giving it up", addr.addr, addr.if_id);
        self.remove_address(addr.if_id, &addr.addr);
        self.dad_failures.lock().push(*addr);
    }

    fn import_prefix_info(&self, if_id: InterfaceId, option: &[u8], sllao_present: bool) {
        match PrefixImport::parse(if_id, option, sllao_present) {
            Some(prefix) => {
                log::debug!("addrconf: prefix {}/{} on {}", prefix.prefix, prefix.prefix_len, if_id);
                self.prefixes.lock().push(prefix);
            }
            None => log::debug!("addrconf: short prefix information option on {}", if_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IF: InterfaceId = InterfaceId::new(2);

    fn ip(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn tentative_addresses_are_not_usable() {
        let ac = MemAddressConfig::new();
        ac.add_address(IF, ip("fe80::1"), AddrFlags::TENTATIVE);
        ac.add_address(IF, ip("fe80::2"), AddrFlags::OPTIMISTIC);

        assert!(!ac.is_local_unicast(&ip("fe80::1"), Some(IF)));
        assert!(ac.is_local_unicast(&ip("fe80::2"), None));
        assert_eq!(ac.link_local_source(IF, AddrFlags::TENTATIVE), None);
        assert_eq!(ac.source_for(IF, &ip("fe80::9")), Some(ip("fe80::2")));

        ac.mark_valid(IF, &ip("fe80::1"));
        assert_eq!(ac.link_local_source(IF, AddrFlags::TENTATIVE), Some(ip("fe80::1")));
    }

    #[test]
    fn source_selection_prefers_matching_scope() {
        let ac = MemAddressConfig::new();
        ac.add_address(IF, ip("fe80::1"), AddrFlags::NONE);
        ac.add_address(IF, ip("2001:db8::1"), AddrFlags::NONE);

        assert_eq!(ac.source_for(IF, &ip("2001:db8::99")), Some(ip("2001:db8::1")));
        assert_eq!(ac.source_for(IF, &ip("ff02::1")), Some(ip("fe80::1")));
        assert_eq!(ac.source_for(InterfaceId::new(3), &ip("ff02::1")), None);
    }

    #[test]
    fn dad_failure_removes_address() {
        let ac = MemAddressConfig::new();
        ac.add_address(IF, ip("2001:db8::7"), AddrFlags::TENTATIVE);
        let local = ac.local_address(&ip("2001:db8::7"), IF).unwrap();
        ac.dad_failed(&local);

        assert!(ac.local_address(&ip("2001:db8::7"), IF).is_none());
        assert_eq!(ac.dad_failures(), vec![local]);
    }

    #[test]
    fn prefix_information_is_recorded() {
        let ac = MemAddressConfig::new();
        let mut opt = vec![3, 4, 64, 0xc0];
        opt.extend_from_slice(&86400u32.to_be_bytes());
        opt.extend_from_slice(&14400u32.to_be_bytes());
        opt.extend_from_slice(&[0; 4]);
        opt.extend_from_slice(&ip("2001:db8:1::").octets());
        ac.import_prefix_info(IF, &opt, true);
        ac.import_prefix_info(IF, &opt[..16], false);

        let prefixes = ac.prefixes();
        assert_eq!(prefixes.len(), 1);
        assert_eq!(prefixes[0].prefix, ip("2001:db8:1::"));
        assert!(prefixes[0].on_link && prefixes[0].autonomous && prefixes[0].sllao_present);
        assert_eq!(prefixes[0].valid_lifetime, 86400);
    }
}

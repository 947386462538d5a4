use parking_lot::RwLock;

use std::sync::Arc;
use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::ndisc::link::{DeviceFlags, LinkInfo, LinkType};
use crate::rtnl::addr::KernelAddress;

/// Kernel interface index. Zero means "no particular interface".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct InterfaceId(u32);

impl InterfaceId {
    pub const UNSPECIFIED: Self = Self(0);

    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Raw index, including the unspecified value 0.
    pub const fn inner_unchecked(&self) -> u32 {
        self.0
    }

    pub const fn is_unspecified(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "if#{}", self.0)
    }
}

/// Largest hardware address any supported link type carries (InfiniBand uses 20).
pub const MAX_ADDR_LEN: usize = 32;

/// A link-layer (hardware) address of up to [`MAX_ADDR_LEN`] bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkAddr {
    len: u8,
    data: [u8; MAX_ADDR_LEN],
}

impl LinkAddr {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > MAX_ADDR_LEN {
            return None;
        }
        let mut data = [0u8; MAX_ADDR_LEN];
        data[..bytes.len()].copy_from_slice(bytes);
        Some(Self { len: bytes.len() as u8, data })
    }

    pub const fn ethernet(mac: [u8; 6]) -> Self {
        let mut data = [0u8; MAX_ADDR_LEN];
        let mut i = 0;
        while i < 6 {
            data[i] = mac[i];
            i += 1;
        }
        Self { len: 6, data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for LinkAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let value = self.as_bytes().iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":");
        write!(f, "{}", value)
    }
}

impl std::fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

pub fn index_to_name(index: InterfaceId) -> Result<String, std::io::Error> {
    let ifname_buf = [0u8; libc::IFNAMSIZ];
    let ret = unsafe { libc::if_indextoname(index.inner_unchecked(), ifname_buf.as_ptr() as *mut libc::c_char) };
    if ret.is_null() {
        return Err(std::io::Error::last_os_error());
    }

    let name = unsafe { std::ffi::CStr::from_ptr(ret as *const libc::c_char) };
    Ok(name.to_string_lossy().into_owned())
}

pub fn name_to_index(name: &str) -> Result<InterfaceId, std::io::Error> {
    let name = std::ffi::CString::new(name).map_err(std::io::Error::other)?;
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(InterfaceId::new(index))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interface {
    pub if_id: InterfaceId,
    pub if_name: String,
    pub link: LinkInfo,
}

#[derive(Debug)]
pub(crate) struct InterfaceState {
    interfaces: RwLock<HashMap<InterfaceId, Interface>>,
    if_by_name: RwLock<HashMap<String, InterfaceId>>,
    link_local_addrs: RwLock<HashMap<InterfaceId, Vec<KernelAddress>>>,
    global_addrs: RwLock<HashMap<InterfaceId, Vec<KernelAddress>>>,
}

impl InterfaceState {
    pub fn new() -> Self {
        Self {
            interfaces: RwLock::new(HashMap::new()),
            if_by_name: RwLock::new(HashMap::new()),
            link_local_addrs: RwLock::new(HashMap::new()),
            global_addrs: RwLock::new(HashMap::new()),
        }
    }

    pub fn if_ids(&self) -> Vec<InterfaceId> {
        self.interfaces.read().keys().copied().collect()
    }
}

/// Aborts the refresh task when the last manager clone goes away.
#[derive(Debug)]
struct RefreshTask(tokio::task::JoinHandle<()>);

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Periodically mirrors the kernel's interfaces, link parameters and
/// IPv6 addresses over rtnetlink.
#[derive(Debug, Clone)]
pub struct InterfaceStateManager {
    state: Arc<InterfaceState>,
    _refresh: Arc<RefreshTask>,
}

impl InterfaceStateManager {
    pub async fn new() -> Result<Self, std::io::Error> {
        let rtnl = crate::rtnl::RtnetlinkConnection::new().await?;
        let state = Arc::new(InterfaceState::new());
        let state_clone = state.clone();
        let (init_sender, init_receiver) = oneshot::channel();
        let join = tokio::spawn(async move {
            let mut link_manager = rtnl.link();
            let addr_manager = rtnl.address();
            let mut init_sender = Some(init_sender);

            loop {
                let interfaces = match link_manager.get_all().await {
                    Ok(interfaces) => interfaces,
                    Err(e) => {
                        log::error!("failed to get interfaces: {}", e);
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        continue;
                    }
                };
                let mut interfaces_map = HashMap::new();
                let mut if_by_name = HashMap::new();
                for mut interface in interfaces {
                    let (link_type, flags) = read_sysfs_link_params(&interface.if_name).await;
                    if let Some(link_type) = link_type {
                        interface.link.link_type = link_type;
                    }
                    interface.link.flags = flags;
                    if_by_name.insert(interface.if_name.clone(), interface.if_id);
                    interfaces_map.insert(interface.if_id, interface);
                }
                *state_clone.interfaces.write() = interfaces_map;
                *state_clone.if_by_name.write() = if_by_name;

                let mut link_local_addrs = HashMap::new();
                let mut global_addrs = HashMap::new();
                for if_id in state_clone.if_ids() {
                    match addr_manager.get_v6(if_id, crate::rtnl::addr::V6AddressRequestScope::LinkLocal).await {
                        Ok(addrs) => {
                            link_local_addrs.insert(if_id, addrs);
                        }
                        Err(e) => {
                            log::error!("failed to get link-local addresses for interface {}: {}", if_id, e);
                            continue;
                        }
                    }
                    match addr_manager.get_v6(if_id, crate::rtnl::addr::V6AddressRequestScope::Global).await {
                        Ok(addrs) => {
                            global_addrs.insert(if_id, addrs);
                        }
                        Err(e) => {
                            log::error!("failed to get global addresses for interface {}: {}", if_id, e);
                        }
                    }
                }
                *state_clone.link_local_addrs.write() = link_local_addrs;
                *state_clone.global_addrs.write() = global_addrs;

                if let Some(sender) = init_sender.take() {
                    let _ = sender.send(());
                }

                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        });

        let _ = init_receiver.await;
        Ok(Self { state, _refresh: Arc::new(RefreshTask(join)) })
    }

    pub fn get_all_ids(&self) -> Vec<InterfaceId> {
        self.state.if_ids()
    }

    pub fn get_index_by_name(&self, name: &str) -> Option<InterfaceId> {
        self.state.if_by_name.read().get(name).copied()
    }

    pub fn get(&self, if_id: InterfaceId) -> Option<Interface> {
        self.state.interfaces.read().get(&if_id).cloned()
    }

    pub fn get_name_by_index(&self, if_id: InterfaceId) -> Option<String> {
        self.state.interfaces.read().get(&if_id).map(|v| v.if_name.clone())
    }

    pub fn get_link_local_addrs(&self, if_id: InterfaceId) -> Vec<KernelAddress> {
        self.state.link_local_addrs.read().get(&if_id).cloned().unwrap_or_default()
    }

    pub fn get_global_addrs(&self, if_id: InterfaceId) -> Vec<KernelAddress> {
        self.state.global_addrs.read().get(&if_id).cloned().unwrap_or_default()
    }

    /// Link-local addresses first.
    pub fn get_addrs(&self, if_id: InterfaceId) -> Vec<KernelAddress> {
        let mut addrs = self.get_link_local_addrs(if_id);
        addrs.extend(self.get_global_addrs(if_id));
        addrs
    }
}

/// Link type and IFF_* flags are not worth a netlink round trip; sysfs has them.
/// Without a readable type the one guessed from the link message stays.
async fn read_sysfs_link_params(if_name: &str) -> (Option<LinkType>, DeviceFlags) {
    let link_type = match tokio::fs::read_to_string(format!("/sys/class/net/{}/type", if_name)).await {
        Ok(s) => s.trim().parse::<u16>().ok().map(LinkType::from_arphrd),
        Err(_) => None,
    };

    let flags = match tokio::fs::read_to_string(format!("/sys/class/net/{}/flags", if_name)).await {
        Ok(s) => {
            let s = s.trim();
            let s = s.strip_prefix("0x").unwrap_or(s);
            u32::from_str_radix(s, 16).map(DeviceFlags::from_iff_bits).unwrap_or_default()
        }
        Err(_) => DeviceFlags::default(),
    };

    (link_type, flags)
}

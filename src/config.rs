use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use parking_lot::RwLock;

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: Arc<PathBuf>,
    config: Arc<RwLock<Option<Config>>>,
    broadcast: tokio::sync::broadcast::Sender<()>,
}

impl ConfigManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let config = None;
        Self {
            config_path: Arc::new(path),
            config: Arc::new(RwLock::new(config)),
            broadcast: tokio::sync::broadcast::channel(1).0,
        }
    }

    fn notify_change(&self) {
        let _ = self.broadcast.send(());
    }

    pub async fn load(&self) -> Result<(), std::io::Error> {
        tokio::task::block_in_place(|| {
            let config = Config::from_file(self.config_path.as_ref())?;
            let result = Some(config);
            let orig = std::mem::replace(&mut *self.config.write(), result.clone());
            if orig != result {
                self.notify_change();
            }
            Ok(())
        })
    }

    pub fn get(&self) -> Option<Config> {
        self.config.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.config.read().is_some()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.broadcast.subscribe()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,

    /// Knobs applied to every interface unless overridden.
    #[serde(default)]
    pub defaults: InterfaceConfig,

    /// Per-interface overrides, keyed by interface name.
    #[serde(default)]
    pub interfaces: HashMap<String, InterfaceOverride>,

    #[serde(default)]
    pub proxy: Vec<ProxyEntryConfig>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(file)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, std::io::Error> {
        let config: Config = toml::from_str(content).map_err(std::io::Error::other)?;
        Ok(config)
    }

    /// Effective settings for one interface.
    pub fn interface(&self, if_name: &str) -> InterfaceConfig {
        match self.interfaces.get(if_name) {
            Some(o) => o.apply(&self.defaults),
            None => self.defaults.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct GlobalConfig {
    /// The "all" forwarding switch.
    #[serde(default)]
    pub forwarding: bool,

    /// The "all" proxy_ndp switch.
    #[serde(default)]
    pub proxy_ndp: bool,

    /// Interfaces the daemon serves.
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// Whether Router Advertisements are processed (`accept_ra`).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum AcceptRa {
    Never,
    /// Only while the interface does not forward.
    UnlessForwarding,
    Always,
}

impl AcceptRa {
    pub fn accepts(&self, forwarding: bool) -> bool {
        match self {
            AcceptRa::Never => false,
            AcceptRa::UnlessForwarding => !forwarding,
            AcceptRa::Always => true,
        }
    }
}

impl Default for AcceptRa {
    fn default() -> Self {
        AcceptRa::UnlessForwarding
    }
}

impl TryFrom<u8> for AcceptRa {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AcceptRa::Never),
            1 => Ok(AcceptRa::UnlessForwarding),
            2 => Ok(AcceptRa::Always),
            other => Err(format!("invalid accept_ra value: {}", other)),
        }
    }
}

impl From<AcceptRa> for u8 {
    fn from(value: AcceptRa) -> Self {
        match value {
            AcceptRa::Never => 0,
            AcceptRa::UnlessForwarding => 1,
            AcceptRa::Always => 2,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rt_info_max_plen() -> u8 {
    0
}

fn default_proxy_delay_ms() -> u32 {
    800
}

fn default_proxy_qlen() -> usize {
    64
}

fn default_base_reachable_time_ms() -> u32 {
    30_000
}

fn default_retrans_time_ms() -> u32 {
    1_000
}

fn default_probes() -> u32 {
    3
}

fn default_redirect_interval_ms() -> u32 {
    1_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    #[serde(default)]
    pub accept_ra: AcceptRa,

    #[serde(default = "default_true")]
    pub accept_ra_defrtr: bool,

    #[serde(default = "default_true")]
    pub accept_ra_pinfo: bool,

    #[serde(default = "default_true")]
    pub accept_ra_rtr_pref: bool,

    /// Longest Route Information prefix that is accepted.
    #[serde(default = "default_rt_info_max_plen")]
    pub accept_ra_rt_info_max_plen: u8,

    #[serde(default)]
    pub forwarding: bool,

    #[serde(default)]
    pub proxy_ndp: bool,

    /// Send unsolicited advertisements when the link address changes.
    #[serde(default)]
    pub ndisc_notify: bool,

    /// Always include the target link-layer option in advertisements.
    #[serde(default)]
    pub force_tllao: bool,

    #[serde(default = "default_proxy_delay_ms")]
    pub proxy_delay_ms: u32,

    #[serde(default = "default_proxy_qlen")]
    pub proxy_qlen: usize,

    #[serde(default = "default_base_reachable_time_ms")]
    pub base_reachable_time_ms: u32,

    #[serde(default = "default_retrans_time_ms")]
    pub retrans_time_ms: u32,

    #[serde(default = "default_probes")]
    pub ucast_probes: u32,

    #[serde(default)]
    pub app_probes: u32,

    #[serde(default = "default_probes")]
    pub mcast_probes: u32,

    #[serde(default = "default_redirect_interval_ms")]
    pub redirect_interval_ms: u32,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            accept_ra: AcceptRa::default(),
            accept_ra_defrtr: true,
            accept_ra_pinfo: true,
            accept_ra_rtr_pref: true,
            accept_ra_rt_info_max_plen: default_rt_info_max_plen(),
            forwarding: false,
            proxy_ndp: false,
            ndisc_notify: false,
            force_tllao: false,
            proxy_delay_ms: default_proxy_delay_ms(),
            proxy_qlen: default_proxy_qlen(),
            base_reachable_time_ms: default_base_reachable_time_ms(),
            retrans_time_ms: default_retrans_time_ms(),
            ucast_probes: default_probes(),
            app_probes: 0,
            mcast_probes: default_probes(),
            redirect_interval_ms: default_redirect_interval_ms(),
        }
    }
}

impl InterfaceConfig {
    /// `accept_ra` evaluated against the interface's forwarding state.
    pub fn accepts_ra(&self) -> bool {
        self.accept_ra.accepts(self.forwarding)
    }
}

/// Any subset of [`InterfaceConfig`]; unset fields fall back to `[defaults]`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct InterfaceOverride {
    pub accept_ra: Option<AcceptRa>,
    pub accept_ra_defrtr: Option<bool>,
    pub accept_ra_pinfo: Option<bool>,
    pub accept_ra_rtr_pref: Option<bool>,
    pub accept_ra_rt_info_max_plen: Option<u8>,
    pub forwarding: Option<bool>,
    pub proxy_ndp: Option<bool>,
    pub ndisc_notify: Option<bool>,
    pub force_tllao: Option<bool>,
    pub proxy_delay_ms: Option<u32>,
    pub proxy_qlen: Option<usize>,
    pub base_reachable_time_ms: Option<u32>,
    pub retrans_time_ms: Option<u32>,
    pub ucast_probes: Option<u32>,
    pub app_probes: Option<u32>,
    pub mcast_probes: Option<u32>,
    pub redirect_interval_ms: Option<u32>,
}

impl InterfaceOverride {
    pub fn apply(&self, base: &InterfaceConfig) -> InterfaceConfig {
        InterfaceConfig {
            accept_ra: self.accept_ra.unwrap_or(base.accept_ra),
            accept_ra_defrtr: self.accept_ra_defrtr.unwrap_or(base.accept_ra_defrtr),
            accept_ra_pinfo: self.accept_ra_pinfo.unwrap_or(base.accept_ra_pinfo),
            accept_ra_rtr_pref: self.accept_ra_rtr_pref.unwrap_or(base.accept_ra_rtr_pref),
            accept_ra_rt_info_max_plen: self.accept_ra_rt_info_max_plen.unwrap_or(base.accept_ra_rt_info_max_plen),
            forwarding: self.forwarding.unwrap_or(base.forwarding),
            proxy_ndp: self.proxy_ndp.unwrap_or(base.proxy_ndp),
            ndisc_notify: self.ndisc_notify.unwrap_or(base.ndisc_notify),
            force_tllao: self.force_tllao.unwrap_or(base.force_tllao),
            proxy_delay_ms: self.proxy_delay_ms.unwrap_or(base.proxy_delay_ms),
            proxy_qlen: self.proxy_qlen.unwrap_or(base.proxy_qlen),
            base_reachable_time_ms: self.base_reachable_time_ms.unwrap_or(base.base_reachable_time_ms),
            retrans_time_ms: self.retrans_time_ms.unwrap_or(base.retrans_time_ms),
            ucast_probes: self.ucast_probes.unwrap_or(base.ucast_probes),
            app_probes: self.app_probes.unwrap_or(base.app_probes),
            mcast_probes: self.mcast_probes.unwrap_or(base.mcast_probes),
            redirect_interval_ms: self.redirect_interval_ms.unwrap_or(base.redirect_interval_ms),
        }
    }
}

/// A published proxy entry: answer solicitations for `address` on `interface`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProxyEntryConfig {
    pub interface: String,
    pub address: Ipv6Addr,
    #[serde(default)]
    pub router: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_rfc_defaults() {
        let config = Config::from_toml("").unwrap();
        let cnf = config.interface("eth0");
        assert_eq!(cnf.base_reachable_time_ms, 30_000);
        assert_eq!(cnf.retrans_time_ms, 1_000);
        assert_eq!(cnf.proxy_delay_ms, 800);
        assert_eq!(cnf.proxy_qlen, 64);
        assert_eq!(cnf.accept_ra, AcceptRa::UnlessForwarding);
        assert!(cnf.accepts_ra());
    }

    #[test]
    fn interface_override() {
        let config = Config::from_toml(
            r#"
            [global]
            forwarding = true
            proxy_ndp = true
            interfaces = ["eth0", "eth1"]

            [defaults]
            accept_ra = 2
            ucast_probes = 5

            [interfaces.eth1]
            forwarding = true
            accept_ra = 1

            [[proxy]]
            interface = "eth1"
            address = "2001:db8::10"
            router = true
            "#,
        )
        .unwrap();

        assert!(config.global.forwarding);
        let eth0 = config.interface("eth0");
        assert_eq!(eth0.ucast_probes, 5);
        assert!(eth0.accepts_ra());

        let eth1 = config.interface("eth1");
        assert_eq!(eth1.ucast_probes, 5);
        assert!(!eth1.accepts_ra());

        assert_eq!(config.proxy.len(), 1);
        assert!(config.proxy[0].router);
    }

    #[test]
    fn rejects_bad_accept_ra() {
        assert!(Config::from_toml("[defaults]\naccept_ra = 3\n").is_err());
    }
}

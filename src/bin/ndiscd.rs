
use ndiscd::config::{Config, ConfigManager};
use ndiscd::icmp6::packet::{InboundPacket, Packet};
use ndiscd::icmp6::{AsyncIcmp6Socket, RawIcmp6Socket};
use ndiscd::interface::{InterfaceId, InterfaceStateManager};
use ndiscd::memory::{LogNotifier, MemoryStack};
use ndiscd::ndisc::addr::{self, ALL_NODES, ALL_ROUTERS};
use ndiscd::ndisc::collab::{AddrFlags, AddressConfig};
use ndiscd::ndisc::NdiscContext;
use ndiscd::proxy::ProxyDelayQueue;
use ndiscd::transmit::{self, ChannelTransmitter};

use clap::{Parser, Subcommand};

use std::collections::HashSet;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;


fn main() {
    env_logger::init();
    let args = Cli::parse();
    let config_manager = ConfigManager::new(&args.config);
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    rt.block_on(async move {
        if let Err(e) = config_manager.load().await {
            log::warn!("Failed to load configuration: {:?}", e);
        }

        let config = config_manager.clone();
        tokio::spawn(async move {
            while !config_manager.is_loaded() {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let _ = config_manager.load().await;
            }

            log::info!("Configuration loaded");
        });

        // enable config reloader for daemon subcommands
        let config_reloader = config.clone();
        let enable_config_reloader = move || {
            tokio::spawn(async move {
                let mut signal = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        log::warn!("SIGHUP handler not installed: {}", e);
                        return;
                    }
                };
                loop {
                    signal.recv().await;
                    log::info!("Received SIGHUP, reloading configuration");
                    if let Err(e) = config_reloader.load().await {
                        log::warn!("Failed to reload configuration: {:?}", e);
                    }
                }
            });
        };

        match args.subcmd {
            Command::Start => {
                enable_config_reloader();
                if let Err(e) = start(config).await {
                    log::error!("ndiscd: {}", e);
                    std::process::exit(1);
                }
            }

            #[allow(unreachable_patterns)]
            _ => {
                log::error!("Invalid subcommand");
            }
        }
    });
}

/// Everything the background tasks share.
struct Daemon {
    ctx: Arc<NdiscContext>,
    stack: MemoryStack,
    socket: AsyncIcmp6Socket,
    if_manager: InterfaceStateManager,
    groups: parking_lot::Mutex<HashSet<(Ipv6Addr, InterfaceId)>>,
}

impl Daemon {
    fn join(&self, group: Ipv6Addr, if_id: InterfaceId) {
        if !self.groups.lock().insert((group, if_id)) {
            return;
        }
        if let Err(e) = self.socket.get_ref().join_multicast(group, if_id) {
            log::warn!("Failed to join {} on {}: {}", group, if_id, e);
        }
    }

    fn leave(&self, group: Ipv6Addr, if_id: InterfaceId) {
        if !self.groups.lock().remove(&(group, if_id)) {
            return;
        }
        if let Err(e) = self.socket.get_ref().leave_multicast(group, if_id) {
            log::debug!("Failed to leave {} on {}: {}", group, if_id, e);
        }
    }

    /// Brings the served interfaces, their addresses and the proxy
    /// entries in line with the kernel and the configuration.
    fn sync(&self, config: &Config) {
        let mut served = HashSet::new();
        for name in config.global.interfaces.iter() {
            let if_id = match self.if_manager.get_index_by_name(name) {
                Some(if_id) => if_id,
                None => {
                    log::debug!("Interface {} not present", name);
                    continue;
                }
            };
            let interface = match self.if_manager.get(if_id) {
                Some(interface) => interface,
                None => continue,
            };
            served.insert(if_id);

            let cnf = config.interface(name);
            if self.ctx.interface(if_id).is_none() {
                log::info!("Serving {} ({}), mtu {}", name, if_id, interface.link.mtu);
                self.stack.neighbors.register_device(if_id, interface.link.clone());
                self.ctx.add_interface(if_id, name, interface.link.clone(), cnf.clone());
                self.join(ALL_NODES, if_id);
                if cnf.accepts_ra() {
                    self.solicit_routers(if_id);
                }
            } else {
                self.stack.neighbors.register_device(if_id, interface.link.clone());
                self.ctx.on_link_changed(if_id, interface.link.clone());
            }

            if cnf.forwarding {
                self.join(ALL_ROUTERS, if_id);
            } else {
                self.leave(ALL_ROUTERS, if_id);
            }

            self.sync_addresses(if_id);
        }

        for if_id in self.ctx.interface_ids() {
            if served.contains(&if_id) {
                continue;
            }
            log::info!("No longer serving {}", if_id);
            self.ctx.on_interface_down(if_id);
            self.ctx.remove_interface(if_id);
            self.stack.neighbors.unregister_device(if_id);
            for addr in self.stack.addrconf.addresses(if_id) {
                self.stack.addrconf.remove_address(if_id, &addr);
            }
            let stale: Vec<_> = self.groups.lock().iter().filter(|(_, id)| *id == if_id).copied().collect();
            for (group, id) in stale {
                self.leave(group, id);
            }
        }

        self.ctx.apply_config(config);
        self.sync_proxies(config);
    }

    fn sync_addresses(&self, if_id: InterfaceId) {
        let kernel = self.if_manager.get_addrs(if_id);

        for addr in self.stack.addrconf.addresses(if_id) {
            if !kernel.iter().any(|k| k.addr == addr) {
                log::debug!("Address {} gone from {}", addr, if_id);
                self.stack.addrconf.remove_address(if_id, &addr);
            }
        }
        for k in kernel.iter() {
            let current = self.stack.addrconf.local_address(&k.addr, if_id).map(|l| l.flags);
            if current != Some(k.flags) {
                self.stack.addrconf.add_address(if_id, k.addr, k.flags);
                self.join(addr::solicited_node_multicast(&k.addr), if_id);
            }
        }
    }

    fn sync_proxies(&self, config: &Config) {
        let mut wanted = HashSet::new();
        for entry in config.proxy.iter() {
            let if_id = if entry.interface == "*" {
                InterfaceId::UNSPECIFIED
            } else {
                match self.if_manager.get_index_by_name(&entry.interface) {
                    Some(if_id) => if_id,
                    None => continue,
                }
            };
            wanted.insert((entry.address, if_id));
            let group = self.stack.neighbors.publish_proxy(entry.address, if_id, entry.router);
            if if_id.is_unspecified() {
                for id in self.ctx.interface_ids() {
                    self.join(group, id);
                }
            } else {
                self.join(group, if_id);
            }
        }

        for entry in self.stack.neighbors.proxies() {
            if wanted.contains(&(entry.addr, entry.if_id)) {
                continue;
            }
            if let Some(group) = self.stack.neighbors.unpublish_proxy(&entry.addr, entry.if_id) {
                if !entry.if_id.is_unspecified() {
                    self.leave(group, entry.if_id);
                }
            }
        }
    }

    fn solicit_routers(&self, if_id: InterfaceId) {
        let src = self
            .stack
            .addrconf
            .link_local_source(if_id, AddrFlags::TENTATIVE)
            .unwrap_or(Ipv6Addr::UNSPECIFIED);
        if let Err(e) = self.ctx.send_rs(if_id, &src, &ALL_ROUTERS) {
            log::debug!("RS on {} not sent: {}", if_id, e);
        }
    }

    fn run_timers(&self) {
        let ctx = self.ctx.clone();
        let due = self.stack.neighbors.run_timers(|if_id| ctx.interface(if_id).map(|iface| iface.params()));
        for neigh in due {
            if let Err(e) = self.ctx.solicit(&neigh, None) {
                log::debug!("Probe for {} not sent: {}", neigh.addr, e);
            }
        }

        let stale_after = self
            .ctx
            .interface_ids()
            .into_iter()
            .filter_map(|if_id| self.ctx.interface(if_id))
            .map(|iface| iface.params().gc_staletime.as_duration())
            .max()
            .unwrap_or(Duration::from_secs(90));
        let expired = self.stack.neighbors.expire(stale_after);
        if expired > 0 {
            log::debug!("Expired {} neighbor entries", expired);
        }
        self.ctx.routes().run_gc();
    }
}

async fn start(config: ConfigManager) -> Result<(), std::io::Error> {
    if !config.is_loaded() {
        log::warn!("Configuration not loaded, waiting til configured");
        let _ = config.subscribe().recv().await;
    }

    let config_data = config.get().ok_or_else(|| std::io::Error::other("configuration not loaded"))?;
    log::debug!("Configuration: {:?}", config_data);

    let if_manager = InterfaceStateManager::new().await?;
    let socket = RawIcmp6Socket::neighbor_discovery()?.into_async()?;

    let stack = MemoryStack::new();
    let (transmitter, outbound) = ChannelTransmitter::new(transmit::DEFAULT_QUEUE_LEN);
    let (deferred, mut replayed) = ProxyDelayQueue::new();
    let ctx = Arc::new(NdiscContext::new(stack.collaborators(
        Arc::new(transmitter),
        Arc::new(LogNotifier),
        Arc::new(deferred),
    )));

    tokio::spawn(transmit::run_sender(socket.clone(), outbound));

    let daemon = Arc::new(Daemon {
        ctx: ctx.clone(),
        stack,
        socket: socket.clone(),
        if_manager,
        groups: parking_lot::Mutex::new(HashSet::new()),
    });
    daemon.sync(&config_data);

    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            while let Some(packet) = replayed.recv().await {
                ctx.handle_inbound(&packet);
            }
        });
    }

    {
        let daemon = daemon.clone();
        let config = config.clone();
        let mut changes = config.subscribe();
        tokio::spawn(async move {
            let mut refresh = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    _ = refresh.tick() => {}
                    changed = changes.recv() => {
                        if changed.is_ok() {
                            log::info!("Configuration changed, applying");
                        }
                    }
                }
                if let Some(config) = config.get() {
                    daemon.sync(&config);
                }
            }
        });
    }

    {
        let daemon = daemon.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(100));
            loop {
                tick.tick().await;
                daemon.run_timers();
            }
        });
    }

    let mut packet = Packet::new();
    loop {
        if let Err(e) = socket.recv(&mut packet).await {
            log::warn!("Failed to receive: {}", e);
            continue;
        }
        match InboundPacket::from_received(&packet) {
            Some(inbound) => ctx.handle_inbound(&inbound),
            None => log::debug!("Packet from {} without packet info", packet.peer_addr),
        }
    }
}


/// IPv6 Neighbor Discovery daemon
#[derive(Debug, Clone, Parser)]
#[clap(name = "ndiscd", version, about)]
pub struct Cli {
    /// Path to the configuration file
    #[clap(short, long, default_value = "/etc/ndiscd.toml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub subcmd: Command,
}

#[derive(Debug, Clone, Subcommand)]
#[non_exhaustive]
pub enum Command {
    /// start the daemon
    Start,
}

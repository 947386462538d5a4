use ndiscd::icmp6::ndp::NdMessage;
use ndiscd::icmp6::packet::Packet;
use ndiscd::icmp6::RawIcmp6Socket;
use ndiscd::interface::{self, InterfaceId};
use ndiscd::ndisc::addr::{ALL_NODES, ALL_ROUTERS};
use ndiscd::ndisc::options;

use clap::Parser;

/// Prints every Neighbor Discovery message received
#[derive(Debug, Clone, Parser)]
#[clap(name = "ndisc-dump", version, about)]
struct Cli {
    /// Interfaces to join all-nodes and all-routers on (default: any)
    #[clap(short, long)]
    interface: Vec<String>,
}

fn main() -> std::io::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let socket = RawIcmp6Socket::neighbor_discovery()?;
    let if_ids = if args.interface.is_empty() {
        vec![InterfaceId::UNSPECIFIED]
    } else {
        args.interface.iter().map(|name| interface::name_to_index(name)).collect::<Result<Vec<_>, _>>()?
    };
    for if_id in if_ids {
        socket.join_multicast(ALL_NODES, if_id)?;
        socket.join_multicast(ALL_ROUTERS, if_id)?;
    }

    let mut packet = Packet::new();
    loop {
        socket.recv(&mut packet)?;
        {
            let ifname = match &packet.info {
                Some(info) => interface::index_to_name(info.if_id).unwrap_or_else(|_| info.if_id.to_string()),
                None => "?".to_owned(),
            };
            let dst = packet.info.map(|info| info.addr.to_string()).unwrap_or_else(|| "?".to_owned());
            let ttl = packet.hop_limit.map(|h| h.hop_limit).unwrap_or(0);
            print!("[{}] {} -> {} (ttl: {})", ifname, packet.peer_addr, dst, ttl);
        }

        match NdMessage::parse(packet.data()) {
            Ok(msg) => {
                print!(" {:?}", msg);
                if let Err(e) = options::parse(msg.options()) {
                    print!(" <bad options: {}>", e);
                }
            }
            Err(e) => {
                print!(" ICMPv6 <err: {}>", e);
            }
        }
        println!();
    }
}

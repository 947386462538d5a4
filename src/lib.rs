//! IPv6 Neighbor Discovery (RFC 4861, RFC 4862, RFC 4429).
//!
//! The protocol engine lives in [`ndisc`]: it validates inbound ND
//! messages, resolves neighbors, tracks default routers and applies the
//! link configuration learned from Router Advertisements. Everything it
//! mutates (neighbor cache, routing table, address configuration,
//! transmission) is reached through the collaborator traits in
//! [`ndisc::collab`]; [`memory`] provides in-process implementations of
//! them, and the `ndiscd` binary wires the engine to a raw ICMPv6 socket.

pub mod config;
pub mod icmp6;
pub mod interface;
pub mod memory;
pub mod ndisc;
pub mod proxy;
pub mod rtnl;
pub mod transmit;

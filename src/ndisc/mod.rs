//! The Neighbor Discovery protocol engine.
//!
//! [`NdiscContext`] is the single entry point. Inbound packets go through
//! [`NdiscContext::handle_inbound`]; device events and probe timers call
//! the matching methods on the same context. Every side effect leaves
//! through the traits in [`collab`].

pub mod addr;
pub mod builder;
pub mod collab;
pub mod context;
pub mod dispatch;
pub mod link;
pub mod options;
pub mod params;
pub mod ratelimit;
pub mod redirect;
pub mod resolve;
pub mod router;
pub mod send;

pub use context::Collaborators;
pub use context::NdInterface;
pub use context::NdiscContext;

use std::net::Ipv6Addr;

use crate::icmp6::Icmp6Error;
use options::OptionError;

/// Why a message was dropped or an operation abandoned. None of these are
/// fatal; the engine drops the message and carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdiscError {
    /// The fixed part of the message could not be decoded.
    Truncated(Icmp6Error),

    /// The option chain is malformed, or a link-layer option has the
    /// wrong length for the interface.
    MalformedOptions(&'static str),

    /// The message breaks an RFC 4861 rule. Never answered.
    ProtocolViolation(&'static str),

    /// A buffer could not be allocated or the transmit queue is full.
    ResourceExhaustion(&'static str),

    /// Another node claims one of our addresses. A tentative address has
    /// already been reported to address configuration.
    Conflict(Ipv6Addr),

    /// Deliberately throttled or deferred.
    RateLimited,

    /// Nothing to act on: unknown interface, no usable source address,
    /// no route.
    Unavailable(&'static str),
}

impl std::fmt::Display for NdiscError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            NdiscError::Truncated(e) => write!(f, "truncated message: {}", e),
            NdiscError::MalformedOptions(m) => write!(f, "malformed options: {}", m),
            NdiscError::ProtocolViolation(m) => write!(f, "protocol violation: {}", m),
            NdiscError::ResourceExhaustion(m) => write!(f, "resource exhaustion: {}", m),
            NdiscError::Conflict(addr) => write!(f, "address conflict: {}", addr),
            NdiscError::RateLimited => write!(f, "rate limited"),
            NdiscError::Unavailable(m) => write!(f, "unavailable: {}", m),
        }
    }
}

impl std::error::Error for NdiscError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NdiscError::Truncated(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Icmp6Error> for NdiscError {
    fn from(e: Icmp6Error) -> Self {
        NdiscError::Truncated(e)
    }
}

impl From<OptionError> for NdiscError {
    fn from(e: OptionError) -> Self {
        match e {
            OptionError::Truncated { .. } => NdiscError::MalformedOptions("truncated option header"),
            OptionError::ZeroLength { .. } => NdiscError::MalformedOptions("zero-length option"),
            OptionError::Overflow { .. } => NdiscError::MalformedOptions("option overflows message"),
        }
    }
}

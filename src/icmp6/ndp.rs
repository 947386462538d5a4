//! Fixed parts of the five Neighbor Discovery messages (RFC 4861 §4).
//!
//! Every message borrows the received buffer; the option chain that
//! follows the fixed part is handed over untouched as `options` and
//! decoded separately by [`crate::ndisc::options`].

use std::net::Ipv6Addr;

use super::Icmp6Error;
use crate::ndisc::options::OptionIter;

pub const ROUTER_SOLICITATION: u8 = 133;
pub const ROUTER_ADVERTISEMENT: u8 = 134;
pub const NEIGHBOR_SOLICITATION: u8 = 135;
pub const NEIGHBOR_ADVERTISEMENT: u8 = 136;
pub const REDIRECT: u8 = 137;

pub const RS_HEADER_LEN: usize = 8;
pub const RA_HEADER_LEN: usize = 16;
pub const NS_HEADER_LEN: usize = 24;
pub const NA_HEADER_LEN: usize = 24;
pub const REDIRECT_HEADER_LEN: usize = 40;

pub const NA_FLAG_ROUTER: u8 = 0x80;
pub const NA_FLAG_SOLICITED: u8 = 0x40;
pub const NA_FLAG_OVERRIDE: u8 = 0x20;

pub const RA_FLAG_MANAGED: u8 = 0x80;
pub const RA_FLAG_OTHER: u8 = 0x40;

pub fn is_nd_type(icmp6_type: u8) -> bool {
    (ROUTER_SOLICITATION..=REDIRECT).contains(&icmp6_type)
}

pub(crate) fn read_addr(data: &[u8], offset: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&data[offset..offset + 16]);
    Ipv6Addr::from(octets)
}

/// Default router preference (RFC 4191 §2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RouterPreference {
    Low,
    Medium,
    High,
    /// The reserved `10` encoding.
    Invalid,
}

impl RouterPreference {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b01 => RouterPreference::High,
            0b00 => RouterPreference::Medium,
            0b11 => RouterPreference::Low,
            _ => RouterPreference::Invalid,
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            RouterPreference::High => 0b01,
            RouterPreference::Medium => 0b00,
            RouterPreference::Low => 0b11,
            RouterPreference::Invalid => 0b10,
        }
    }
}

impl Default for RouterPreference {
    fn default() -> Self {
        RouterPreference::Medium
    }
}

fn fmt_option_list(f: &mut std::fmt::Formatter, options: &[u8]) -> std::fmt::Result {
    let mut debug = f.debug_list();
    for option in OptionIter::new(options) {
        debug.entry(&option);
    }
    debug.finish()
}

#[derive(Clone, Copy)]
pub struct RouterSolicitation<'a> {
    pub options: &'a [u8],
}

impl std::fmt::Debug for RouterSolicitation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "NDP RouterSolicitation ")?;
        fmt_option_list(f, self.options)
    }
}

#[derive(Clone, Copy)]
pub struct RouterAdvertisement<'a> {
    pub hop_limit: u8,
    pub managed: bool,
    pub other: bool,
    pub preference: RouterPreference,
    /// Seconds.
    pub router_lifetime: u16,
    /// Milliseconds.
    pub reachable_time: u32,
    /// Milliseconds.
    pub retrans_timer: u32,
    pub options: &'a [u8],
}

impl std::fmt::Debug for RouterAdvertisement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "NDP RouterAdvertisement: flags=")?;
        if self.managed {
            write!(f, "M")?;
        }
        if self.other {
            write!(f, "O")?;
        }
        write!(f, " pref={:?}, ", self.preference)?;
        write!(f, "hop_limit={}, ", self.hop_limit)?;
        write!(f, "router_lifetime={}, ", self.router_lifetime)?;
        write!(f, "reachable_time={}, ", self.reachable_time)?;
        write!(f, "retrans_timer={}, ", self.retrans_timer)?;
        fmt_option_list(f, self.options)
    }
}

#[derive(Clone, Copy)]
pub struct NeighborSolicitation<'a> {
    pub target: Ipv6Addr,
    pub options: &'a [u8],
}

impl std::fmt::Debug for NeighborSolicitation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "NDP NeighborSolicitation: {} ", self.target)?;
        fmt_option_list(f, self.options)
    }
}

#[derive(Clone, Copy)]
pub struct NeighborAdvertisement<'a> {
    pub router: bool,
    pub solicited: bool,
    pub override_: bool,
    pub target: Ipv6Addr,
    pub options: &'a [u8],
}

impl std::fmt::Debug for NeighborAdvertisement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "NDP NeighborAdvertisement: flags=")?;
        if self.router {
            write!(f, "R")?;
        }
        if self.solicited {
            write!(f, "S")?;
        }
        if self.override_ {
            write!(f, "O")?;
        }
        write!(f, " {} ", self.target)?;
        fmt_option_list(f, self.options)
    }
}

#[derive(Clone, Copy)]
pub struct Redirect<'a> {
    pub target: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub options: &'a [u8],
}

impl std::fmt::Debug for Redirect<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "NDP Redirect: target={} destination={} ", self.target, self.destination)?;
        fmt_option_list(f, self.options)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum NdMessage<'a> {
    /// type 133
    RouterSolicitation(RouterSolicitation<'a>),

    /// type 134
    RouterAdvertisement(RouterAdvertisement<'a>),

    /// type 135
    NeighborSolicitation(NeighborSolicitation<'a>),

    /// type 136
    NeighborAdvertisement(NeighborAdvertisement<'a>),

    /// type 137
    Redirect(Redirect<'a>),
}

impl<'a> NdMessage<'a> {
    /// Decodes the fixed part of an ND message. The ICMPv6 code and
    /// checksum are not looked at here.
    pub fn parse(data: &'a [u8]) -> Result<Self, Icmp6Error> {
        if data.len() < 4 {
            return Err(Icmp6Error::new("ICMPv6 packet too short"));
        }

        match data[0] {
            ROUTER_SOLICITATION => {
                if data.len() < RS_HEADER_LEN {
                    return Err(Icmp6Error::new("RS: packet too short"));
                }
                Ok(NdMessage::RouterSolicitation(RouterSolicitation {
                    options: &data[RS_HEADER_LEN..],
                }))
            }

            ROUTER_ADVERTISEMENT => {
                if data.len() < RA_HEADER_LEN {
                    return Err(Icmp6Error::new("RA: packet too short"));
                }
                let flags = data[5];
                Ok(NdMessage::RouterAdvertisement(RouterAdvertisement {
                    hop_limit: data[4],
                    managed: flags & RA_FLAG_MANAGED != 0,
                    other: flags & RA_FLAG_OTHER != 0,
                    preference: RouterPreference::from_bits(flags >> 3),
                    router_lifetime: u16::from_be_bytes([data[6], data[7]]),
                    reachable_time: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
                    retrans_timer: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
                    options: &data[RA_HEADER_LEN..],
                }))
            }

            NEIGHBOR_SOLICITATION => {
                if data.len() < NS_HEADER_LEN {
                    return Err(Icmp6Error::new("NS: packet too short"));
                }
                Ok(NdMessage::NeighborSolicitation(NeighborSolicitation {
                    target: read_addr(data, 8),
                    options: &data[NS_HEADER_LEN..],
                }))
            }

            NEIGHBOR_ADVERTISEMENT => {
                if data.len() < NA_HEADER_LEN {
                    return Err(Icmp6Error::new("NA: packet too short"));
                }
                let flags = data[4];
                Ok(NdMessage::NeighborAdvertisement(NeighborAdvertisement {
                    router: flags & NA_FLAG_ROUTER != 0,
                    solicited: flags & NA_FLAG_SOLICITED != 0,
                    override_: flags & NA_FLAG_OVERRIDE != 0,
                    target: read_addr(data, 8),
                    options: &data[NA_HEADER_LEN..],
                }))
            }

            REDIRECT => {
                if data.len() < REDIRECT_HEADER_LEN {
                    return Err(Icmp6Error::new("Redirect: packet too short"));
                }
                Ok(NdMessage::Redirect(Redirect {
                    target: read_addr(data, 8),
                    destination: read_addr(data, 24),
                    options: &data[REDIRECT_HEADER_LEN..],
                }))
            }

            _ => Err(Icmp6Error::new("not a neighbor discovery message")),
        }
    }

    pub fn options(&self) -> &'a [u8] {
        match self {
            NdMessage::RouterSolicitation(m) => m.options,
            NdMessage::RouterAdvertisement(m) => m.options,
            NdMessage::NeighborSolicitation(m) => m.options,
            NdMessage::NeighborAdvertisement(m) => m.options,
            NdMessage::Redirect(m) => m.options,
        }
    }
}

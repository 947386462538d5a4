//! Per-link-type behaviour: hardware multicast mapping, link-layer
//! address option layout and framing overhead.

use std::net::Ipv6Addr;

use crate::interface::LinkAddr;

use super::options::NdOption;

/// ARPHRD_* hardware types as found in `/sys/class/net/*/type`.
pub mod arphrd {
    pub const ETHER: u16 = 1;
    pub const IEEE802: u16 = 6;
    pub const ARCNET: u16 = 7;
    pub const INFINIBAND: u16 = 32;
    pub const PPP: u16 = 512;
    pub const RAWIP: u16 = 519;
    pub const TUNNEL6: u16 = 769;
    pub const LOOPBACK: u16 = 772;
    pub const FDDI: u16 = 774;
    pub const SIT: u16 = 776;
    pub const IPGRE: u16 = 778;
    pub const NONE: u16 = 0xfffe;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    Ethernet,
    Ieee802,
    Fddi,
    Arcnet,
    Infiniband,
    IpGre,
    Loopback,
    /// Links that carry bare IPv6 packets without a link-layer header.
    Headerless,
    Other(u16),
}

impl LinkType {
    pub fn from_arphrd(ty: u16) -> Self {
        match ty {
            arphrd::ETHER => LinkType::Ethernet,
            arphrd::IEEE802 => LinkType::Ieee802,
            arphrd::FDDI => LinkType::Fddi,
            arphrd::ARCNET => LinkType::Arcnet,
            arphrd::INFINIBAND => LinkType::Infiniband,
            arphrd::IPGRE => LinkType::IpGre,
            arphrd::LOOPBACK => LinkType::Loopback,
            arphrd::NONE | arphrd::PPP | arphrd::RAWIP | arphrd::TUNNEL6 | arphrd::SIT => LinkType::Headerless,
            other => LinkType::Other(other),
        }
    }

    /// Bytes of zero padding between the option header and the address.
    pub fn addr_option_pad(&self) -> usize {
        match self {
            LinkType::Infiniband => 2,
            _ => 0,
        }
    }

    pub fn has_link_header(&self) -> bool {
        !matches!(self, LinkType::Headerless)
    }

    /// Link-layer header length, used to size outbound buffers.
    pub fn header_len(&self) -> usize {
        match self {
            LinkType::Ethernet | LinkType::Ieee802 | LinkType::Loopback => 14,
            LinkType::Fddi => 21,
            LinkType::Arcnet => 4,
            LinkType::Infiniband => 4,
            LinkType::IpGre => 4,
            LinkType::Headerless => 0,
            LinkType::Other(_) => 16,
        }
    }
}

/// Space taken by a link-layer address option: header, padding and
/// address rounded up to the 8-byte option unit.
pub fn addr_option_space(addr_len: usize, link_type: LinkType) -> usize {
    (addr_len + link_type.addr_option_pad() + 2 + 7) & !7
}

/// The subset of IFF_* device flags the engine looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceFlags {
    pub loopback: bool,
    pub pointopoint: bool,
    pub noarp: bool,
}

impl DeviceFlags {
    pub fn from_iff_bits(bits: u32) -> Self {
        Self {
            loopback: bits & libc::IFF_LOOPBACK as u32 != 0,
            pointopoint: bits & libc::IFF_POINTOPOINT as u32 != 0,
            noarp: bits & libc::IFF_NOARP as u32 != 0,
        }
    }
}

/// What the engine needs to know about a device.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub link_type: LinkType,
    pub flags: DeviceFlags,
    /// Device hardware address; `None` on links without one.
    pub addr: Option<LinkAddr>,
    pub broadcast: Option<LinkAddr>,
    pub mtu: u32,
}

impl LinkInfo {
    pub fn ethernet(mac: [u8; 6], mtu: u32) -> Self {
        Self {
            link_type: LinkType::Ethernet,
            flags: DeviceFlags::default(),
            addr: Some(LinkAddr::ethernet(mac)),
            broadcast: Some(LinkAddr::ethernet([0xff; 6])),
            mtu,
        }
    }

    pub fn headerless(mtu: u32) -> Self {
        Self {
            link_type: LinkType::Headerless,
            flags: DeviceFlags { pointopoint: true, ..Default::default() },
            addr: None,
            broadcast: None,
            mtu,
        }
    }

    pub fn addr_len(&self) -> usize {
        self.addr.map(|a| a.len()).unwrap_or(0)
    }

    /// Zero when the device has no hardware address.
    pub fn addr_option_space(&self) -> usize {
        match self.addr_len() {
            0 => 0,
            len => addr_option_space(len, self.link_type),
        }
    }

    /// Headroom reserved in front of an outbound ND message.
    pub fn reserved_space(&self) -> usize {
        (self.link_type.header_len() + 15) & !15
    }

    /// Whether a source/target link-layer option is exactly as long as
    /// this device's addresses require. On a link without hardware
    /// addresses that is a single empty 8-byte option.
    pub fn addr_option_fits(&self, opt: &NdOption<'_>) -> bool {
        opt.len() == addr_option_space(self.addr_len(), self.link_type)
    }

    /// Extracts the address carried by a source/target link-layer option.
    /// `None` when the option does not fit or the link has no addresses.
    pub fn link_addr_from_option(&self, opt: &NdOption<'_>) -> Option<LinkAddr> {
        let addr_len = self.addr_len();
        if addr_len == 0 || !self.addr_option_fits(opt) {
            return None;
        }
        let start = 2 + self.link_type.addr_option_pad();
        LinkAddr::from_slice(&opt.bytes()[start..start + addr_len])
    }

    /// Maps an IPv6 multicast group to a hardware address. With
    /// `transmit` set, link types without a mapping fall back to the
    /// broadcast address.
    pub fn multicast_map(&self, addr: &Ipv6Addr, transmit: bool) -> Option<LinkAddr> {
        let octets = addr.octets();
        match self.link_type {
            LinkType::Ethernet | LinkType::Ieee802 | LinkType::Fddi => {
                Some(LinkAddr::ethernet([0x33, 0x33, octets[12], octets[13], octets[14], octets[15]]))
            }
            LinkType::Arcnet => LinkAddr::from_slice(&[0x00]),
            LinkType::Infiniband => {
                let broadcast = self.broadcast?;
                let broadcast = broadcast.as_bytes();
                if broadcast.len() < 10 {
                    return None;
                }
                let mut buf = [0u8; 20];
                buf[1] = 0xff;
                buf[2] = 0xff;
                buf[3] = 0xff;
                buf[4] = 0xff;
                buf[5] = 0x10 | (broadcast[5] & 0x0f);
                buf[6] = 0x60;
                buf[7] = 0x1b;
                buf[8] = broadcast[8];
                buf[9] = broadcast[9];
                buf[10..].copy_from_slice(&octets[6..16]);
                LinkAddr::from_slice(&buf)
            }
            LinkType::IpGre => {
                let broadcast = self.broadcast?;
                if broadcast.as_bytes().iter().all(|b| *b == 0) {
                    None
                } else {
                    Some(broadcast)
                }
            }
            _ => {
                if transmit {
                    self.broadcast
                } else {
                    None
                }
            }
        }
    }
}

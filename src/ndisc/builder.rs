//! Encoders for the messages we originate: NS, NA, RS and Redirect.
//!
//! Builders produce the ICMPv6 message with a zero checksum; the send
//! path fills it in once source and destination are final. Buffers are
//! reserved up front for the whole framed packet, and a failed
//! reservation surfaces as [`NdiscError::ResourceExhaustion`].

use std::net::Ipv6Addr;

use crate::icmp6::ndp;
use crate::icmp6::IPV6_HEADER_LEN;
use crate::icmp6::IPV6_MIN_MTU;
use crate::interface::LinkAddr;

use super::link::LinkInfo;
use super::options::NdOptionType;
use super::NdiscError;

/// NA flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NaFlags {
    pub router: bool,
    pub solicited: bool,
    pub override_: bool,
}

impl NaFlags {
    fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.router {
            bits |= ndp::NA_FLAG_ROUTER;
        }
        if self.solicited {
            bits |= ndp::NA_FLAG_SOLICITED;
        }
        if self.override_ {
            bits |= ndp::NA_FLAG_OVERRIDE;
        }
        bits
    }
}

/// Reserves room for link-layer header, IPv6 header and `len` bytes of
/// ICMPv6 message.
fn alloc(link: &LinkInfo, len: usize) -> Result<Vec<u8>, NdiscError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(link.reserved_space() + IPV6_HEADER_LEN + len).map_err(|_| {
        log::error!("ndisc: failed to allocate a {}-byte message", len);
        NdiscError::ResourceExhaustion("failed to allocate ND message")
    })?;
    Ok(buf)
}

fn put_header(buf: &mut Vec<u8>, icmp6_type: u8, first_word: [u8; 4]) {
    buf.extend_from_slice(&[icmp6_type, 0, 0, 0]);
    buf.extend_from_slice(&first_word);
}

/// Appends a link-layer address option laid out for `link`: type, length,
/// link-specific pre-padding, the address, then zeros up to the 8-byte
/// boundary.
pub fn put_addr_option(buf: &mut Vec<u8>, kind: NdOptionType, addr: &LinkAddr, link: &LinkInfo) {
    let space = super::link::addr_option_space(addr.len(), link.link_type);
    let start = buf.len();
    buf.push(kind as u8);
    buf.push((space >> 3) as u8);
    buf.resize(buf.len() + link.link_type.addr_option_pad(), 0);
    buf.extend_from_slice(addr.as_bytes());
    buf.resize(start + space, 0);
}

fn addr_option_len(link: &LinkInfo, include: bool) -> usize {
    if include {
        link.addr_option_space()
    } else {
        0
    }
}

pub fn neighbor_solicitation(link: &LinkInfo, target: &Ipv6Addr, include_sllao: bool) -> Result<Vec<u8>, NdiscError> {
    let sllao = include_sllao.then_some(link.addr).flatten();
    let mut buf = alloc(link, ndp::NS_HEADER_LEN + addr_option_len(link, sllao.is_some()))?;
    put_header(&mut buf, ndp::NEIGHBOR_SOLICITATION, [0; 4]);
    buf.extend_from_slice(&target.octets());
    if let Some(addr) = sllao {
        put_addr_option(&mut buf, NdOptionType::SourceLinkAddr, &addr, link);
    }
    Ok(buf)
}

pub fn neighbor_advertisement(link: &LinkInfo, target: &Ipv6Addr, flags: NaFlags, include_tllao: bool) -> Result<Vec<u8>, NdiscError> {
    let tllao = include_tllao.then_some(link.addr).flatten();
    let mut buf = alloc(link, ndp::NA_HEADER_LEN + addr_option_len(link, tllao.is_some()))?;
    put_header(&mut buf, ndp::NEIGHBOR_ADVERTISEMENT, [flags.bits(), 0, 0, 0]);
    buf.extend_from_slice(&target.octets());
    if let Some(addr) = tllao {
        put_addr_option(&mut buf, NdOptionType::TargetLinkAddr, &addr, link);
    }
    Ok(buf)
}

pub fn router_solicitation(link: &LinkInfo, include_sllao: bool) -> Result<Vec<u8>, NdiscError> {
    let sllao = include_sllao.then_some(link.addr).flatten();
    let mut buf = alloc(link, ndp::RS_HEADER_LEN + addr_option_len(link, sllao.is_some()))?;
    put_header(&mut buf, ndp::ROUTER_SOLICITATION, [0; 4]);
    if let Some(addr) = sllao {
        put_addr_option(&mut buf, NdOptionType::SourceLinkAddr, &addr, link);
    }
    Ok(buf)
}

/// Bytes of the original packet a Redirect can carry, option header
/// included: whatever fits in a minimum-MTU packet, rounded down to the
/// option unit. Zero means the option is left out.
pub fn redirected_header_len(original_len: usize, other_options_len: usize) -> usize {
    let room = (IPV6_MIN_MTU as usize)
        .saturating_sub(IPV6_HEADER_LEN + ndp::REDIRECT_HEADER_LEN + other_options_len);
    room.min(original_len + 8) & !7
}

/// Builds a Redirect. `original` is the IPv6 packet that triggered it,
/// starting at its IPv6 header.
pub fn redirect(
    link: &LinkInfo,
    target: &Ipv6Addr,
    destination: &Ipv6Addr,
    target_lladdr: Option<&LinkAddr>,
    original: &[u8],
) -> Result<Vec<u8>, NdiscError> {
    let tllao_len = target_lladdr.map(|a| super::link::addr_option_space(a.len(), link.link_type)).unwrap_or(0);
    let rd_len = redirected_header_len(original.len(), tllao_len);

    let mut buf = alloc(link, ndp::REDIRECT_HEADER_LEN + tllao_len + rd_len)?;
    put_header(&mut buf, ndp::REDIRECT, [0; 4]);
    buf.extend_from_slice(&target.octets());
    buf.extend_from_slice(&destination.octets());

    if let Some(addr) = target_lladdr {
        put_addr_option(&mut buf, NdOptionType::TargetLinkAddr, addr, link);
    }

    if rd_len > 0 {
        buf.extend_from_slice(&[NdOptionType::RedirectedHeader as u8, (rd_len >> 3) as u8, 0, 0, 0, 0, 0, 0]);
        buf.extend_from_slice(&original[..rd_len - 8]);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp6::ndp::NdMessage;
    use crate::ndisc::link::LinkType;
    use crate::ndisc::options;

    fn eth() -> LinkInfo {
        LinkInfo::ethernet([0x02, 0x00, 0x5e, 0x10, 0x20, 0x30], 1500)
    }

    #[test]
    fn ns_with_sllao_round_trips() {
        let link = eth();
        let target: Ipv6Addr = "fe80::1".parse().unwrap();
        let msg = neighbor_solicitation(&link, &target, true).unwrap();
        assert_eq!(msg.len(), 32);

        let ns = match NdMessage::parse(&msg).unwrap() {
            NdMessage::NeighborSolicitation(ns) => ns,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(ns.target, target);

        let parsed = options::parse(ns.options).unwrap();
        let sllao = parsed.source_link_addr().unwrap();
        assert_eq!(link.link_addr_from_option(&sllao), link.addr);
        assert!(parsed.target_link_addr().is_none());
        assert_eq!(options::OptionIter::new(ns.options).count(), 1);
    }

    #[test]
    fn na_flags_and_tllao() {
        let link = eth();
        let target: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let flags = NaFlags { router: true, solicited: false, override_: true };
        let msg = neighbor_advertisement(&link, &target, flags, true).unwrap();
        assert_eq!(msg[4], 0xa0);
        assert_eq!(&msg[24..26], &[2, 1]);
    }

    #[test]
    fn headerless_link_omits_option() {
        let link = LinkInfo::headerless(1280);
        let msg = router_solicitation(&link, true).unwrap();
        assert_eq!(msg.len(), 8);
    }

    #[test]
    fn infiniband_option_is_padded() {
        let mut link = eth();
        link.link_type = LinkType::Infiniband;
        link.addr = LinkAddr::from_slice(&[0xab; 20]);
        let mut buf = Vec::new();
        put_addr_option(&mut buf, NdOptionType::SourceLinkAddr, &link.addr.unwrap(), &link);
        assert_eq!(buf.len(), 24);
        assert_eq!(&buf[..4], &[1, 3, 0, 0]);
        assert_eq!(&buf[4..24], &[0xab; 20]);
    }

    #[test]
    fn redirect_payload_is_capped_and_aligned() {
        // 1280 - 40 - 40 - 8 = 1192 bytes of room
        assert_eq!(redirected_header_len(4000, 8), 1192);
        assert_eq!(redirected_header_len(61, 0), 64);
        assert_eq!(redirected_header_len(0, 0), 8);
    }

    #[test]
    fn redirect_layout() {
        let link = eth();
        let target: Ipv6Addr = "fe80::2".parse().unwrap();
        let dest: Ipv6Addr = "2001:db8::99".parse().unwrap();
        let original = vec![0x60u8; 100];
        let lladdr = LinkAddr::ethernet([1, 2, 3, 4, 5, 6]);
        let msg = redirect(&link, &target, &dest, Some(&lladdr), &original).unwrap();

        let rd = match NdMessage::parse(&msg).unwrap() {
            NdMessage::Redirect(rd) => rd,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(rd.target, target);
        assert_eq!(rd.destination, dest);
        let parsed = options::parse(rd.options).unwrap();
        let rh = parsed.redirected_header().unwrap();
        assert_eq!(rh.len(), 104);
        assert_eq!(rh.redirected_packet().unwrap(), &original[..96]);
        assert!(parsed.target_link_addr().is_some());
    }
}

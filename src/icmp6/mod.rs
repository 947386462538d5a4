pub mod socket;
pub mod packet;
pub mod ndp;

pub use socket::RawIcmp6Socket;
pub use socket::AsyncIcmp6Socket;

use std::net::Ipv6Addr;

pub const IPPROTO_ICMPV6: u8 = 58;

/// Fixed IPv6 header length.
pub const IPV6_HEADER_LEN: usize = 40;

/// Minimum link MTU every IPv6 link must support.
pub const IPV6_MIN_MTU: u32 = 1280;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icmp6Error {
    message: &'static str,
}

impl Icmp6Error {
    pub fn new(message: &'static str) -> Self {
        Self {
            message,
        }
    }

    pub fn message(&self) -> &'static str {
        self.message
    }
}

impl std::fmt::Display for Icmp6Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Icmp6Error {}

fn sum_words(mut sum: u64, data: &[u8]) -> u64 {
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u16::from_be_bytes([word[0], word[1]]) as u64;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u64) << 8;
    }
    sum
}

/// Internet checksum of `payload` under the IPv6 pseudo-header
/// (RFC 8200 §8.1). A payload that already carries a correct checksum
/// yields zero.
pub fn checksum(src: &Ipv6Addr, dst: &Ipv6Addr, payload: &[u8]) -> u16 {
    let mut sum = sum_words(0, &src.octets());
    sum = sum_words(sum, &dst.octets());
    sum += payload.len() as u64;
    sum += IPPROTO_ICMPV6 as u64;
    sum = sum_words(sum, payload);
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Zeroes and then fills the checksum field of an ICMPv6 message.
pub fn fill_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, message: &mut [u8]) {
    if message.len() < 4 {
        return;
    }
    message[2] = 0;
    message[3] = 0;
    let sum = checksum(src, dst, message);
    message[2..4].copy_from_slice(&sum.to_be_bytes());
}

pub fn verify_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, message: &[u8]) -> bool {
    checksum(src, dst, message) == 0
}

//! Neighbor Discovery option chain (RFC 4861 §4.6).
//!
//! Options are `{type, length}` TLVs where the length counts 8-byte
//! units and covers the two header bytes. [`parse`] validates a whole
//! chain up front; the handlers then read singleton options out of
//! [`ParsedOptions`] and walk the repeatable kinds with an
//! [`OptionChain`].

use std::ops::Range;

/// Size of one option length unit.
pub const OPTION_UNIT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NdOptionType {
    SourceLinkAddr = 1,
    TargetLinkAddr = 2,
    PrefixInfo = 3,
    RedirectedHeader = 4,
    Mtu = 5,
    RouteInfo = 24,
    Rdnss = 25,
    Dnssl = 31,
}

impl NdOptionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NdOptionType::SourceLinkAddr),
            2 => Some(NdOptionType::TargetLinkAddr),
            3 => Some(NdOptionType::PrefixInfo),
            4 => Some(NdOptionType::RedirectedHeader),
            5 => Some(NdOptionType::Mtu),
            24 => Some(NdOptionType::RouteInfo),
            25 => Some(NdOptionType::Rdnss),
            31 => Some(NdOptionType::Dnssl),
            _ => None,
        }
    }

    /// Options that are handed to userspace untouched.
    pub fn is_user_option(value: u8) -> bool {
        value == NdOptionType::Rdnss as u8 || value == NdOptionType::Dnssl as u8
    }
}

/// One option, header included.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NdOption<'a> {
    bytes: &'a [u8],
}

impl<'a> NdOption<'a> {
    /// `bytes` must start at the option header and span exactly the
    /// declared length.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn raw_type(&self) -> u8 {
        self.bytes[0]
    }

    pub fn kind(&self) -> Option<NdOptionType> {
        NdOptionType::from_u8(self.raw_type())
    }

    /// Total length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Everything after the two header bytes.
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[2..]
    }

    /// Value of an MTU option.
    pub fn mtu(&self) -> Option<u32> {
        if self.kind() != Some(NdOptionType::Mtu) || self.bytes.len() < 8 {
            return None;
        }
        let b = self.bytes;
        Some(u32::from_be_bytes([b[4], b[5], b[6], b[7]]))
    }

    /// Prefix length of a Route Information option (RFC 4191 §2.3).
    pub fn route_prefix_len(&self) -> Option<u8> {
        if self.kind() != Some(NdOptionType::RouteInfo) || self.bytes.len() < 8 {
            return None;
        }
        Some(self.bytes[2])
    }

    /// The original packet carried by a Redirected Header option, after
    /// its six reserved bytes.
    pub fn redirected_packet(&self) -> Option<&'a [u8]> {
        if self.kind() != Some(NdOptionType::RedirectedHeader) || self.bytes.len() < 8 {
            return None;
        }
        Some(&self.bytes[8..])
    }
}

impl std::fmt::Debug for NdOption<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let hex = |data: &[u8]| data.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":");
        match self.kind() {
            Some(NdOptionType::SourceLinkAddr) => write!(f, "src LL: {}", hex(self.payload())),
            Some(NdOptionType::TargetLinkAddr) => write!(f, "tgt LL: {}", hex(self.payload())),
            Some(NdOptionType::PrefixInfo) => write!(f, "prefix [{}]", self.len()),
            Some(NdOptionType::RedirectedHeader) => write!(f, "redirected header [{}]", self.len()),
            Some(NdOptionType::Mtu) => match self.mtu() {
                Some(mtu) => write!(f, "MTU {}", mtu),
                None => write!(f, "MTU [{}]", self.len()),
            },
            Some(NdOptionType::RouteInfo) => write!(f, "route info [{}]", self.len()),
            Some(NdOptionType::Rdnss) => write!(f, "RDNSS [{}]", self.len()),
            Some(NdOptionType::Dnssl) => write!(f, "DNSSL [{}]", self.len()),
            None => write!(f, "NdOption({:#02x}) [{}]", self.raw_type(), self.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionError {
    /// Fewer bytes left than an option header.
    Truncated { offset: usize },
    /// Declared length of zero.
    ZeroLength { offset: usize },
    /// Declared length runs past the end of the buffer.
    Overflow { offset: usize, declared: usize, remaining: usize },
}

impl std::fmt::Display for OptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OptionError::Truncated { offset } => write!(f, "truncated option header at offset {}", offset),
            OptionError::ZeroLength { offset } => write!(f, "zero-length option at offset {}", offset),
            OptionError::Overflow { offset, declared, remaining } => {
                write!(f, "option at offset {} declares {} bytes, {} remain", offset, declared, remaining)
            }
        }
    }
}

impl std::error::Error for OptionError {}

/// Lenient walk over a raw option chain that stops at the first
/// malformed option. Used for display; validation goes through [`parse`].
#[derive(Debug, Clone)]
pub struct OptionIter<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> OptionIter<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw, pos: 0 }
    }
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = NdOption<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.raw[self.pos.min(self.raw.len())..];
        if rest.len() < 2 {
            return None;
        }
        let len = rest[1] as usize * OPTION_UNIT;
        if len == 0 || len > rest.len() {
            self.pos = self.raw.len();
            return None;
        }
        self.pos += len;
        Some(NdOption::new(&rest[..len]))
    }
}

/// Offsets of the first and last option of one repeatable kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    first: usize,
    last: usize,
}

impl Span {
    fn extend(span: &mut Option<Span>, offset: usize) {
        match span {
            Some(span) => span.last = offset,
            None => *span = Some(Span { first: offset, last: offset }),
        }
    }
}

/// Forward scan from one option to the next option accepted by a
/// predicate, never going past an end offset. The chain it walks must
/// already have been validated by [`parse`].
#[derive(Clone)]
pub struct OptionChain<'a> {
    raw: &'a [u8],
    next: Option<usize>,
    end: usize,
    matches: fn(u8) -> bool,
}

impl<'a> OptionChain<'a> {
    fn new(raw: &'a [u8], span: Option<Span>, matches: fn(u8) -> bool) -> Self {
        match span {
            Some(span) => Self { raw, next: Some(span.first), end: span.last, matches },
            None => Self { raw, next: None, end: 0, matches },
        }
    }

    fn option_at(&self, offset: usize) -> Option<NdOption<'a>> {
        let header = self.raw.get(offset..offset + 2)?;
        let len = header[1] as usize * OPTION_UNIT;
        if len == 0 {
            return None;
        }
        self.raw.get(offset..offset + len).map(NdOption::new)
    }

    fn advance(&self, mut offset: usize) -> Option<usize> {
        loop {
            let current = self.option_at(offset)?;
            offset += current.len();
            if offset > self.end {
                return None;
            }
            let candidate = self.option_at(offset)?;
            if (self.matches)(candidate.raw_type()) {
                return Some(offset);
            }
        }
    }
}

impl<'a> Iterator for OptionChain<'a> {
    type Item = NdOption<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next?;
        let option = self.option_at(offset)?;
        self.next = if offset < self.end { self.advance(offset) } else { None };
        Some(option)
    }
}

/// A validated option chain.
#[derive(Debug, Clone)]
pub struct ParsedOptions<'a> {
    raw: &'a [u8],
    source_link_addr: Option<NdOption<'a>>,
    target_link_addr: Option<NdOption<'a>>,
    redirected_header: Option<NdOption<'a>>,
    mtu: Option<NdOption<'a>>,
    prefix_info: Option<Span>,
    route_info: Option<Span>,
    user_options: Option<Span>,
}

fn is_prefix_info(t: u8) -> bool {
    t == NdOptionType::PrefixInfo as u8
}

fn is_route_info(t: u8) -> bool {
    t == NdOptionType::RouteInfo as u8
}

impl<'a> ParsedOptions<'a> {
    pub fn source_link_addr(&self) -> Option<NdOption<'a>> {
        self.source_link_addr
    }

    pub fn target_link_addr(&self) -> Option<NdOption<'a>> {
        self.target_link_addr
    }

    pub fn redirected_header(&self) -> Option<NdOption<'a>> {
        self.redirected_header
    }

    pub fn mtu(&self) -> Option<NdOption<'a>> {
        self.mtu
    }

    pub fn prefix_info(&self) -> OptionChain<'a> {
        OptionChain::new(self.raw, self.prefix_info, is_prefix_info)
    }

    pub fn route_info(&self) -> OptionChain<'a> {
        OptionChain::new(self.raw, self.route_info, is_route_info)
    }

    /// RDNSS and DNSSL options in chain order.
    pub fn user_options(&self) -> OptionChain<'a> {
        OptionChain::new(self.raw, self.user_options, NdOptionType::is_user_option)
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }
}

/// Validates and indexes an option chain. Every byte of `raw` must be
/// covered by a well-formed option. Unknown types are skipped; a repeated
/// singleton keeps its first occurrence.
pub fn parse(raw: &[u8]) -> Result<ParsedOptions<'_>, OptionError> {
    let mut parsed = ParsedOptions {
        raw,
        source_link_addr: None,
        target_link_addr: None,
        redirected_header: None,
        mtu: None,
        prefix_info: None,
        route_info: None,
        user_options: None,
    };

    let mut offset = 0;
    while offset < raw.len() {
        let remaining = raw.len() - offset;
        if remaining < 2 {
            return Err(OptionError::Truncated { offset });
        }
        let declared = raw[offset + 1] as usize * OPTION_UNIT;
        if declared == 0 {
            return Err(OptionError::ZeroLength { offset });
        }
        if declared > remaining {
            return Err(OptionError::Overflow { offset, declared, remaining });
        }

        let option = NdOption::new(&raw[offset..offset + declared]);
        let slot = match option.kind() {
            Some(NdOptionType::SourceLinkAddr) => Some(&mut parsed.source_link_addr),
            Some(NdOptionType::TargetLinkAddr) => Some(&mut parsed.target_link_addr),
            Some(NdOptionType::RedirectedHeader) => Some(&mut parsed.redirected_header),
            Some(NdOptionType::Mtu) => Some(&mut parsed.mtu),
            Some(NdOptionType::PrefixInfo) => {
                Span::extend(&mut parsed.prefix_info, offset);
                None
            }
            Some(NdOptionType::RouteInfo) => {
                Span::extend(&mut parsed.route_info, offset);
                None
            }
            Some(NdOptionType::Rdnss) | Some(NdOptionType::Dnssl) => {
                Span::extend(&mut parsed.user_options, offset);
                None
            }
            None => {
                log::trace!("ignored unsupported option; type={}, len={}", option.raw_type(), declared / OPTION_UNIT);
                None
            }
        };

        if let Some(slot) = slot {
            if slot.is_some() {
                log::debug!("duplicated ND6 option found: type={}", option.raw_type());
            } else {
                *slot = Some(option);
            }
        }

        offset += declared;
    }

    Ok(parsed)
}

/// Byte range of an option inside the chain it was parsed from.
pub fn option_range(parsed: &ParsedOptions<'_>, option: &NdOption<'_>) -> Option<Range<usize>> {
    let base = parsed.raw.as_ptr() as usize;
    let start = (option.bytes().as_ptr() as usize).checked_sub(base)?;
    let end = start + option.len();
    if end > parsed.raw.len() {
        return None;
    }
    Some(start..end)
}

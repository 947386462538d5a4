//! Token buckets: one guarding the log against packet floods, and a
//! per-destination one for outgoing redirects.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Mutex;

/// Logs through the `log` facade, but only while `$limit` has tokens.
///
/// ```ignore
/// nd_log!(ctx.log_limit(), log::Level::Warn, "NS: multicast target {}", target);
/// ```
#[macro_export]
macro_rules! nd_log {
    ($limit:expr, $level:expr, $($arg:tt)+) => {
        if log::log_enabled!($level) && $limit.allow() {
            log::log!($level, $($arg)+);
        }
    };
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// `burst` messages per `interval`.
#[derive(Debug)]
pub struct LogLimit {
    burst: u32,
    interval: Duration,
    bucket: Mutex<Bucket>,
    suppressed: Mutex<u64>,
}

impl LogLimit {
    pub fn new(burst: u32, interval: Duration) -> Self {
        Self {
            burst,
            interval,
            bucket: Mutex::new(Bucket { tokens: burst, last_refill: Instant::now() }),
            suppressed: Mutex::new(0),
        }
    }

    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock();
        if now.saturating_duration_since(bucket.last_refill) >= self.interval {
            bucket.tokens = self.burst;
            bucket.last_refill = now;
            let mut suppressed = self.suppressed.lock();
            if *suppressed > 0 {
                log::warn!("ndisc: {} log messages suppressed", *suppressed);
                *suppressed = 0;
            }
        }
        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            *self.suppressed.lock() += 1;
            false
        }
    }
}

impl Default for LogLimit {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(5))
    }
}

/// How many intervals' worth of tokens a peer may bank.
const BURST_FACTOR: u32 = 6;

/// Peers idle for this long are forgotten on the next sweep.
const PEER_IDLE: Duration = Duration::from_secs(120);

const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct PeerTokens {
    /// Banked credit, measured in time.
    credit: Duration,
    last: Instant,
}

/// Per-destination limiter: one message per `interval`, with bursts of
/// up to six.
#[derive(Debug)]
pub struct PeerRateLimiter {
    peers: Mutex<HashMap<Ipv6Addr, PeerTokens>>,
}

impl PeerRateLimiter {
    pub fn new() -> Self {
        Self { peers: Mutex::new(HashMap::new()) }
    }

    pub fn allow(&self, peer: Ipv6Addr, interval: Duration) -> bool {
        self.allow_at(peer, interval, Instant::now())
    }

    pub fn allow_at(&self, peer: Ipv6Addr, interval: Duration, now: Instant) -> bool {
        let cap = interval * BURST_FACTOR;
        let mut peers = self.peers.lock();
        if peers.len() >= SWEEP_THRESHOLD {
            peers.retain(|_, p| now.saturating_duration_since(p.last) < PEER_IDLE);
        }

        let entry = peers.entry(peer).or_insert(PeerTokens { credit: cap, last: now });
        let credit = entry.credit + now.saturating_duration_since(entry.last);
        let mut credit = credit.min(cap);
        entry.last = now;

        let allowed = credit >= interval;
        if allowed {
            credit -= interval;
        }
        entry.credit = credit;
        allowed
    }
}

impl Default for PeerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

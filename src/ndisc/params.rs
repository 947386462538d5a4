//! Per-interface ND timers and probe counts.

use std::time::Duration;

use rand::Rng;

use crate::config::InterfaceConfig;

/// Timer ticks per second.
pub const HZ: u64 = 250;

/// Longest timeout the scheduler accepts, in ticks.
pub const MAX_SCHEDULE_TIMEOUT: u64 = i32::MAX as u64;

/// A duration in timer ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Self = Self(0);

    /// Shortest interval an RA may set, one tenth of a second.
    pub const MIN_RA_TIMER: Self = Self(HZ / 10);

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * HZ)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * HZ / 1000)
    }

    /// Converts a millisecond timer field of an RA. Zero means
    /// "unspecified" and yields `None`, as does a value the scheduler
    /// cannot represent once multiplied by `horizon_factor`. Small values
    /// are raised to [`Ticks::MIN_RA_TIMER`].
    pub fn from_ra_millis(ms: u32, horizon_factor: u64) -> Option<Self> {
        if ms == 0 {
            return None;
        }
        if (ms as u64) / 1000 >= MAX_SCHEDULE_TIMEOUT / (horizon_factor * HZ) {
            return None;
        }
        Some(Self::from_millis(ms as u64).max(Self::MIN_RA_TIMER))
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }

    pub fn as_millis(&self) -> u64 {
        self.0 * 1000 / HZ
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::Mul<u64> for Ticks {
    type Output = Ticks;

    fn mul(self, rhs: u64) -> Ticks {
        Ticks(self.0.saturating_mul(rhs))
    }
}

/// Picks a reachable time uniformly from `[base/2, 3*base/2)`
/// (RFC 4861 §6.3.2).
pub fn rand_reach_time(base: Ticks) -> Ticks {
    if base.is_zero() {
        return Ticks::ZERO;
    }
    let jitter = rand::thread_rng().gen_range(0..base.0);
    Ticks(jitter + (base.0 >> 1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdParams {
    pub retrans_time: Ticks,
    pub base_reachable_time: Ticks,
    /// Randomised from `base_reachable_time`.
    pub reachable_time: Ticks,
    pub gc_staletime: Ticks,
    pub ucast_probes: u32,
    pub app_probes: u32,
    pub mcast_probes: u32,
    pub proxy_delay: Ticks,
    pub proxy_qlen: usize,
}

impl NdParams {
    pub fn from_config(cnf: &InterfaceConfig) -> Self {
        let base_reachable_time = Ticks::from_millis(cnf.base_reachable_time_ms as u64);
        Self {
            retrans_time: Ticks::from_millis(cnf.retrans_time_ms as u64),
            base_reachable_time,
            reachable_time: rand_reach_time(base_reachable_time),
            gc_staletime: base_reachable_time * 3,
            ucast_probes: cnf.ucast_probes,
            app_probes: cnf.app_probes,
            mcast_probes: cnf.mcast_probes,
            proxy_delay: Ticks::from_millis(cnf.proxy_delay_ms as u64),
            proxy_qlen: cnf.proxy_qlen,
        }
    }

    /// Returns whether anything changed.
    pub fn set_base_reachable_time(&mut self, base: Ticks) -> bool {
        if base == self.base_reachable_time {
            return false;
        }
        self.base_reachable_time = base;
        self.gc_staletime = base * 3;
        self.reachable_time = rand_reach_time(base);
        true
    }

    /// Returns whether anything changed.
    pub fn set_retrans_time(&mut self, retrans: Ticks) -> bool {
        if retrans == self.retrans_time {
            return false;
        }
        self.retrans_time = retrans;
        true
    }
}

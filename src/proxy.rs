//! Delay queue for proxied and anycast Neighbor Solicitations.
//!
//! Answers on behalf of other nodes are sent after a random delay
//! (RFC 4861 §7.2.8). The engine hands such solicitations to a
//! [`ProxyDelayQueue`], which feeds them back once their delay has
//! passed, marked as locally enqueued so they are answered immediately.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;

use crate::icmp6::packet::InboundPacket;
use crate::ndisc::collab::DeferredQueue;

/// Decrements the pending count when a scheduled packet is done with,
/// delivered or not.
struct Pending(Arc<AtomicUsize>);

impl Drop for Pending {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone)]
pub struct ProxyDelayQueue {
    runtime: tokio::runtime::Handle,
    pending: Arc<AtomicUsize>,
    replay: mpsc::UnboundedSender<InboundPacket>,
}

impl ProxyDelayQueue {
    /// Must be called from within a tokio runtime. Replayed packets come
    /// out of the returned receiver.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InboundPacket>) {
        Self::with_handle(tokio::runtime::Handle::current())
    }

    pub fn with_handle(runtime: tokio::runtime::Handle) -> (Self, mpsc::UnboundedReceiver<InboundPacket>) {
        let (replay, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            runtime,
            pending: Arc::new(AtomicUsize::new(0)),
            replay,
        };
        (queue, receiver)
    }

    /// Packets waiting for their delay to pass.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn random_delay(max_delay: Duration) -> Duration {
        let max = max_delay.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max))
    }
}

impl DeferredQueue for ProxyDelayQueue {
    fn enqueue(&self, mut packet: InboundPacket, max_delay: Duration, qlen: usize) -> bool {
        let reserved = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| if n < qlen { Some(n + 1) } else { None });
        if reserved.is_err() {
            return false;
        }

        let pending = Pending(self.pending.clone());
        let replay = self.replay.clone();
        let delay = Self::random_delay(max_delay);
        packet.locally_enqueued = true;

        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if replay.send(packet).is_err() {
                log::debug!("proxy: replay channel closed, dropping deferred solicitation");
            }
            drop(pending);
        });
        true
    }
}

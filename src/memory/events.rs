use std::net::Ipv6Addr;
use std::time::Duration;

use parking_lot::Mutex;

use crate::icmp6::packet::InboundPacket;
use crate::interface::InterfaceId;
use crate::ndisc::collab::DeferredQueue;
use crate::ndisc::collab::NdiscNotifier;
use crate::ndisc::collab::OutboundMessage;
use crate::ndisc::collab::RedirectNotice;
use crate::ndisc::collab::Transmitter;
use crate::ndisc::NdiscError;

/// Keeps every message it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingTransmitter {
    sent: Mutex<Vec<OutboundMessage>>,
    capacity: Option<usize>,
}

impl RecordingTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses messages once `capacity` are held.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            capacity: Some(capacity),
        }
    }

    /// Drains the recorded messages.
    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }
}

impl Transmitter for RecordingTransmitter {
    fn transmit(&self, message: OutboundMessage) -> Result<(), NdiscError> {
        let mut sent = self.sent.lock();
        if self.capacity.map_or(false, |cap| sent.len() >= cap) {
            return Err(NdiscError::ResourceExhaustion("transmit queue full"));
        }
        sent.push(message);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierEvent {
    UserOption {
        if_id: InterfaceId,
        icmp6_type: u8,
        icmp6_code: u8,
        option: Vec<u8>,
        router: Ipv6Addr,
    },
    LinkParamsChanged(InterfaceId),
    Redirect(RedirectNotice),
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifierEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<NotifierEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl NdiscNotifier for RecordingNotifier {
    fn user_option(&self, if_id: InterfaceId, icmp6_type: u8, icmp6_code: u8, option: &[u8], router: &Ipv6Addr) {
        self.events.lock().push(NotifierEvent::UserOption {
            if_id,
            icmp6_type,
            icmp6_code,
            option: option.to_vec(),
            router: *router,
        });
    }

    fn link_params_changed(&self, if_id: InterfaceId) {
        self.events.lock().push(NotifierEvent::LinkParamsChanged(if_id));
    }

    fn redirect(&self, notice: RedirectNotice) {
        self.events.lock().push(NotifierEvent::Redirect(notice));
    }
}

/// Writes management-plane notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NdiscNotifier for LogNotifier {
    fn user_option(&self, if_id: InterfaceId, icmp6_type: u8, _icmp6_code: u8, option: &[u8], router: &Ipv6Addr) {
        let kind = option.first().copied().unwrap_or(0);
        log::info!("ndisc: option type {} in ICMPv6 type {} from {} on {} ({} bytes)", kind, icmp6_type, router, if_id, option.len());
    }

    fn link_params_changed(&self, if_id: InterfaceId) {
        log::info!("ndisc: link parameters of {} changed", if_id);
    }

    fn redirect(&self, notice: RedirectNotice) {
        log::info!(
            "ndisc: redirect from {} on {}: {} via {}",
            notice.router,
            notice.if_id,
            notice.destination,
            notice.target
        );
    }
}

/// Holds deferred packets until taken; nothing is replayed on its own.
#[derive(Debug, Default)]
pub struct RecordingDeferredQueue {
    queued: Mutex<Vec<(InboundPacket, Duration)>>,
}

impl RecordingDeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<InboundPacket> {
        std::mem::take(&mut *self.queued.lock()).into_iter().map(|(p, _)| p).collect()
    }

    pub fn len(&self) -> usize {
        self.queued.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.lock().is_empty()
    }
}

impl DeferredQueue for RecordingDeferredQueue {
    fn enqueue(&self, packet: InboundPacket, max_delay: Duration, qlen: usize) -> bool {
        let mut queued = self.queued.lock();
        if queued.len() >= qlen {
            return false;
        }
        queued.push((packet, max_delay));
        true
    }
}

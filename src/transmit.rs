//! Transmit path from the engine to the raw ICMPv6 socket.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::icmp6::packet::Packet;
use crate::icmp6::AsyncIcmp6Socket;
use crate::ndisc::collab::OutboundMessage;
use crate::ndisc::collab::Transmitter;
use crate::ndisc::NdiscError;

/// Messages the engine may have in flight before sends start failing.
pub const DEFAULT_QUEUE_LEN: usize = 256;

/// Queues outbound messages for a sender task. Never blocks the caller.
#[derive(Debug, Clone)]
pub struct ChannelTransmitter {
    sender: mpsc::Sender<OutboundMessage>,
}

impl ChannelTransmitter {
    pub fn new(queue_len: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::channel(queue_len.max(1));
        (Self { sender }, receiver)
    }
}

impl Transmitter for ChannelTransmitter {
    fn transmit(&self, message: OutboundMessage) -> Result<(), NdiscError> {
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(NdiscError::ResourceExhaustion("transmit queue full")),
            Err(TrySendError::Closed(_)) => Err(NdiscError::Unavailable("transmit path closed")),
        }
    }
}

/// Writes queued messages to `socket` until every transmitter is gone.
pub async fn run_sender(socket: AsyncIcmp6Socket, mut receiver: mpsc::Receiver<OutboundMessage>) {
    while let Some(message) = receiver.recv().await {
        let packet = Packet::outbound(message.dst, message.src, message.if_id, message.hop_limit, &message.payload);
        if let Err(e) = socket.send(&packet).await {
            log::warn!("send: {} -> {} on {} failed: {}", message.src, message.dst, message.if_id, e);
        }
    }
    log::debug!("send: transmit queue closed");
}

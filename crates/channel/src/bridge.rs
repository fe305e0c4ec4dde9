//! Webhook-fed transport for an external messaging bridge.
//!
//! The bridge owns the actual messaging session. It POSTs every received message to the
//! server, which hands it to a [`BridgeInbox`]; the paired [`BridgeTransport`] yields
//! those envelopes to the [`ChannelRunner`](crate::runner::ChannelRunner).

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use crate::events::{BridgePayload, InboundEnvelope};
use crate::runner::{ChannelTransport, TransportError};

pub const DEFAULT_INBOX_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InboxError {
    #[error("bridge inbox is closed")]
    Closed,
}

#[derive(Clone)]
pub struct BridgeInbox {
    sender: mpsc::Sender<InboundEnvelope>,
    closed: watch::Receiver<bool>,
}

impl BridgeInbox {
    /// Queues a bridge payload and returns the envelope id assigned to it.
    pub async fn deliver(&self, payload: BridgePayload) -> Result<String, InboxError> {
        if *self.closed.borrow() {
            return Err(InboxError::Closed);
        }
        let envelope = payload.into_envelope(|| Uuid::new_v4().to_string());
        let envelope_id = envelope.envelope_id.clone();
        self.sender.send(envelope).await.map_err(|_| InboxError::Closed)?;
        Ok(envelope_id)
    }
}

pub struct BridgeTransport {
    receiver: Mutex<mpsc::Receiver<InboundEnvelope>>,
    closed: watch::Sender<bool>,
}

pub fn bridge_channel(capacity: usize) -> (BridgeInbox, BridgeTransport) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let (closed, closed_rx) = watch::channel(false);
    (
        BridgeInbox { sender, closed: closed_rx },
        BridgeTransport { receiver: Mutex::new(receiver), closed },
    )
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl ChannelTransport for BridgeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Ends once every inbox handle has been dropped and the queue is drained, or as
    /// soon as the transport is disconnected.
    async fn next_envelope(&self) -> Result<Option<InboundEnvelope>, TransportError> {
        tokio::select! {
            biased;
            _ = wait_closed(self.closed.subscribe()) => Ok(None),
            envelope = async { self.receiver.lock().await.recv().await } => Ok(envelope),
        }
    }

    /// Never waits on a pending `next_envelope`; the reader observes the flag instead.
    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        if let Ok(mut receiver) = self.receiver.try_lock() {
            receiver.close();
        }
        Ok(())
    }
}

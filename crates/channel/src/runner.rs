use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{screen, InboundEnvelope, InboundMessage, MessageHandler};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `None` means the stream ended cleanly.
    async fn next_envelope(&self) -> Result<Option<InboundEnvelope>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl ChannelTransport for NoopTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<InboundEnvelope>, TransportError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// One FIFO worker per correspondent: a sender's messages are handled strictly in
/// arrival order while different senders proceed concurrently. A worker retires as soon
/// as its queue drains; the next message from that sender starts a fresh one.
struct CorrespondentQueues {
    handler: Arc<dyn MessageHandler>,
    queues: Arc<Mutex<QueueMap>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

type QueueMap = HashMap<String, mpsc::UnboundedSender<InboundMessage>>;

impl CorrespondentQueues {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            handler,
            queues: Arc::new(Mutex::new(HashMap::new())),
            workers: Mutex::new(Vec::new()),
        }
    }

    async fn enqueue(&self, message: InboundMessage) {
        let mut queues = self.queues.lock().await;
        let message = match queues.get(&message.sender) {
            Some(queue) => match queue.send(message) {
                Ok(()) => return,
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let (queue, receiver) = mpsc::unbounded_channel();
        let sender = message.sender.clone();
        // A freshly created receiver is alive, so this send cannot fail.
        let _ = queue.send(message);
        queues.insert(sender.clone(), queue);

        let mut workers = self.workers.lock().await;
        workers.retain(|worker| !worker.is_finished());
        workers.push(tokio::spawn(run_worker(
            sender,
            receiver,
            Arc::clone(&self.handler),
            Arc::clone(&self.queues),
        )));
    }

    async fn close(&self) {
        self.queues.lock().await.clear();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(error) = worker.await {
                warn!(error = %error, "correspondent worker ended abnormally");
            }
        }
    }
}

async fn run_worker(
    correspondent: String,
    mut receiver: mpsc::UnboundedReceiver<InboundMessage>,
    handler: Arc<dyn MessageHandler>,
    queues: Arc<Mutex<QueueMap>>,
) {
    debug!(correspondent = %correspondent, "correspondent worker started");
    while let Some(message) = receiver.recv().await {
        if let Err(error) = handler.handle(message).await {
            warn!(
                event_name = "ingress.message.handler_failed",
                correspondent = %correspondent,
                error = %error,
                "message handler failed; continuing with next message"
            );
        }

        if receiver.is_empty() {
            // Enqueue holds the same lock, so nothing can land between the check and removal.
            let mut queues = queues.lock().await;
            if receiver.is_empty() {
                queues.remove(&correspondent);
                break;
            }
        }
    }
    debug!(correspondent = %correspondent, "correspondent worker stopped");
}

pub struct ChannelRunner {
    transport: Arc<dyn ChannelTransport>,
    queues: CorrespondentQueues,
    reconnect_policy: ReconnectPolicy,
}

impl ChannelRunner {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        handler: Arc<dyn MessageHandler>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, queues: CorrespondentQueues::new(handler), reconnect_policy }
    }

    /// Pumps the transport until it ends or retries are exhausted, then waits for every
    /// queued message to be handled. Transport failures never propagate.
    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => break,
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "channel transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "channel retries exhausted; continuing process without crash"
                        );
                        break;
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.queues.close().await;
        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening channel transport");
        self.transport.connect().await?;
        info!(attempt, "channel transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "channel transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            if let Err(reason) = screen(&envelope.message) {
                debug!(
                    event_name = "ingress.message.ignored",
                    envelope_id = %envelope.envelope_id,
                    reason = reason.as_str(),
                    "inbound message filtered out"
                );
                continue;
            }

            info!(
                event_name = "ingress.message.received",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                correspondent = %envelope.message.sender,
                "received inbound message"
            );
            self.queues.enqueue(envelope.message).await;
        }
    }
}

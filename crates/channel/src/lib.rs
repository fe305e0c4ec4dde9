//! Messaging channel plumbing.
//!
//! - **Events** (`events`) - inbound message shape, bridge payloads and the filter that
//!   drops group, broadcast, self-sent and empty messages
//! - **Runner** (`runner`) - transport loop with reconnect backoff and one ordered
//!   worker queue per correspondent
//! - **Bridge** (`bridge`) - webhook-fed transport for an external messaging bridge
//! - **Sender** (`sender`) - outbound delivery (`Noop` or HTTP bridge)
//!
//! ```text
//! bridge → /webhook/messages → BridgeInbox → ChannelRunner → MessageHandler
//!                                                               ↓
//!                                    MessageSender ← reply ← agent runtime
//! ```

pub mod bridge;
pub mod events;
pub mod runner;
pub mod sender;

pub use bridge::{bridge_channel, BridgeInbox, BridgeTransport, InboxError};
pub use events::{BridgePayload, HandlerError, InboundEnvelope, InboundMessage, MessageHandler};
pub use runner::{ChannelRunner, ChannelTransport, NoopTransport, ReconnectPolicy, TransportError};
pub use sender::{sender_from_config, HttpBridgeSender, MessageSender, NoopSender, SendError};

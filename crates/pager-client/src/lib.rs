//! # pager-client
//!
//! Client side of the Pager relay.
//!
//! - [`MessageLifecycle`]: optimistic tracking of outbound messages and
//!   reconciliation of hub echoes by correlation identifier
//! - [`Reconnector`]: one fixed-delay reconnect at a time, cancellable
//! - [`HttpTransport`]: publish, read and event-stream access over HTTP
//! - [`MessagingClient`]: all of the above plus observable [`DeviceState`]
//!
//! ```rust,ignore
//! use pager_client::{ClientConfig, MessagingClient};
//!
//! let client = MessagingClient::http(ClientConfig::from_env())?;
//! client.connect();
//! let message = client.send("Hello").await?;
//! println!("{}", message.status);
//! ```

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod reconnect;
pub mod transport;

pub use client::{ConnectionStatus, DeviceState, MessagingClient};
pub use error::ClientError;
pub use lifecycle::{
    Direction, EchoOutcome, LifecycleError, Message, MessageId, MessageLifecycle, Outgoing,
    Reaction, SendStatus,
};
pub use reconnect::{Reconnector, DEFAULT_RECONNECT_DELAY};
pub use transport::{
    decode_event_stream, ClientConfig, EventStream, HttpTransport, SendTransport,
    SequenceCheck, StreamSource,
};

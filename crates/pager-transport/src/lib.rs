//! # pager-transport
//!
//! Server-to-client delivery for the Pager relay.
//!
//! Each open stream is a [`StreamConnection`]: it holds one hub
//! registration and yields encoded event-stream frames, numbered from 1 per
//! connection, with keep-alive comments in between when the stream is idle.
//!
//! ```rust,ignore
//! use pager_transport::{StreamConfig, StreamConnection};
//!
//! let conn = StreamConnection::open(&hub, &StreamConfig::default())?;
//! let body = axum::body::Body::from_stream(conn.map(Ok::<_, Infallible>));
//! ```

pub mod sse;
pub mod traits;

pub use sse::{StreamConfig, StreamConnection};
pub use traits::{ConnectionId, TransportError};

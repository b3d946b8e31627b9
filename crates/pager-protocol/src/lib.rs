//! # pager-protocol
//!
//! Wire definitions for the Pager relay.
//!
//! This crate defines the JSON bodies exchanged with the server and the
//! event-stream framing used to push new messages to subscribers.
//!
//! ## Types
//!
//! - `MessageEvent` - A published message, as broadcast to subscribers
//! - `PublishRequest` / `ApiResponse` - Publish and read endpoint bodies
//! - `StreamFrame` - One sequenced event on a stream connection
//!
//! ## Example
//!
//! ```rust
//! use pager_protocol::{codec, MessageEvent, StreamFrame};
//!
//! let frame = StreamFrame::new(1, MessageEvent::new("Hello", None));
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, encode_event, FrameDecoder, ProtocolError};
pub use frames::{
    ApiResponse, MessageEvent, PublishRequest, StreamFrame, STATUS_BAD_REQUEST, STATUS_OK,
    STATUS_UNAVAILABLE,
};

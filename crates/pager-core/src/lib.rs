//! # pager-core
//!
//! Core building blocks of the Pager relay.
//!
//! - **Validator** - Sanitize and bounds-check publish bodies
//! - **MessageStore** - The single latest-message slot over a key-value backend
//! - **BroadcastHub** - Topic-keyed pub/sub registry with bounded handlers
//! - **Relay** - The publish pipeline tying the three together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │  Validator  │────▶│MessageStore │────▶│ BroadcastHub │────▶ subscribers
//! └─────────────┘     └─────────────┘     └──────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │KeyValueStore│
//!                     └─────────────┘
//! ```

pub mod hub;
pub mod relay;
pub mod store;
pub mod validator;

pub use hub::{
    BroadcastHub, Handler, HubConfig, HubError, HubStats, PublishReport, Subscription,
    SubscriptionHandle, Topic,
};
pub use relay::{PublishError, Published, Relay};
pub use store::{
    FileStore, KeyValueStore, MemoryStore, MessageStore, StoreError, LATEST_MESSAGE_KEY,
};
pub use validator::{
    escape_html, SanitizedText, ValidatedMessage, ValidationError, ValidationLimits, Validator,
};

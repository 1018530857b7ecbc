//! Typed async client for a derivatives-risk dashboard backend.
//!
//! Owns the push-connection lifecycle (fixed-delay reconnect, typed events),
//! reconciles full snapshots with incremental per-option updates in a single
//! store, derives the alert set, manages per-contract subscription intent,
//! and aligns historical series onto a fixed intraday session grid.

pub mod client;
pub mod connection;
pub mod errors;
pub mod history;
pub mod protocol;
pub mod rest;
pub mod store;
pub mod subscription;
pub mod timegrid;
pub mod types;

pub use client::{FeedConfig, RiskFeedClient};
pub use connection::{ConnectionManager, ConnectionState, FeedEvent, RECONNECT_DELAY};
pub use errors::{
    ClientError, ClientResult, FeedError, FeedResult, RestError, RestResult,
};
pub use history::{
    downsample, merge_history, HistoryFetcher, HistoryKey, HistoryPoint, RawHistoryPoint,
    MAX_RENDER_POINTS,
};
pub use protocol::{
    ControlFrame, InboundFrame, LiveUpdate, OptionQuote, OptionType, Recommendation, Snapshot,
};
pub use rest::RestClient;
pub use store::{AlertEntry, RiskBand, RiskStore, ALERT_THRESHOLD, SAFE_THRESHOLD};
pub use subscription::{Subscription, SubscriptionManager};
pub use timegrid::{session_grid, GRID_POINTS};
pub use types::{ExpiryDate, Range, RequestId, Symbol};

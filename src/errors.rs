use thiserror::Error;

use crate::types::{RequestId, Symbol};

pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Errors raised on the push-connection path. Transport failures here are
/// recovered by the reconnect loop; they never clear store state.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type RestResult<T> = std::result::Result<T, RestError>;

/// Errors raised by the REST collaborator endpoints.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("http error: status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("stale history response for {symbol} (req {request_id} superseded)")]
    Stale {
        symbol: Symbol,
        request_id: RequestId,
    },
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Top level client errors. `Init` is the only fatal variant: the initial
/// health check or snapshot load failed before the live view existed, so the
/// caller gets an explicit retry decision instead of a silently empty store.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("initial load failed: {0}")]
    Init(#[source] RestError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Rest(#[from] RestError),
}

//! Client side of the remote event feed that seeds the Events table.

mod http;

pub use http::{FeedConfig, HttpEventFeed};

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::models::EventEntity;

/// Result alias for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

/// Failures raised while pulling events from the feed provider.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The HTTP client could not be built.
    #[error("failed to build event feed client")]
    ClientBuilder {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// A page request could not be sent or timed out.
    #[error("failed to request event feed page `{url}`")]
    Request {
        /// Page that was requested.
        url: String,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// The provider answered with a non-success status.
    #[error("event feed `{url}` answered with status {status}")]
    Status {
        /// Page that was requested.
        url: String,
        /// Status the provider answered with.
        status: reqwest::StatusCode,
    },
    /// The page body was not the expected JSON document.
    #[error("failed to decode event feed page `{url}`")]
    Decode {
        /// Page that was requested.
        url: String,
        /// Body decoding failure.
        #[source]
        source: reqwest::Error,
    },
    /// An event carried a start time that is not RFC 3339.
    #[error("event `{event_id}` has an invalid start time `{value}`")]
    InvalidStartTime {
        /// Event carrying the bad value.
        event_id: String,
        /// The start time as received.
        value: String,
        /// Parser failure.
        #[source]
        source: time::error::Parse,
    },
}

/// Source of event records, upcoming and historical.
pub trait EventFeed: Send + Sync {
    /// Current and upcoming events.
    fn upcoming_events(&self) -> BoxFuture<'static, FeedResult<Vec<EventEntity>>>;
    /// Historical events restricted to the trailing history window.
    fn past_events(&self) -> BoxFuture<'static, FeedResult<Vec<EventEntity>>>;
}

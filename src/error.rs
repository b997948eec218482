//! Error Taxonomy - Fetch, Cascade and News Failures
//!
//! Every outbound call classifies its failure as one of the `FetchError`
//! kinds. The cascade and news desk aggregate those into the coarser
//! outcomes the facade surfaces.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single outbound fetch or decode step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection refused, DNS failure, TLS error, reset...
    #[error("network failure: {0}")]
    Network(String),
    /// The request did not complete within its budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The server answered with a non-2xx status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    /// Malformed JSON/XML or a missing required field.
    #[error("decode failure: {0}")]
    Decode(String),
    /// Unparseable numeric string, non-positive price, bad date.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl FetchError {
    /// Short label used for metrics and log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Status(_) => "status",
            Self::Decode(_) => "decode",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Outcome of a provider cascade that produced no quote.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CascadeError {
    /// The cascade was built with an empty provider list.
    #[error("no price providers configured")]
    NoProviders,
    /// The requested symbol was blank after normalization.
    #[error("empty symbol")]
    EmptySymbol,
    /// Every provider in the chain failed for this symbol.
    #[error("all {attempts} price providers failed for {symbol}")]
    AllProvidersFailed {
        /// Normalized symbol that was requested.
        symbol: String,
        /// Number of providers attempted.
        attempts: usize,
        /// Failure reported by the last provider tried.
        last: FetchError,
    },
}

/// Outcome of a news refresh that produced no new batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NewsError {
    /// No feed sources are configured.
    #[error("no feed sources configured")]
    NoFeeds,
    /// Every configured feed failed to fetch.
    #[error("all {0} news feeds failed")]
    AllFeedsFailed(usize),
}

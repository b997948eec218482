//! Feed Fetcher Port - Raw Syndication Bytes

use async_trait::async_trait;

use crate::domain::FeedSource;
use crate::error::FetchError;

/// Downloads the raw body of a feed. Parsing happens in the news desk.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedFetcher: Send + Sync + 'static {
  /// Fetch the XML body of `source`. Non-2xx responses are errors.
  async fn fetch(&self, source: &FeedSource) -> Result<Vec<u8>, FetchError>;
}

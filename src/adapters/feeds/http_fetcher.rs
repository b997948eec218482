//! HTTP Feed Fetcher - Downloads Syndication Documents

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::adapters::http::HttpClient;
use crate::domain::FeedSource;
use crate::error::FetchError;
use crate::ports::FeedFetcher;

/// Fetches RSS bodies over the shared HTTP client.
pub struct HttpFeedFetcher {
    client: HttpClient,
}

impl HttpFeedFetcher {
    pub const fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    #[instrument(skip(self), fields(source = %source.source_name))]
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<u8>, FetchError> {
        let body = self.client.get_bytes(&source.url, &[]).await?;
        debug!(bytes = body.len(), "Feed downloaded");
        Ok(body)
    }
}

//! News article types, feed merging and pagination.
//!
//! Articles are keyed by their canonical URL. A batch is the merged output
//! of one refresh across every configured feed: sorted newest first with
//! duplicate URLs removed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A syndication feed to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Feed URL returning RSS XML.
    pub url: String,
    /// Display name attached to every article from this feed.
    pub source_name: String,
}

/// A normalized news article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Headline.
    pub title: String,
    /// Plain-text summary (markup stripped).
    pub description: Option<String>,
    /// Canonical link, unique within a batch.
    pub url: String,
    /// Lead image, if any strategy found one.
    pub image_url: Option<String>,
    /// Publication time.
    pub published_at: DateTime<Utc>,
    /// Name of the feed the article came from.
    pub source_name: String,
}

/// One page of the current article batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticlePage {
    /// 1-based page number actually served.
    pub page: usize,
    /// Requested page size.
    pub page_size: usize,
    /// Articles in the whole batch.
    pub total: usize,
    /// Articles on this page.
    pub articles: Vec<Article>,
    /// Whether a further page exists.
    pub has_more: bool,
}

/// Merge per-feed article lists into one batch.
///
/// Sorted descending by publish time (ties by URL so the order is stable
/// across refreshes). When the same canonical URL shows up more than once
/// the newest occurrence wins.
pub fn merge_batches(batches: Vec<Vec<Article>>) -> Vec<Article> {
    let mut all: Vec<Article> = batches.into_iter().flatten().collect();
    all.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.url.cmp(&b.url))
    });

    let mut seen = HashSet::with_capacity(all.len());
    all.retain(|article| seen.insert(article.url.clone()));
    all
}

/// Slice a batch into a 1-based page. Page 0 is served as page 1.
pub fn paginate(articles: &[Article], page: usize, page_size: usize) -> ArticlePage {
    let page = page.max(1);
    let total = articles.len();

    if page_size == 0 {
        return ArticlePage {
            page,
            page_size,
            total,
            articles: Vec::new(),
            has_more: false,
        };
    }

    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);

    ArticlePage {
        page,
        page_size,
        total,
        articles: articles[start..end].to_vec(),
        has_more: end < total,
    }
}

/// Case-insensitive title search. An empty query returns everything.
pub fn search<'a>(articles: &'a [Article], query: &str) -> Vec<&'a Article> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return articles.iter().collect();
    }
    articles
        .iter()
        .filter(|a| a.title.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn article(url: &str, ts: i64, source: &str) -> Article {
        Article {
            title: format!("title {url}"),
            description: None,
            url: url.to_string(),
            image_url: None,
            published_at: Utc.timestamp_opt(ts, 0).unwrap(),
            source_name: source.to_string(),
        }
    }

    #[test]
    fn test_merge_sorts_descending_across_feeds() {
        let a = vec![article("https://a/1", 100, "A"), article("https://a/2", 300, "A")];
        let b = vec![article("https://b/1", 200, "B"), article("https://b/2", 400, "B")];

        let merged = merge_batches(vec![a, b]);
        let urls: Vec<&str> = merged.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, ["https://b/2", "https://a/2", "https://b/1", "https://a/1"]);
    }

    #[test]
    fn test_merge_drops_duplicate_urls_keeping_newest() {
        let a = vec![article("https://x/story", 100, "A")];
        let b = vec![article("https://x/story", 500, "B")];

        let merged = merge_batches(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_name, "B");
    }

    #[test]
    fn test_paginate_pages_and_has_more() {
        let batch: Vec<Article> = (0..7)
            .map(|i| article(&format!("https://n/{i}"), 1000 - i, "N"))
            .collect();

        let p1 = paginate(&batch, 1, 3);
        assert_eq!(p1.articles.len(), 3);
        assert!(p1.has_more);
        assert_eq!(p1.total, 7);

        let p3 = paginate(&batch, 3, 3);
        assert_eq!(p3.articles.len(), 1);
        assert!(!p3.has_more);

        let p9 = paginate(&batch, 9, 3);
        assert!(p9.articles.is_empty());
        assert!(!p9.has_more);
    }

    #[test]
    fn test_paginate_page_zero_and_size_zero() {
        let batch = vec![article("https://n/0", 1, "N")];
        assert_eq!(paginate(&batch, 0, 5).page, 1);
        assert_eq!(paginate(&batch, 0, 5).articles.len(), 1);
        assert!(paginate(&batch, 1, 0).articles.is_empty());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut a = article("https://n/0", 1, "N");
        a.title = "Bitcoin hits new high".to_string();
        let b = article("https://n/1", 2, "N");
        let batch = vec![a, b];

        let hits = search(&batch, "BITCOIN");
        assert_eq!(hits.len(), 1);
        assert_eq!(search(&batch, "  ").len(), 2);
    }
}

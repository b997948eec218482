//! Shared HTTP Plumbing
//!
//! One pooled `reqwest` client reused by every provider and feed fetcher,
//! with a per-client concurrency cap and optional outbound rate limit.

pub mod client;

pub use client::{HttpClient, HttpClientConfig};

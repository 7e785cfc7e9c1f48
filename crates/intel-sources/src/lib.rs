//! Market data providers for intel-rs
//!
//! This crate supplies the evidence-gathering side of the pipeline:
//!
//! - A [`DataProvider`] trait for pluggable data sources
//! - Concrete providers: web search (Tavily), news feed (NewsData.io),
//!   and web scraping (Firecrawl)
//! - A [`DataSourceAggregator`] that fans out to all enabled providers
//!   concurrently, tolerating partial failure
//! - A TTL response cache shared by providers

pub mod aggregator;
pub mod cache;
pub mod error;
pub mod provider;
pub mod providers;

pub use aggregator::DataSourceAggregator;
pub use cache::ResponseCache;
pub use error::ProviderError;
pub use provider::DataProvider;
pub use providers::{NewsFeedProvider, WebScrapeProvider, WebSearchProvider};

//! Concrete provider implementations

pub mod news;
pub mod search;
pub mod web;

pub use news::NewsFeedProvider;
pub use search::WebSearchProvider;
pub use web::WebScrapeProvider;

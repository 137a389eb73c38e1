//! Remote document-library access.
//!
//! This crate provides:
//! - `RemoteTree` trait for paginated folder listing and downloads
//! - `GraphClient`, the Microsoft Graph drive implementation
//! - `TreeCrawler`, which flattens a folder tree into tagged file descriptors
//! - `RetryingFetcher` with bounded retries and an optional local `ContentStore`
//! - `CrawlSummary` for a per-level/per-category overview of a crawl

pub mod category;
pub mod client;
pub mod crawler;
pub mod error;
pub mod fetcher;
pub mod store;
pub mod summary;

pub use category::CategoryRules;
pub use client::{AccessToken, ChildPage, DriveInfo, GraphClient, RemoteEntry, RemoteTree};
pub use crawler::{CrawlDiagnostic, CrawlOptions, CrawlOutcome, TreeCrawler};
pub use error::DriveError;
pub use fetcher::{RetryPolicy, RetryingFetcher};
pub use store::ContentStore;
pub use summary::CrawlSummary;

//! Finds product links in chat messages, scrapes the linked pages into
//! structured products, and keeps enough provenance (raw markup, product and
//! the message that carried it) to rebuild a test fixture when a delivered
//! product is reported as wrong.

pub mod bot;
pub mod config;
pub mod discord;
pub mod error;
pub mod links;
pub mod models;
pub mod numbers;
pub mod pipeline;
pub mod product_fetcher;
pub mod report;
pub mod scraper;
pub mod storage;
pub mod traits;

pub use error::{CorrelationError, ExtractError, FetchError, PipelineError, RepositoryError, StepError};
pub use models::{ArchiveRecord, DeliveryRecord, Product};
pub use product_fetcher::ProductFetcher;

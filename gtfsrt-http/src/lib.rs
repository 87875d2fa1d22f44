//! HTTP fetching for GTFS-RT feeds.

pub mod client;
pub mod errors;
pub mod fetcher;

pub use client::build_client;
pub use errors::FetchError;
pub use fetcher::{fetch_feed, FetchOutcome};

//! Content extraction for lead intake.
//!
//! This crate provides:
//! - [`fetch`]: the crawl capability ([`PageFetcher`], [`HttpFetcher`]) and URL validation
//! - [`emails`]: address scanning and normalization
//! - [`signals`]: best-effort name/profile signals from a page
//! - [`ContentExtractor`]: URL in, [`ExtractionResult`] out

pub mod emails;
mod extractor;
pub mod fetch;
pub mod signals;

pub use extractor::{ContentExtractor, ExtractionResult};
pub use fetch::{FetchedPage, HttpFetcher, PageFetcher, validate_url};

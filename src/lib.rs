//! Core engine for a job-scoped, breadth-first web crawler.
//!
//! See `SPEC_FULL.md` at the repository root for the module map. The crate
//! is organized leaf-first: canonicalizer and scope predicate have no
//! dependents within the crate, the frontier and rate limiter sit above
//! them, the robots advisor and store are independent services, and the
//! orchestrator wires all of them together behind a worker pool.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod models;
pub mod orchestrator;
pub mod ratelimit;
pub mod robots;
pub mod scope;
pub mod store;
pub mod url_canon;

pub use error::CrawlError;

//! Crate-wide error aggregation.
//!
//! Each module defines its own narrow error enum (`FrontierError`,
//! `RobotsError`, `StoreError`, ...). `CrawlError` wraps them at the
//! orchestrator boundary, which is the only place spec.md's propagation
//! policy (§7) requires a single unified error type.

use crate::frontier::FrontierError;
use crate::orchestrator::OrchestratorError;
use crate::robots::RobotsError;
use crate::scope::ScopeError;
use crate::store::StoreError;
use crate::url_canon::CanonicalizeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Canonicalize(#[from] CanonicalizeError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Frontier(#[from] FrontierError),

    #[error(transparent)]
    Robots(#[from] RobotsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("failed to create the browser/extraction context: {0}")]
    ContextInit(String),

    #[error("orchestrator panicked on an unrecoverable error: {0}")]
    Fatal(String),
}

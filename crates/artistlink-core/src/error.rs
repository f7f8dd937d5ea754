//! Core error types for artistlink-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the record and graph model.

use thiserror::Error;

use crate::id::ArtistId;

/// Core errors produced by the artistlink-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two records with different ids were passed to the merge policy.
    #[error("cannot merge records with different ids: '{left}' vs '{right}'")]
    IdMismatch { left: ArtistId, right: ArtistId },

    /// A node was not present in the visualization graph.
    #[error("node not found: '{id}'")]
    NodeNotFound { id: ArtistId },

    /// The full and delta graphs disagree.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },
}

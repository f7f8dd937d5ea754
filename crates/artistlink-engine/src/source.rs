//! The external collaboration source.

use async_trait::async_trait;

use artistlink_core::{ArtistId, EntityRecord, StubEntity};

use crate::error::UpstreamError;

/// Where collaborator sets and artist metadata come from.
///
/// Implementations are responsible for their own rate limiting; the HTTP
/// implementation routes every request through a shared [`crate::Throttle`].
#[async_trait]
pub trait CollaborationSource: Send + Sync {
    /// Every artist credited alongside `id`, in discovery order. May contain
    /// duplicates.
    async fn fetch_collaborators(&self, id: &ArtistId) -> Result<Vec<StubEntity>, UpstreamError>;

    /// Full metadata for `ids`. Callers keep each call within the source's
    /// batch limit. Unknown ids are omitted from the result.
    async fn fetch_details(&self, ids: &[ArtistId]) -> Result<Vec<EntityRecord>, UpstreamError>;
}

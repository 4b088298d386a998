//! Storage trait for the project-scoped evidence cache.
//!
//! One store serves one project. Pages and extractions are append-only
//! caches shared by every session of the project; search sessions are
//! written once, when the run completes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    extraction::ExtractionRecord,
    page::{PageInput, PageRecord, SavedPage},
    session::{FinalizeSearchInput, SearchSession, SessionHandle},
};

/// Project-scoped cache of pages, extractions and finished sessions.
///
/// Lookups return `Ok(None)` for anything missing or unreadable. An `Err`
/// from a lookup means the backend itself failed; callers treat that as
/// a miss too.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Deterministic id of the project this store serves.
    fn project_id(&self) -> &str;

    /// Start a session for a top-level query.
    async fn create_search_session(&self, query: &str) -> Result<SessionHandle>;

    /// Latest stored page for a URL (compared in normalized form).
    async fn find_cached_page_by_url(&self, url: &str) -> Result<Option<PageRecord>>;

    /// Stored extraction for a page and normalized query.
    async fn find_cached_extraction_by_page_and_query(
        &self,
        page_id: &str,
        query: &str,
    ) -> Result<Option<ExtractionRecord>>;

    /// Store a fetched page.
    async fn save_page(&self, input: PageInput) -> Result<SavedPage>;

    /// Store (replace) the extraction for a page.
    async fn save_extraction(&self, record: ExtractionRecord) -> Result<()>;

    /// Persist a completed session with its references.
    async fn finalize_search(&self, input: FinalizeSearchInput) -> Result<()>;

    /// Load a persisted session.
    async fn load_search_session(&self, search_id: &str) -> Result<Option<SearchSession>>;
}

#[async_trait]
impl<T: EvidenceStore + ?Sized> EvidenceStore for std::sync::Arc<T> {
    fn project_id(&self) -> &str {
        (**self).project_id()
    }

    async fn create_search_session(&self, query: &str) -> Result<SessionHandle> {
        (**self).create_search_session(query).await
    }

    async fn find_cached_page_by_url(&self, url: &str) -> Result<Option<PageRecord>> {
        (**self).find_cached_page_by_url(url).await
    }

    async fn find_cached_extraction_by_page_and_query(
        &self,
        page_id: &str,
        query: &str,
    ) -> Result<Option<ExtractionRecord>> {
        (**self)
            .find_cached_extraction_by_page_and_query(page_id, query)
            .await
    }

    async fn save_page(&self, input: PageInput) -> Result<SavedPage> {
        (**self).save_page(input).await
    }

    async fn save_extraction(&self, record: ExtractionRecord) -> Result<()> {
        (**self).save_extraction(record).await
    }

    async fn finalize_search(&self, input: FinalizeSearchInput) -> Result<()> {
        (**self).finalize_search(input).await
    }

    async fn load_search_session(&self, search_id: &str) -> Result<Option<SearchSession>> {
        (**self).load_search_session(search_id).await
    }
}

/// Fresh session id.
///
/// Time-ordered (UUIDv7) so session files sort by creation.
pub fn new_search_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Derive a project id from a storage location: first 16 hex chars of
/// SHA-256 over the path string.
pub fn project_id_for(path: &str) -> String {
    use sha2::{Digest, Sha256};
    let hex = format!("{:x}", Sha256::digest(path.as_bytes()));
    hex[..16].to_string()
}

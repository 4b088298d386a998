//! In-memory evidence store for testing and development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::Result;
use crate::traits::store::{new_search_id, project_id_for, EvidenceStore};
use crate::types::{
    extraction::ExtractionRecord,
    normalize::{normalize_text, normalize_url},
    page::{PageInput, PageRecord, SavedPage},
    session::{FinalizeSearchInput, SearchSession, SessionHandle},
};

/// In-memory storage for pages, extractions and sessions.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    project_id: String,
    pages: RwLock<HashMap<String, PageRecord>>,
    extractions: RwLock<HashMap<String, ExtractionRecord>>,
    sessions: RwLock<HashMap<String, SearchSession>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store for an anonymous project.
    pub fn new() -> Self {
        Self::for_project_path("memory")
    }

    /// Create a store whose project id derives from `path`.
    pub fn for_project_path(path: &str) -> Self {
        Self {
            project_id: project_id_for(path),
            pages: RwLock::new(HashMap::new()),
            extractions: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of stored pages.
    pub fn page_count(&self) -> usize {
        self.pages.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Get the number of stored extractions.
    pub fn extraction_count(&self) -> usize {
        self.extractions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Insert a page record directly, bypassing `save_page`.
    pub fn insert_page(&self, record: PageRecord) {
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.page_id.clone(), record);
    }
}

#[async_trait]
impl EvidenceStore for MemoryStore {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn create_search_session(&self, _query: &str) -> Result<SessionHandle> {
        Ok(SessionHandle {
            search_id: new_search_id(),
            created_at: Utc::now(),
        })
    }

    async fn find_cached_page_by_url(&self, url: &str) -> Result<Option<PageRecord>> {
        let wanted = normalize_url(url);
        Ok(self
            .pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|p| normalize_url(&p.url) == wanted && !p.markdown.is_empty())
            .max_by_key(|p| p.fetched_at)
            .cloned())
    }

    async fn find_cached_extraction_by_page_and_query(
        &self,
        page_id: &str,
        query: &str,
    ) -> Result<Option<ExtractionRecord>> {
        let query = normalize_text(query);
        Ok(self
            .extractions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(page_id)
            .filter(|r| r.query == query)
            .cloned())
    }

    async fn save_page(&self, input: PageInput) -> Result<SavedPage> {
        let record = input.into_record(Utc::now());
        let saved = SavedPage {
            page_id: record.page_id.clone(),
            line_count: record.line_count,
        };
        self.insert_page(record);
        Ok(saved)
    }

    async fn save_extraction(&self, record: ExtractionRecord) -> Result<()> {
        // One current record per page; a new query replaces the old one.
        self.extractions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.page_id.clone(), record);
        Ok(())
    }

    async fn finalize_search(&self, input: FinalizeSearchInput) -> Result<()> {
        let session = SearchSession {
            search_id: input.search_id.clone(),
            project_id: self.project_id.clone(),
            query: input.query,
            created_at: input.created_at,
            completed_at: Some(Utc::now()),
            prompt: input.prompt,
            conclusion: input.conclusion,
            references: input.references,
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(input.search_id, session);
        Ok(())
    }

    async fn load_search_session(&self, search_id: &str) -> Result<Option<SearchSession>> {
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(search_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::extraction::AgentExtraction;
    use chrono::Duration;

    #[tokio::test]
    async fn test_page_round_trip() {
        let store = MemoryStore::new();
        let saved = store
            .save_page(PageInput::new("https://x", "a\nb\nc"))
            .await
            .unwrap();
        assert_eq!(saved.line_count, 3);

        let page = store.find_cached_page_by_url("https://x").await.unwrap().unwrap();
        assert_eq!(page.markdown, "a\nb\nc");
        assert_eq!(page.line_count, 3);
    }

    #[tokio::test]
    async fn test_latest_fetch_wins() {
        let store = MemoryStore::new();
        let old = PageInput::new("https://x/doc", "old").into_record(Utc::now() - Duration::hours(1));
        let new = PageInput::new("https://x/doc/", "new").into_record(Utc::now());
        store.insert_page(new);
        store.insert_page(old);

        let page = store.find_cached_page_by_url("https://X/doc").await.unwrap().unwrap();
        assert_eq!(page.markdown, "new");
    }

    #[tokio::test]
    async fn test_extraction_keyed_by_normalized_query() {
        let store = MemoryStore::new();
        let record = ExtractionRecord::from_agent(
            "page-1",
            "Rust  Async",
            AgentExtraction {
                viewpoint: "v".into(),
                ..Default::default()
            },
        );
        store.save_extraction(record).await.unwrap();

        assert!(store
            .find_cached_extraction_by_page_and_query("page-1", " rust async ")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_cached_extraction_by_page_and_query("page-1", "rust")
            .await
            .unwrap()
            .is_none());
    }
}

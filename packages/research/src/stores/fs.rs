//! File-based evidence store.
//!
//! Layout under the project directory:
//!
//! ```text
//! pages/<pageId>/content.md          raw page text
//! pages/<pageId>/meta.json           PageMeta
//! pages/<pageId>.extraction.json     latest ExtractionRecord for the page
//! searches/<searchId>.json           finished SearchSession
//! ```
//!
//! Every read goes through a `parse_*` function that returns `None` on any
//! shape mismatch. Missing and corrupt files are cache misses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ResearchError, Result};
use crate::traits::store::{new_search_id, project_id_for, EvidenceStore};
use crate::types::{
    extraction::ExtractionRecord,
    normalize::{normalize_text, normalize_url},
    page::{line_count, PageInput, PageRecord, SavedPage},
    session::{FinalizeSearchInput, SearchSession, SessionHandle},
};

const PAGES_DIR: &str = "pages";
const SEARCHES_DIR: &str = "searches";
const CONTENT_FILE: &str = "content.md";
const META_FILE: &str = "meta.json";
const EXTRACTION_SUFFIX: &str = ".extraction.json";

/// Page metadata stored next to the markdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page_id: String,
    pub project_id: String,
    pub search_id: String,
    pub query: String,
    pub url: String,
    pub normalized_url: String,
    pub title: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub line_count: usize,
}

/// Evidence store persisted as plain files under one project directory.
pub struct FileStore {
    root: PathBuf,
    project_id: String,
}

impl FileStore {
    /// Open (creating if needed) the store rooted at `root`.
    ///
    /// The project id is derived from the canonical form of `root`, so the
    /// same directory always maps to the same project.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        for dir in [PAGES_DIR, SEARCHES_DIR] {
            tokio::fs::create_dir_all(root.join(dir))
                .await
                .map_err(ResearchError::storage)?;
        }
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(ResearchError::storage)?;
        let project_id = project_id_for(&root.to_string_lossy());

        debug!(root = %root.display(), project_id = %project_id, "Opened file store");
        Ok(Self { root, project_id })
    }

    /// Directory the store lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn page_dir(&self, page_id: &str) -> PathBuf {
        self.root.join(PAGES_DIR).join(page_id)
    }

    fn extraction_path(&self, page_id: &str) -> PathBuf {
        self.root
            .join(PAGES_DIR)
            .join(format!("{page_id}{EXTRACTION_SUFFIX}"))
    }

    fn session_path(&self, search_id: &str) -> PathBuf {
        self.root.join(SEARCHES_DIR).join(format!("{search_id}.json"))
    }

    /// All page metadata that parses and belongs to this project.
    async fn page_metas(&self) -> Vec<PageMeta> {
        let mut metas = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(self.root.join(PAGES_DIR)).await else {
            return metas;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let dir_name = entry.file_name().to_string_lossy().to_string();
            if dir_name.ends_with(EXTRACTION_SUFFIX) {
                continue;
            }
            let Some(raw) = read_optional(&entry.path().join(META_FILE)).await else {
                continue;
            };
            match parse_page_meta(&raw, &dir_name) {
                Some(meta) if meta.project_id == self.project_id => metas.push(meta),
                Some(_) => {}
                None => debug!(page_id = %dir_name, "Skipping unreadable page metadata"),
            }
        }
        metas
    }
}

/// Read a file, treating any I/O failure as absence.
async fn read_optional(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache read failed, treating as miss");
            None
        }
    }
}

/// Write through a temporary sibling so readers never see half a file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(ResearchError::storage)?;
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(ResearchError::storage)?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(ResearchError::storage)
}

/// Ids become path components; only accept plain tokens.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse page metadata stored under `dir_name`.
pub fn parse_page_meta(raw: &[u8], dir_name: &str) -> Option<PageMeta> {
    let meta: PageMeta = serde_json::from_slice(raw).ok()?;
    (meta.page_id == dir_name && !meta.url.is_empty()).then_some(meta)
}

/// Parse an extraction record stored for `page_id`.
pub fn parse_extraction(raw: &[u8], page_id: &str) -> Option<ExtractionRecord> {
    let record: ExtractionRecord = serde_json::from_slice(raw).ok()?;
    if record.page_id != page_id {
        return None;
    }
    let ranges_ok = record
        .selections
        .iter()
        .all(|s| s.start >= 1 && s.end >= s.start);
    ranges_ok.then_some(record)
}

/// Parse a session stored for `search_id` in `project_id`.
pub fn parse_session(raw: &[u8], search_id: &str, project_id: &str) -> Option<SearchSession> {
    let session: SearchSession = serde_json::from_slice(raw).ok()?;
    (session.search_id == search_id && session.project_id == project_id).then_some(session)
}

#[async_trait]
impl EvidenceStore for FileStore {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn create_search_session(&self, query: &str) -> Result<SessionHandle> {
        let handle = SessionHandle {
            search_id: new_search_id(),
            created_at: Utc::now(),
        };
        debug!(search_id = %handle.search_id, query = %query, "Created search session");
        Ok(handle)
    }

    async fn find_cached_page_by_url(&self, url: &str) -> Result<Option<PageRecord>> {
        let wanted = normalize_url(url);
        let Some(meta) = self
            .page_metas()
            .await
            .into_iter()
            .filter(|m| m.normalized_url == wanted)
            .max_by_key(|m| m.fetched_at)
        else {
            return Ok(None);
        };

        let content_path = self.page_dir(&meta.page_id).join(CONTENT_FILE);
        let Some(markdown) = read_optional(&content_path)
            .await
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .filter(|text| !text.is_empty())
        else {
            debug!(url = %url, page_id = %meta.page_id, "Cached page has no content");
            return Ok(None);
        };

        Ok(Some(PageRecord {
            page_id: meta.page_id,
            search_id: meta.search_id,
            query: meta.query,
            url: meta.url,
            title: meta.title,
            fetched_at: meta.fetched_at,
            line_count: line_count(&markdown),
            markdown,
        }))
    }

    async fn find_cached_extraction_by_page_and_query(
        &self,
        page_id: &str,
        query: &str,
    ) -> Result<Option<ExtractionRecord>> {
        if !is_safe_id(page_id) {
            return Ok(None);
        }
        let query = normalize_text(query);
        let Some(raw) = read_optional(&self.extraction_path(page_id)).await else {
            return Ok(None);
        };
        match parse_extraction(&raw, page_id) {
            Some(record) if record.query == query => Ok(Some(record)),
            Some(_) => Ok(None),
            None => {
                debug!(page_id = %page_id, "Malformed extraction file, treating as miss");
                Ok(None)
            }
        }
    }

    async fn save_page(&self, input: PageInput) -> Result<SavedPage> {
        let record = input.into_record(Utc::now());
        let dir = self.page_dir(&record.page_id);

        let meta = PageMeta {
            page_id: record.page_id.clone(),
            project_id: self.project_id.clone(),
            search_id: record.search_id.clone(),
            query: record.query.clone(),
            normalized_url: normalize_url(&record.url),
            url: record.url.clone(),
            title: record.title.clone(),
            fetched_at: record.fetched_at,
            line_count: record.line_count,
        };

        write_atomic(&dir.join(CONTENT_FILE), record.markdown.as_bytes()).await?;
        write_atomic(&dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?).await?;

        debug!(url = %record.url, page_id = %record.page_id, lines = record.line_count, "Saved page");
        Ok(SavedPage {
            page_id: record.page_id,
            line_count: record.line_count,
        })
    }

    async fn save_extraction(&self, record: ExtractionRecord) -> Result<()> {
        if !is_safe_id(&record.page_id) {
            return Err(ResearchError::Config(format!(
                "invalid page id: {}",
                record.page_id
            )));
        }
        let bytes = serde_json::to_vec_pretty(&record)?;
        write_atomic(&self.extraction_path(&record.page_id), &bytes).await
    }

    async fn finalize_search(&self, input: FinalizeSearchInput) -> Result<()> {
        if !is_safe_id(&input.search_id) {
            return Err(ResearchError::Config(format!(
                "invalid search id: {}",
                input.search_id
            )));
        }
        let session = SearchSession {
            search_id: input.search_id,
            project_id: self.project_id.clone(),
            query: input.query,
            created_at: input.created_at,
            completed_at: Some(Utc::now()),
            prompt: input.prompt,
            conclusion: input.conclusion,
            references: input.references,
        };
        let bytes = serde_json::to_vec_pretty(&session)?;
        write_atomic(&self.session_path(&session.search_id), &bytes).await?;

        debug!(
            search_id = %session.search_id,
            references = session.references.len(),
            "Persisted search session"
        );
        Ok(())
    }

    async fn load_search_session(&self, search_id: &str) -> Result<Option<SearchSession>> {
        if !is_safe_id(search_id) {
            return Ok(None);
        }
        let Some(raw) = read_optional(&self.session_path(search_id)).await else {
            return Ok(None);
        };
        Ok(parse_session(&raw, search_id, &self.project_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::extraction::AgentExtraction;
    use crate::types::reference::Reference;
    use crate::types::selection::LineSelection;

    async fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_page_round_trip() {
        let (_dir, store) = store().await;
        let saved = store
            .save_page(PageInput::new("https://x", "a\nb\nc"))
            .await
            .unwrap();
        assert_eq!(saved.line_count, 3);

        let page = store.find_cached_page_by_url("https://x").await.unwrap().unwrap();
        assert_eq!(page.markdown, "a\nb\nc");
        assert_eq!(page.line_count, 3);
        assert_eq!(page.page_id, saved.page_id);
    }

    #[tokio::test]
    async fn test_project_id_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileStore::open(dir.path()).await.unwrap();
        let b = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(a.project_id(), b.project_id());
        assert_eq!(a.project_id().len(), 16);
    }

    #[tokio::test]
    async fn test_missing_content_is_a_miss() {
        let (_dir, store) = store().await;
        let saved = store
            .save_page(PageInput::new("https://x/a", "body"))
            .await
            .unwrap();
        tokio::fs::remove_file(store.page_dir(&saved.page_id).join(CONTENT_FILE))
            .await
            .unwrap();

        assert!(store.find_cached_page_by_url("https://x/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_extraction_is_a_miss() {
        let (_dir, store) = store().await;
        let saved = store
            .save_page(PageInput::new("https://x/a", "body"))
            .await
            .unwrap();
        tokio::fs::write(store.extraction_path(&saved.page_id), b"{ not json")
            .await
            .unwrap();

        let found = store
            .find_cached_extraction_by_page_and_query(&saved.page_id, "q")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_extraction_round_trip_matches_normalized_query() {
        let (_dir, store) = store().await;
        let extraction = AgentExtraction {
            viewpoint: "Tokio is a runtime".into(),
            selections: vec![LineSelection::new(1, 1, "body")],
            ..Default::default()
        };
        store
            .save_extraction(ExtractionRecord::from_agent("abc123", "What  is Tokio", extraction))
            .await
            .unwrap();

        let hit = store
            .find_cached_extraction_by_page_and_query("abc123", "what is tokio")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.viewpoint, "Tokio is a runtime");
        assert!(store
            .find_cached_extraction_by_page_and_query("abc123", "something else")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (_dir, store) = store().await;
        let handle = store.create_search_session("q").await.unwrap();
        let reference = Reference {
            ref_id: 1,
            uri: format!("evidence://{}/{}/1", store.project_id(), handle.search_id),
            page_id: "p".into(),
            url: "https://a".into(),
            title: None,
            viewpoint: "v".into(),
            start_line: 3,
            end_line: 5,
            text: "c\nd\ne".into(),
        };
        store
            .finalize_search(FinalizeSearchInput {
                search_id: handle.search_id.clone(),
                query: "q".into(),
                created_at: handle.created_at,
                prompt: None,
                conclusion: Some("done".into()),
                references: vec![reference.clone()],
            })
            .await
            .unwrap();

        let session = store
            .load_search_session(&handle.search_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.reference(1), Some(&reference));
        assert!(session.completed_at.is_some());
        assert!(store.load_search_session("../etc").await.unwrap().is_none());
    }

    #[test]
    fn test_parse_page_meta_checks_directory() {
        let meta = PageMeta {
            page_id: "abc".into(),
            project_id: "p".into(),
            search_id: "s".into(),
            query: "q".into(),
            url: "https://a".into(),
            normalized_url: "https://a/".into(),
            title: None,
            fetched_at: Utc::now(),
            line_count: 1,
        };
        let raw = serde_json::to_vec(&meta).unwrap();
        assert!(parse_page_meta(&raw, "abc").is_some());
        assert!(parse_page_meta(&raw, "other").is_none());
        assert!(parse_page_meta(b"[]", "abc").is_none());
    }
}

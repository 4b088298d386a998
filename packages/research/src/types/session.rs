//! Search sessions - one per top-level query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::reference::Reference;

/// A research session, persisted once complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    pub search_id: String,
    pub project_id: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Prompt handed to the answer generator, if the caller recorded one
    #[serde(default)]
    pub prompt: Option<String>,

    /// Generated answer, if the caller recorded one
    #[serde(default)]
    pub conclusion: Option<String>,

    #[serde(default)]
    pub references: Vec<Reference>,
}

impl SearchSession {
    /// Look up a reference by id.
    pub fn reference(&self, ref_id: usize) -> Option<&Reference> {
        self.references.iter().find(|r| r.ref_id == ref_id)
    }
}

/// Handle returned when a session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub search_id: String,
    pub created_at: DateTime<Utc>,
}

/// Input for `EvidenceStore::finalize_search`.
#[derive(Debug, Clone)]
pub struct FinalizeSearchInput {
    pub search_id: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub prompt: Option<String>,
    pub conclusion: Option<String>,
    pub references: Vec<Reference>,
}

//! Citable references and their stable URIs.

use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};

const URI_SCHEME: &str = "evidence://";

/// A citable unit built from validated evidence. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Sequential, 1-based
    pub ref_id: usize,
    pub uri: String,
    pub page_id: String,
    pub url: String,
    pub title: Option<String>,
    pub viewpoint: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// Parsed form of a reference URI: `evidence://<project>/<search>/<ref>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceUri {
    pub project_id: String,
    pub search_id: String,
    pub ref_id: usize,
}

impl ReferenceUri {
    /// Create a URI value.
    pub fn new(project_id: impl Into<String>, search_id: impl Into<String>, ref_id: usize) -> Self {
        Self {
            project_id: project_id.into(),
            search_id: search_id.into(),
            ref_id,
        }
    }

    /// Parse a URI string.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || ResearchError::InvalidReferenceUri {
            uri: uri.to_string(),
        };

        let rest = uri.trim().strip_prefix(URI_SCHEME).ok_or_else(invalid)?;
        let mut parts = rest.split('/');
        let (Some(project), Some(search), Some(ref_part), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if project.is_empty() || search.is_empty() {
            return Err(invalid());
        }
        let ref_id: usize = ref_part.parse().map_err(|_| invalid())?;
        if ref_id == 0 {
            return Err(invalid());
        }

        Ok(Self::new(project, search, ref_id))
    }
}

impl std::fmt::Display for ReferenceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}/{}/{}",
            URI_SCHEME, self.project_id, self.search_id, self.ref_id
        )
    }
}

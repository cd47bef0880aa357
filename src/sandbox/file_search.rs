//! `file_search`: the boolean query engine applied across the corpus

use super::walk::compile_glob;
use super::{read_text, Sandbox, SandboxError};
use crate::search::{self, Match, QueryMatcher};

pub const DEFAULT_MAX_RESULTS: usize = 50;
pub const DEFAULT_CONTEXT_LINES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub glob: Option<String>,
    pub max_results: usize,
    pub context_lines: usize,
    pub case_sensitive: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            glob: None,
            max_results: DEFAULT_MAX_RESULTS,
            context_lines: DEFAULT_CONTEXT_LINES,
            case_sensitive: false,
        }
    }
}

impl Sandbox {
    /// Matches ordered by path then line, truncated to `max_results`.
    ///
    /// Documents are visited in sorted order and the scan stops as soon as the
    /// limit is reached, so truncation is deterministic.
    pub fn file_search(&self, request: &SearchRequest) -> Result<Vec<Match>, SandboxError> {
        let query = search::parse(&request.query)?;
        let matcher = QueryMatcher::compile(&query, request.case_sensitive)
            .map_err(|e| SandboxError::Pattern(e.to_string()))?;
        let glob = compile_glob(request.glob.as_deref().unwrap_or(&self.default_glob))?;

        let mut matches = Vec::new();
        for doc in self.documents(&self.root) {
            let remaining = request.max_results.saturating_sub(matches.len());
            if remaining == 0 {
                break;
            }
            if !glob.is_match(&doc.relative) {
                continue;
            }
            let text = match read_text(&doc.canonical, &doc.relative) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(path = %doc.relative, error = %e, "Skipping unreadable document");
                    continue;
                }
            };
            matches.extend(matcher.search_text(
                &doc.relative,
                &text,
                request.context_lines,
                remaining,
            ));
        }

        tracing::debug!(query = %query, matches = matches.len(), "file_search finished");
        Ok(matches)
    }
}

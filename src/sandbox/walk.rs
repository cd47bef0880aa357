//! Corpus enumeration and `list_paths`

use super::{normalize_lexically, Sandbox, SandboxError};
use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A document reachable inside the root.
#[derive(Debug, Clone)]
pub(super) struct Document {
    /// Root-relative path as shown to the model
    pub relative: String,
    pub canonical: PathBuf,
}

/// `*` crosses directory separators, so `*.md` matches at any depth.
pub(super) fn compile_glob(pattern: &str) -> Result<GlobMatcher, SandboxError> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| SandboxError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

impl Sandbox {
    /// List allowed documents in lexicographic order.
    ///
    /// A `prefix` naming a directory lists that subtree; any other prefix is
    /// matched as a plain string prefix of the relative path.
    pub fn list_paths(
        &self,
        prefix: Option<&str>,
        glob: Option<&str>,
    ) -> Result<Vec<String>, SandboxError> {
        let glob = glob.map(compile_glob).transpose()?;

        let mut base = self.root.clone();
        let mut string_prefix = None;
        if let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
            let normalized = normalize_lexically(prefix).ok_or_else(|| SandboxError::Violation {
                path: prefix.to_string(),
            })?;
            if self.root.join(&normalized).is_dir() {
                base = self.resolve(prefix)?;
            } else {
                string_prefix = self.relative(&self.root.join(&normalized));
            }
        }

        let paths = self
            .documents(&base)
            .into_iter()
            .map(|doc| doc.relative)
            .filter(|rel| string_prefix.as_ref().is_none_or(|p| rel.starts_with(p.as_str())))
            .filter(|rel| glob.as_ref().is_none_or(|g| g.is_match(rel)))
            .collect();
        Ok(paths)
    }

    /// Every allowed regular file under `base`, sorted by relative path.
    ///
    /// Documents reachable under several names are reported once, under the
    /// lexicographically first name.
    pub(super) fn documents(&self, base: &Path) -> Vec<Document> {
        let mut found = Vec::new();

        for entry in WalkBuilder::new(base)
            .standard_filters(false)
            .follow_links(false)
            .build()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable corpus entry");
                    continue;
                }
            };
            if entry.depth() == 0 || !self.is_allowed(entry.path()) {
                continue;
            }
            let Ok(canonical) = entry.path().canonicalize() else {
                continue;
            };
            if !canonical.starts_with(&self.root) || !canonical.is_file() {
                continue;
            }
            if let Some(relative) = self.relative(entry.path()) {
                found.push(Document {
                    relative,
                    canonical,
                });
            }
        }

        found.sort_by(|a, b| a.relative.cmp(&b.relative));
        let mut seen = HashSet::new();
        found.retain(|doc| seen.insert(doc.canonical.clone()));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::corpus;
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_lists_allowed_documents_sorted() {
        let (_dir, sandbox) = corpus();
        let paths = sandbox.list_paths(None, None).unwrap();
        assert_eq!(
            paths,
            vec![
                "gesetze/bgb/543.md",
                "gesetze/bgb/573.md",
                "urteile/2023/viii_zr_1.txt",
            ]
        );
    }

    #[test]
    fn test_directory_prefix() {
        let (_dir, sandbox) = corpus();
        let paths = sandbox.list_paths(Some("urteile"), None).unwrap();
        assert_eq!(paths, vec!["urteile/2023/viii_zr_1.txt"]);
    }

    #[test]
    fn test_string_prefix() {
        let (_dir, sandbox) = corpus();
        let paths = sandbox.list_paths(Some("gesetze/bgb/57"), None).unwrap();
        assert_eq!(paths, vec!["gesetze/bgb/573.md"]);
    }

    #[test]
    fn test_glob_filter() {
        let (_dir, sandbox) = corpus();
        let paths = sandbox.list_paths(None, Some("*.txt")).unwrap();
        assert_eq!(paths, vec!["urteile/2023/viii_zr_1.txt"]);
    }

    #[test]
    fn test_prefix_escape_rejected() {
        let (_dir, sandbox) = corpus();
        let err = sandbox.list_paths(Some("../"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);
    }

    #[test]
    fn test_invalid_glob() {
        let (_dir, sandbox) = corpus();
        let err = sandbox.list_paths(None, Some("[")).unwrap_err();
        assert!(matches!(err, SandboxError::InvalidGlob { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_aliases_deduplicated() {
        let (dir, sandbox) = corpus();
        std::os::unix::fs::symlink(
            dir.path().join("gesetze/bgb/573.md"),
            dir.path().join("alias.md"),
        )
        .unwrap();

        let paths = sandbox.list_paths(None, None).unwrap();
        assert!(paths.contains(&"alias.md".to_string()));
        assert!(!paths.contains(&"gesetze/bgb/573.md".to_string()));
    }
}

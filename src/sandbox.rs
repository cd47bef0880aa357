//! Read-only document sandbox
//!
//! Every path a tool receives is resolved against a fixed root. Resolution is
//! checked twice: lexically before touching the filesystem, so `../` escapes
//! fail even when the target does not exist, and again after
//! canonicalization, so symlinks cannot leave the root either.

mod file_search;
mod read;
mod walk;

pub use file_search::{SearchRequest, DEFAULT_CONTEXT_LINES, DEFAULT_MAX_RESULTS};
pub use read::RangeRequest;

use crate::error::ErrorKind;
use crate::search::QuerySyntaxError;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("path escapes the document root: {path}")]
    Violation { path: String },

    #[error("unsupported file type: {path} (allowed extensions: {allowed})")]
    UnsupportedType { path: String, allowed: String },

    #[error("no such document: {path}")]
    NotFound { path: String },

    #[error("invalid query: {0}")]
    Query(#[from] QuerySyntaxError),

    #[error("invalid glob {pattern:?}: {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("query cannot be compiled: {0}")]
    Pattern(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::Violation { .. } => ErrorKind::SandboxViolation,
            SandboxError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            SandboxError::Query(_) => ErrorKind::QuerySyntaxError,
            SandboxError::NotFound { .. }
            | SandboxError::InvalidGlob { .. }
            | SandboxError::InvalidRange(_)
            | SandboxError::Pattern(_)
            | SandboxError::Io { .. } => ErrorKind::ToolExecutionError,
        }
    }

    fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SandboxError::Io {
            path: path.into(),
            source,
        }
    }
}

/// The configured document root plus the file types tools may touch.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    allowed_extensions: Vec<String>,
    default_glob: String,
}

impl Sandbox {
    pub fn new(
        root: impl AsRef<Path>,
        allowed_extensions: &[String],
        default_glob: impl Into<String>,
    ) -> Result<Self, SandboxError> {
        let display = root.as_ref().display().to_string();
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|e| SandboxError::io(display.clone(), e))?;
        if !root.is_dir() {
            return Err(SandboxError::NotFound { path: display });
        }

        let allowed_extensions = allowed_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Ok(Self {
            root,
            allowed_extensions,
            default_glob: default_glob.into(),
        })
    }

    /// Resolve a root-relative path to an existing canonical path inside the root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let normalized = normalize_lexically(requested).ok_or_else(|| SandboxError::Violation {
            path: requested.to_string(),
        })?;

        let canonical = match self.root.join(normalized).canonicalize() {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SandboxError::NotFound {
                    path: requested.to_string(),
                })
            }
            Err(e) => return Err(SandboxError::io(requested, e)),
        };

        if !canonical.starts_with(&self.root) {
            tracing::warn!(path = %requested, "Rejected path resolving outside document root");
            return Err(SandboxError::Violation {
                path: requested.to_string(),
            });
        }
        Ok(canonical)
    }

    fn is_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            })
    }

    /// Resolve and require a regular file of an allowed type.
    fn resolve_document(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let canonical = self.resolve(requested)?;
        // Check the requested name as well as the target so a `.txt` symlink
        // to some other file type is rejected too
        if !canonical.is_file()
            || !self.is_allowed(Path::new(requested))
            || !self.is_allowed(&canonical)
        {
            return Err(SandboxError::UnsupportedType {
                path: requested.to_string(),
                allowed: self.allowed_extensions.join(", "),
            });
        }
        Ok(canonical)
    }

    /// Root-relative display form with `/` separators.
    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        Some(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }
}

/// Collapse `.` and `..` without touching the filesystem.
///
/// Returns `None` for absolute paths and for any `..` that climbs above the root.
fn normalize_lexically(requested: &str) -> Option<PathBuf> {
    let mut parts: Vec<&OsStr> = Vec::new();
    for component in Path::new(requested).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return None,
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(part) => parts.push(part),
        }
    }
    Some(parts.into_iter().collect())
}

/// Decode a document, replacing invalid UTF-8 rather than failing on it.
fn read_text(path: &Path, display: &str) -> Result<String, SandboxError> {
    let bytes = std::fs::read(path).map_err(|e| SandboxError::io(display, e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

//! Project files on disk: the stage table, stage status, and the documents
//! and assets a stage produces.
//!
//! Every path handed in by a client is relative to the project root and is
//! confined to the stage directories (plus a small set of root files).

pub mod documents;
pub mod prompts;
pub mod stages;

use std::path::{Component, Path, PathBuf};

pub use documents::{Asset, DocumentPayload};
pub use prompts::{StageAction, UnknownActionError, stage_prompt};
pub use stages::{
    STAGES, StageDefinition, StageInfo, StageKind, StageStatus, derive_status, find_stage,
};

/// Errors from project file operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A project checkout that the dashboard works on.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Render `path` relative to the root with `/` separators.
    pub(crate) fn relative_display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Lower-cased extension of `path`, with the leading dot.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
}

//! Reading and editing stage documents, and serving stage assets.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::stages::{DOCUMENT_EXTENSIONS, STAGES};
use super::{Project, ProjectError, extension_of};

/// Extensions served raw from stage directories.
const ASSET_EXTENSIONS: &[&str] = &[
    ".html", ".css", ".js", ".mjs", ".json", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp",
    ".ico", ".txt",
];

/// Root-level files that may be read and edited alongside the stages.
const ROOT_FILES: &[&str] = &["ideas.md"];

const PROTECTED_FILE: &str = "README.md";

/// A document together with its metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub path: String,
    pub content: String,
    pub content_type: &'static str,
    pub last_modified: DateTime<Utc>,
}

/// Raw asset bytes with the content type to serve them as.
#[derive(Debug, Clone)]
pub struct Asset {
    pub content: Vec<u8>,
    pub content_type: String,
}

impl Project {
    pub fn read_document(&self, rel: &str) -> Result<DocumentPayload, ProjectError> {
        let path = self.resolve_path(rel)?;
        self.ensure_scope(&path)?;
        ensure_document_type(&path)?;
        if !path.is_file() {
            return Err(ProjectError::NotFound("Document not found".to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        self.payload(&path, content)
    }

    /// Write `content` to a document, creating parent directories as needed.
    pub fn write_document(&self, rel: &str, content: &str) -> Result<DocumentPayload, ProjectError> {
        let path = self.resolve_path(rel)?;
        self.ensure_scope(&path)?;
        ensure_document_type(&path)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        tracing::info!(path = %rel, bytes = content.len(), "document written");

        self.payload(&path, content.to_string())
    }

    pub fn delete_document(&self, rel: &str) -> Result<(), ProjectError> {
        let path = self.resolve_path(rel)?;
        if path.file_name().is_some_and(|name| name == PROTECTED_FILE) {
            return Err(ProjectError::Forbidden(format!("{PROTECTED_FILE} cannot be deleted")));
        }
        self.ensure_scope(&path)?;
        ensure_document_type(&path)?;
        if !path.is_file() {
            return Err(ProjectError::NotFound("Document not found".to_string()));
        }

        std::fs::remove_file(&path)?;
        tracing::info!(path = %rel, "document deleted");
        Ok(())
    }

    pub fn read_asset(&self, rel: &str) -> Result<Asset, ProjectError> {
        let path = self.resolve_path(rel)?;
        self.ensure_scope(&path)?;
        if !extension_of(&path).is_some_and(|ext| ASSET_EXTENSIONS.contains(&ext.as_str())) {
            return Err(ProjectError::BadRequest("Unsupported asset type".to_string()));
        }
        if path.is_dir() {
            return Err(ProjectError::BadRequest("Path is a directory".to_string()));
        }
        if !path.is_file() {
            return Err(ProjectError::NotFound("Document not found".to_string()));
        }

        Ok(Asset {
            content: std::fs::read(&path)?,
            content_type: asset_content_type(&path),
        })
    }

    /// Join a client-supplied relative path onto the root. Absolute paths and
    /// any `..` are refused outright.
    fn resolve_path(&self, rel: &str) -> Result<PathBuf, ProjectError> {
        if rel.trim().is_empty() {
            return Err(ProjectError::BadRequest("Path is required".to_string()));
        }
        let candidate = Path::new(rel);
        if candidate.is_absolute() || rel.starts_with('/') || rel.starts_with('\\') {
            return Err(ProjectError::Forbidden("Absolute paths are not allowed".to_string()));
        }
        if rel.contains("..") {
            return Err(ProjectError::Forbidden("Path traversal is not allowed".to_string()));
        }
        if candidate
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ProjectError::Forbidden("Path is outside project root".to_string()));
        }
        Ok(self.root().join(candidate))
    }

    /// The path must sit inside a stage directory or be one of the allowed
    /// root files.
    fn ensure_scope(&self, path: &Path) -> Result<(), ProjectError> {
        let rel = self.relative_display(path);
        let parts: Vec<&str> = rel.split('/').collect();

        if parts.len() == 1 && ROOT_FILES.contains(&parts[0]) {
            return Ok(());
        }
        if parts.len() > 1 && STAGES.iter().any(|s| s.directory == parts[0]) {
            return Ok(());
        }
        Err(ProjectError::Forbidden(
            "Path must be inside a stage directory".to_string(),
        ))
    }

    fn payload(&self, path: &Path, content: String) -> Result<DocumentPayload, ProjectError> {
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(DocumentPayload {
            path: self.relative_display(path),
            content,
            content_type: document_content_type(path),
            last_modified: DateTime::<Utc>::from(modified),
        })
    }
}

fn ensure_document_type(path: &Path) -> Result<(), ProjectError> {
    match extension_of(path) {
        Some(ext) if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ProjectError::BadRequest("Unsupported document type".to_string())),
    }
}

fn document_content_type(path: &Path) -> &'static str {
    if extension_of(path).as_deref() == Some(".html") {
        "text/html"
    } else {
        "text/markdown"
    }
}

fn asset_content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let textual = mime.type_() == mime_guess::mime::TEXT
        || matches!(mime.subtype().as_str(), "json" | "javascript");
    if textual {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> (tempfile::TempDir, Project) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("05-prd")).unwrap();
        let project = Project::new(tmp.path());
        (tmp, project)
    }

    #[test]
    fn write_then_read_document() {
        let (tmp, project) = project();

        let written = project
            .write_document("05-prd/sections/goals.md", "# Goals\n")
            .unwrap();
        assert_eq!(written.path, "05-prd/sections/goals.md");
        assert_eq!(written.content_type, "text/markdown");
        assert!(tmp.path().join("05-prd/sections/goals.md").is_file());

        let read = project.read_document("05-prd/sections/goals.md").unwrap();
        assert_eq!(read.content, "# Goals\n");
    }

    #[test]
    fn html_documents_report_html_content_type() {
        let (_tmp, project) = project();
        let doc = project.write_document("05-prd/mock.html", "<p>hi</p>").unwrap();
        assert_eq!(doc.content_type, "text/html");
    }

    #[test]
    fn root_ideas_file_is_in_scope() {
        let (_tmp, project) = project();
        project.write_document("ideas.md", "- one\n").unwrap();
        assert_eq!(project.read_document("ideas.md").unwrap().content, "- one\n");
    }

    #[test]
    fn other_root_files_are_out_of_scope() {
        let (_tmp, project) = project();
        assert!(matches!(
            project.write_document("notes.md", "x"),
            Err(ProjectError::Forbidden(_))
        ));
        assert!(matches!(
            project.read_document("src/main.md"),
            Err(ProjectError::Forbidden(_))
        ));
    }

    #[test]
    fn rejects_bad_paths() {
        let (_tmp, project) = project();
        assert!(matches!(
            project.read_document(""),
            Err(ProjectError::BadRequest(_))
        ));
        assert!(matches!(
            project.read_document("   "),
            Err(ProjectError::BadRequest(_))
        ));
        assert!(matches!(
            project.read_document("/etc/passwd"),
            Err(ProjectError::Forbidden(_))
        ));
        assert!(matches!(
            project.read_document("05-prd/../../secret.md"),
            Err(ProjectError::Forbidden(_))
        ));
    }

    #[test]
    fn rejects_unsupported_document_type() {
        let (_tmp, project) = project();
        assert!(matches!(
            project.write_document("05-prd/run.sh", "echo"),
            Err(ProjectError::BadRequest(_))
        ));
    }

    #[test]
    fn missing_document_is_not_found() {
        let (_tmp, project) = project();
        assert!(matches!(
            project.read_document("05-prd/absent.md"),
            Err(ProjectError::NotFound(_))
        ));
        assert!(matches!(
            project.delete_document("05-prd/absent.md"),
            Err(ProjectError::NotFound(_))
        ));
    }

    #[test]
    fn delete_document_removes_file() {
        let (tmp, project) = project();
        project.write_document("05-prd/draft.md", "x").unwrap();
        project.delete_document("05-prd/draft.md").unwrap();
        assert!(!tmp.path().join("05-prd/draft.md").exists());
    }

    #[test]
    fn readme_cannot_be_deleted() {
        let (tmp, project) = project();
        project.write_document("05-prd/README.md", "# PRD").unwrap();
        assert!(matches!(
            project.delete_document("05-prd/README.md"),
            Err(ProjectError::Forbidden(_))
        ));
        assert!(tmp.path().join("05-prd/README.md").exists());
    }

    #[test]
    fn read_asset_serves_bytes_with_content_type() {
        let (tmp, project) = project();
        std::fs::write(tmp.path().join("05-prd/style.css"), "body{}").unwrap();
        std::fs::write(tmp.path().join("05-prd/logo.png"), [0x89, b'P', b'N', b'G']).unwrap();

        let css = project.read_asset("05-prd/style.css").unwrap();
        assert_eq!(css.content, b"body{}");
        assert_eq!(css.content_type, "text/css; charset=utf-8");

        let png = project.read_asset("05-prd/logo.png").unwrap();
        assert_eq!(png.content_type, "image/png");
    }

    #[test]
    fn read_asset_rejects_unlisted_extensions_and_directories() {
        let (tmp, project) = project();
        std::fs::write(tmp.path().join("05-prd/build.sh"), "#!/bin/sh").unwrap();
        std::fs::create_dir_all(tmp.path().join("05-prd/site.html")).unwrap();

        assert!(matches!(
            project.read_asset("05-prd/build.sh"),
            Err(ProjectError::BadRequest(_))
        ));
        assert!(matches!(
            project.read_asset("05-prd/site.html"),
            Err(ProjectError::BadRequest(_))
        ));
    }
}

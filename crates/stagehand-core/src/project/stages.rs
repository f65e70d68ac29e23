//! The fixed stage table and stage status derived from directory contents.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::prompts::StageAction;
use super::{Project, ProjectError, extension_of};

/// A workflow stage and the directory its documents live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDefinition {
    pub stage_id: &'static str,
    pub name: &'static str,
    pub directory: &'static str,
    /// Agent skill the stage's prompts invoke.
    pub skill: &'static str,
    pub kind: StageKind,
}

/// Which family of actions a stage offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    InitIdeas,
    Standard,
    Research,
    Ux,
    DevOps,
    Sprints,
    Archive,
}

const fn stage(
    stage_id: &'static str,
    name: &'static str,
    directory: &'static str,
    skill: &'static str,
    kind: StageKind,
) -> StageDefinition {
    StageDefinition {
        stage_id,
        name,
        directory,
        skill,
        kind,
    }
}

/// Every stage, in workflow order.
pub const STAGES: &[StageDefinition] = &[
    stage("00", "Init Ideas", "00-init-ideas", "dev-swarm-stage-init-ideas", StageKind::InitIdeas),
    stage("01", "Market Research", "01-market-research", "dev-swarm-stage-market-research", StageKind::Standard),
    stage("02", "Personas", "02-personas", "dev-swarm-stage-personas", StageKind::Standard),
    stage("03", "MVP", "03-mvp", "dev-swarm-stage-mvp", StageKind::Standard),
    stage("04", "Tech Research", "04-tech-research", "dev-swarm-stage-tech-research", StageKind::Research),
    stage("05", "PRD", "05-prd", "dev-swarm-stage-prd", StageKind::Standard),
    stage("06", "UX", "06-ux", "dev-swarm-stage-ux", StageKind::Ux),
    stage("07", "Architecture", "07-architecture", "dev-swarm-stage-architecture", StageKind::Standard),
    stage("08", "Tech Specs", "08-tech-specs", "dev-swarm-stage-tech-specs", StageKind::Standard),
    stage("09", "DevOps", "09-devops", "dev-swarm-stage-devops", StageKind::DevOps),
    stage("10", "Sprints", "10-sprints", "dev-swarm-stage-sprints", StageKind::Sprints),
    stage("11", "Deployment", "11-deployment", "dev-swarm-stage-deployment", StageKind::DevOps),
    stage("99", "Archive", "99-archive", "dev-swarm-stage-archive", StageKind::Archive),
];

/// Stages that must always be worked through.
const NON_SKIPPABLE: &[&str] = &["00", "05", "08", "10"];

/// Document extensions listed as stage files.
pub(crate) const DOCUMENT_EXTENSIONS: &[&str] = &[".md", ".html"];

const README: &str = "README.md";
const SKIP_FILE: &str = "SKIP.md";
const SKIP_FILE_CONTENTS: &str = "# Stage Skipped\n\nSkipped via stagehand.\n";

/// Look up a stage by id.
pub fn find_stage(stage_id: &str) -> Option<&'static StageDefinition> {
    STAGES.iter().find(|s| s.stage_id == stage_id)
}

pub fn is_skippable(stage_id: &str) -> bool {
    !NON_SKIPPABLE.contains(&stage_id)
}

/// Progress of a stage, derived from the files in its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    NotStarted,
    InProgress,
    Completed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not-started",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        };
        f.pad(s)
    }
}

/// `SKIP.md` wins; a README plus any other document is completed; a README
/// alone is in progress.
pub fn derive_status(has_skip: bool, has_readme: bool, has_other_files: bool) -> StageStatus {
    if has_skip {
        StageStatus::Skipped
    } else if has_readme && has_other_files {
        StageStatus::Completed
    } else if has_readme {
        StageStatus::InProgress
    } else {
        StageStatus::NotStarted
    }
}

/// A stage together with its derived status and documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    pub stage_id: String,
    pub name: String,
    pub skill: String,
    pub status: StageStatus,
    pub is_skippable: bool,
    pub has_skip_file: bool,
    /// Root-relative document paths, sorted.
    pub files: Vec<String>,
    /// Actions whose prompts can be built for this stage.
    pub actions: Vec<StageAction>,
}

impl Project {
    /// Every stage with its current status.
    pub fn list_stages(&self) -> Result<Vec<StageInfo>, ProjectError> {
        STAGES.iter().map(|stage| self.stage_info(stage)).collect()
    }

    /// Documents under one stage's directory.
    pub fn list_stage_files(&self, stage_id: &str) -> Result<Vec<String>, ProjectError> {
        let stage = find_stage(stage_id)
            .ok_or_else(|| ProjectError::NotFound("Stage not found".to_string()))?;
        self.list_documents(&self.stage_dir(stage))
    }

    /// Create or remove a stage's `SKIP.md`.
    pub fn toggle_skip(&self, stage_id: &str, skip: bool) -> Result<StageInfo, ProjectError> {
        let stage = find_stage(stage_id)
            .ok_or_else(|| ProjectError::NotFound("Stage not found".to_string()))?;
        if !is_skippable(stage_id) {
            return Err(ProjectError::BadRequest("Stage is not skippable".to_string()));
        }

        let dir = self.stage_dir(stage);
        if !dir.is_dir() {
            return Err(ProjectError::NotFound("Stage directory not found".to_string()));
        }

        let skip_file = dir.join(SKIP_FILE);
        match (skip, skip_file.exists()) {
            (true, false) => std::fs::write(&skip_file, SKIP_FILE_CONTENTS)?,
            (false, true) => std::fs::remove_file(&skip_file)?,
            _ => {}
        }
        tracing::info!(stage_id, skip, "stage skip toggled");

        self.stage_info(stage)
    }

    fn stage_dir(&self, stage: &StageDefinition) -> PathBuf {
        self.root().join(stage.directory)
    }

    fn stage_info(&self, stage: &StageDefinition) -> Result<StageInfo, ProjectError> {
        let dir = self.stage_dir(stage);
        let has_skip_file = dir.join(SKIP_FILE).exists();
        let files = self.list_documents(&dir)?;

        let readme_path = format!("{}/{README}", stage.directory);
        let skip_path = format!("{}/{SKIP_FILE}", stage.directory);
        let has_readme = files.contains(&readme_path);
        let has_other_files = files.iter().any(|f| *f != readme_path && *f != skip_path);

        Ok(StageInfo {
            stage_id: stage.stage_id.to_string(),
            name: stage.name.to_string(),
            skill: stage.skill.to_string(),
            status: derive_status(has_skip_file, has_readme, has_other_files),
            is_skippable: is_skippable(stage.stage_id),
            has_skip_file,
            files,
            actions: stage.kind.actions().to_vec(),
        })
    }

    /// Documents under `dir`, recursively, as sorted root-relative paths.
    /// A missing directory has no documents.
    fn list_documents(&self, dir: &Path) -> Result<Vec<String>, ProjectError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file()
                && extension_of(entry.path())
                    .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
            {
                found.push(self.relative_display(entry.path()));
            }
        }
        found.sort();
        Ok(found)
    }
}

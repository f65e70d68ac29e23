//! Prompts for the per-stage actions the dashboard offers.
//!
//! Each action expands into a fixed instruction naming the stage's agent
//! skill and directory. A few actions also take a target: the research
//! topic, the sprint folder, or the backlog name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::stages::{StageKind, find_stage};
use super::ProjectError;

/// An action that expands into an agent prompt for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageAction {
    RefineIdeas,
    Proposal,
    Files,
    Finalize,
    Research,
    Mockup,
    ExecuteOps,
    SprintPlan,
    Backlogs,
    DevelopAll,
    DevelopSprint,
    DevelopBacklog,
    Archive,
}

const ALL_ACTIONS: &[StageAction] = &[
    StageAction::RefineIdeas,
    StageAction::Proposal,
    StageAction::Files,
    StageAction::Finalize,
    StageAction::Research,
    StageAction::Mockup,
    StageAction::ExecuteOps,
    StageAction::SprintPlan,
    StageAction::Backlogs,
    StageAction::DevelopAll,
    StageAction::DevelopSprint,
    StageAction::DevelopBacklog,
    StageAction::Archive,
];

impl StageAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RefineIdeas => "refine-ideas",
            Self::Proposal => "proposal",
            Self::Files => "files",
            Self::Finalize => "finalize",
            Self::Research => "research",
            Self::Mockup => "mockup",
            Self::ExecuteOps => "execute-ops",
            Self::SprintPlan => "sprint-plan",
            Self::Backlogs => "backlogs",
            Self::DevelopAll => "develop-all",
            Self::DevelopSprint => "develop-sprint",
            Self::DevelopBacklog => "develop-backlog",
            Self::Archive => "archive",
        }
    }

    /// Whether the prompt names a research topic, sprint or backlog.
    pub fn needs_target(self) -> bool {
        matches!(
            self,
            Self::Research | Self::DevelopSprint | Self::DevelopBacklog
        )
    }
}

impl fmt::Display for StageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when parsing an unknown [`StageAction`] name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown stage action: {0}")]
pub struct UnknownActionError(pub String);

impl FromStr for StageAction {
    type Err = UnknownActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_ACTIONS
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownActionError(s.to_string()))
    }
}

impl StageKind {
    /// Actions offered by stages of this kind, in dashboard order.
    pub fn actions(self) -> &'static [StageAction] {
        use StageAction as A;
        match self {
            Self::InitIdeas => &[A::RefineIdeas, A::Proposal, A::Files, A::Finalize],
            Self::Standard => &[A::Proposal, A::Files, A::Finalize],
            Self::Research => &[A::Proposal, A::Files, A::Research, A::Finalize],
            Self::Ux => &[A::Proposal, A::Files, A::Mockup, A::Finalize],
            Self::DevOps => &[A::Proposal, A::Files, A::ExecuteOps, A::Finalize],
            Self::Sprints => &[
                A::Proposal,
                A::SprintPlan,
                A::Backlogs,
                A::DevelopAll,
                A::DevelopSprint,
                A::DevelopBacklog,
            ],
            Self::Archive => &[A::Archive],
        }
    }
}

/// Build the agent prompt for `action` on `stage_id`.
///
/// Unknown stages are `NotFound`. An action the stage does not offer, or a
/// missing target for an action that needs one, is `BadRequest`.
pub fn stage_prompt(
    stage_id: &str,
    action: StageAction,
    target: Option<&str>,
) -> Result<String, ProjectError> {
    let stage = find_stage(stage_id)
        .ok_or_else(|| ProjectError::NotFound("Stage not found".to_string()))?;
    if !stage.kind.actions().contains(&action) {
        return Err(ProjectError::BadRequest(format!(
            "Action {action} is not available for stage {stage_id}"
        )));
    }

    let target = target.map(str::trim).filter(|t| !t.is_empty());
    let target = match (action.needs_target(), target) {
        (true, None) => {
            return Err(ProjectError::BadRequest(format!(
                "Action {action} requires a target"
            )));
        }
        (_, target) => target.unwrap_or_default(),
    };

    let skill = stage.skill;
    let dir = stage.directory;
    let prompt = match action {
        StageAction::RefineIdeas => {
            "Use the prompt defined at `.claude/commands/ideas-refine.md` to update `ideas.md`"
                .to_string()
        }
        StageAction::Proposal => {
            format!("Use agent skill `{skill}` to create `{dir}/README.md` only, then commit to git")
        }
        StageAction::Files => format!(
            "Use agent skill `{skill}` to create stage files by `{dir}/README.md`, then commit all to git"
        ),
        StageAction::Finalize => match stage.kind {
            StageKind::Research => format!(
                "Use agent skill `{skill}` to update `{dir}/README.md` to reflect stage files and research results at `{dir}/`, then commit all to git"
            ),
            StageKind::Ux => format!(
                "Use agent skill `{skill}` to update `{dir}/README.md` to reflect stage files and UI mockup, then commit all to git"
            ),
            _ => format!(
                "Use agent skill `{skill}` to update `{dir}/README.md` to reflect stage files at `{dir}/`, then commit all to git"
            ),
        },
        StageAction::Research => format!(
            "Use agent skill `{skill}` to do tech research for {target}, once finished, then commit all to git"
        ),
        StageAction::Mockup => format!(
            "Use agent skill `{skill}` to create the UI mockup by the UI mockup readme file, once finished, then commit all to git"
        ),
        StageAction::ExecuteOps => format!(
            "Use agent skill `{skill}` to execute any local and remote actions based on the stages files, then commit all to git for the result"
        ),
        StageAction::SprintPlan => format!(
            "Use agent skill `{skill}` to create development plan file `development-plan.md`, then commit all to git"
        ),
        StageAction::Backlogs => format!(
            "Use agent skill `{skill}` to create all the sprints and backlogs files, then commit all to git"
        ),
        StageAction::DevelopAll => format!(
            "Use agent skill `{skill}` do all the code development, review and test for each backlog one by one.\n\
             Once finish one sprint, conduct the sprint test by the readme file, then the next sprint until finish the whole project"
        ),
        StageAction::DevelopSprint => format!(
            "Use agent skill `{skill}` do all the code development, review and test for each backlog one by one in this sprint {target} and conduct the sprint test by the readme file"
        ),
        StageAction::DevelopBacklog => {
            let backlog = target.strip_suffix(".md").unwrap_or(target);
            format!(
                "Use agent skill `{skill}` do the code development, review and test for this backlog name {backlog}"
            )
        }
        StageAction::Archive => format!(
            "Use agent skill `{skill}` to archive the current project, and ready to start a new project"
        ),
    };
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::STAGES;

    #[test]
    fn action_names_round_trip() {
        for action in ALL_ACTIONS {
            assert_eq!(action.as_str().parse::<StageAction>().unwrap(), *action);
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                serde_json::Value::from(action.as_str())
            );
        }
        assert!("deploy".parse::<StageAction>().is_err());
    }

    #[test]
    fn every_stage_offers_its_actions() {
        for stage in STAGES {
            for action in stage.kind.actions() {
                let target = action.needs_target().then_some("x");
                assert!(
                    stage_prompt(stage.stage_id, *action, target).is_ok(),
                    "{action} on {}",
                    stage.stage_id
                );
            }
        }
    }

    #[test]
    fn standard_prompts_name_skill_and_directory() {
        assert_eq!(
            stage_prompt("05", StageAction::Proposal, None).unwrap(),
            "Use agent skill `dev-swarm-stage-prd` to create `05-prd/README.md` only, then commit to git"
        );
        assert_eq!(
            stage_prompt("01", StageAction::Files, None).unwrap(),
            "Use agent skill `dev-swarm-stage-market-research` to create stage files by \
             `01-market-research/README.md`, then commit all to git"
        );
        assert_eq!(
            stage_prompt("07", StageAction::Finalize, None).unwrap(),
            "Use agent skill `dev-swarm-stage-architecture` to update `07-architecture/README.md` \
             to reflect stage files at `07-architecture/`, then commit all to git"
        );
    }

    #[test]
    fn finalize_varies_by_stage_kind() {
        assert!(
            stage_prompt("04", StageAction::Finalize, None)
                .unwrap()
                .contains("research results at `04-tech-research/`")
        );
        assert!(
            stage_prompt("06", StageAction::Finalize, None)
                .unwrap()
                .contains("stage files and UI mockup")
        );
    }

    #[test]
    fn targeted_actions_embed_the_target() {
        assert_eq!(
            stage_prompt("04", StageAction::Research, Some(" vector databases ")).unwrap(),
            "Use agent skill `dev-swarm-stage-tech-research` to do tech research for vector databases, \
             once finished, then commit all to git"
        );
        assert!(
            stage_prompt("10", StageAction::DevelopSprint, Some("sprint-2"))
                .unwrap()
                .contains("in this sprint sprint-2 and")
        );
        assert!(
            stage_prompt("10", StageAction::DevelopBacklog, Some("login-form.md"))
                .unwrap()
                .ends_with("for this backlog name login-form")
        );
    }

    #[test]
    fn targeted_action_without_target_is_rejected() {
        assert!(matches!(
            stage_prompt("04", StageAction::Research, Some("  ")),
            Err(ProjectError::BadRequest(_))
        ));
    }

    #[test]
    fn unavailable_action_and_unknown_stage() {
        assert!(matches!(
            stage_prompt("01", StageAction::Mockup, None),
            Err(ProjectError::BadRequest(_))
        ));
        assert!(matches!(
            stage_prompt("99", StageAction::Proposal, None),
            Err(ProjectError::BadRequest(_))
        ));
        assert!(matches!(
            stage_prompt("42", StageAction::Proposal, None),
            Err(ProjectError::NotFound(_))
        ));
    }
}

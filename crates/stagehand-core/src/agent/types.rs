use serde::Serialize;

/// Token in an argument template that is replaced by the run prompt.
pub const PROMPT_PLACEHOLDER: &str = "{{prompt}}";

/// A validated agent definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Unique identifier used by start requests.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Binary to execute (absolute path or looked up on `$PATH`).
    pub bin: String,
    /// Argument template; elements may contain [`PROMPT_PLACEHOLDER`].
    pub args: Vec<String>,
    /// Fixed rehearsal prompt that replaces whatever the caller sends.
    pub test_prompt: Option<String>,
}

impl AgentConfig {
    /// Build the process argument vector for `prompt`.
    ///
    /// Every occurrence of [`PROMPT_PLACEHOLDER`] in every element is
    /// replaced; elements without the token pass through unchanged.
    pub fn build_args(&self, prompt: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(PROMPT_PLACEHOLDER, prompt))
            .collect()
    }

    /// The prompt a run will actually use: the configured `test_prompt`
    /// when present, otherwise the caller's prompt.
    pub fn effective_prompt<'a>(&'a self, requested: &'a str) -> &'a str {
        self.test_prompt.as_deref().unwrap_or(requested)
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// The client-facing view of an agent, used for agent selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
}

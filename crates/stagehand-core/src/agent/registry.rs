//! Agent registry -- loads and validates agent definitions from disk.
//!
//! The registry holds only the path of the definition file. Every call to
//! [`AgentRegistry::list`] or [`AgentRegistry::resolve`] reads and
//! validates the file again; there is no cache to invalidate.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::types::{AgentConfig, AgentSummary};

/// Errors from loading or querying the agent definitions.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read agent definitions at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse agent definitions: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("agent definitions must be a JSON array")]
    NotAnArray,

    #[error("agent entry {0} is not an object")]
    InvalidEntry(usize),

    #[error("agent entry {0} is missing required fields (id, name, bin, args)")]
    MissingFields(usize),

    #[error("agent entry {0} has non-string args")]
    NonStringArgs(usize),

    #[error("agent entry {0} has a non-string test_prompt")]
    InvalidTestPrompt(usize),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),
}

/// Read-only view over the agent definition file.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    path: PathBuf,
}

impl AgentRegistry {
    /// Create a registry backed by the JSON file at `path`.
    ///
    /// The file is not touched until the first lookup.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing definition file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate every agent definition, in declaration order.
    pub fn load(&self) -> Result<Vec<AgentConfig>, ConfigError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        parse_agents(&raw)
    }

    /// List `{id, name}` for every configured agent, in declaration order.
    pub fn list(&self) -> Result<Vec<AgentSummary>, ConfigError> {
        Ok(self.load()?.iter().map(AgentConfig::summary).collect())
    }

    /// Look up a single agent by id.
    ///
    /// The whole file is validated first, so a malformed entry anywhere
    /// fails the lookup even if the requested agent itself is valid.
    pub fn resolve(&self, agent_id: &str) -> Result<AgentConfig, ConfigError> {
        self.load()?
            .into_iter()
            .find(|cfg| cfg.id == agent_id)
            .ok_or_else(|| ConfigError::UnknownAgent(agent_id.to_string()))
    }
}

/// Parse and validate the contents of an agent definition file.
pub fn parse_agents(raw: &str) -> Result<Vec<AgentConfig>, ConfigError> {
    let parsed: Value = serde_json::from_str(raw)?;
    let Value::Array(entries) = parsed else {
        return Err(ConfigError::NotAnArray);
    };

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let obj = entry.as_object().ok_or(ConfigError::InvalidEntry(idx))?;
            parse_entry(idx, obj)
        })
        .collect()
}

fn parse_entry(idx: usize, obj: &Map<String, Value>) -> Result<AgentConfig, ConfigError> {
    let required = |key: &str| -> Result<String, ConfigError> {
        obj.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::MissingFields(idx))
    };

    let id = required("id")?;
    let name = required("name")?;
    let bin = required("bin")?;

    let args = obj
        .get("args")
        .and_then(Value::as_array)
        .ok_or(ConfigError::MissingFields(idx))?
        .iter()
        .map(|arg| {
            arg.as_str()
                .map(str::to_string)
                .ok_or(ConfigError::NonStringArgs(idx))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // An empty test_prompt is treated as unset.
    let test_prompt = match obj.get("test_prompt") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(ConfigError::InvalidTestPrompt(idx)),
    };

    Ok(AgentConfig {
        id,
        name,
        bin,
        args,
        test_prompt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_agents(contents: &str) -> (tempfile::TempDir, AgentRegistry) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("agents.json");
        std::fs::write(&path, contents).unwrap();
        (tmp, AgentRegistry::new(path))
    }

    #[test]
    fn list_preserves_declaration_order() {
        let (_tmp, registry) = write_agents(
            r#"[
                {"id":"zeta","name":"Zeta","bin":"z","args":[]},
                {"id":"alpha","name":"Alpha","bin":"a","args":["{{prompt}}"]}
            ]"#,
        );
        let agents = registry.list().unwrap();
        let ids: Vec<&str> = agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
        assert_eq!(agents[1].name, "Alpha");
    }

    #[test]
    fn resolve_returns_full_config() {
        let (_tmp, registry) = write_agents(
            r#"[{"id":"echo","name":"Echo","bin":"/bin/echo","args":["{{prompt}}"],"test_prompt":"pinned"}]"#,
        );
        let cfg = registry.resolve("echo").unwrap();
        assert_eq!(cfg.bin, "/bin/echo");
        assert_eq!(cfg.args, vec!["{{prompt}}"]);
        assert_eq!(cfg.test_prompt.as_deref(), Some("pinned"));
    }

    #[test]
    fn resolve_unknown_agent_fails() {
        let (_tmp, registry) = write_agents(r#"[{"id":"echo","name":"Echo","bin":"e","args":[]}]"#);
        let err = registry.resolve("codex").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAgent(ref id) if id == "codex"));
        assert_eq!(err.to_string(), "unknown agent: codex");
    }

    #[test]
    fn missing_file_is_read_error() {
        let registry = AgentRegistry::new("/nonexistent/stagehand/agents.json");
        let err = registry.list().unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/stagehand/agents.json"));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_agents("[{").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn top_level_object_is_rejected() {
        let err = parse_agents(r#"{"id":"x"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::NotAnArray));
    }

    #[test]
    fn non_object_entry_is_rejected() {
        let err = parse_agents(r#"[{"id":"a","name":"A","bin":"a","args":[]}, 42]"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry(1)));
    }

    #[test]
    fn missing_or_empty_fields_are_rejected() {
        for raw in [
            r#"[{"name":"A","bin":"a","args":[]}]"#,
            r#"[{"id":"","name":"A","bin":"a","args":[]}]"#,
            r#"[{"id":"a","name":"A","args":[]}]"#,
            r#"[{"id":"a","name":"A","bin":"a"}]"#,
            r#"[{"id":"a","name":"A","bin":"a","args":"{{prompt}}"}]"#,
            r#"[{"id":7,"name":"A","bin":"a","args":[]}]"#,
        ] {
            let err = parse_agents(raw).unwrap_err();
            assert!(
                matches!(err, ConfigError::MissingFields(0)),
                "expected MissingFields for {raw}, got {err:?}"
            );
        }
    }

    #[test]
    fn non_string_args_are_rejected() {
        let err = parse_agents(r#"[{"id":"a","name":"A","bin":"a","args":["-p", 3]}]"#).unwrap_err();
        assert!(matches!(err, ConfigError::NonStringArgs(0)));
        assert_eq!(err.to_string(), "agent entry 0 has non-string args");
    }

    #[test]
    fn empty_test_prompt_is_unset() {
        let agents =
            parse_agents(r#"[{"id":"a","name":"A","bin":"a","args":[],"test_prompt":""}]"#).unwrap();
        assert!(agents[0].test_prompt.is_none());
    }

    #[test]
    fn non_string_test_prompt_is_rejected() {
        let err =
            parse_agents(r#"[{"id":"a","name":"A","bin":"a","args":[],"test_prompt":true}]"#)
                .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTestPrompt(0)));
    }

    #[test]
    fn edits_are_visible_without_reloading() {
        let (tmp, registry) = write_agents(r#"[{"id":"one","name":"One","bin":"a","args":[]}]"#);
        assert_eq!(registry.list().unwrap().len(), 1);

        std::fs::write(
            tmp.path().join("agents.json"),
            r#"[{"id":"one","name":"One","bin":"a","args":[]},{"id":"two","name":"Two","bin":"b","args":[]}]"#,
        )
        .unwrap();
        assert_eq!(registry.list().unwrap().len(), 2);
        assert!(registry.resolve("two").is_ok());
    }
}

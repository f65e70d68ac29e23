//! Configuration file management for stagehand.
//!
//! Provides a TOML-based config file at `~/.config/stagehand/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

/// Per-project directory holding the agents and gate files by default.
pub const PROJECT_CONFIG_DIR: &str = ".stagehand";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub project: ProjectSection,
    pub agents: AgentsSection,
    pub server: ServerSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsSection {
    /// Agents JSON file. Defaults to `<root>/.stagehand/agents.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Dotenv file holding the execution flag. Defaults to `<root>/.stagehand/.env`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_file: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the stagehand config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/stagehand` or
/// `~/.config/stagehand`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("stagehand");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("stagehand")
}

/// Return the path to the stagehand config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn default_agents_file(root: &Path) -> PathBuf {
    root.join(PROJECT_CONFIG_DIR).join("agents.json")
}

pub fn default_gate_file(root: &Path) -> PathBuf {
    root.join(PROJECT_CONFIG_DIR).join(".env")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct StagehandConfig {
    pub project_root: PathBuf,
    pub agents_file: PathBuf,
    pub gate_file: PathBuf,
    pub bind: String,
    pub port: u16,
}

impl StagehandConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Project root: `cli_root` > `STAGEHAND_PROJECT_ROOT` > `project.root` > current dir
    /// - Agents file: `STAGEHAND_AGENTS_FILE` > `agents.file` > `<root>/.stagehand/agents.json`
    /// - Gate file: `STAGEHAND_GATE_FILE` > `agents.gate_file` > `<root>/.stagehand/.env`
    /// - Bind/port: `server.bind` / `server.port` (the serve flags override these)
    pub fn resolve(cli_root: Option<&Path>) -> Result<Self> {
        // A missing file is normal; a malformed one is not.
        let file_config = if config_path().exists() {
            load_config()?
        } else {
            ConfigFile::default()
        };

        let root = if let Some(root) = cli_root {
            root.to_path_buf()
        } else if let Ok(root) = std::env::var("STAGEHAND_PROJECT_ROOT") {
            PathBuf::from(root)
        } else if let Some(ref root) = file_config.project.root {
            root.clone()
        } else {
            std::env::current_dir().context("failed to determine current directory")?
        };
        let project_root = std::path::absolute(&root)
            .with_context(|| format!("invalid project root {}", root.display()))?;

        let agents_file = if let Ok(file) = std::env::var("STAGEHAND_AGENTS_FILE") {
            PathBuf::from(file)
        } else if let Some(ref file) = file_config.agents.file {
            file.clone()
        } else {
            default_agents_file(&project_root)
        };

        let gate_file = if let Ok(file) = std::env::var("STAGEHAND_GATE_FILE") {
            PathBuf::from(file)
        } else if let Some(ref file) = file_config.agents.gate_file {
            file.clone()
        } else {
            default_gate_file(&project_root)
        };

        Ok(Self {
            project_root,
            agents_file,
            gate_file,
            bind: file_config.server.bind,
            port: file_config.server.port,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ENV_KEYS: &[&str] = &[
        "STAGEHAND_PROJECT_ROOT",
        "STAGEHAND_AGENTS_FILE",
        "STAGEHAND_GATE_FILE",
    ];

    /// Point `XDG_CONFIG_HOME` at an empty temp dir and clear stagehand env
    /// vars. The returned guard restores `XDG_CONFIG_HOME` on drop.
    struct IsolatedEnv {
        _lock: std::sync::MutexGuard<'static, ()>,
        tmp: tempfile::TempDir,
        orig_xdg: Option<String>,
    }

    impl IsolatedEnv {
        fn new() -> Self {
            let lock = crate::test_util::lock_env();
            let tmp = tempfile::TempDir::new().unwrap();
            let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
            unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
            for key in ENV_KEYS {
                unsafe { std::env::remove_var(key) };
            }
            Self {
                _lock: lock,
                tmp,
                orig_xdg,
            }
        }
    }

    impl Drop for IsolatedEnv {
        fn drop(&mut self) {
            for key in ENV_KEYS {
                unsafe { std::env::remove_var(key) };
            }
            match self.orig_xdg.take() {
                Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
                None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
            }
        }
    }

    #[test]
    fn config_file_sections_are_optional() {
        let config: ConfigFile = toml::from_str("[project]\nroot = \"/srv/app\"\n").unwrap();
        assert_eq!(config.project.root.as_deref(), Some(Path::new("/srv/app")));
        assert!(config.agents.file.is_none());
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let env = IsolatedEnv::new();

        let original = ConfigFile {
            project: ProjectSection {
                root: Some(env.tmp.path().join("proj")),
            },
            agents: AgentsSection {
                file: Some(PathBuf::from("/etc/stagehand/agents.json")),
                gate_file: None,
            },
            server: ServerSection {
                bind: "0.0.0.0".to_string(),
                port: 8080,
            },
        };
        save_config(&original).unwrap();
        assert!(config_path().starts_with(env.tmp.path()));

        let loaded = load_config().unwrap();
        assert_eq!(loaded.project.root, original.project.root);
        assert_eq!(loaded.agents.file, original.agents.file);
        assert!(loaded.agents.gate_file.is_none());
        assert_eq!(loaded.server.port, 8080);
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _env = IsolatedEnv::new();

        let config = StagehandConfig::resolve(None).unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.project_root, cwd);
        assert_eq!(config.agents_file, cwd.join(".stagehand/agents.json"));
        assert_eq!(config.gate_file, cwd.join(".stagehand/.env"));
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let env = IsolatedEnv::new();
        unsafe { std::env::set_var("STAGEHAND_PROJECT_ROOT", "/from/env") };
        let root = env.tmp.path().join("cli-root");

        let config = StagehandConfig::resolve(Some(&root)).unwrap();
        assert_eq!(config.project_root, root);
        assert_eq!(config.agents_file, root.join(".stagehand/agents.json"));
    }

    #[test]
    fn resolve_with_env_var_overrides_config_file() {
        let env = IsolatedEnv::new();
        save_config(&ConfigFile {
            project: ProjectSection {
                root: Some(PathBuf::from("/from/file")),
            },
            agents: AgentsSection {
                file: Some(PathBuf::from("/from/file/agents.json")),
                gate_file: Some(PathBuf::from("/from/file/.env")),
            },
            server: ServerSection::default(),
        })
        .unwrap();
        let env_root = env.tmp.path().join("env-root");
        unsafe { std::env::set_var("STAGEHAND_PROJECT_ROOT", &env_root) };
        unsafe { std::env::set_var("STAGEHAND_GATE_FILE", "/from/env/.env") };

        let config = StagehandConfig::resolve(None).unwrap();
        assert_eq!(config.project_root, env_root);
        assert_eq!(config.agents_file, PathBuf::from("/from/file/agents.json"));
        assert_eq!(config.gate_file, PathBuf::from("/from/env/.env"));
    }

    #[test]
    fn resolve_uses_config_file_root() {
        let _env = IsolatedEnv::new();
        save_config(&ConfigFile {
            project: ProjectSection {
                root: Some(PathBuf::from("/from/file")),
            },
            ..ConfigFile::default()
        })
        .unwrap();

        let config = StagehandConfig::resolve(None).unwrap();
        assert_eq!(config.project_root, PathBuf::from("/from/file"));
        assert_eq!(
            config.gate_file,
            PathBuf::from("/from/file/.stagehand/.env")
        );
    }

    #[test]
    fn resolve_rejects_malformed_config_file() {
        let _env = IsolatedEnv::new();
        std::fs::create_dir_all(config_dir()).unwrap();
        std::fs::write(config_path(), "[server]\nport = \"not a number\"\n").unwrap();

        let err = StagehandConfig::resolve(None).unwrap_err();
        assert!(
            format!("{err:#}").contains("failed to parse config file"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("stagehand/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}

mod agents_cmd;
mod config;
mod run_cmd;
mod serve_cmd;
mod stages_cmd;
#[cfg(test)]
mod test_util;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use stagehand_core::agent::AgentRegistry;
use stagehand_core::project::{Project, StageAction, stage_prompt};
use stagehand_core::run::{AGENT_EXECUTE_KEY, EnvFileGate, RunSupervisor};

use config::StagehandConfig;

#[derive(Parser)]
#[command(
    name = "stagehand",
    about = "Stage-by-stage project dashboard that supervises AI agent runs"
)]
struct Cli {
    /// Project root (overrides STAGEHAND_PROJECT_ROOT env var)
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a stagehand config file and seed the project's agent files
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Serve the dashboard and agent API over HTTP
    Serve {
        /// Address to bind (defaults to server.bind in the config file)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (defaults to server.port in the config file)
        #[arg(long)]
        port: Option<u16>,
    },
    /// List configured agents
    Agents,
    /// Show stage status for the project
    Stages,
    /// Run an agent for a stage and follow its output
    Run {
        /// Stage ID (e.g. 01)
        stage_id: String,
        /// Prompt passed to the agent
        #[arg(required_unless_present = "action")]
        prompt: Option<String>,
        /// Build the prompt for a stage action instead (proposal, files,
        /// finalize, research, mockup, execute-ops, sprint-plan, ...)
        #[arg(long, conflicts_with = "prompt")]
        action: Option<StageAction>,
        /// Research topic, sprint folder or backlog name for actions that
        /// need one
        #[arg(long, requires = "action")]
        target: Option<String>,
        /// Agent ID from the agents file
        #[arg(long, default_value = serve_cmd::DEFAULT_AGENT)]
        agent: String,
    },
}

const SAMPLE_AGENTS: &str = r#"[
  {
    "id": "claude",
    "name": "Claude Code",
    "bin": "claude",
    "args": ["-p", "{{prompt}}"]
  },
  {
    "id": "codex",
    "name": "Codex",
    "bin": "codex",
    "args": ["exec", "{{prompt}}"]
  }
]
"#;

/// Execute the `stagehand init` command: write config file and seed the
/// project's agents and gate files if they are missing.
fn cmd_init(cli_root: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let root = match cli_root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir().context("failed to determine current directory")?,
    };
    let root = std::path::absolute(&root)
        .with_context(|| format!("invalid project root {}", root.display()))?;

    let cfg = config::ConfigFile {
        project: config::ProjectSection {
            root: Some(root.clone()),
        },
        ..config::ConfigFile::default()
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  project.root = {}", root.display());

    let agents_file = config::default_agents_file(&root);
    let gate_file = config::default_gate_file(&root);
    if let Some(dir) = agents_file.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    if agents_file.exists() {
        println!("  agents file kept: {}", agents_file.display());
    } else {
        std::fs::write(&agents_file, SAMPLE_AGENTS)
            .with_context(|| format!("failed to write {}", agents_file.display()))?;
        println!("  agents file written: {}", agents_file.display());
    }

    if gate_file.exists() {
        println!("  gate file kept: {}", gate_file.display());
    } else {
        std::fs::write(&gate_file, format!("{AGENT_EXECUTE_KEY}=false\n"))
            .with_context(|| format!("failed to write {}", gate_file.display()))?;
        println!("  gate file written: {}", gate_file.display());
    }

    println!();
    println!(
        "Agent execution is disabled. Set {AGENT_EXECUTE_KEY}=true in {} to allow runs.",
        gate_file.display()
    );

    Ok(())
}

fn build_supervisor(resolved: &StagehandConfig) -> RunSupervisor {
    RunSupervisor::new(
        AgentRegistry::new(&resolved.agents_file),
        EnvFileGate::new(&resolved.gate_file),
        &resolved.project_root,
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cmd_init(cli.project_root.as_deref(), force)?;
        }
        Commands::Serve { bind, port } => {
            let resolved = StagehandConfig::resolve(cli.project_root.as_deref())?;
            let bind = bind.unwrap_or_else(|| resolved.bind.clone());
            let port = port.unwrap_or(resolved.port);
            tracing::info!(
                project_root = %resolved.project_root.display(),
                agents_file = %resolved.agents_file.display(),
                gate_file = %resolved.gate_file.display(),
                "resolved configuration"
            );
            let state = serve_cmd::AppState::new(
                build_supervisor(&resolved),
                Project::new(&resolved.project_root),
            );
            serve_cmd::run_serve(state, &bind, port).await?;
        }
        Commands::Agents => {
            let resolved = StagehandConfig::resolve(cli.project_root.as_deref())?;
            agents_cmd::run_agents(&AgentRegistry::new(&resolved.agents_file))?;
        }
        Commands::Stages => {
            let resolved = StagehandConfig::resolve(cli.project_root.as_deref())?;
            stages_cmd::run_stages(&Project::new(&resolved.project_root))?;
        }
        Commands::Run {
            stage_id,
            prompt,
            action,
            target,
            agent,
        } => {
            let prompt = match (action, prompt) {
                (Some(action), _) => stage_prompt(&stage_id, action, target.as_deref())?,
                (None, Some(prompt)) => prompt,
                (None, None) => anyhow::bail!("a prompt or --action is required"),
            };
            let resolved = StagehandConfig::resolve(cli.project_root.as_deref())?;
            let supervisor = build_supervisor(&resolved);
            run_cmd::run_agent(&supervisor, &stage_id, &prompt, &agent).await?;
        }
    }

    Ok(())
}

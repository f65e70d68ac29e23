//! `stagehand agents` command: list configured agents.

use anyhow::{Context, Result};

use stagehand_core::agent::AgentRegistry;

pub fn run_agents(registry: &AgentRegistry) -> Result<()> {
    let agents = registry
        .load()
        .with_context(|| format!("failed to load agents from {}", registry.path().display()))?;

    if agents.is_empty() {
        println!("No agents configured in {}.", registry.path().display());
        return Ok(());
    }

    println!("{:<16} {:<24} {}", "ID", "NAME", "COMMAND");
    println!("{}", "-".repeat(72));
    for agent in &agents {
        let mut command = agent.bin.clone();
        for arg in &agent.args {
            command.push(' ');
            command.push_str(arg);
        }
        println!("{:<16} {:<24} {command}", agent.id, agent.name);
        if let Some(ref test_prompt) = agent.test_prompt {
            println!("{:<16} test prompt: {test_prompt}", "");
        }
    }

    Ok(())
}

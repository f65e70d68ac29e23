//! `stagehand stages` command: print the stage status table.

use anyhow::Result;

use stagehand_core::project::{Project, StageStatus};

pub fn run_stages(project: &Project) -> Result<()> {
    let stages = project.list_stages()?;

    println!("Project: {}", project.root().display());
    println!();
    println!(
        "{:<4} {:<18} {:<12} {:>5}  {:<9}  {}",
        "ID", "NAME", "STATUS", "DOCS", "SKIPPABLE", "ACTIONS"
    );
    println!("{}", "-".repeat(80));

    for stage in &stages {
        let icon = match stage.status {
            StageStatus::NotStarted => ".",
            StageStatus::InProgress => "*",
            StageStatus::Completed => "+",
            StageStatus::Skipped => "-",
        };
        let actions = stage
            .actions
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<4} {:<18} {icon} {:<10} {:>5}  {:<9}  {actions}",
            stage.stage_id,
            stage.name,
            stage.status,
            stage.files.len(),
            if stage.is_skippable { "yes" } else { "no" },
        );
    }

    Ok(())
}

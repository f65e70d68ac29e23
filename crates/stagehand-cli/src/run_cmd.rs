//! `stagehand run` command: start an agent run and follow it in the
//! terminal.

use std::time::Duration;

use anyhow::{Result, bail};
use futures::StreamExt;

use stagehand_core::run::{
    EventCategory, KILL_GRACE_PERIOD, RunEvent, RunStatus, RunSupervisor, SequencedEvent,
};

/// Start a run and print its events until it finishes.
///
/// The first Ctrl+C interrupts the run; events keep printing until the
/// stream closes. Fails unless the run ends `succeeded`.
pub async fn run_agent(
    supervisor: &RunSupervisor,
    stage_id: &str,
    prompt: &str,
    agent_id: &str,
) -> Result<()> {
    let summary = supervisor.start_run(stage_id, prompt, agent_id)?;
    let run_id = summary.run_id;
    println!("Run {run_id} started (stage {stage_id}, agent {agent_id})");

    let mut events = supervisor.stream_events(&run_id, 0);
    let mut cursor = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            item = events.next() => match item {
                Some(item) => {
                    cursor = item.seq + 1;
                    print_event(&item);
                }
                None => break,
            },
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Ctrl+C handler failed");
                    continue;
                }
                eprintln!("Interrupting run {run_id}...");
                if let Err(e) = supervisor.interrupt_run() {
                    tracing::warn!(run_id = %run_id, error = %e, "interrupt failed");
                }
            }
        }
    }

    // A stopped run closes its stream before the agent has exited. Give the
    // process its grace period so the exit is reported before we return.
    if interrupted {
        let tail = wait_for_exit(supervisor, &run_id, cursor).await;
        for item in &tail {
            print_event(item);
        }
    }

    let status = supervisor
        .find_run(&run_id)
        .map(|run| run.status())
        .unwrap_or(RunStatus::Failed);
    if status != RunStatus::Succeeded {
        bail!("run {run_id} finished with status {status}");
    }
    Ok(())
}

async fn wait_for_exit(
    supervisor: &RunSupervisor,
    run_id: &str,
    cursor: usize,
) -> Vec<SequencedEvent> {
    let Some(run) = supervisor.find_run(run_id) else {
        return Vec::new();
    };
    // Subscribe before checking so an exit recorded in between still wakes us.
    let mut changes = run.subscribe();
    let deadline = tokio::time::Instant::now() + KILL_GRACE_PERIOD + Duration::from_secs(3);
    while !run.has_exited() {
        match tokio::time::timeout_at(deadline, changes.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => break,
        }
    }
    run.batch_since(cursor).events
}

fn print_event(item: &SequencedEvent) {
    println!("{}", format_event(&item.event));
}

/// One terminal line per event: local time, category tag, message.
pub fn format_event(event: &RunEvent) -> String {
    let time = event
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S%.3f");
    let tag = match event.category {
        EventCategory::System => "sys",
        EventCategory::Output => "out",
        EventCategory::Stderr => "err",
        EventCategory::Status => "---",
    };
    match event.category {
        EventCategory::Status => format!("[{time}] {tag} status: {}", event.message),
        _ => format!("[{time}] {tag} {}", event.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_event_tags_categories() {
        let line = format_event(&RunEvent::new(EventCategory::Stderr, "boom"));
        assert!(line.ends_with("] err boom"), "unexpected line: {line}");

        let line = format_event(&RunEvent::new(EventCategory::Status, "succeeded"));
        assert!(line.ends_with("] --- status: succeeded"), "unexpected line: {line}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_agent_succeeds_for_zero_exit() {
        let fx = stagehand_test_utils::Fixture::new();
        fx.with_agent("echo", "echo", &["{{prompt}}"]);
        let supervisor = fx.supervisor();

        run_agent(&supervisor, "01", "hello", "echo").await.unwrap();
        assert_eq!(
            supervisor.current_run().unwrap().status(),
            RunStatus::Succeeded
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_agent_fails_for_non_zero_exit() {
        let fx = stagehand_test_utils::Fixture::new();
        let script = fx.write_script("fail.sh", "exit 2");
        fx.with_agent("fail", script.to_str().unwrap(), &[]);
        let supervisor = fx.supervisor();

        let err = run_agent(&supervisor, "01", "go", "fail").await.unwrap_err();
        assert!(err.to_string().contains("finished with status failed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn wait_for_exit_returns_the_exit_tail() {
        let fx = stagehand_test_utils::Fixture::new();
        let script = fx.write_script("slow.sh", "exec sleep 30");
        fx.with_agent("slow", script.to_str().unwrap(), &[]);
        let supervisor = fx.supervisor();

        let run_id = supervisor.start_run("01", "go", "slow").unwrap().run_id;
        supervisor.interrupt_run().unwrap();
        let cursor = supervisor.get_events(&run_id).len();

        let started = std::time::Instant::now();
        let tail = wait_for_exit(&supervisor, &run_id, cursor).await;
        assert!(started.elapsed() < KILL_GRACE_PERIOD);
        assert!(supervisor.find_run(&run_id).unwrap().has_exited());
        let messages: Vec<&str> = tail.iter().map(|e| e.event.message.as_str()).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("Process exited"));
        assert_eq!(messages[1], "stopped");
    }

    #[tokio::test]
    async fn run_agent_reports_disabled_gate() {
        let fx = stagehand_test_utils::Fixture::new();
        fx.with_agent("echo", "echo", &["{{prompt}}"]);
        fx.disable_gate();
        let supervisor = fx.supervisor();

        let err = run_agent(&supervisor, "01", "go", "echo").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}

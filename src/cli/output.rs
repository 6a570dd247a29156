//! CLI output formatting

use crate::{
    backend::{ScriptInfo, UpdateStatus},
    core::{DeploymentStatus, PipelineReport, RepositoryConfig, StepPayload, StepResult},
    execution::DeployEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Spinner shown while a step runs
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        spinner.set_style(template);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a deployment status for display
pub fn format_status(status: DeploymentStatus) -> String {
    match status {
        DeploymentStatus::Running => style("RUNNING").yellow().to_string(),
        DeploymentStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        DeploymentStatus::Skipped => style("SKIPPED").dim().to_string(),
        DeploymentStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// One-line summary of a step's payload
fn describe_payload(payload: &StepPayload) -> String {
    match payload {
        StepPayload::EnsureRepo { cloned: true } => "fresh clone".to_string(),
        StepPayload::EnsureRepo { cloned: false } => "working copy present".to_string(),
        StepPayload::Pull { changed: false, .. } => "no changes".to_string(),
        StepPayload::Pull { files, .. } => format!("{} file(s) changed", files.len()),
        StepPayload::InstallDependencies { manager, skipped: true, .. } => {
            format!("{}: no manifest, skipped", manager)
        }
        StepPayload::InstallDependencies { manager, .. } => manager.to_string(),
        StepPayload::Build { commands } => format!("{} command(s)", commands.len()),
        StepPayload::StopScripts(outcome)
        | StepPayload::RegisterScripts(outcome)
        | StepPayload::RestartScripts(outcome) => format!(
            "{} ok, {} failed",
            outcome.succeeded.len(),
            outcome.failed.len()
        ),
    }
}

/// Format one step result
pub fn format_step(step: &StepResult) -> String {
    let elapsed = (step.completed_at - step.started_at).num_milliseconds().max(0);
    let icon = if step.success { CHECK } else { CROSS };
    let name = if step.success {
        style(step.kind().as_str()).green()
    } else {
        style(step.kind().as_str()).red()
    };

    let mut line = format!(
        "{} {} {} {}",
        icon,
        name,
        style(describe_payload(&step.payload)).dim(),
        style(format!("({}ms)", elapsed)).dim()
    );
    if let Some(error) = &step.error {
        line.push_str(&format!("\n     {}", style(error).red()));
    }
    line
}

/// Format a finished deployment with all of its steps
pub fn format_report(report: &PipelineReport) -> String {
    let icon = match report.status {
        DeploymentStatus::Succeeded => CHECK,
        DeploymentStatus::Failed => CROSS,
        DeploymentStatus::Skipped => SKIP,
        DeploymentStatus::Running => SPINNER,
    };

    let mut out = format!(
        "{} {} ({}) {} - {}",
        icon,
        style(&report.repository).bold(),
        report.branch,
        format_status(report.status),
        style(format_duration(Duration::from_millis(report.duration_ms.unwrap_or_default()))).dim()
    );
    for step in &report.steps {
        out.push_str("\n  ");
        out.push_str(&format_step(step));
    }
    if let Some(error) = &report.error {
        out.push_str(&format!("\n{} {}", WARN, style(error).red()));
    }
    out
}

/// Format an engine event for display
pub fn format_deploy_event(event: &DeployEvent) -> Option<String> {
    match event {
        DeployEvent::PipelineStarted {
            execution_id,
            repository,
            trigger,
        } => Some(format!(
            "{} Deploying {} ({}, {})",
            ROCKET,
            style(repository).bold(),
            style(trigger).cyan(),
            style(short_id(execution_id)).dim()
        )),
        DeployEvent::StepStarted { .. } => None,
        DeployEvent::StepCompleted { result, .. } => Some(format_step(result)),
        DeployEvent::PipelineCompleted { status, .. } => Some(format!("{} Deployment {}", INFO, format_status(*status))),
    }
}

/// Format a repository for `list`
pub fn format_repository(repo: &RepositoryConfig) -> String {
    let mut out = format!(
        "  {} {} {}",
        style(&repo.name).bold(),
        style(format!("[{}]", repo.branch)).cyan(),
        style(repo.path.display()).dim()
    );
    if let Some(url) = &repo.repo_url {
        out.push_str(&format!("\n    remote: {}", url));
    }
    out.push_str(&format!("\n    dependencies: {}", repo.dependencies.kind));
    let builds = repo.build_commands();
    if !builds.is_empty() {
        let commands: Vec<&str> = builds.iter().map(|b| b.command()).collect();
        out.push_str(&format!("\n    build: {}", commands.join(" && ")));
    }
    if !repo.restart_scripts.is_empty() {
        out.push_str(&format!("\n    restart: {}", repo.restart_scripts.join(", ")));
    }
    out
}

/// Format an update check result for `check`
pub fn format_update_status(repo: &RepositoryConfig, status: &UpdateStatus) -> String {
    let icon = if status.has_updates() { ROCKET } else { CHECK };
    format!(
        "{} {} ({}): {} behind, {} ahead",
        icon,
        style(&repo.name).bold(),
        repo.branch,
        style(status.behind).cyan(),
        style(status.ahead).dim()
    )
}

/// Format a process-manager script
pub fn format_script(script: &ScriptInfo) -> String {
    format!(
        "  {} {}",
        style(&script.name).bold(),
        style(script.status.as_deref().unwrap_or("unknown")).dim()
    )
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", millis)
    } else if secs < 60 {
        format!("{}.{}s", secs, duration.subsec_millis() / 100)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

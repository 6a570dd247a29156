use autodeploy::backend::{Collaborators, GitCli, ProcessManager, ProcessManagerClient, VersionControl};
use autodeploy::cli::commands::{
    CheckCommand, DeployCommand, ListCommand, ScriptAction, ScriptsCommand, ServeCommand, ValidateCommand,
};
use autodeploy::cli::output::*;
use autodeploy::cli::{Cli, Command};
use autodeploy::core::{AppConfig, DeploymentTrigger, StepPayload};
use autodeploy::execution::{DeployEvent, DeploymentEngine, DeploymentScheduler, PollScheduler, ResultReporter};
use autodeploy::server::{self, AppState};
use autodeploy::trigger::RepoDispatch;

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("autodeploy={level},tower_http={level}")));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")?;

    match cli.command() {
        Command::Serve(cmd) => serve(&cli, &cmd).await?,
        Command::Deploy(cmd) => deploy(&cli, &cmd).await?,
        Command::Check(cmd) => check(&cli, &cmd).await?,
        Command::Validate(cmd) => validate(&cli, &cmd)?,
        Command::List(cmd) => list(&cli, &cmd)?,
        Command::Scripts(cmd) => scripts(&cli, &cmd).await?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let path = AppConfig::resolve_path(cli.config.as_deref());
    AppConfig::from_file(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

async fn serve(cli: &Cli, cmd: &ServeCommand) -> Result<()> {
    let config = load_config(cli)?;
    let dispatch = RepoDispatch::from_config(&config);
    info!("Loaded {} repositories ({:?} mode)", dispatch.len(), config.trigger_mode);

    let webhook = config.trigger_mode.webhook_enabled() && !cmd.no_webhook;
    let polling = config.trigger_mode.polling_enabled() && !cmd.no_poll;
    if !webhook && !polling {
        bail!("Both the webhook server and polling are disabled, nothing to do");
    }

    let collaborators = Collaborators::system();
    let engine = DeploymentEngine::new(collaborators.clone(), config.process_manager.clone());
    let scheduler = DeploymentScheduler::new(Arc::new(engine), Arc::new(ResultReporter::default()));

    if config.deploy_on_startup {
        for repo in dispatch.iter() {
            let trigger = DeploymentTrigger::startup(&repo.name, &repo.branch);
            let outcome = scheduler.submit(repo.clone(), trigger).await;
            info!(repo = %repo.name, "Startup deployment {}", outcome);
        }
    }

    let poller = polling.then(|| {
        Arc::new(PollScheduler::new(
            dispatch.clone(),
            collaborators.vcs.clone(),
            scheduler.clone(),
            Duration::from_secs(config.polling.interval_seconds),
        ))
    });
    let poll_task = poller.clone().map(|poller| tokio::spawn(async move { poller.run().await }));

    if webhook {
        let mut listen = config.webhook.clone();
        if let Some(port) = cmd.port {
            listen.port = port;
        }
        if let Some(host) = &cmd.host {
            listen.host = host.clone();
        }
        let state = AppState::new(config.webhook.secret.as_deref(), dispatch, scheduler.clone());
        server::serve(&listen, state, shutdown_signal())
            .await
            .with_context(|| format!("Webhook server on {}:{} failed", listen.host, listen.port))?;
    } else {
        shutdown_signal().await;
    }

    info!("Shutting down");
    if let Some(poller) = &poller {
        poller.stop();
    }
    if let Some(task) = poll_task {
        if let Err(e) = task.await {
            warn!("Poll loop ended abnormally: {}", e);
        }
    }
    info!("Waiting for running deployments to finish");
    scheduler.wait_idle().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn deploy(cli: &Cli, cmd: &DeployCommand) -> Result<()> {
    let config = load_config(cli)?;
    let repo = config
        .repository(&cmd.repository, cmd.branch.as_deref())
        .cloned()
        .with_context(|| format!("No repository named '{}' in the configuration", cmd.repository))?;

    let spinner = create_spinner(format!("Deploying {}", repo.name));
    let progress = spinner.clone();
    let engine = DeploymentEngine::new(Collaborators::system(), config.process_manager.clone())
        .with_event_handler(move |event| match &event {
            DeployEvent::StepStarted { step, .. } => progress.set_message(step.to_string()),
            _ => {
                if let Some(line) = format_deploy_event(&event) {
                    progress.println(line);
                }
            }
        });

    let trigger = DeploymentTrigger::manual(&repo.name, &repo.branch);
    let state = engine.execute(Arc::new(repo), trigger).await;
    spinner.finish_and_clear();

    let report = state.report();
    println!("\n{}", format_report(&report));

    if !report.success {
        // Show what the failing build command printed
        if let Some(StepPayload::Build { commands }) = report.steps.last().map(|s| &s.payload) {
            if let Some(failed) = commands.iter().find(|c| !c.success) {
                println!("\n{}", format_output(&failed.stderr, 20));
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn check(cli: &Cli, cmd: &CheckCommand) -> Result<()> {
    let config = load_config(cli)?;
    let git = GitCli::default();
    let mut results = Vec::new();

    for repo in &config.repositories {
        if cmd.repo.as_deref().is_some_and(|name| name != repo.name) {
            continue;
        }

        if !git.is_repository(&repo.path).await {
            if !cmd.json {
                println!("{} {}: no working copy at {}", WARN, style(&repo.name).bold(), repo.path.display());
            }
            results.push(serde_json::json!({
                "repository": repo.name,
                "branch": repo.branch,
                "error": "not cloned",
            }));
            continue;
        }

        match git.check_for_updates(&repo.path, &repo.branch).await {
            Ok(status) => {
                if !cmd.json {
                    println!("{}", format_update_status(repo, &status));
                }
                results.push(serde_json::json!({
                    "repository": repo.name,
                    "branch": repo.branch,
                    "behind": status.behind,
                    "ahead": status.ahead,
                }));
            }
            Err(e) => {
                if !cmd.json {
                    println!("{} {}: {}", CROSS, style(&repo.name).bold(), style(&e).red());
                }
                results.push(serde_json::json!({
                    "repository": repo.name,
                    "branch": repo.branch,
                    "error": e.to_string(),
                }));
            }
        }
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

fn validate(cli: &Cli, cmd: &ValidateCommand) -> Result<()> {
    let path = AppConfig::resolve_path(cli.config.as_deref());
    println!("{} Validating {}...", INFO, path.display());

    match AppConfig::from_file(&path) {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            println!("  Trigger mode: {}", style(format!("{:?}", config.trigger_mode).to_lowercase()).bold());
            println!("  Repositories: {}", style(config.repositories.len()).cyan());
            println!(
                "  Webhook secret: {}",
                if config.webhook.secret.is_some() { style("set").green() } else { style("not set").yellow() }
            );

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

fn list(cli: &Cli, cmd: &ListCommand) -> Result<()> {
    let config = load_config(cli)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&config.repositories)?);
        return Ok(());
    }

    println!("{} Configured repositories:", INFO);
    for repo in &config.repositories {
        println!("{}", format_repository(repo));
    }
    Ok(())
}

async fn scripts(cli: &Cli, cmd: &ScriptsCommand) -> Result<()> {
    let config = load_config(cli)?;
    let endpoint = match cmd.repo.as_deref() {
        Some(name) => config
            .repository(name, None)
            .with_context(|| format!("No repository named '{}' in the configuration", name))?
            .process_manager(&config.process_manager)
            .clone(),
        None => config.process_manager.clone(),
    };

    let client = ProcessManagerClient::new();
    let action = cmd.action.clone().unwrap_or(ScriptAction::List);

    let (verb, name, result) = match &action {
        ScriptAction::List => {
            let scripts = client
                .list_scripts(&endpoint)
                .await
                .with_context(|| format!("Failed to list scripts from {}", endpoint.url))?;
            println!("{} {} script(s) at {}", INFO, scripts.len(), endpoint.url);
            for script in &scripts {
                println!("{}", format_script(script));
            }
            return Ok(());
        }
        ScriptAction::Start { name } => ("start", name, client.start_script(&endpoint, name).await),
        ScriptAction::Stop { name } => ("stop", name, client.stop_script(&endpoint, name).await),
        ScriptAction::Restart { name } => ("restart", name, client.restart_script(&endpoint, name).await),
    };

    let message = result.with_context(|| format!("Failed to {} script '{}'", verb, name))?;
    println!("{} {} {}", CHECK, style(name).bold(), style(message).dim());
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use feedwarden::harness::{run_script, FeedScript, HarnessReport};
use feedwarden::metrics::MetricsEndpoint;
use feedwarden::{
    FeedDocument, HttpEvaluationClient, Orchestrator, OrchestratorHandle, RunSummary, Services,
    SharedDocument, WsConnector,
};
use feedwarden_policy_center::{ConfigCenter, InMemoryConfigCenter};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::context::CliContext;
use crate::cli::output::render;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Feed script (YAML) to play against the page model
    #[arg(long, value_name = "FILE")]
    pub feed: Option<PathBuf>,

    /// Keep running this long after the script ends (overrides the script)
    #[arg(long)]
    pub linger_ms: Option<u64>,

    /// Initial page location
    #[arg(long)]
    pub location: Option<String>,

    /// Keep markers and the action log in memory only
    #[arg(long)]
    pub ephemeral: bool,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let center = Arc::new(
        InMemoryConfigCenter::from_options(ctx.load_options())
            .with_context(|| format!("Failed to load configuration {}", ctx.config_path().display()))?,
    );
    let snapshot = center.snapshot().await;
    let client = Arc::new(HttpEvaluationClient::new()?);
    let connector = Arc::new(WsConnector);
    let services = if args.ephemeral {
        Services::in_memory(connector, client)
    } else {
        Services {
            connector,
            client,
            markers: ctx.open_markers()?,
            audit: Box::new(ctx.open_audit_log()?),
        }
    };

    let document = SharedDocument::new(match &args.location {
        Some(location) => FeedDocument::new(location.clone()),
        None => FeedDocument::default(),
    });
    let mut orchestrator = Orchestrator::new(document.clone(), snapshot, services);
    orchestrator.watch_config(center.subscribe());
    let metrics = MetricsEndpoint::start(ctx.metrics_port(), CancellationToken::new())
        .await
        .context("Failed to start metrics endpoint")?;
    let _reload = spawn_reload_on_hangup(Arc::clone(&center));
    let handle = orchestrator.handle();

    let outcome = drive(args, ctx, orchestrator, document, handle).await;
    if let Some(metrics) = metrics {
        metrics.shutdown().await;
    }
    outcome
}

async fn drive(
    args: RunArgs,
    ctx: &CliContext,
    mut orchestrator: Orchestrator<SharedDocument>,
    document: SharedDocument,
    handle: OrchestratorHandle,
) -> Result<()> {
    match args.feed {
        Some(path) => {
            let mut script = FeedScript::load(&path)
                .with_context(|| format!("Failed to load feed script {}", path.display()))?;
            if let Some(linger_ms) = args.linger_ms {
                script.linger_ms = linger_ms;
            }
            info!(feed = %path.display(), steps = script.steps.len(), "playing feed script");
            let report = tokio::select! {
                report = run_script(orchestrator, document, &script) => report?,
                _ = signal::ctrl_c() => {
                    info!("Interrupted; stopping orchestrator");
                    handle.shutdown();
                    return Ok(());
                }
            };
            print_report(ctx, &report)
        }
        None => {
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    info!("Interrupted; stopping orchestrator");
                    handle.shutdown();
                }
            });
            let summary = orchestrator.run().await?;
            print_summary(ctx, &summary)
        }
    }
}

#[cfg(unix)]
fn spawn_reload_on_hangup(center: Arc<InMemoryConfigCenter>) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(?err, "SIGHUP reload unavailable");
            return None;
        }
    };
    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match center.reload().await {
                Ok(snapshot) => info!(rev = snapshot.rev, "configuration reloaded"),
                Err(err) => warn!(%err, "configuration reload failed; keeping previous"),
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_center: Arc<InMemoryConfigCenter>) -> Option<JoinHandle<()>> {
    None
}

fn print_report(ctx: &CliContext, report: &HarnessReport) -> Result<()> {
    if let Some(text) = render(ctx.output(), report)? {
        println!("{text}");
        return Ok(());
    }
    println!("Feed script finished ({} steps)", report.steps);
    print_summary_lines(&report.summary);
    println!();
    println!("Cards:");
    for card in &report.cards {
        println!(
            "- {:<16} badge={:<8} classes=[{}]{}",
            card.key.as_deref().unwrap_or("-"),
            card.badge.as_deref().unwrap_or("-"),
            card.classes.join(", "),
            if card.selected_options.is_empty() {
                String::new()
            } else {
                format!(" menu=[{}]", card.selected_options.join(", "))
            }
        );
    }
    Ok(())
}

fn print_summary(ctx: &CliContext, summary: &RunSummary) -> Result<()> {
    if let Some(text) = render(ctx.output(), summary)? {
        println!("{text}");
        return Ok(());
    }
    print_summary_lines(summary);
    Ok(())
}

fn print_summary_lines(summary: &RunSummary) {
    println!("Run Summary:");
    println!("- Configuration revision: {}", summary.config_rev);
    println!("- Push channel: {}", summary.connection);
    println!(
        "- Items → unseen={} queued={} scored={} (in flight={})",
        summary.unseen, summary.queued, summary.scored, summary.in_flight
    );
    println!(
        "- Push messages → applied={} dropped={}",
        summary.scores_applied, summary.messages_dropped
    );
    println!(
        "- Markers → not interested={} warnings={}",
        summary.not_interested, summary.warnings
    );
    println!("- Action log entries: {}", summary.audit_entries);
}

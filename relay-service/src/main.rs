//! relay service
//!
//! Command-line front end for the workflow engine:
//! - `run` loads a plan file, executes it against the built-in tools and
//!   streams progress events to stdout as JSON lines
//! - `tools` lists the registered tool definitions

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relay_core::config::{get_config, get_config_bool};
use relay_tools::{DispatcherConfig, ToolDispatcher, ToolRegistry};
use relay_workflows::prelude::*;
use relay_workflows::{
    BroadcastProgressSink, EngineConfig, FanoutProgressSink, TracingProgressSink,
};

mod plan_file;

#[derive(Parser, Debug)]
#[command(name = "relay-service")]
#[command(about = "Run tool workflows from plan files")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON (also enabled by RELAY_JSON_LOGS)
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Execute a plan file
    Run {
        /// Path to a JSON or YAML plan
        plan: PathBuf,

        /// Owner the workflow runs on behalf of (default: $RELAY_OWNER or "cli")
        #[arg(long)]
        owner: Option<String>,

        /// Conversation the workflow belongs to
        #[arg(long, default_value = "cli")]
        conversation: String,

        /// Answer to give if the workflow pauses for a decision
        #[arg(long)]
        choice: Option<String>,
    },
    /// List the registered tools
    Tools,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("relay_service=info".parse()?)
        .add_directive("relay_workflows=info".parse()?)
        .add_directive("relay_tools=info".parse()?);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment from /etc/relay/environment (if exists)
    relay_core::config::load_environment();
    init_tracing(args.json_logs || get_config_bool("RELAY_JSON_LOGS", false))?;

    let registry = Arc::new(ToolRegistry::new());
    relay_tools::register_builtin_tools(&registry).await?;
    info!("Initialized Tool Registry");

    match args.command {
        Commands::Tools => {
            let tools = registry.list().await;
            println!("{}", serde_json::to_string_pretty(&tools)?);
            Ok(())
        }
        Commands::Run {
            plan,
            owner,
            conversation,
            choice,
        } => {
            let owner = owner.unwrap_or_else(|| get_config("RELAY_OWNER", "cli"));
            run_plan(registry, plan, owner, conversation, choice).await
        }
    }
}

async fn run_plan(
    registry: Arc<ToolRegistry>,
    path: PathBuf,
    owner: String,
    conversation: String,
    choice: Option<String>,
) -> Result<()> {
    let request = plan_file::load_plan(&path).await?;
    let config = EngineConfig::from_env();

    let broadcast = Arc::new(BroadcastProgressSink::default());
    let sink = FanoutProgressSink::new()
        .with_sink(broadcast.clone())
        .with_sink(Arc::new(TracingProgressSink::new(config.elide_threshold)));

    let printer = {
        let mut rx = broadcast.subscribe();
        let owner = owner.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.owner_id() == owner => match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to encode progress event: {}", e),
                    },
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => warn!("Progress printer skipped {} events", n),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };
    drop(broadcast);

    let dispatcher = ToolDispatcher::new(registry.clone(), DispatcherConfig::from_env());
    let engine = WorkflowEngine::builder(Arc::new(dispatcher))
        .config(config)
        .progress_sink(Arc::new(sink))
        .build();

    let workflow_id = engine.submit_plan(request, &owner, &conversation).await?;
    info!(workflow_id = %workflow_id, plan = %path.display(), "Plan registered");

    let mut summary = engine.execute(&workflow_id).await?;

    if let Some(decision) = summary.pending_decision.clone() {
        match choice {
            Some(choice) => {
                info!(
                    workflow_id = %workflow_id,
                    step_id = %decision.step_id,
                    "Resuming with choice '{}'", choice
                );
                summary = engine
                    .resume_with_decision(
                        &workflow_id,
                        &decision.decision_id,
                        serde_json::Value::String(choice),
                    )
                    .await?;
            }
            None => warn!(
                workflow_id = %workflow_id,
                step_id = %decision.step_id,
                "Workflow is waiting for a decision; pass --choice to answer it"
            ),
        }
    }

    let snapshot = engine.get_status(&workflow_id).await?;
    drop(engine);
    if let Err(e) = printer.await {
        warn!("Progress printer stopped abnormally: {}", e);
    }

    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    let stats = registry.stats().await;
    info!(
        lookups = stats.lookups,
        misses = stats.misses,
        by_tool = ?stats.lookups_by_tool,
        "Tool registry usage"
    );

    if snapshot.status == WorkflowStatus::Failed || snapshot.status == WorkflowStatus::Cancelled {
        bail!(
            "workflow {} {}: {}",
            workflow_id,
            snapshot.status,
            summary.error.unwrap_or_default()
        );
    }
    Ok(())
}

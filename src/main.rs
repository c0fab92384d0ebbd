use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kopilot::agent::{ClaudeTransport, TurnConfig, TurnEngine};
use kopilot::config::Config;
use kopilot::exec::CommandExecutor;
use kopilot::kube::{ContextRegistry, KubectlClient, ResourceBackend};
use kopilot::tui::{App, ViewState};

#[derive(Parser)]
#[command(name = "kopilot")]
#[command(author, version, about = "Kubernetes dashboard with an AI copilot", long_about = None)]
struct Cli {
    /// Namespace to show on startup
    #[arg(short, long)]
    namespace: Option<String>,

    /// Model to use for the copilot (e.g. claude-sonnet-4-20250514)
    #[arg(short, long)]
    model: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long)]
    kubeconfig: Option<String>,

    /// Enable verbose logging (written to the KOPILOT_LOG file)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = Config::load()?;
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(kubeconfig) = cli.kubeconfig {
        config.kubeconfig = kubeconfig;
    }

    let executor = CommandExecutor::new();
    let kubeconfig = (!config.kubeconfig.is_empty()).then(|| config.kubeconfig.clone());
    let client = Arc::new(KubectlClient::new(executor.clone(), kubeconfig));

    let mut info = client.connection_info().await;
    // The active context's namespace wins over the default, but explicit
    // choices (file, env, flag) win over the context.
    if config.namespace == "default" {
        if let Some(namespace) = info.namespace.clone() {
            config.namespace = namespace;
        }
    }
    info.namespace = Some(config.namespace.clone());
    tracing::info!(
        cluster = %info.cluster_name,
        context = %info.context_name,
        namespace = %config.namespace,
        "starting dashboard"
    );

    let transport = Arc::new(ClaudeTransport::new(
        config.anthropic_key.clone(),
        config.model.clone(),
        executor.clone(),
    ));
    let engine = Arc::new(TurnEngine::new(
        transport,
        TurnConfig {
            cluster_name: info.cluster_name.clone(),
            context_name: info.context_name.clone(),
            namespace: config.namespace.clone(),
            model: Some(config.model.clone()),
        },
    ));

    let backend: Arc<dyn ResourceBackend> = client.clone();
    let contexts: Arc<dyn ContextRegistry> = client.clone();
    let app = App::new(
        ViewState::new(config.namespace.clone()),
        engine,
        backend,
        contexts,
        executor,
        info,
    )
    .with_refresh_interval(Duration::from_secs(config.refresh_secs.max(1)))
    .with_copilot_available(!config.anthropic_key.is_empty());

    app.run().await
}

/// The TUI owns the terminal, so logs go to a file (or nowhere).
fn init_logging(verbose: bool) -> Result<()> {
    let Ok(path) = std::env::var("KOPILOT_LOG") else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    let filter = if verbose { "kopilot=debug" } else { "kopilot=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();
    Ok(())
}

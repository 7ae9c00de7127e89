mod cli;
mod clients;
mod config;
mod llm;
mod orchestrator;
mod resolver;
mod server;
mod session;
mod simplify;
mod tools;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use clients::sports::SportsApiClient;
use clients::web_search::build_web_search;
use config::AppConfig;
use orchestrator::Orchestrator;
use server::AppState;
use session::InMemorySessionStore;
use tools::{create_default_registry, ToolRegistry, ToolServices};

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().compact())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();
}

/// Load the config, creating a default file on first run.
fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path,
        None => AppConfig::config_path()?,
    };
    if !path.exists() {
        AppConfig::save_default_to(&path)?;
        eprintln!("[Config] Created default config: {}", path.display());
        eprintln!("[Config] Edit it to set your API keys, model, etc.");
    }
    AppConfig::load_with_env(&path)
}

fn build_registry(config: &AppConfig, tennis_api_key: String) -> Result<(ToolRegistry, ToolServices)> {
    let sports = SportsApiClient::new(&config.tennis_api, tennis_api_key)
        .context("Failed to build the sports data client")?;
    let web = build_web_search(&config.web_search)?;
    let services = ToolServices {
        sports: Arc::new(sports),
        web,
    };
    Ok((create_default_registry(services.clone()), services))
}

fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let (registry, services) = build_registry(config, config.tennis_api_key()?)?;
    let provider = llm::create_provider(&config.llm, config.api_key()?)?;
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        api_base = config.llm.api_base.as_deref().unwrap_or("(default)"),
        tools = registry.len(),
        "orchestrator ready"
    );
    Ok(Orchestrator::new(
        provider,
        Arc::new(registry),
        services.web,
        (&config.llm).into(),
        config.agent.system_prompt.clone(),
    )
    .with_max_turns(config.agent.max_turns as usize))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::InitConfig { force }) = &cli.command {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => AppConfig::config_path()?,
        };
        if path.exists() && !force {
            anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
        }
        AppConfig::save_default_to(&path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = load_config(cli.config.clone())?;
    init_tracing(&config.logging.level);

    match cli.command {
        Some(Commands::Tools) => {
            let key = config.tennis_api_key().unwrap_or_default();
            let (registry, _) = build_registry(&config, key)?;
            print!("{}", cli::render_catalogue(&registry));
        }
        Some(Commands::Ask { query, stream }) => {
            let orchestrator = build_orchestrator(&config)?;
            cli::run_ask(&orchestrator, &query, stream).await?;
        }
        Some(Commands::Serve { host, port }) => {
            serve(&config, host, port).await?;
        }
        Some(Commands::InitConfig { .. }) => {}
        None => serve(&config, None, None).await?,
    }
    Ok(())
}

async fn serve(config: &AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let state = Arc::new(AppState {
        orchestrator,
        sessions: Arc::new(InMemorySessionStore::from_config(&config.session)),
    });
    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port)
    );
    server::serve(state, &addr).await
}

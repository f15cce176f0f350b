//! Toolgate — specification-driven tool gateway.
//!
//! Usage:
//!   toolgate check                 Compile every configured spec, no network
//!   toolgate tools                 Mount all backends and list the catalogue
//!   toolgate chat --prompt "..."   Run one tool-use conversation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use toolgate::agent::{FormatterMap, Session, SessionOptions, SessionOutcome};
use toolgate::config;
use toolgate::dispatch::Dispatcher;
use toolgate::gateway;
use toolgate::model::AnthropicClient;
use toolgate::spec;
use toolgate::tools;

#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(version = "0.1.0")]
#[command(about = "Specification-driven tool gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the gateway config file.
    #[arg(long, default_value = "toolgate.toml")]
    config: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile every configured specification and report, without network I/O.
    Check,

    /// Mount all backends and print the merged tool catalogue.
    Tools,

    /// Run one conversation through the orchestration loop.
    Chat {
        /// The user prompt to answer.
        #[arg(long)]
        prompt: String,

        /// Override the configured turn bound.
        #[arg(long)]
        max_turns: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = PathBuf::from(shellexpand::tilde(&cli.config).into_owned());
    let config = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match cli.command {
        Commands::Check => cmd_check(&config),
        Commands::Tools => cmd_tools(&config),
        Commands::Chat { prompt, max_turns } => cmd_chat(&config, prompt, max_turns).await,
    }
}

fn cmd_check(config: &config::GatewayConfig) -> Result<()> {
    let mut failures = 0;

    for backend in &config.backends {
        let spec_path = config.resolve_path(&backend.spec_path);
        let result = std::fs::read_to_string(&spec_path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", spec_path, e))
            .and_then(|text| spec::compile(&text).map_err(Into::into))
            .and_then(|ops| {
                let mut names = Vec::with_capacity(ops.len());
                for op in &ops {
                    names.push(tools::build_tool(op)?.name);
                }
                Ok(names)
            });

        match result {
            Ok(names) => {
                println!(
                    "{} {} — {} operation(s) compile cleanly",
                    "ok".green().bold(),
                    backend.name,
                    names.len()
                );
                for name in names {
                    println!("     {}", name.dimmed());
                }
            }
            Err(e) => {
                failures += 1;
                println!("{} {} — {}", "err".red().bold(), backend.name, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} specification(s) failed to compile");
    }
    Ok(())
}

fn cmd_tools(config: &config::GatewayConfig) -> Result<()> {
    let (registry, reports) = gateway::build_registry(config)?;

    for report in &reports {
        println!(
            "{} Mounted {} ({} tools)",
            ">>>".green().bold(),
            report.backend,
            report.tools
        );
    }
    println!();
    for tool in registry.list() {
        if tool.description.is_empty() {
            println!("  {}", tool.name.bold());
        } else {
            println!("  {} — {}", tool.name.bold(), tool.description.dimmed());
        }
    }
    println!();
    println!("{} tool(s) registered", registry.len());
    Ok(())
}

async fn cmd_chat(
    config: &config::GatewayConfig,
    prompt: String,
    max_turns: Option<u32>,
) -> Result<()> {
    let (registry, _) = gateway::build_registry(config)?;
    if registry.is_empty() {
        anyhow::bail!("no tools registered; check backend configuration");
    }

    let api_key = gateway::require_env(&config.model.api_key_env)?;
    let model = AnthropicClient::new(
        &config.model.base_url,
        &api_key,
        &config.model.model,
        Duration::from_secs(config.model.timeout_secs),
    )?;

    let registry = Arc::new(registry);
    let catalogue = registry.list().to_vec();
    let dispatcher = Dispatcher::over_http(registry);

    let system_prompt = if config.model.system_prompt.is_empty() {
        None
    } else {
        Some(config.model.system_prompt.clone())
    };
    let session = Session::new(
        Arc::new(model),
        Arc::new(dispatcher),
        catalogue,
        FormatterMap::from_config(&config.formatting),
        SessionOptions {
            system_prompt,
            max_turns: max_turns.unwrap_or(config.model.max_turns).max(1),
            max_tokens: config.model.max_tokens,
        },
    );

    println!("{} {}", "User:".bold(), prompt);

    // Ctrl+C cancels the in-flight call and discards the session.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        } else {
            warn!("Failed to listen for Ctrl+C");
        }
    });

    match session.run(prompt, cancel).await? {
        SessionOutcome::Completed { text, turns } => {
            println!();
            println!("{} {}", "Assistant:".green().bold(), text);
            println!("{}", format!("({turns} turn(s))").dimmed());
        }
        SessionOutcome::Incomplete { turns } => {
            println!();
            println!(
                "{} no final answer after {} turn(s)",
                "Incomplete:".yellow().bold(),
                turns
            );
        }
        SessionOutcome::Cancelled => {
            println!();
            println!("{}", "Session cancelled.".red().bold());
        }
    }

    Ok(())
}

//! Command-line front end.

use crate::commands::{self, LauncherState};
use crate::config::LauncherConfig;
use crate::engine::{catalog, AuthChanged, ChannelSink, PartialResult, SourceOutcome};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "quicklaunch",
    about = "Search GitHub, linux.do, X, Stack Overflow, Reddit and Hacker News in one go",
    version
)]
pub struct Cli {
    /// TOML config file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Keep cookies in memory only
    #[arg(long, global = true)]
    pub no_profile: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Search every source, printing each one as it finishes
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Search a single source
    Single {
        /// Source id (see `sources`)
        source: String,
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Show which sources have a signed-in session
    Status,
    /// Forget the stored session of a source
    Logout { source: String },
    /// List the available sources
    Sources,
    /// Print the default web search URL for a query
    Open {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
}

pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "quicklaunch_lib=debug,info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));

    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose);

    let mut config = LauncherConfig::load(cli.config.as_deref())?;
    if cli.no_profile {
        config.persist_credentials = false;
    }

    match cli.command {
        Commands::Open { query } => {
            let url = commands::submit_search(&query.join(" ")).map_err(anyhow::Error::msg)?;
            println!("{}", url);
            Ok(())
        }
        Commands::Sources => {
            let sources = commands::list_sources();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                for s in sources {
                    let login = if s.search_needs_login { "  (login required)" } else { "" };
                    println!("{:<14} {:<3} {}{}", s.id, s.icon_glyph, s.display_name, login);
                }
            }
            Ok(())
        }
        command => {
            let surfaces = commands::default_surfaces(&config);
            let state = LauncherState::new(&config, surfaces)?
                .with_auth_listener(Arc::new(|e: AuthChanged| debug!(source = %e.source_id, "auth changed")));
            run_stateful(&state, command, cli.json).await
        }
    }
}

async fn run_stateful(state: &LauncherState, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Search { query } => search(state, &query.join(" "), json).await,
        Commands::Single { source, query } => {
            let report = commands::search_single(state, &query.join(" "), &source).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            if let Some(error) = &report.error {
                bail!("{}: {}", source, error);
            }
            if report.needs_login {
                println!("{}: sign in required", source);
            }
            for result in &report.results {
                print_result(result);
            }
            Ok(())
        }
        Commands::Status => {
            let status = commands::auth_status(state);
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                for s in &catalog::SOURCES {
                    let signed_in = status.get(s.id).copied().unwrap_or(false);
                    println!("{:<14} {}", s.id, if signed_in { "signed in" } else { "-" });
                }
            }
            Ok(())
        }
        Commands::Logout { source } => {
            commands::logout(state, &source).map_err(anyhow::Error::msg)?;
            println!("{}: signed out", source);
            Ok(())
        }
        Commands::Open { .. } | Commands::Sources => Ok(()),
    }
}

async fn search(state: &LauncherState, query: &str, json: bool) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<PartialResult>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if !json {
                eprintln!("{}", progress_line(&event));
            }
        }
    });

    let sink = ChannelSink(tx);
    let response = commands::aggregate_search(state, query, &sink).await;
    drop(sink);
    printer.await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    if !response.ok {
        bail!(response.error.unwrap_or_else(|| "search failed".to_string()));
    }

    for s in &catalog::SOURCES {
        let Some(report) = response.results.get(s.id) else {
            continue;
        };
        if report.results.is_empty() {
            continue;
        }
        println!("\n== {} ==", s.display_name);
        for result in &report.results {
            print_result(result);
        }
    }
    Ok(())
}

/// One line per settled source, e.g. `[GH] GitHub: 30+ (12,345 results in total)`.
pub fn progress_line(event: &PartialResult) -> String {
    let (glyph, name) = match catalog::find(&event.source_id) {
        Some(s) => (s.icon_glyph, s.display_name),
        None => ("?", event.source_id.as_str()),
    };
    let status = match &event.outcome {
        SourceOutcome::Ok { .. } => {
            let label = event.outcome.count_label().unwrap_or_default();
            match event.outcome.total_hint() {
                Some(hint) => format!("{} ({})", label, hint),
                None => label,
            }
        }
        SourceOutcome::AuthRequired => "sign in required".to_string(),
        SourceOutcome::Failed { message } => format!("error: {}", message),
    };
    format!("[{}] {}: {}", glyph, name, status)
}

fn print_result(result: &crate::engine::SearchResult) {
    println!("  {}\n    {}", result.title, result.url);
    if !result.snippet.is_empty() {
        println!("    {}", result.snippet);
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oz_core::{HistoryStore, JsonHistoryFile, PersistenceSource, RenderPipeline};

mod clipboard;
mod config;
mod debug_log;
mod page;
mod render;
mod setup;
mod stream;
mod surface;
mod terminal;
mod tui;

use config::{expand_path, Config};
use debug_log::DebugLogger;
use stream::StreamOptions;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: every tick and fragment
    Trace,
    /// Verbose: render passes, session lifecycle, history refreshes
    Debug,
    /// Standard: high-level flow
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "oz")]
#[command(author, version, about = "oz: render, stream and browse assistant answers", long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Record render passes and history operations to file (JSON-lines format)
    #[arg(long)]
    pub trace_file: Option<PathBuf>,

    /// Configuration file (defaults to ~/.config/oz/config.toml)
    #[arg(short, long, env = "OZ_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a markdown answer once
    Render {
        /// Input file (stdin when omitted or "-")
        input: Option<PathBuf>,

        /// Write a standalone HTML page to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print plain text
        #[arg(long, conflicts_with = "output")]
        plain: bool,
    },
    /// Replay an answer as a live generation
    Stream {
        /// Input file (stdin when omitted or "-")
        input: Option<PathBuf>,

        /// Characters per fragment
        #[arg(long, default_value = "12")]
        chunk_size: usize,

        /// Delay between fragments in milliseconds
        #[arg(long, default_value = "30")]
        delay_ms: u64,

        /// Stream into a live HTML page instead of the terminal
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Add the completed answer to the history file
        #[arg(long)]
        record: bool,
    },
    /// Browse the interaction history
    History {
        /// History file (overrides config)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Show current configuration
    Config,
    /// Write a commented configuration file to ~/.config/oz
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The history browser owns the terminal; anything else may log to stderr.
    let will_use_tui =
        matches!(cli.command, Commands::History { .. }) && atty::is(atty::Stream::Stdout);

    // Resolve log level: --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    // Set up logging
    let filter = EnvFilter::new(log_level.as_filter());

    if will_use_tui && cli.log_file.is_none() {
        // TUI mode without log file: suppress all tracing output
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init();
    } else if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::sync::Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Handle setup before config is required
    if matches!(cli.command, Commands::Setup) {
        return setup::run();
    }

    let config = Config::load(cli.config.as_deref())?;

    let logger = match &cli.trace_file {
        Some(path) => Some(Arc::new(DebugLogger::new(path).with_context(|| {
            format!("Failed to create trace file: {}", path.display())
        })?)),
        None => None,
    };

    match cli.command {
        Commands::Render {
            input,
            output,
            plain,
        } => {
            render::run(
                &config,
                input.as_deref(),
                output.as_ref(),
                plain,
                logger.as_deref(),
            )
            .await
        }
        Commands::Stream {
            input,
            chunk_size,
            delay_ms,
            output,
            record,
        } => {
            let options = StreamOptions {
                input,
                chunk_size,
                delay: Duration::from_millis(delay_ms),
                output,
                record,
            };
            stream::run(&config, options, logger.as_deref()).await
        }
        Commands::History { file } => {
            let path = match file {
                Some(file) => expand_path(&file.to_string_lossy()),
                None => config.history_path()?,
            };
            if will_use_tui {
                tui::run_history(&config, path, logger).await
            } else {
                print_history(&config, &path).await
            }
        }
        Commands::Config => show_config(&config),
        Commands::Setup => Ok(()),
    }
}

/// Print the history as plain text when there is no terminal to browse in.
async fn print_history(config: &Config, path: &std::path::Path) -> Result<()> {
    let entries = JsonHistoryFile::new(path)
        .load()
        .await
        .with_context(|| format!("Failed to read history from {}", path.display()))?;

    let mut store = HistoryStore::new(config.history.newest_first);
    store.load(entries);

    let pipeline = RenderPipeline::new(config.render.clone(), Arc::new(oz_core::PlainHighlighter));
    for entry in store.entries().iter().filter(|e| e.is_renderable()) {
        let id = entry.id.as_ref().map(ToString::to_string).unwrap_or_default();
        let when = chrono::DateTime::from_timestamp_millis(entry.timestamp)
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("#{}  {}", id, when);
        println!("{}\n", pipeline.render(entry.text()).plain_text());
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let path = Config::config_path()?;
    println!("# Configuration file: {}", path.display());
    if !path.exists() {
        println!("# (not found, showing defaults; run `oz setup` to create it)");
    }
    println!("# History file: {}", config.history_path()?.display());
    println!();
    let toml = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    print!("{}", toml);
    Ok(())
}

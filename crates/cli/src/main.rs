//! CLI entrypoint and subcommand orchestration.

mod config;
mod serve;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};

#[cfg(not(test))]
use std::sync::Arc;

#[cfg(not(test))]
use anyhow::Context;
#[cfg(not(test))]
use config::Config;
#[cfg(not(test))]
use tracing::{info, warn};
#[cfg(not(test))]
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level command-line arguments for deskhand.
#[derive(Parser)]
#[command(name = "deskhand")]
#[command(about = "Shell, screen and editor tools for computer-use agents", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug logging to ~/.deskhand/logs
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// CLI subcommands available in the application.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Print the descriptor of every registered tool as JSON
    Describe {
        /// Print JSON-schema tool definitions instead
        #[arg(long, default_value_t = false)]
        schemas: bool,
    },

    /// Run a single tool call and print its result
    Run {
        /// Tool name (bash, computer, str_replace_editor)
        #[arg(short, long)]
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Answer JSON-lines tool calls on stdin (default when no subcommand is given)
    Serve,
}

impl Commands {
    fn label(&self) -> &'static str {
        match self {
            Commands::Describe { .. } => "describe",
            Commands::Run { .. } => "run",
            Commands::Serve => "serve",
        }
    }
}

#[cfg(not(test))]
#[tokio::main]
/// Program entrypoint.
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);

    // Logs go to stderr; stdout carries tool results only.
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>;

    let debug_writer = if cli.debug {
        let log_dir = config::home_dir().join("logs");
        std::fs::create_dir_all(&log_dir).ok();
        let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        _file_guard = Some(guard);
        Some(writer)
    } else {
        _file_guard = None;
        None
    };

    match debug_writer {
        Some(writer) => {
            let console = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter);
            let file = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug"));
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .init();
        }
        None => {
            fmt()
                .with_env_filter(console_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }

    if cli.debug {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            command = command.label(),
            log_level = %cli.log_level,
            "========== deskhand session start =========="
        );
    }

    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let registry = Arc::new(runtime::standard_registry(&config.tool_settings()).await?);

    match command {
        Commands::Describe { schemas } => cmd_describe(&registry, schemas),
        Commands::Run { tool, args } => cmd_run(&registry, &tool, &args).await,
        Commands::Serve => cmd_serve(registry).await,
    }
}

#[cfg(not(test))]
/// Prints descriptors, or function-calling definitions with `--schemas`.
fn cmd_describe(registry: &runtime::ToolRegistry, schemas: bool) -> anyhow::Result<()> {
    let json = if schemas {
        serde_json::to_string_pretty(&registry.definitions())?
    } else {
        serde_json::to_string_pretty(&registry.describe())?
    };
    println!("{json}");
    Ok(())
}

#[cfg(not(test))]
/// Runs one tool call and prints the result as JSON.
async fn cmd_run(registry: &runtime::ToolRegistry, tool: &str, args: &str) -> anyhow::Result<()> {
    let arguments: serde_json::Value =
        serde_json::from_str(args).context("--args must be a JSON object")?;
    let result = registry.run(tool, arguments).await;
    if result.is_error() {
        warn!(tool, "Tool call failed");
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(not(test))]
/// Serves JSON-lines calls until stdin closes or Ctrl-C.
async fn cmd_serve(registry: Arc<runtime::ToolRegistry>) -> anyhow::Result<()> {
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    tokio::select! {
        served = serve::serve(registry, input, &mut output) => served,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    }
}

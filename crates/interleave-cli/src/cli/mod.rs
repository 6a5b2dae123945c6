//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use interleave_core::config::{Config, GenerationOptions};

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "interleave")]
#[command(version)]
#[command(about = "Streaming agent with interleaved thinking and tool use")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config.toml (default: $INTERLEAVE_HOME/config.toml)
    #[arg(long, global = true, value_name = "PATH", env = "INTERLEAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Address to bind (overrides [server] host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides [server] port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chat with a running server from the terminal
    Chat {
        /// Server URL (default: http://{server.host}:{server.port})
        #[arg(long)]
        url: Option<String>,

        /// Use the WebSocket endpoint instead of SSE
        #[arg(long)]
        ws: bool,

        /// Override the model
        #[arg(short, long)]
        model: Option<String>,

        /// Override max output tokens
        #[arg(long, value_name = "N")]
        max_tokens: Option<u32>,

        /// Override the thinking budget (0 disables thinking)
        #[arg(long, value_name = "N")]
        thinking_budget: Option<u32>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        // keep the terminal for the conversation
        Commands::Chat { .. } => "warn",
    };
    let _guard = logging::init(cli.log_file.as_deref(), default_level)?;

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load_optional(cli.config.as_ref()).context("load config")?;

    match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config, host, port).await,
        Commands::Chat {
            url,
            ws,
            model,
            max_tokens,
            thinking_budget,
        } => {
            let server = url.unwrap_or_else(|| {
                format!("http://{}:{}", config.server.host, config.server.port)
            });
            commands::chat::run(commands::chat::ChatRunOptions {
                server: &server,
                base_path: &config.server.base_path,
                websocket: ws,
                options: GenerationOptions {
                    model,
                    max_tokens,
                    thinking_budget,
                },
            })
            .await
        }
    }
}

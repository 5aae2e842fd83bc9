//! Stratus MCP Server: entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use stratus_mcp::config::{Overrides, ServerConfig};
use stratus_mcp::protocol::ProtocolHandler;
use stratus_mcp::session::SessionRegistry;
use stratus_mcp::tools::ToolRegistry;
use stratus_mcp::transport::HttpTransport;

#[derive(Parser)]
#[command(
    name = "stratus-mcp",
    about = "MCP server over streamable HTTP with legacy SSE support",
    version
)]
struct Cli {
    /// Path to a TOML config file. Also reads STRATUS_CONFIG.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default).
    Serve {
        /// Listen address (host:port).
        #[arg(long)]
        addr: Option<String>,

        /// Required X-API-Key value.
        /// Also reads from STRATUS_API_KEY env var.
        #[arg(long)]
        api_key: Option<String>,

        /// Allowed Origin header value. Repeatable; none means any origin.
        #[arg(long = "allow-origin")]
        allowed_origins: Vec<String>,

        /// Seconds of stream inactivity before a keepalive comment.
        #[arg(long)]
        keepalive_secs: Option<u64>,

        /// Messages buffered per stream subscriber.
        #[arg(long)]
        queue_capacity: Option<usize>,
    },

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   stratus-mcp completions bash > ~/.local/share/bash-completion/completions/stratus-mcp
    ///   stratus-mcp completions zsh > ~/.zfunc/_stratus-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        addr: None,
        api_key: None,
        allowed_origins: Vec::new(),
        keepalive_secs: None,
        queue_capacity: None,
    }) {
        Commands::Serve {
            addr,
            api_key,
            allowed_origins,
            keepalive_secs,
            queue_capacity,
        } => {
            let config = ServerConfig::load_or_default(cli.config.as_deref())?.apply(Overrides {
                addr,
                api_key,
                allowed_origins,
                keepalive_secs,
                queue_capacity,
            })?;

            tracing::info!("Stratus MCP server");
            if config.api_key.is_some() {
                tracing::info!("Auth: X-API-Key required");
            }
            if !config.allowed_origins.is_empty() {
                tracing::info!("Allowed origins: {}", config.allowed_origins.join(", "));
            }

            let sessions = Arc::new(SessionRegistry::with_queue_capacity(config.queue_capacity));
            let handler = ProtocolHandler::new(sessions);
            let transport = HttpTransport::with_config(&config, handler);
            transport.run(&config.addr).await?;
        }

        Commands::Info => {
            let capabilities = stratus_mcp::types::InitializeResult::default_result();
            let tools = ToolRegistry::with_defaults().list_tools();
            let info = serde_json::json!({
                "server": capabilities.server_info,
                "protocol_version": capabilities.protocol_version,
                "capabilities": capabilities.capabilities,
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "stratus-mcp", &mut std::io::stdout());
        }
    }

    Ok(())
}

pub mod chat;
pub mod config;
pub mod history;
pub mod run;

use clap::{Parser, Subcommand};

/// Parley, a tool-using chat agent.
#[derive(Debug, Parser)]
#[command(name = "parley", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat (default when no subcommand is given).
    Chat {
        /// Conversation key.
        #[arg(long, default_value = "cli:chat")]
        conversation: String,
    },
    /// Send a single message and print the reply.
    Run {
        /// The message to send.
        message: String,
        /// Conversation key.
        #[arg(long, default_value = "cli:run")]
        conversation: String,
        /// Model override for this turn (alias or full identifier).
        #[arg(long)]
        model: Option<String>,
        /// Print the reply and token usage as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print a conversation's stored history.
    History {
        conversation: String,
        /// Print raw JSON turns instead of a transcript.
        #[arg(long)]
        json: bool,
    },
    /// Drop a conversation's history.
    Reset { conversation: String },
    /// Show recent audit log entries, newest first.
    Audit {
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `PARLEY_CONFIG` (or
/// `config.toml` by default). A missing file yields the defaults.
/// Returns the parsed [`Config`] and the path that was used.
///
/// [`Config`]: pl_domain::config::Config
pub fn load_config() -> anyhow::Result<(pl_domain::config::Config, String)> {
    let config_path = std::env::var("PARLEY_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        pl_domain::config::Config::default()
    };

    Ok((config, config_path))
}

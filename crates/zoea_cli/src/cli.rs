//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Swarm of autonomous LLM-driven game agents
#[derive(Parser)]
#[command(name = "zoea", about, version, propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the swarm database (default: ~/.zoea/zoea.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format: text (human-readable) or json (machine-readable)
    #[arg(short, long, global = true, default_value = "text")]
    pub output: OutputFormat,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Colored terminal output for humans
    #[default]
    Text,
    /// Structured JSON for machine consumption
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a mysis
    Create {
        /// Mysis name
        name: String,
        /// Provider to use (anthropic, openai, zai, local)
        #[arg(short, long)]
        provider: String,
        /// Persona prompt stored as the system memory
        #[arg(long)]
        system: Option<String>,
    },
    /// Delete a mysis and its memories
    Delete {
        /// Mysis name or id
        mysis: String,
    },
    /// Start one mysis and run it until Ctrl-C
    Start {
        /// Mysis name or id
        mysis: String,
    },
    /// Mark a mysis stopped and release its account
    Stop {
        /// Mysis name or id
        mysis: String,
    },
    /// List the fleet
    List,
    /// Change a mysis's provider, model or temperature
    Configure {
        /// Mysis name or id
        mysis: String,
        #[arg(short, long)]
        provider: Option<String>,
        #[arg(short, long)]
        model: Option<String>,
        #[arg(short, long)]
        temperature: Option<f64>,
    },
    /// Send a direct message and print the response
    Send {
        /// Mysis name or id
        mysis: String,
        /// Message content
        message: String,
        /// Seconds to wait for the response
        #[arg(long, default_value_t = 120)]
        wait: u64,
    },
    /// Broadcast a message to every mysis
    Broadcast {
        /// Message content
        message: String,
        /// Send as this mysis (excluded from delivery)
        #[arg(long)]
        from: Option<String>,
    },
    /// Stop every mysis and release all accounts
    StopAll,
    /// Run the whole fleet until Ctrl-C, printing events
    Run,
    /// Manage pooled accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand)]
pub enum AccountAction {
    /// Add an account to the pool
    Add { username: String, password: String },
    /// List accounts and their holders
    List,
    /// Release every claim (crash recovery)
    ReleaseAll,
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hookwise::HookEvent;

pub mod dispatch;
pub mod rules;

#[derive(Debug, Parser)]
#[command(name = "hookwise", version, about = "Declarative rule dispatch for agent lifecycle hooks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging (debug level) on stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Rules file path, overriding the resolution chain
    #[arg(long, global = true, value_name = "PATH")]
    pub rules: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Dispatch one hook event; reads the JSON payload from stdin
    Dispatch {
        /// Hook event name: UserPromptSubmit, Stop, or SubagentStop
        event: HookEvent,
    },
    /// Load and summarize the configured rules
    Rules,
}

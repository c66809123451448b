//! Operator tool for the ldaprepl replication protocol
//!
//! Decodes captured PDUs, inspects and generates CSNs and checks
//! replication configuration files.

pub mod commands;

use clap::{Parser, Subcommand};

/// Inspect ldaprepl replication traffic and configuration
#[derive(Parser)]
#[command(name = "ldaprepl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand)]
pub enum Commands {
    /// Decode a hex-encoded replication message
    Decode(commands::decode::DecodeArgs),
    /// Parse or generate change sequence numbers
    Csn(commands::csn::CsnArgs),
    /// Replication configuration files
    Config(commands::config::ConfigArgs),
}

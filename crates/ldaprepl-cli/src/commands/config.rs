use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ldaprepl_core::ReplicationConfig;
use std::path::PathBuf;

use super::OutputContext;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Load and validate a configuration file
    Check {
        /// TOML file
        path: PathBuf,
    },
    /// Print the default configuration as TOML
    Default,
}

pub fn execute(args: ConfigArgs, output: &OutputContext) -> Result<()> {
    match args.command {
        ConfigCommands::Check { path } => check_config(&path, output),
        ConfigCommands::Default => show_default(output),
    }
}

fn check_config(path: &PathBuf, output: &OutputContext) -> Result<()> {
    let config = ReplicationConfig::from_file(path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    if output.json {
        return output.print_json(&config);
    }
    output.print_success(&format!("{} is valid", path.display()));
    if output.verbose {
        println!("Server id:        {}", config.server_id);
        println!("Server URL:       {}", config.server_url);
        println!("Base DN:          {}", config.base_dn);
        println!("Group id:         {}", config.group_id);
        println!("Protocol version: {}", config.max_protocol_version);
        println!("Window size:      {}", config.window_size);
        println!("Heartbeat:        {:?}", config.heartbeat_interval);
        println!(
            "Assured:          {}",
            if config.assured {
                format!("{:?} (level {})", config.assured_mode, config.safe_data_level)
            } else {
                "no".to_string()
            }
        );
    }
    Ok(())
}

fn show_default(output: &OutputContext) -> Result<()> {
    let config = ReplicationConfig::default();
    if output.json {
        return output.print_json(&config);
    }
    print!("{}", render_toml(&config)?);
    Ok(())
}

/// Render a configuration as TOML
pub fn render_toml(config: &ReplicationConfig) -> Result<String> {
    toml::to_string(config).context("Failed to render configuration")
}

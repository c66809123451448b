//! Command implementations

pub mod config;
pub mod csn;
pub mod decode;

use anyhow::Result;
use serde::Serialize;

/// How results are printed
#[derive(Debug, Clone)]
pub struct OutputContext {
    /// Print JSON instead of text
    pub json: bool,
    /// Print extra detail
    pub verbose: bool,
}

impl OutputContext {
    /// Print a value as pretty JSON
    pub fn print_json<T: Serialize>(&self, data: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }

    /// Print a success line
    pub fn print_success(&self, message: &str) {
        if !self.json {
            println!("✓ {}", message);
        }
    }
}

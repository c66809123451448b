use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use ldaprepl_core::{Csn, CsnGenerator};
use serde::Serialize;

use super::OutputContext;

#[derive(Args)]
pub struct CsnArgs {
    #[command(subcommand)]
    pub command: CsnCommands,
}

#[derive(Subcommand)]
pub enum CsnCommands {
    /// Break a CSN into its fields
    Parse {
        /// CSN in its 28 hex digit form
        csn: String,
    },
    /// Generate CSNs from the current clock
    Now {
        /// Replica id to stamp
        #[arg(short, long)]
        replica_id: u16,
        /// Number of CSNs to generate
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
}

/// Fields of a CSN, as printed
#[derive(Debug, Serialize)]
pub struct CsnReport {
    pub csn: String,
    pub timestamp: u64,
    pub time: Option<DateTime<Utc>>,
    pub seqnum: u32,
    pub replica_id: u16,
}

impl From<&Csn> for CsnReport {
    fn from(csn: &Csn) -> Self {
        Self {
            csn: csn.to_string(),
            timestamp: csn.timestamp(),
            time: i64::try_from(csn.timestamp())
                .ok()
                .and_then(DateTime::from_timestamp_millis),
            seqnum: csn.seqnum(),
            replica_id: csn.replica_id(),
        }
    }
}

pub fn execute(args: CsnArgs, output: &OutputContext) -> Result<()> {
    match args.command {
        CsnCommands::Parse { csn } => {
            let csn: Csn = csn
                .trim()
                .parse()
                .with_context(|| format!("'{}' is not a CSN", csn.trim()))?;
            print_reports(&[CsnReport::from(&csn)], output)
        }
        CsnCommands::Now { replica_id, count } => {
            let generator = CsnGenerator::new(replica_id);
            let reports = (0..count)
                .map(|_| generator.new_csn().map(|csn| CsnReport::from(&csn)))
                .collect::<ldaprepl_core::Result<Vec<_>>>()?;
            print_reports(&reports, output)
        }
    }
}

fn print_reports(reports: &[CsnReport], output: &OutputContext) -> Result<()> {
    if output.json {
        return output.print_json(&reports);
    }
    for report in reports {
        if output.verbose {
            let time = report
                .time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "(out of range)".to_string());
            println!("CSN:        {}", report.csn);
            println!("Timestamp:  {} ({})", report.timestamp, time);
            println!("Sequence:   {}", report.seqnum);
            println!("Replica id: {}", report.replica_id);
        } else {
            println!("{}", report.csn);
        }
    }
    Ok(())
}

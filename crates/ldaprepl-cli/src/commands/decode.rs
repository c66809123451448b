use anyhow::{Context, Result, bail};
use clap::Args;
use ldaprepl_core::ProtocolVersion;
use ldaprepl_core::ReplicationMessage;
use ldaprepl_core::session::FrameCodec;
use std::io::Read;

use super::OutputContext;

#[derive(Args)]
pub struct DecodeArgs {
    /// Hex-encoded message, or `-` to read it from stdin
    pub hex: String,

    /// Protocol version the message was sent with
    #[arg(short = 'p', long, default_value_t = ProtocolVersion::CURRENT.as_u8())]
    pub protocol_version: u8,

    /// Input is a full session frame (length, payload, CRC32)
    #[arg(long)]
    pub framed: bool,

    /// Largest frame accepted with --framed
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub max_frame_size: usize,
}

pub fn execute(args: DecodeArgs, output: &OutputContext) -> Result<()> {
    let text = if args.hex == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        args.hex.clone()
    };
    let version = ProtocolVersion::try_from(args.protocol_version)?;
    let bytes = parse_hex(&text)?;
    let payload = if args.framed {
        FrameCodec::new(args.max_frame_size).decode(&bytes)?.to_vec()
    } else {
        bytes
    };
    tracing::debug!("Decoding {} bytes at {}", payload.len(), version);
    let msg = decode_message(&payload, version)?;

    if output.json {
        return output.print_json(&msg);
    }
    println!("{:?} ({} bytes at {})", msg.message_type(version), payload.len(), version);
    if output.verbose {
        println!("{:#?}", msg);
    } else {
        println!("{}", serde_json::to_string_pretty(&msg)?);
    }
    Ok(())
}

/// Parse hex text, ignoring whitespace and an optional `0x` prefix
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let cleaned = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(&cleaned);
    if cleaned.is_empty() {
        bail!("No hex input");
    }
    hex::decode(cleaned).context("Input is not valid hex")
}

/// Decode one message at `version`
pub fn decode_message(bytes: &[u8], version: ProtocolVersion) -> Result<ReplicationMessage> {
    ReplicationMessage::decode_any(bytes, version)
        .with_context(|| format!("Failed to decode {} byte message at {}", bytes.len(), version))
}

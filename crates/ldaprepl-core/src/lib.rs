//! ldaprepl Core - Multi-master LDAP replication protocol
//!
//! This crate provides the message layer of a multi-master directory
//! replication system:
//! - CSNs (change sequence numbers) and the local change clock
//! - ServerState checkpoints (highest CSN seen per replica)
//! - A versioned wire codec (protocol V1 to V8) and a tag dispatcher
//! - Update, acknowledgment, handshake/topology, flow-control, full
//!   resynchronization and monitoring messages
//! - Session plumbing: framing, a single-writer task, windowed flow control
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │      Operation engine (external)            │
//! │  LdapOperation ⇄ LdapUpdate, CsnGenerator   │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │            Message families                  │
//! │ update, ack, handshake, topology, flow,     │
//! │ resync, monitor  ─► ReplicationMessage      │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │        Codec (ProtocolVersion-aware)         │
//! │   ByteWriter / ByteReader, BER, tags        │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │               Session                        │
//! │  frames, SessionWriter task, SessionReader, │
//! │  SendWindow / ReceiveWindow                 │
//! └─────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod csn;
pub mod error;
pub mod ldap;
pub mod operation;
pub mod protocol;
pub mod server_state;
pub mod session;

pub use config::ReplicationConfig;
pub use csn::{Csn, CsnGenerator};
pub use error::{Error, Result};
pub use protocol::{ProtocolVersion, ReplicaId, ReplicationMessage, WireMessage};
pub use server_state::{ServerState, SharedServerState};

//! Full (re)initialization
//!
//! A target asks a source for a copy with `InitializeRequest`; the source
//! announces the transfer with `InitializeTarget`, streams `Entry` chunks and
//! closes with `Done` or `Error`. From V4 the target paces the stream with
//! `InitializeRcvAck` credits.

use crate::protocol::message_type::MessageType;
use crate::protocol::version::{Feature, ProtocolVersion};
use crate::protocol::{ReplicaId, WireMessage, open_message, start_message};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Entries the target accepts before acknowledging, when unspecified
pub const DEFAULT_INIT_WINDOW: i32 = 100;

/// Target asking a source for a full copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeRequestMsg {
    /// Suffix to copy
    pub base_dn: String,
    /// Requesting server
    pub sender_id: ReplicaId,
    /// Server asked for the copy
    pub destination_id: ReplicaId,
    /// Entries sent before waiting for an acknowledgment
    pub init_window: i32,
}

impl InitializeRequestMsg {
    /// Create a request with the default window
    pub fn new(base_dn: impl Into<String>, sender_id: ReplicaId, destination_id: ReplicaId) -> Self {
        Self {
            base_dn: base_dn.into(),
            sender_id,
            destination_id,
            init_window: DEFAULT_INIT_WINDOW,
        }
    }
}

impl WireMessage for InitializeRequestMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::InitializeRequest
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_str(&self.base_dn)?;
        w.put_num(self.sender_id);
        w.put_num(self.destination_id);
        if version.supports(Feature::InitWindow) {
            w.put_num(self.init_window);
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let mut msg = Self::new(r.get_str()?, r.get_num()?, r.get_num()?);
        if version.supports(Feature::InitWindow) {
            msg.init_window = r.get_num()?;
        }
        r.finish()?;
        Ok(msg)
    }
}

/// Source announcing a full copy to a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeTargetMsg {
    /// Suffix being copied
    pub base_dn: String,
    /// Source server
    pub sender_id: ReplicaId,
    /// Server receiving the copy
    pub destination_id: ReplicaId,
    /// Server that asked for the copy
    pub initiator_id: ReplicaId,
    /// Number of entries that will follow
    pub entry_count: i64,
    /// Entries sent before waiting for an acknowledgment
    pub init_window: i32,
}

impl InitializeTargetMsg {
    /// Create an announcement with the default window
    pub fn new(
        base_dn: impl Into<String>,
        sender_id: ReplicaId,
        destination_id: ReplicaId,
        initiator_id: ReplicaId,
        entry_count: i64,
    ) -> Self {
        Self {
            base_dn: base_dn.into(),
            sender_id,
            destination_id,
            initiator_id,
            entry_count,
            init_window: DEFAULT_INIT_WINDOW,
        }
    }
}

impl WireMessage for InitializeTargetMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::InitializeTarget
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_num(self.destination_id);
        w.put_str(&self.base_dn)?;
        w.put_num(self.sender_id);
        w.put_num(self.initiator_id);
        w.put_num(self.entry_count);
        if version.supports(Feature::InitWindow) {
            w.put_num(self.init_window);
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let destination_id = r.get_num()?;
        let base_dn = r.get_str()?;
        let mut msg = Self::new(base_dn, r.get_num()?, destination_id, r.get_num()?, r.get_num()?);
        if version.supports(Feature::InitWindow) {
            msg.init_window = r.get_num()?;
        }
        r.finish()?;
        Ok(msg)
    }
}

/// One entry of a full copy, in LDIF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMsg {
    /// Source server
    pub sender_id: ReplicaId,
    /// Server receiving the copy
    pub destination_id: ReplicaId,
    /// Serialized entry
    pub entry_bytes: Vec<u8>,
    /// Position in the stream, `-1` when the sender does not number entries
    pub msg_id: i32,
}

impl EntryMsg {
    /// Create an entry chunk
    pub fn new(sender_id: ReplicaId, destination_id: ReplicaId, entry_bytes: Vec<u8>, msg_id: i32) -> Self {
        Self {
            sender_id,
            destination_id,
            entry_bytes,
            msg_id,
        }
    }
}

impl WireMessage for EntryMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::Entry
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_num(self.sender_id);
        w.put_num(self.destination_id);
        if version.supports(Feature::EntryMsgId) {
            w.put_num(self.msg_id);
        }
        w.put_slice(&self.entry_bytes);
        w.put_u8(0);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let sender_id = r.get_num()?;
        let destination_id = r.get_num()?;
        let msg_id = if version.supports(Feature::EntryMsgId) {
            r.get_num()?
        } else {
            -1
        };
        let entry_bytes = match r.get_rest().split_last() {
            Some((&0, entry)) => entry.to_vec(),
            _ => return Err(Error::malformed("entry bytes are not NUL-terminated")),
        };
        Ok(Self::new(sender_id, destination_id, entry_bytes, msg_id))
    }
}

/// End of a full copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneMsg {
    /// Source server
    pub sender_id: ReplicaId,
    /// Server that received the copy
    pub destination_id: ReplicaId,
}

impl WireMessage for DoneMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::Done
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_num(self.sender_id);
        w.put_num(self.destination_id);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let msg = Self {
            sender_id: r.get_num()?,
            destination_id: r.get_num()?,
        };
        r.finish()?;
        Ok(msg)
    }
}

/// Failure report, mostly of a full copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMsg {
    /// Reporting server
    pub sender_id: ReplicaId,
    /// Server the report is for
    pub destination_id: ReplicaId,
    /// Message id of the error
    pub msg_id: i64,
    /// Human readable details
    pub details: String,
    /// Creation time in milliseconds, `0` when the sender does not send it
    pub creation_time: i64,
}

impl ErrorMsg {
    /// Create an error report stamped with the current time
    pub fn new(
        sender_id: ReplicaId,
        destination_id: ReplicaId,
        msg_id: i64,
        details: impl Into<String>,
    ) -> Self {
        Self {
            sender_id,
            destination_id,
            msg_id,
            details: details.into(),
            creation_time: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl WireMessage for ErrorMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::Error
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_num(self.sender_id);
        w.put_num(self.destination_id);
        w.put_num(self.msg_id);
        w.put_str(&self.details)?;
        if version.supports(Feature::ErrorCreationTime) {
            w.put_num(self.creation_time);
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let msg = Self {
            sender_id: r.get_num()?,
            destination_id: r.get_num()?,
            msg_id: r.get_num()?,
            details: r.get_str()?,
            creation_time: if version.supports(Feature::ErrorCreationTime) {
                r.get_num()?
            } else {
                0
            },
        };
        r.finish()?;
        Ok(msg)
    }
}

/// New generation id, starting a new synchronization epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetGenerationIdMsg {
    /// Generation id every participant must adopt
    pub generation_id: i64,
}

impl WireMessage for ResetGenerationIdMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::ResetGenerationId
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_num(self.generation_id);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let msg = Self {
            generation_id: r.get_num()?,
        };
        r.finish()?;
        Ok(msg)
    }
}

/// Credit replenishing the source's full-copy window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeRcvAckMsg {
    /// Target server
    pub sender_id: ReplicaId,
    /// Source server
    pub destination_id: ReplicaId,
    /// Number of the last entry processed
    pub num_ack: i32,
}

impl WireMessage for InitializeRcvAckMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::InitializeRcvAck
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_num(self.sender_id);
        w.put_num(self.destination_id);
        w.put_num(self.num_ack);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let msg = Self {
            sender_id: r.get_num()?,
            destination_id: r.get_num()?,
            num_ack: r.get_num()?,
        };
        r.finish()?;
        Ok(msg)
    }
}

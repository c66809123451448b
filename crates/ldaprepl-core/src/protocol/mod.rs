//! Replication wire protocol
//!
//! ```text
//!  inbound bytes ──► ReplicationMessage::decode_any(bytes, version)
//!                        │ tag byte ─► MessageType ─► check_version
//!                        ▼
//!                    <Msg as WireMessage>::decode ─► typed message
//!
//!  typed message ──► WireMessage::encode(version) ──► [tag][body]
//! ```
//!
//! The version is fixed once per session by the handshake and passed to
//! every encode and decode call. Fields a version does not carry are left
//! out when encoding and take their default when decoding.

pub mod ber;
pub mod codec;
pub mod message_type;
pub mod messages;
pub mod version;

pub use codec::{ByteReader, ByteWriter};
pub use message_type::MessageType;
pub use messages::*;
pub use version::{Feature, ProtocolVersion};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Server identifier as carried by control messages
///
/// CSNs hold the replica id of the change's origin as a `u16`; control
/// messages carry decimal ids that may be negative.
pub type ReplicaId = i32;

/// A message with a version-aware wire form
pub trait WireMessage: Sized {
    /// Tag written when encoding at `version`
    fn message_type(version: ProtocolVersion) -> MessageType;

    /// Encode for a session speaking `version`
    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>>;

    /// Decode bytes received on a session speaking `version`
    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self>;
}

/// Writer primed with the tag of `M`, refusing versions that predate it
pub(crate) fn start_message<M: WireMessage>(version: ProtocolVersion) -> Result<ByteWriter> {
    let kind = M::message_type(version);
    if let Some(feature) = kind.feature() {
        version.require(feature)?;
    }
    Ok(ByteWriter::with_tag(kind.as_u8()))
}

/// Reader positioned after the tag of `M`
pub(crate) fn open_message<M: WireMessage>(bytes: &[u8], version: ProtocolVersion) -> Result<ByteReader<'_>> {
    let kind = M::message_type(version);
    kind.check_version(version)?;
    ByteReader::expect_tag(bytes, kind.as_u8())
}

/// Every replication message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// Add, modify, delete or modify-DN
    Update(LdapUpdate),
    /// Opaque update
    GenericUpdate(GenericUpdateMsg),
    /// Assured replication acknowledgment
    Ack(AckMsg),
    /// Directory server start
    ServerStart(ServerStartMsg),
    /// Replication server start
    ReplServerStart(ReplServerStartMsg),
    /// Session start after the handshake
    StartSession(StartSessionMsg),
    /// Status change request or notification
    ChangeStatus(ChangeStatusMsg),
    /// Graceful session end
    Stop(StopMsg),
    /// Topology report
    Topology(TopologyMsg),
    /// Flow-control credit
    Window(WindowMsg),
    /// Request for a window message
    WindowProbe(WindowProbeMsg),
    /// Liveness heartbeat
    Heartbeat(HeartbeatMsg),
    /// Heartbeat carrying the sender's latest CSN
    ChangeTimeHeartbeat(ChangeTimeHeartbeatMsg),
    /// Replica leaving the topology
    ReplicaOffline(ReplicaOfflineMsg),
    /// Full initialization request
    InitializeRequest(InitializeRequestMsg),
    /// Full initialization announcement
    InitializeTarget(InitializeTargetMsg),
    /// One entry of a full initialization
    Entry(EntryMsg),
    /// End of a full initialization
    Done(DoneMsg),
    /// Error report
    Error(ErrorMsg),
    /// New generation id
    ResetGenerationId(ResetGenerationIdMsg),
    /// Full initialization flow-control credit
    InitializeRcvAck(InitializeRcvAckMsg),
    /// Monitoring request
    MonitorRequest(MonitorRequestMsg),
    /// Monitoring report
    Monitor(MonitorMsg),
}

macro_rules! dispatch {
    ($self:expr, $msg:ident => $body:expr) => {
        match $self {
            ReplicationMessage::Update($msg) => $body,
            ReplicationMessage::GenericUpdate($msg) => $body,
            ReplicationMessage::Ack($msg) => $body,
            ReplicationMessage::ServerStart($msg) => $body,
            ReplicationMessage::ReplServerStart($msg) => $body,
            ReplicationMessage::StartSession($msg) => $body,
            ReplicationMessage::ChangeStatus($msg) => $body,
            ReplicationMessage::Stop($msg) => $body,
            ReplicationMessage::Topology($msg) => $body,
            ReplicationMessage::Window($msg) => $body,
            ReplicationMessage::WindowProbe($msg) => $body,
            ReplicationMessage::Heartbeat($msg) => $body,
            ReplicationMessage::ChangeTimeHeartbeat($msg) => $body,
            ReplicationMessage::ReplicaOffline($msg) => $body,
            ReplicationMessage::InitializeRequest($msg) => $body,
            ReplicationMessage::InitializeTarget($msg) => $body,
            ReplicationMessage::Entry($msg) => $body,
            ReplicationMessage::Done($msg) => $body,
            ReplicationMessage::Error($msg) => $body,
            ReplicationMessage::ResetGenerationId($msg) => $body,
            ReplicationMessage::InitializeRcvAck($msg) => $body,
            ReplicationMessage::MonitorRequest($msg) => $body,
            ReplicationMessage::Monitor($msg) => $body,
        }
    };
}

impl ReplicationMessage {
    /// Decode any message received on a session speaking `version`
    ///
    /// Unknown tags, tags the version does not carry and malformed bodies
    /// are all errors; nothing is skipped.
    pub fn decode_any(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let tag = *bytes.first().ok_or_else(|| Error::malformed("empty message"))?;
        let kind = MessageType::try_from(tag)?;
        kind.check_version(version)?;
        let result = Self::decode_kind(kind, bytes, version);
        if let Err(e) = &result {
            tracing::warn!(
                "Rejected {:?} message at {} ({} bytes, head {}): {}",
                kind,
                version,
                bytes.len(),
                hex::encode(&bytes[..bytes.len().min(32)]),
                e
            );
        }
        result
    }

    fn decode_kind(kind: MessageType, bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        Ok(match kind {
            MessageType::AddV1 | MessageType::Add => Self::Update(LdapUpdate::Add(AddMsg::decode(bytes, version)?)),
            MessageType::ModifyV1 | MessageType::Modify => {
                Self::Update(LdapUpdate::Modify(ModifyMsg::decode(bytes, version)?))
            }
            MessageType::DeleteV1 | MessageType::Delete => {
                Self::Update(LdapUpdate::Delete(DeleteMsg::decode(bytes, version)?))
            }
            MessageType::ModifyDnV1 | MessageType::ModifyDn => {
                Self::Update(LdapUpdate::ModifyDn(ModifyDnMsg::decode(bytes, version)?))
            }
            MessageType::GenericUpdate => Self::GenericUpdate(GenericUpdateMsg::decode(bytes, version)?),
            MessageType::Ack => Self::Ack(AckMsg::decode(bytes, version)?),
            MessageType::ServerStartV1 | MessageType::ServerStart => {
                Self::ServerStart(ServerStartMsg::decode(bytes, version)?)
            }
            MessageType::ReplServerStartV1 | MessageType::ReplServerStart => {
                Self::ReplServerStart(ReplServerStartMsg::decode(bytes, version)?)
            }
            MessageType::StartSession => Self::StartSession(StartSessionMsg::decode(bytes, version)?),
            MessageType::ChangeStatus => Self::ChangeStatus(ChangeStatusMsg::decode(bytes, version)?),
            MessageType::Stop => Self::Stop(StopMsg::decode(bytes, version)?),
            MessageType::Topology => Self::Topology(TopologyMsg::decode(bytes, version)?),
            MessageType::Window => Self::Window(WindowMsg::decode(bytes, version)?),
            MessageType::WindowProbe => Self::WindowProbe(WindowProbeMsg::decode(bytes, version)?),
            MessageType::Heartbeat => Self::Heartbeat(HeartbeatMsg::decode(bytes, version)?),
            MessageType::ChangeTimeHeartbeat => {
                Self::ChangeTimeHeartbeat(ChangeTimeHeartbeatMsg::decode(bytes, version)?)
            }
            MessageType::ReplicaOffline => Self::ReplicaOffline(ReplicaOfflineMsg::decode(bytes, version)?),
            MessageType::InitializeRequest => {
                Self::InitializeRequest(InitializeRequestMsg::decode(bytes, version)?)
            }
            MessageType::InitializeTarget => Self::InitializeTarget(InitializeTargetMsg::decode(bytes, version)?),
            MessageType::Entry => Self::Entry(EntryMsg::decode(bytes, version)?),
            MessageType::Done => Self::Done(DoneMsg::decode(bytes, version)?),
            MessageType::Error => Self::Error(ErrorMsg::decode(bytes, version)?),
            MessageType::ResetGenerationId => {
                Self::ResetGenerationId(ResetGenerationIdMsg::decode(bytes, version)?)
            }
            MessageType::InitializeRcvAck => Self::InitializeRcvAck(InitializeRcvAckMsg::decode(bytes, version)?),
            MessageType::MonitorRequest => Self::MonitorRequest(MonitorRequestMsg::decode(bytes, version)?),
            MessageType::Monitor => Self::Monitor(MonitorMsg::decode(bytes, version)?),
        })
    }

    /// Encode for a session speaking `version`
    pub fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        dispatch!(self, msg => msg.encode(version))
    }

    /// Tag written when encoding at `version`
    pub fn message_type(&self, version: ProtocolVersion) -> MessageType {
        match self {
            Self::Update(update) => update.message_type(version),
            Self::GenericUpdate(_) => GenericUpdateMsg::message_type(version),
            Self::Ack(_) => AckMsg::message_type(version),
            Self::ServerStart(_) => ServerStartMsg::message_type(version),
            Self::ReplServerStart(_) => ReplServerStartMsg::message_type(version),
            Self::StartSession(_) => StartSessionMsg::message_type(version),
            Self::ChangeStatus(_) => ChangeStatusMsg::message_type(version),
            Self::Stop(_) => StopMsg::message_type(version),
            Self::Topology(_) => TopologyMsg::message_type(version),
            Self::Window(_) => WindowMsg::message_type(version),
            Self::WindowProbe(_) => WindowProbeMsg::message_type(version),
            Self::Heartbeat(_) => HeartbeatMsg::message_type(version),
            Self::ChangeTimeHeartbeat(_) => ChangeTimeHeartbeatMsg::message_type(version),
            Self::ReplicaOffline(_) => ReplicaOfflineMsg::message_type(version),
            Self::InitializeRequest(_) => InitializeRequestMsg::message_type(version),
            Self::InitializeTarget(_) => InitializeTargetMsg::message_type(version),
            Self::Entry(_) => EntryMsg::message_type(version),
            Self::Done(_) => DoneMsg::message_type(version),
            Self::Error(_) => ErrorMsg::message_type(version),
            Self::ResetGenerationId(_) => ResetGenerationIdMsg::message_type(version),
            Self::InitializeRcvAck(_) => InitializeRcvAckMsg::message_type(version),
            Self::MonitorRequest(_) => MonitorRequestMsg::message_type(version),
            Self::Monitor(_) => MonitorMsg::message_type(version),
        }
    }

    /// Oldest version carrying this message
    pub fn min_version(&self) -> ProtocolVersion {
        // Updates and start messages fall back to their V1 tags
        self.message_type(ProtocolVersion::V1).min_version()
    }

    /// True for add, modify, delete, modify-DN and generic updates
    pub fn is_update(&self) -> bool {
        matches!(self, Self::Update(_) | Self::GenericUpdate(_))
    }
}

macro_rules! from_message {
    ($($variant:ident($msg:ty)),* $(,)?) => {
        $(
            impl From<$msg> for ReplicationMessage {
                fn from(msg: $msg) -> Self {
                    Self::$variant(msg)
                }
            }
        )*
    };
}

from_message!(
    Update(LdapUpdate),
    GenericUpdate(GenericUpdateMsg),
    Ack(AckMsg),
    ServerStart(ServerStartMsg),
    ReplServerStart(ReplServerStartMsg),
    StartSession(StartSessionMsg),
    ChangeStatus(ChangeStatusMsg),
    Stop(StopMsg),
    Topology(TopologyMsg),
    Window(WindowMsg),
    WindowProbe(WindowProbeMsg),
    Heartbeat(HeartbeatMsg),
    ChangeTimeHeartbeat(ChangeTimeHeartbeatMsg),
    ReplicaOffline(ReplicaOfflineMsg),
    InitializeRequest(InitializeRequestMsg),
    InitializeTarget(InitializeTargetMsg),
    Entry(EntryMsg),
    Done(DoneMsg),
    Error(ErrorMsg),
    ResetGenerationId(ResetGenerationIdMsg),
    InitializeRcvAck(InitializeRcvAckMsg),
    MonitorRequest(MonitorRequestMsg),
    Monitor(MonitorMsg),
);

impl From<AddMsg> for ReplicationMessage {
    fn from(msg: AddMsg) -> Self {
        Self::Update(LdapUpdate::Add(msg))
    }
}

impl From<ModifyMsg> for ReplicationMessage {
    fn from(msg: ModifyMsg) -> Self {
        Self::Update(LdapUpdate::Modify(msg))
    }
}

impl From<DeleteMsg> for ReplicationMessage {
    fn from(msg: DeleteMsg) -> Self {
        Self::Update(LdapUpdate::Delete(msg))
    }
}

impl From<ModifyDnMsg> for ReplicationMessage {
    fn from(msg: ModifyDnMsg) -> Self {
        Self::Update(LdapUpdate::ModifyDn(msg))
    }
}

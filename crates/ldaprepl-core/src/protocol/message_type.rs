//! Message type tags

use crate::protocol::version::{Feature, ProtocolVersion};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Leading byte of every replication message
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Modify update, first protocol revision
    ModifyV1 = 1,
    /// Add update, first protocol revision
    AddV1 = 2,
    /// Delete update, first protocol revision
    DeleteV1 = 3,
    /// Modify-DN update, first protocol revision
    ModifyDnV1 = 4,
    /// Assured replication acknowledgment
    Ack = 5,
    /// Directory server start, first protocol revision
    ServerStartV1 = 6,
    /// Replication server start, first protocol revision
    ReplServerStartV1 = 7,
    /// Flow-control credit
    Window = 8,
    /// Full initialization request
    InitializeRequest = 10,
    /// Full initialization announcement
    InitializeTarget = 11,
    /// One entry of a full initialization
    Entry = 12,
    /// End of a full initialization
    Done = 13,
    /// Error report
    Error = 14,
    /// Request for a window message
    WindowProbe = 15,
    /// New generation id
    ResetGenerationId = 17,
    /// Monitoring request
    MonitorRequest = 18,
    /// Monitoring report
    Monitor = 19,
    /// Directory server start
    ServerStart = 20,
    /// Replication server start
    ReplServerStart = 21,
    /// Modify update
    Modify = 22,
    /// Add update
    Add = 23,
    /// Delete update
    Delete = 24,
    /// Modify-DN update
    ModifyDn = 25,
    /// Topology report
    Topology = 26,
    /// Session start after the handshake
    StartSession = 27,
    /// Status change request or notification
    ChangeStatus = 28,
    /// Opaque update
    GenericUpdate = 29,
    /// Liveness heartbeat
    Heartbeat = 30,
    /// Heartbeat carrying the sender's latest CSN
    ChangeTimeHeartbeat = 34,
    /// Graceful session end
    Stop = 36,
    /// Full initialization flow-control credit
    InitializeRcvAck = 37,
    /// Replica leaving the topology
    ReplicaOffline = 38,
}

impl MessageType {
    /// Wire byte
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Version-gated feature that introduced this message kind
    pub const fn feature(self) -> Option<Feature> {
        match self {
            Self::Modify | Self::Add | Self::Delete | Self::ModifyDn => {
                Some(Feature::AssuredUpdateHeader)
            }
            Self::Topology
            | Self::StartSession
            | Self::ChangeStatus
            | Self::MonitorRequest
            | Self::Monitor => Some(Feature::TopologyMessages),
            Self::ChangeTimeHeartbeat | Self::GenericUpdate => Some(Feature::ChangeTimeHeartbeat),
            Self::Stop | Self::InitializeRcvAck => Some(Feature::SessionStop),
            Self::ReplicaOffline => Some(Feature::ReplicaOffline),
            _ => None,
        }
    }

    /// Oldest version carrying this message kind
    pub const fn min_version(self) -> ProtocolVersion {
        match self.feature() {
            Some(feature) => feature.introduced_in(),
            None => ProtocolVersion::V1,
        }
    }

    /// Newest version carrying this message kind, for tags that were retired
    pub fn max_version(self) -> Option<ProtocolVersion> {
        match self {
            Self::ModifyV1 | Self::AddV1 | Self::DeleteV1 | Self::ModifyDnV1 => {
                Some(ProtocolVersion::V1)
            }
            _ => None,
        }
    }

    /// Start messages carry their own version and travel before negotiation
    pub fn is_self_describing(self) -> bool {
        matches!(
            self,
            Self::ServerStartV1 | Self::ReplServerStartV1 | Self::ServerStart | Self::ReplServerStart
        )
    }

    /// Check that this tag may appear on a session speaking `version`
    pub fn check_version(self, version: ProtocolVersion) -> Result<()> {
        if self.is_self_describing() {
            return Ok(());
        }
        let too_old = version < self.min_version();
        let too_new = self.max_version().is_some_and(|max| version > max);
        if too_old || too_new {
            return Err(Error::version_mismatch(format!(
                "message type {:?} ({}) is not valid at protocol {}",
                self,
                self.as_u8(),
                version
            )));
        }
        Ok(())
    }
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::ModifyV1,
            2 => Self::AddV1,
            3 => Self::DeleteV1,
            4 => Self::ModifyDnV1,
            5 => Self::Ack,
            6 => Self::ServerStartV1,
            7 => Self::ReplServerStartV1,
            8 => Self::Window,
            10 => Self::InitializeRequest,
            11 => Self::InitializeTarget,
            12 => Self::Entry,
            13 => Self::Done,
            14 => MessageType::Error,
            15 => Self::WindowProbe,
            17 => Self::ResetGenerationId,
            18 => Self::MonitorRequest,
            19 => Self::Monitor,
            20 => Self::ServerStart,
            21 => Self::ReplServerStart,
            22 => Self::Modify,
            23 => Self::Add,
            24 => Self::Delete,
            25 => Self::ModifyDn,
            26 => Self::Topology,
            27 => Self::StartSession,
            28 => Self::ChangeStatus,
            29 => Self::GenericUpdate,
            30 => Self::Heartbeat,
            34 => Self::ChangeTimeHeartbeat,
            36 => Self::Stop,
            37 => Self::InitializeRcvAck,
            38 => Self::ReplicaOffline,
            other => return Err(Error::UnknownMessageType(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for tag in 0..=u8::MAX {
            if let Ok(kind) = MessageType::try_from(tag) {
                assert_eq!(kind.as_u8(), tag);
            }
        }
        assert!(matches!(
            MessageType::try_from(9),
            Err(Error::UnknownMessageType(9))
        ));
        assert!(MessageType::try_from(0).is_err());
    }

    #[test]
    fn test_version_window() {
        assert!(MessageType::ModifyV1.check_version(ProtocolVersion::V1).is_ok());
        assert!(MessageType::ModifyV1.check_version(ProtocolVersion::V2).is_err());
        assert!(MessageType::Modify.check_version(ProtocolVersion::V1).is_err());
        assert!(MessageType::Stop.check_version(ProtocolVersion::V3).is_err());
        assert!(MessageType::ReplicaOffline.check_version(ProtocolVersion::V8).is_ok());
        assert!(MessageType::ServerStart.check_version(ProtocolVersion::V1).is_ok());
    }

    #[test]
    fn test_min_version_follows_feature_table() {
        for tag in 0..=u8::MAX {
            let Ok(kind) = MessageType::try_from(tag) else {
                continue;
            };
            let Some(feature) = kind.feature() else {
                assert_eq!(kind.min_version(), ProtocolVersion::V1, "{:?}", kind);
                continue;
            };
            assert_eq!(kind.min_version(), feature.introduced_in(), "{:?}", kind);
            let before = ProtocolVersion::try_from(kind.min_version().as_u8() - 1).unwrap();
            assert!(before.require(feature).is_err());
            assert!(kind.check_version(before).is_err(), "{:?} at {}", kind, before);
            assert!(kind.check_version(kind.min_version()).is_ok());
        }
        assert_eq!(MessageType::GenericUpdate.min_version(), ProtocolVersion::V3);
        assert_eq!(MessageType::InitializeRcvAck.min_version(), ProtocolVersion::V4);
        assert_eq!(MessageType::ReplicaOffline.min_version(), ProtocolVersion::V8);
    }
}

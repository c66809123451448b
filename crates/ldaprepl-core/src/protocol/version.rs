//! Protocol versions and the field-presence table
//!
//! Every field or message added after the first revision is listed in
//! [`Feature`]. Encoders and decoders ask `version.supports(Feature::X)`
//! instead of comparing raw numbers, and message tags map to the feature
//! that introduced them, so the "what exists at version N" knowledge lives
//! in [`Feature::introduced_in`] alone.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Negotiated replication protocol revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ProtocolVersion(u8);

impl ProtocolVersion {
    /// First revision
    pub const V1: Self = Self(1);
    /// Assured replication, topology and monitoring
    pub const V2: Self = Self(2);
    /// Change-time heartbeat, generic updates
    pub const V3: Self = Self(3);
    /// External change log and full-init flow control
    pub const V4: Self = Self(4);
    /// ECL attributes for deletes
    pub const V5: Self = Self(5);
    /// URLs and protocol versions in topology
    pub const V6: Self = Self(6);
    /// Binary CSN in change-time heartbeat
    pub const V7: Self = Self(7);
    /// Replica offline announcements
    pub const V8: Self = Self(8);

    /// Version spoken by this implementation
    pub const CURRENT: Self = Self::V8;

    /// Every known version, oldest first
    pub const ALL: [Self; 8] = [
        Self::V1,
        Self::V2,
        Self::V3,
        Self::V4,
        Self::V5,
        Self::V6,
        Self::V7,
        Self::V8,
    ];

    /// Wire byte
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Version both peers understand
    pub fn negotiate(local: Self, remote: Self) -> Self {
        local.min(remote)
    }

    /// Whether `feature` is present on the wire at this version
    pub fn supports(self, feature: Feature) -> bool {
        self >= feature.introduced_in()
    }

    /// Error out unless `feature` is present at this version
    pub fn require(self, feature: Feature) -> Result<()> {
        if self.supports(feature) {
            Ok(())
        } else {
            Err(Error::UnsupportedVersion(self.0))
        }
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        if (Self::V1.0..=Self::CURRENT.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::UnsupportedVersion(value))
        }
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(version: ProtocolVersion) -> Self {
        version.0
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

/// Version-gated fields and messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// V2 update tags with version byte, assured mode and safe data level
    AssuredUpdateHeader,
    /// Group id in start messages
    GroupId,
    /// Degraded status threshold in replication-server start
    DegradedStatusThreshold,
    /// Modification list carried by modify-DN
    ModifyDnModifications,
    /// Timeout, wrong status and replay error flags in acks
    AckErrorInfo,
    /// Topology, start-session, change-status and monitoring messages
    TopologyMessages,
    /// Change-time heartbeat and generic update messages
    ChangeTimeHeartbeat,
    /// ECL attributes on update messages and in start-session/DSInfo
    EclIncludes,
    /// Weight of a replication server in RSInfo
    RsWeight,
    /// Sequence number of entry messages
    EntryMsgId,
    /// Creation time of error messages
    ErrorCreationTime,
    /// Window size of full initialization
    InitWindow,
    /// Stop and initialization receive-ack messages
    SessionStop,
    /// Initiator name and subtree flag of deletes
    DeleteInitiator,
    /// ECL attributes for deletes
    EclIncludesForDeletes,
    /// URL and protocol version in DSInfo, URL in RSInfo
    TopologyUrls,
    /// CSN carried in binary form by change-time heartbeats
    BinaryHeartbeatCsn,
    /// Replica offline message
    ReplicaOffline,
}

impl Feature {
    /// First version carrying the feature
    pub const fn introduced_in(self) -> ProtocolVersion {
        match self {
            Feature::AssuredUpdateHeader
            | Feature::GroupId
            | Feature::DegradedStatusThreshold
            | Feature::ModifyDnModifications
            | Feature::AckErrorInfo
            | Feature::TopologyMessages => ProtocolVersion::V2,
            Feature::ChangeTimeHeartbeat => ProtocolVersion::V3,
            Feature::EclIncludes
            | Feature::RsWeight
            | Feature::EntryMsgId
            | Feature::ErrorCreationTime
            | Feature::InitWindow
            | Feature::SessionStop
            | Feature::DeleteInitiator => ProtocolVersion::V4,
            Feature::EclIncludesForDeletes => ProtocolVersion::V5,
            Feature::TopologyUrls => ProtocolVersion::V6,
            Feature::BinaryHeartbeatCsn => ProtocolVersion::V7,
            Feature::ReplicaOffline => ProtocolVersion::V8,
        }
    }
}

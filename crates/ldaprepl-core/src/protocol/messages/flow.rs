//! Flow control and liveness

use crate::csn::Csn;
use crate::protocol::message_type::MessageType;
use crate::protocol::version::{Feature, ProtocolVersion};
use crate::protocol::{WireMessage, open_message, start_message};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Credit replenishing the peer's send window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMsg {
    num_ack: i32,
}

impl WindowMsg {
    /// Grant `num_ack` more in-flight updates
    pub fn new(num_ack: i32) -> Self {
        Self { num_ack }
    }

    /// Credits granted
    pub fn num_ack(&self) -> i32 {
        self.num_ack
    }
}

impl WireMessage for WindowMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::Window
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_num(self.num_ack);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let msg = Self::new(r.get_num()?);
        r.finish()?;
        Ok(msg)
    }
}

macro_rules! empty_message {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
        pub struct $name;

        impl WireMessage for $name {
            fn message_type(_version: ProtocolVersion) -> MessageType {
                $kind
            }

            fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
                Ok(start_message::<Self>(version)?.finish())
            }

            fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
                open_message::<Self>(bytes, version)?.finish()?;
                Ok(Self)
            }
        }
    };
}

empty_message!(
    /// Asks the peer for a window message
    WindowProbeMsg,
    MessageType::WindowProbe
);

empty_message!(
    /// Liveness ping
    HeartbeatMsg,
    MessageType::Heartbeat
);

/// Heartbeat carrying the sender's latest CSN
///
/// Lets quiet replicas advance their peers' view of how far they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTimeHeartbeatMsg {
    csn: Csn,
}

impl ChangeTimeHeartbeatMsg {
    /// Create a change-time heartbeat
    pub fn new(csn: Csn) -> Self {
        Self { csn }
    }

    /// Latest CSN of the sender
    pub fn csn(&self) -> Csn {
        self.csn
    }
}

impl WireMessage for ChangeTimeHeartbeatMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::ChangeTimeHeartbeat
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        if version.supports(Feature::BinaryHeartbeatCsn) {
            w.put_csn_bytes(&self.csn);
        } else {
            w.put_csn(&self.csn);
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let csn = if version.supports(Feature::BinaryHeartbeatCsn) {
            r.get_csn_bytes()?
        } else {
            r.get_csn()?
        };
        r.finish()?;
        Ok(Self { csn })
    }
}

/// Replica leaving the topology, stamped with its last CSN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaOfflineMsg {
    csn: Csn,
}

impl ReplicaOfflineMsg {
    /// Create a replica-offline message
    pub fn new(csn: Csn) -> Self {
        Self { csn }
    }

    /// Last CSN produced by the departing replica
    pub fn csn(&self) -> Csn {
        self.csn
    }

    /// Id of the departing replica
    pub fn replica_id(&self) -> u16 {
        self.csn.replica_id()
    }
}

impl WireMessage for ReplicaOfflineMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::ReplicaOffline
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_csn_bytes(&self.csn);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let csn = r.get_csn_bytes()?;
        r.finish()?;
        Ok(Self { csn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window() {
        let bytes = WindowMsg::new(100).encode(ProtocolVersion::V1).unwrap();
        assert_eq!(bytes, b"\x08100\0".to_vec());
        assert_eq!(WindowMsg::decode(&bytes, ProtocolVersion::V1).unwrap().num_ack(), 100);
        assert!(WindowMsg::decode(b"\x08100", ProtocolVersion::V1).is_err());
    }

    #[test]
    fn test_empty_bodies() {
        assert_eq!(HeartbeatMsg.encode(ProtocolVersion::V3).unwrap(), vec![30]);
        assert_eq!(WindowProbeMsg.encode(ProtocolVersion::V1).unwrap(), vec![15]);
        assert!(HeartbeatMsg::decode(&[30, 1], ProtocolVersion::V3).is_err());
        assert!(WindowProbeMsg::decode(&[30], ProtocolVersion::V3).is_err());
    }

    #[test]
    fn test_heartbeat_csn_form_switches_at_v7() {
        let msg = ChangeTimeHeartbeatMsg::new(Csn::new(0x1234, 7, 99));
        let v6 = msg.encode(ProtocolVersion::V6).unwrap();
        let v7 = msg.encode(ProtocolVersion::V7).unwrap();
        assert_eq!(v6.len(), 1 + 29);
        assert_eq!(v7.len(), 1 + 14);
        assert_eq!(ChangeTimeHeartbeatMsg::decode(&v6, ProtocolVersion::V6).unwrap(), msg);
        assert_eq!(ChangeTimeHeartbeatMsg::decode(&v7, ProtocolVersion::V7).unwrap(), msg);
        assert!(ChangeTimeHeartbeatMsg::decode(&v6, ProtocolVersion::V7).is_err());
        assert!(msg.encode(ProtocolVersion::V2).is_err());
    }

    #[test]
    fn test_replica_offline() {
        let msg = ReplicaOfflineMsg::new(Csn::new(5, 6, 40_000));
        assert!(msg.encode(ProtocolVersion::V7).is_err());
        let bytes = msg.encode(ProtocolVersion::V8).unwrap();
        let decoded = ReplicaOfflineMsg::decode(&bytes, ProtocolVersion::V8).unwrap();
        assert_eq!(decoded.replica_id(), 40_000);
        assert!(ReplicaOfflineMsg::decode(&bytes[..10], ProtocolVersion::V8).is_err());
    }
}

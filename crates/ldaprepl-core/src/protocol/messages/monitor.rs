//! Monitoring snapshot exchange
//!
//! ```text
//! MonitorRequest  [18][sender\0][dest\0]
//! Monitor         [19][sender\0][dest\0][rsState]
//!                 [dsCount\0]( [id\0][approx\0][state] )*
//!                 [rsCount\0]( [id\0][approx\0][state] )*
//! ```
//!
//! States use the length-prefixed binary form.

use crate::protocol::codec::{ByteReader, ByteWriter};
use crate::protocol::message_type::MessageType;
use crate::protocol::version::ProtocolVersion;
use crate::protocol::{ReplicaId, WireMessage, open_message, start_message};
use crate::server_state::ServerState;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ask a replication server for a [`MonitorMsg`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRequestMsg {
    /// Requesting server
    pub sender_id: ReplicaId,
    /// Server asked for the snapshot
    pub destination_id: ReplicaId,
}

impl WireMessage for MonitorRequestMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::MonitorRequest
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

/// What one peer has seen, and the age of the oldest change it misses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMonitorData {
    /// Peer's server state
    pub state: ServerState,
    /// Approximate time of the first change the peer has not received, in
    /// milliseconds, `0` when it is up to date
    pub approx_first_missing_date: i64,
}

/// Monitoring snapshot of a replication server and its peers
///
/// A report only: nothing here feeds back into live state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorMsg {
    sender_id: ReplicaId,
    destination_id: ReplicaId,
    replication_server_state: ServerState,
    ds_peers: BTreeMap<ReplicaId, PeerMonitorData>,
    rs_peers: BTreeMap<ReplicaId, PeerMonitorData>,
}

impl MonitorMsg {
    /// Create an empty snapshot
    pub fn new(sender_id: ReplicaId, destination_id: ReplicaId) -> Self {
        Self {
            sender_id,
            destination_id,
            ..Self::default()
        }
    }

    /// Set the reporting server's own state
    pub fn with_replication_server_state(mut self, state: ServerState) -> Self {
        self.replication_server_state = state;
        self
    }

    /// Record a directory server peer
    pub fn with_ds_peer(mut self, replica_id: ReplicaId, state: ServerState, approx_first_missing_date: i64) -> Self {
        self.ds_peers.insert(
            replica_id,
            PeerMonitorData {
                state,
                approx_first_missing_date,
            },
        );
        self
    }

    /// Record a replication server peer
    pub fn with_rs_peer(mut self, replica_id: ReplicaId, state: ServerState, approx_first_missing_date: i64) -> Self {
        self.rs_peers.insert(
            replica_id,
            PeerMonitorData {
                state,
                approx_first_missing_date,
            },
        );
        self
    }

    /// Reporting server
    pub fn sender_id(&self) -> ReplicaId {
        self.sender_id
    }

    /// Server the report is for
    pub fn destination_id(&self) -> ReplicaId {
        self.destination_id
    }

    /// Reporting server's own state
    pub fn replication_server_state(&self) -> &ServerState {
        &self.replication_server_state
    }

    /// Directory server peers, by id
    pub fn ds_peers(&self) -> impl Iterator<Item = (ReplicaId, &PeerMonitorData)> {
        self.ds_peers.iter().map(|(id, data)| (*id, data))
    }

    /// Replication server peers, by id
    pub fn rs_peers(&self) -> impl Iterator<Item = (ReplicaId, &PeerMonitorData)> {
        self.rs_peers.iter().map(|(id, data)| (*id, data))
    }

    /// Data reported for one directory server
    pub fn ds_peer(&self, replica_id: ReplicaId) -> Option<&PeerMonitorData> {
        self.ds_peers.get(&replica_id)
    }

    /// Data reported for one replication server
    pub fn rs_peer(&self, replica_id: ReplicaId) -> Option<&PeerMonitorData> {
        self.rs_peers.get(&replica_id)
    }
}

fn put_peers(w: &mut ByteWriter, peers: &BTreeMap<ReplicaId, PeerMonitorData>) {
    w.put_num(peers.len());
    for (id, data) in peers {
        w.put_num(*id);
        w.put_num(data.approx_first_missing_date);
        w.put_state_bytes(&data.state);
    }
}

fn get_peers(r: &mut ByteReader<'_>) -> Result<BTreeMap<ReplicaId, PeerMonitorData>> {
    let count: usize = r.get_num()?;
    // every entry takes at least id\0 approx\0 and a 4 byte state length
    if count > r.remaining() / 8 {
        return Err(Error::malformed(format!(
            "{} monitor entries announced with {} bytes left",
            count,
            r.remaining()
        )));
    }
    let mut peers = BTreeMap::new();
    for _ in 0..count {
        let id = r.get_num()?;
        let approx_first_missing_date = r.get_num()?;
        let state = r.get_state_bytes()?;
        if peers
            .insert(
                id,
                PeerMonitorData {
                    state,
                    approx_first_missing_date,
                },
            )
            .is_some()
        {
            return Err(Error::malformed(format!("replica {} reported twice", id)));
        }
    }
    Ok(peers)
}

impl WireMessage for MonitorMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::Monitor
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_num(self.sender_id);
        w.put_num(self.destination_id);
        w.put_state_bytes(&self.replication_server_state);
        put_peers(&mut w, &self.ds_peers);
        put_peers(&mut w, &self.rs_peers);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let msg = Self {
            sender_id: r.get_num()?,
            destination_id: r.get_num()?,
            replication_server_state: r.get_state_bytes()?,
            ds_peers: get_peers(&mut r)?,
            rs_peers: get_peers(&mut r)?,
        };
        r.finish()?;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csn::Csn;

    fn state(seed: u64) -> ServerState {
        [Csn::new(seed, 1, 1), Csn::new(seed + 1, 2, 2)].into_iter().collect()
    }

    #[test]
    fn test_monitor_request() {
        let msg = MonitorRequestMsg {
            sender_id: 1,
            destination_id: 2,
        };
        assert!(msg.encode(ProtocolVersion::V1).is_err());
        let bytes = msg.encode(ProtocolVersion::V2).unwrap();
        assert_eq!(bytes, b"\x121\x002\x00".to_vec());
        assert_eq!(MonitorRequestMsg::decode(&bytes, ProtocolVersion::V2).unwrap(), msg);
    }

    #[test]
    fn test_empty_monitor() {
        let msg = MonitorMsg::new(3, 4);
        let decoded = MonitorMsg::decode(&msg.encode(ProtocolVersion::V4).unwrap(), ProtocolVersion::V4).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.replication_server_state().is_empty());
        assert_eq!(decoded.ds_peers().count(), 0);
    }

    #[test]
    fn test_monitor_roundtrip() {
        let msg = MonitorMsg::new(3, 4)
            .with_replication_server_state(state(100))
            .with_ds_peer(10, state(1), 1_000)
            .with_ds_peer(-11, ServerState::new(), 0)
            .with_rs_peer(20, state(5), 5_000);
        let decoded = MonitorMsg::decode(&msg.encode(ProtocolVersion::V2).unwrap(), ProtocolVersion::V2).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.ds_peer(10).unwrap().approx_first_missing_date, 1_000);
        assert!(decoded.rs_peer(10).is_none());
    }

    #[test]
    fn test_oversized_count_is_rejected() {
        let mut w = ByteWriter::with_tag(MessageType::Monitor.as_u8());
        w.put_num(1);
        w.put_num(2);
        w.put_state_bytes(&ServerState::new());
        w.put_num(1_000_000);
        assert!(matches!(
            MonitorMsg::decode(&w.finish(), ProtocolVersion::V2),
            Err(Error::Malformed(_))
        ));
    }
}

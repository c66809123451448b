//! Assured replication acknowledgment
//!
//! ```text
//! V1   [5][csn\0]
//! V2+  [5][csn\0][timeout][wrongStatus][replayError][failedId\0]*
//! ```

use crate::csn::Csn;
use crate::protocol::message_type::MessageType;
use crate::protocol::version::{Feature, ProtocolVersion};
use crate::protocol::{ReplicaId, WireMessage, open_message, start_message};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Acknowledgment of an assured update
///
/// The failed server ids are carried verbatim, sign included; what a
/// negative id means is up to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMsg {
    csn: Csn,
    has_timeout: bool,
    has_wrong_status: bool,
    has_replay_error: bool,
    failed_servers: Vec<ReplicaId>,
}

impl AckMsg {
    /// Successful acknowledgment of `csn`
    pub fn new(csn: Csn) -> Self {
        Self {
            csn,
            has_timeout: false,
            has_wrong_status: false,
            has_replay_error: false,
            failed_servers: Vec::new(),
        }
    }

    /// Acknowledgment carrying error information
    pub fn with_errors(
        csn: Csn,
        has_timeout: bool,
        has_wrong_status: bool,
        has_replay_error: bool,
        failed_servers: Vec<ReplicaId>,
    ) -> Self {
        Self {
            csn,
            has_timeout,
            has_wrong_status,
            has_replay_error,
            failed_servers,
        }
    }

    /// CSN of the acknowledged update
    pub fn csn(&self) -> Csn {
        self.csn
    }

    /// Some server did not answer in time
    pub fn has_timeout(&self) -> bool {
        self.has_timeout
    }

    /// Some server was not in a status allowing assured replication
    pub fn has_wrong_status(&self) -> bool {
        self.has_wrong_status
    }

    /// Some server failed to replay the update
    pub fn has_replay_error(&self) -> bool {
        self.has_replay_error
    }

    /// Any of the three error flags is set
    pub fn has_errors(&self) -> bool {
        self.has_timeout || self.has_wrong_status || self.has_replay_error
    }

    /// Servers that failed, in the order they were reported
    pub fn failed_servers(&self) -> &[ReplicaId] {
        &self.failed_servers
    }
}

impl WireMessage for AckMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::Ack
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_csn(&self.csn);
        if version.supports(Feature::AckErrorInfo) {
            w.put_bool(self.has_timeout);
            w.put_bool(self.has_wrong_status);
            w.put_bool(self.has_replay_error);
            for id in &self.failed_servers {
                w.put_num(*id);
            }
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let mut msg = Self::new(r.get_csn()?);
        if version.supports(Feature::AckErrorInfo) {
            msg.has_timeout = r.get_bool()?;
            msg.has_wrong_status = r.get_bool()?;
            msg.has_replay_error = r.get_bool()?;
            while !r.is_empty() {
                msg.failed_servers.push(r.get_num()?);
            }
        }
        r.finish()?;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_flag_combinations() {
        let csn = Csn::new(0x123f1e58828, 123, 45);
        let failed = vec![12345, -12345, 31657, -28456, 0];
        for bits in 0..8u8 {
            let msg = AckMsg::with_errors(csn, bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, failed.clone());
            let decoded = AckMsg::decode(&msg.encode(ProtocolVersion::CURRENT).unwrap(), ProtocolVersion::CURRENT)
                .unwrap();
            assert_eq!(decoded, msg);
            assert_eq!(decoded.has_errors(), bits != 0);
        }
    }

    #[test]
    fn test_v1_carries_csn_only() {
        let msg = AckMsg::with_errors(Csn::new(1, 2, 3), true, true, true, vec![4]);
        let bytes = msg.encode(ProtocolVersion::V1).unwrap();
        assert_eq!(bytes.len(), 1 + 29);
        let decoded = AckMsg::decode(&bytes, ProtocolVersion::V1).unwrap();
        assert_eq!(decoded, AckMsg::new(Csn::new(1, 2, 3)));
    }

    #[test]
    fn test_empty_failed_list() {
        let msg = AckMsg::new(Csn::new(7, 0, 1));
        let decoded = AckMsg::decode(&msg.encode(ProtocolVersion::V4).unwrap(), ProtocolVersion::V4).unwrap();
        assert!(decoded.failed_servers().is_empty());
        assert!(!decoded.has_errors());
    }

    #[test]
    fn test_bad_failed_id_is_rejected() {
        let mut bytes = AckMsg::new(Csn::new(7, 0, 1)).encode(ProtocolVersion::V4).unwrap();
        bytes.extend_from_slice(b"12a\0");
        assert!(AckMsg::decode(&bytes, ProtocolVersion::V4).is_err());
        let mut unterminated = AckMsg::new(Csn::new(7, 0, 1)).encode(ProtocolVersion::V4).unwrap();
        unterminated.extend_from_slice(b"12");
        assert!(AckMsg::decode(&unterminated, ProtocolVersion::V4).is_err());
    }
}

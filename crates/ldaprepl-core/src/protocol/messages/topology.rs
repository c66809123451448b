//! Topology gossip
//!
//! ```text
//! [26][dsCount] DSInfo* [rsCount] RSInfo*
//!
//! DSInfo  id\0 rsId\0 genId\0 status assured mode level group urlCount url\0*
//!         V4+ eclCount name\0*   V5+ eclDelCount name\0*   V6+ url\0 version
//! RSInfo  id\0 genId\0 group     V4+ weight\0              V6+ url\0
//! ```

use crate::protocol::codec::{ByteReader, ByteWriter};
use crate::protocol::message_type::MessageType;
use crate::protocol::messages::handshake::ServerStatus;
use crate::protocol::messages::update::AssuredMode;
use crate::protocol::version::{Feature, ProtocolVersion};
use crate::protocol::{ReplicaId, WireMessage, open_message, start_message};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Weight of a replication server that did not configure one
pub const DEFAULT_RS_WEIGHT: i32 = 1;

fn put_count(w: &mut ByteWriter, len: usize, what: &str) -> Result<()> {
    let count = u8::try_from(len)
        .map_err(|_| Error::encode(format!("{} {} exceed the one byte count", len, what)))?;
    w.put_u8(count);
    Ok(())
}

fn put_strings<'a>(w: &mut ByteWriter, items: impl ExactSizeIterator<Item = &'a String>, what: &str) -> Result<()> {
    put_count(w, items.len(), what)?;
    for item in items {
        w.put_str(item)?;
    }
    Ok(())
}

fn get_strings(r: &mut ByteReader<'_>) -> Result<Vec<String>> {
    let count = r.get_u8()?;
    (0..count).map(|_| r.get_str()).collect()
}

/// Directory server as seen by the topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsInfo {
    /// Directory server id
    pub replica_id: ReplicaId,
    /// Directory server URL
    pub url: String,
    /// Replication server the directory server is connected to
    pub rs_id: ReplicaId,
    /// Generation id of the directory server's data
    pub generation_id: i64,
    /// Current status
    pub status: ServerStatus,
    /// Whether it sends assured updates
    pub assured: bool,
    /// Assured sub-mode
    pub assured_mode: AssuredMode,
    /// Safe data level
    pub safe_data_level: u8,
    /// Group id
    pub group_id: u8,
    /// Referral URLs, in order
    pub referral_urls: Vec<String>,
    /// ECL attributes for adds and modifies
    pub ecl_includes: BTreeSet<String>,
    /// ECL attributes for deletes
    pub ecl_includes_for_deletes: BTreeSet<String>,
    /// Protocol version the directory server speaks, when known
    pub protocol_version: Option<ProtocolVersion>,
}

impl DsInfo {
    /// Create a descriptor with no referrals or ECL attributes
    pub fn new(
        replica_id: ReplicaId,
        rs_id: ReplicaId,
        generation_id: i64,
        status: ServerStatus,
        group_id: u8,
    ) -> Self {
        Self {
            replica_id,
            url: String::new(),
            rs_id,
            generation_id,
            status,
            assured: false,
            assured_mode: AssuredMode::SafeData,
            safe_data_level: 1,
            group_id,
            referral_urls: Vec::new(),
            ecl_includes: BTreeSet::new(),
            ecl_includes_for_deletes: BTreeSet::new(),
            protocol_version: None,
        }
    }

    fn encode(&self, w: &mut ByteWriter, version: ProtocolVersion) -> Result<()> {
        w.put_num(self.replica_id);
        w.put_num(self.rs_id);
        w.put_num(self.generation_id);
        w.put_u8(self.status as u8);
        w.put_bool(self.assured);
        w.put_u8(self.assured_mode as u8);
        w.put_u8(self.safe_data_level);
        w.put_u8(self.group_id);
        put_strings(w, self.referral_urls.iter(), "referral URLs")?;
        if version.supports(Feature::EclIncludes) {
            put_strings(w, self.ecl_includes.iter(), "ECL attributes")?;
        }
        if version.supports(Feature::EclIncludesForDeletes) {
            put_strings(w, self.ecl_includes_for_deletes.iter(), "ECL delete attributes")?;
        }
        if version.supports(Feature::TopologyUrls) {
            w.put_str(&self.url)?;
            w.put_u8(self.protocol_version.map_or(0, ProtocolVersion::as_u8));
        }
        Ok(())
    }

    fn decode(r: &mut ByteReader<'_>, version: ProtocolVersion) -> Result<Self> {
        let mut info = Self::new(
            r.get_num()?,
            r.get_num()?,
            r.get_num()?,
            ServerStatus::Normal,
            0,
        );
        info.status = ServerStatus::try_from(r.get_u8()?)?;
        info.assured = r.get_bool()?;
        info.assured_mode = AssuredMode::try_from(r.get_u8()?)?;
        info.safe_data_level = r.get_u8()?;
        info.group_id = r.get_u8()?;
        info.referral_urls = get_strings(r)?;
        if version.supports(Feature::EclIncludes) {
            info.ecl_includes = get_strings(r)?.into_iter().collect();
        }
        if version.supports(Feature::EclIncludesForDeletes) {
            info.ecl_includes_for_deletes = get_strings(r)?.into_iter().collect();
        }
        if version.supports(Feature::TopologyUrls) {
            info.url = r.get_str()?;
            info.protocol_version = match r.get_u8()? {
                0 => None,
                v => Some(ProtocolVersion::try_from(v)?),
            };
        }
        Ok(info)
    }
}

/// Replication server as seen by the topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsInfo {
    /// Replication server id
    pub replica_id: ReplicaId,
    /// Replication server URL
    pub url: String,
    /// Generation id of the replication server
    pub generation_id: i64,
    /// Group id
    pub group_id: u8,
    /// Load-balancing weight
    pub weight: i32,
}

impl RsInfo {
    /// Create a descriptor with the default weight
    pub fn new(replica_id: ReplicaId, generation_id: i64, group_id: u8) -> Self {
        Self {
            replica_id,
            url: String::new(),
            generation_id,
            group_id,
            weight: DEFAULT_RS_WEIGHT,
        }
    }

    fn encode(&self, w: &mut ByteWriter, version: ProtocolVersion) -> Result<()> {
        w.put_num(self.replica_id);
        w.put_num(self.generation_id);
        w.put_u8(self.group_id);
        if version.supports(Feature::RsWeight) {
            w.put_num(self.weight);
        }
        if version.supports(Feature::TopologyUrls) {
            w.put_str(&self.url)?;
        }
        Ok(())
    }

    fn decode(r: &mut ByteReader<'_>, version: ProtocolVersion) -> Result<Self> {
        let mut info = Self::new(r.get_num()?, r.get_num()?, r.get_u8()?);
        if version.supports(Feature::RsWeight) {
            info.weight = r.get_num()?;
        }
        if version.supports(Feature::TopologyUrls) {
            info.url = r.get_str()?;
        }
        Ok(info)
    }
}

/// Directory and replication servers currently in the topology
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopologyMsg {
    ds_infos: Vec<DsInfo>,
    rs_infos: Vec<RsInfo>,
}

impl TopologyMsg {
    /// Create a topology message
    pub fn new(ds_infos: Vec<DsInfo>, rs_infos: Vec<RsInfo>) -> Self {
        Self { ds_infos, rs_infos }
    }

    /// Directory servers, in order
    pub fn ds_infos(&self) -> &[DsInfo] {
        &self.ds_infos
    }

    /// Replication servers, in order
    pub fn rs_infos(&self) -> &[RsInfo] {
        &self.rs_infos
    }
}

impl WireMessage for TopologyMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::Topology
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        put_count(&mut w, self.ds_infos.len(), "directory servers")?;
        for info in &self.ds_infos {
            info.encode(&mut w, version)?;
        }
        put_count(&mut w, self.rs_infos.len(), "replication servers")?;
        for info in &self.rs_infos {
            info.encode(&mut w, version)?;
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let ds_count = r.get_u8()?;
        let ds_infos = (0..ds_count)
            .map(|_| DsInfo::decode(&mut r, version))
            .collect::<Result<Vec<_>>>()?;
        let rs_count = r.get_u8()?;
        let rs_infos = (0..rs_count)
            .map(|_| RsInfo::decode(&mut r, version))
            .collect::<Result<Vec<_>>>()?;
        r.finish()?;
        Ok(Self { ds_infos, rs_infos })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_ds() -> DsInfo {
        let mut info = DsInfo::new(2436, 591, 0, ServerStatus::Normal, 0);
        info.assured_mode = AssuredMode::SafeRead;
        info.safe_data_level = 17;
        info.referral_urls = vec!["ldaps://host:port/dc=foo??sub?(sn=One Entry)".into()];
        info.ecl_includes = ["cn".to_string()].into();
        info.ecl_includes_for_deletes = ["uid".to_string(), "sn".to_string()].into();
        info.url = "ds.example.com:1389".into();
        info.protocol_version = Some(ProtocolVersion::V6);
        info
    }

    fn full_rs() -> RsInfo {
        let mut info = RsInfo::new(4527, 45316, 103);
        info.weight = 3;
        info.url = "rs.example.com:8989".into();
        info
    }

    #[test]
    fn test_empty_lists_stay_empty() {
        let msg = TopologyMsg::default();
        for version in &ProtocolVersion::ALL[1..] {
            let bytes = msg.encode(*version).unwrap();
            assert_eq!(bytes, vec![26, 0, 0]);
            let decoded = TopologyMsg::decode(&bytes, *version).unwrap();
            assert!(decoded.ds_infos().is_empty());
            assert!(decoded.rs_infos().is_empty());
        }
    }

    #[test]
    fn test_fields_by_version() {
        let msg = TopologyMsg::new(vec![full_ds()], vec![full_rs()]);
        let v3 = TopologyMsg::decode(&msg.encode(ProtocolVersion::V3).unwrap(), ProtocolVersion::V3).unwrap();
        assert_eq!(v3.ds_infos()[0].referral_urls, full_ds().referral_urls);
        assert!(v3.ds_infos()[0].ecl_includes.is_empty());
        assert_eq!(v3.rs_infos()[0].weight, DEFAULT_RS_WEIGHT);

        let v4 = TopologyMsg::decode(&msg.encode(ProtocolVersion::V4).unwrap(), ProtocolVersion::V4).unwrap();
        assert_eq!(v4.ds_infos()[0].ecl_includes, full_ds().ecl_includes);
        assert!(v4.ds_infos()[0].ecl_includes_for_deletes.is_empty());
        assert_eq!(v4.rs_infos()[0].weight, 3);
        assert!(v4.rs_infos()[0].url.is_empty());

        let v6 = TopologyMsg::decode(&msg.encode(ProtocolVersion::V6).unwrap(), ProtocolVersion::V6).unwrap();
        assert_eq!(v6, msg);
    }

    #[test]
    fn test_too_many_entries() {
        let infos = (0..256).map(|i| RsInfo::new(i, 0, 1)).collect();
        let msg = TopologyMsg::new(Vec::new(), infos);
        assert!(matches!(msg.encode(ProtocolVersion::V4), Err(Error::Encode(_))));
    }

    #[test]
    fn test_unknown_status_is_malformed() {
        let mut info = DsInfo::new(1, 2, 3, ServerStatus::Normal, 1);
        info.referral_urls.clear();
        let mut bytes = TopologyMsg::new(vec![info], Vec::new())
            .encode(ProtocolVersion::V3)
            .unwrap();
        // status byte follows "1\02\03\0"
        bytes[8] = 9;
        assert!(TopologyMsg::decode(&bytes, ProtocolVersion::V3).is_err());
    }
}

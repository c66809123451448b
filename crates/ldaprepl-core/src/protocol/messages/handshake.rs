//! Session handshake and status control
//!
//! ```text
//! DS                                   RS
//!  │ ── ServerStart ───────────────────▶ │   advertised version, state
//!  │ ◀────────────────── ReplServerStart │   advertised version, state
//!  │           (version = min of both)   │
//!  │ ◀─────────────────────── Topology ─ │
//!  │ ── StartSession ──────────────────▶ │
//!  │ ◀─────────────────────── Topology ─ │
//!  │           ... updates ...           │
//!  │ ── Stop ──────────────────────────▶ │
//! ```
//!
//! Start messages travel before the version is negotiated, so they carry
//! their own version byte (no byte at all for the first revision tags).

use crate::protocol::codec::{ByteReader, ByteWriter};
use crate::protocol::message_type::MessageType;
use crate::protocol::messages::update::AssuredMode;
use crate::protocol::version::{Feature, ProtocolVersion};
use crate::protocol::{ReplicaId, WireMessage, open_message, start_message};
use crate::server_state::ServerState;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Group id of servers that never configured one
pub const DEFAULT_GROUP_ID: u8 = 1;

/// Pending-change count above which a server turns degraded
pub const DEFAULT_DEGRADED_STATUS_THRESHOLD: i32 = 5000;

/// Status byte meaning "no status" in change-status messages
const NO_STATUS: u8 = 0xff;

/// Participation status of a directory server
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ServerStatus {
    /// Fully participating
    #[default]
    Normal = 1,
    /// Too many pending changes for assured replication
    Degraded = 2,
    /// Being reinitialized
    FullUpdate = 3,
    /// Generation id differs from the replication server's
    BadGenerationId = 4,
}

impl TryFrom<u8> for ServerStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Normal),
            2 => Ok(Self::Degraded),
            3 => Ok(Self::FullUpdate),
            4 => Ok(Self::BadGenerationId),
            _ => Err(Error::malformed(format!("unknown server status {}", value))),
        }
    }
}

fn put_ssl(w: &mut ByteWriter, ssl: bool) -> Result<()> {
    w.put_str(if ssl { "true" } else { "false" })
}

fn get_ssl(r: &mut ByteReader<'_>) -> Result<bool> {
    match r.get_str()?.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::malformed(format!("invalid SSL flag '{}'", other))),
    }
}

/// Read the leading tag of a start message and the version it advertises
fn open_start<'a>(bytes: &'a [u8], v1_tag: MessageType, tag: MessageType) -> Result<(ByteReader<'a>, ProtocolVersion)> {
    let mut r = ByteReader::new(bytes);
    let found = r.get_u8()?;
    if found == v1_tag.as_u8() {
        return Ok((r, ProtocolVersion::V1));
    }
    if found != tag.as_u8() {
        return Err(Error::malformed(format!(
            "expected message type {} or {}, found {}",
            v1_tag.as_u8(),
            tag.as_u8(),
            found
        )));
    }
    let advertised = r.get_u8()?;
    let version = match advertised {
        0 | 1 => {
            return Err(Error::version_mismatch(format!(
                "start message type {} cannot advertise protocol {}",
                found, advertised
            )));
        }
        v if v > ProtocolVersion::CURRENT.as_u8() => {
            tracing::debug!(
                "Peer advertises protocol {}, answering with {}",
                v,
                ProtocolVersion::CURRENT
            );
            ProtocolVersion::CURRENT
        }
        v => ProtocolVersion::try_from(v)?,
    };
    Ok((r, version))
}

fn start_writer(version: ProtocolVersion, v1_tag: MessageType, tag: MessageType) -> ByteWriter {
    if version.supports(Feature::GroupId) {
        let mut w = ByteWriter::with_tag(tag.as_u8());
        w.put_u8(version.as_u8());
        w
    } else {
        ByteWriter::with_tag(v1_tag.as_u8())
    }
}

/// Directory server opening a session with a replication server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStartMsg {
    /// Highest protocol version the sender speaks
    pub protocol_version: ProtocolVersion,
    /// Generation id of the sender's data
    pub generation_id: i64,
    /// Group the sender belongs to
    pub group_id: u8,
    /// Replicated suffix
    pub base_dn: String,
    /// Sender id
    pub server_id: ReplicaId,
    /// Sender URL
    pub server_url: String,
    /// Receive queue limit
    pub max_receive_queue: i32,
    /// Receive delay limit
    pub max_receive_delay: i32,
    /// Updates the sender may have in flight
    pub send_window_size: i32,
    /// Send delay limit
    pub max_send_delay: i32,
    /// Updates the sender accepts before sending a window message
    pub receive_window_size: i32,
    /// Heartbeat interval requested from the peer, milliseconds
    pub heartbeat_interval: i64,
    /// Whether the session is to be encrypted
    pub ssl_encryption: bool,
    /// Sender's checkpoint
    pub server_state: ServerState,
}

impl ServerStartMsg {
    /// Create a start message with default tunables
    pub fn new(
        server_id: ReplicaId,
        server_url: impl Into<String>,
        base_dn: impl Into<String>,
        window_size: i32,
        server_state: ServerState,
        generation_id: i64,
        ssl_encryption: bool,
        group_id: u8,
    ) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            generation_id,
            group_id,
            base_dn: base_dn.into(),
            server_id,
            server_url: server_url.into(),
            max_receive_queue: 0,
            max_receive_delay: 0,
            send_window_size: 0,
            max_send_delay: 0,
            receive_window_size: window_size,
            heartbeat_interval: 0,
            ssl_encryption,
            server_state,
        }
    }
}

impl WireMessage for ServerStartMsg {
    fn message_type(version: ProtocolVersion) -> MessageType {
        if version.supports(Feature::GroupId) {
            MessageType::ServerStart
        } else {
            MessageType::ServerStartV1
        }
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_writer(version, MessageType::ServerStartV1, MessageType::ServerStart);
        w.put_num(self.generation_id);
        if version.supports(Feature::GroupId) {
            w.put_u8(self.group_id);
        }
        w.put_str(&self.base_dn)?;
        w.put_num(self.server_id);
        w.put_str(&self.server_url)?;
        w.put_num(self.max_receive_queue);
        w.put_num(self.max_receive_delay);
        w.put_num(self.send_window_size);
        w.put_num(self.max_send_delay);
        w.put_num(self.receive_window_size);
        w.put_num(self.heartbeat_interval);
        put_ssl(&mut w, self.ssl_encryption)?;
        w.put_state_string(&self.server_state);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], _version: ProtocolVersion) -> Result<Self> {
        let (mut r, protocol_version) =
            open_start(bytes, MessageType::ServerStartV1, MessageType::ServerStart)?;
        let generation_id = r.get_num()?;
        let group_id = if protocol_version.supports(Feature::GroupId) {
            r.get_u8()?
        } else {
            DEFAULT_GROUP_ID
        };
        let msg = Self {
            protocol_version,
            generation_id,
            group_id,
            base_dn: r.get_str()?,
            server_id: r.get_num()?,
            server_url: r.get_str()?,
            max_receive_queue: r.get_num()?,
            max_receive_delay: r.get_num()?,
            send_window_size: r.get_num()?,
            max_send_delay: r.get_num()?,
            receive_window_size: r.get_num()?,
            heartbeat_interval: r.get_num()?,
            ssl_encryption: get_ssl(&mut r)?,
            server_state: r.get_state_string()?,
        };
        r.finish()?;
        Ok(msg)
    }
}

/// Replication server answering a start message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplServerStartMsg {
    /// Highest protocol version the sender speaks
    pub protocol_version: ProtocolVersion,
    /// Generation id of the sender's data
    pub generation_id: i64,
    /// Group the sender belongs to
    pub group_id: u8,
    /// Replicated suffix
    pub base_dn: String,
    /// Sender id
    pub server_id: ReplicaId,
    /// Sender URL
    pub server_url: String,
    /// Updates the sender accepts before sending a window message
    pub window_size: i32,
    /// Whether the session is to be encrypted
    pub ssl_encryption: bool,
    /// Pending-change count above which directory servers turn degraded
    pub degraded_status_threshold: i32,
    /// Sender's checkpoint
    pub server_state: ServerState,
}

impl ReplServerStartMsg {
    /// Create a replication server start message
    pub fn new(
        server_id: ReplicaId,
        server_url: impl Into<String>,
        base_dn: impl Into<String>,
        window_size: i32,
        server_state: ServerState,
        generation_id: i64,
        ssl_encryption: bool,
        group_id: u8,
        degraded_status_threshold: i32,
    ) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            generation_id,
            group_id,
            base_dn: base_dn.into(),
            server_id,
            server_url: server_url.into(),
            window_size,
            ssl_encryption,
            degraded_status_threshold,
            server_state,
        }
    }
}

impl WireMessage for ReplServerStartMsg {
    fn message_type(version: ProtocolVersion) -> MessageType {
        if version.supports(Feature::GroupId) {
            MessageType::ReplServerStart
        } else {
            MessageType::ReplServerStartV1
        }
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_writer(version, MessageType::ReplServerStartV1, MessageType::ReplServerStart);
        w.put_num(self.generation_id);
        if version.supports(Feature::GroupId) {
            w.put_u8(self.group_id);
        }
        w.put_str(&self.base_dn)?;
        w.put_num(self.server_id);
        w.put_str(&self.server_url)?;
        w.put_num(self.window_size);
        put_ssl(&mut w, self.ssl_encryption)?;
        if version.supports(Feature::DegradedStatusThreshold) {
            w.put_num(self.degraded_status_threshold);
        }
        w.put_state_string(&self.server_state);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], _version: ProtocolVersion) -> Result<Self> {
        let (mut r, protocol_version) =
            open_start(bytes, MessageType::ReplServerStartV1, MessageType::ReplServerStart)?;
        let generation_id = r.get_num()?;
        let group_id = if protocol_version.supports(Feature::GroupId) {
            r.get_u8()?
        } else {
            DEFAULT_GROUP_ID
        };
        let base_dn = r.get_str()?;
        let server_id = r.get_num()?;
        let server_url = r.get_str()?;
        let window_size = r.get_num()?;
        let ssl_encryption = get_ssl(&mut r)?;
        let degraded_status_threshold = if protocol_version.supports(Feature::DegradedStatusThreshold) {
            r.get_num()?
        } else {
            DEFAULT_DEGRADED_STATUS_THRESHOLD
        };
        let server_state = r.get_state_string()?;
        r.finish()?;
        Ok(Self {
            protocol_version,
            generation_id,
            group_id,
            base_dn,
            server_id,
            server_url,
            window_size,
            ssl_encryption,
            degraded_status_threshold,
            server_state,
        })
    }
}

fn put_counted(w: &mut ByteWriter, items: impl ExactSizeIterator<Item = impl AsRef<str>>) -> Result<()> {
    w.put_num(items.len());
    for item in items {
        w.put_str(item.as_ref())?;
    }
    Ok(())
}

fn get_counted(r: &mut ByteReader<'_>) -> Result<Vec<String>> {
    let count: usize = r.get_num()?;
    if count > r.remaining() {
        return Err(Error::malformed(format!(
            "{} strings announced but only {} bytes left",
            count,
            r.remaining()
        )));
    }
    (0..count).map(|_| r.get_str()).collect()
}

/// Directory server entering the replication flow after the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionMsg {
    /// Status the server starts in
    pub status: ServerStatus,
    /// LDAP URLs clients may be referred to
    pub referral_urls: Vec<String>,
    /// Whether the server sends assured updates
    pub assured: bool,
    /// Assured sub-mode
    pub assured_mode: AssuredMode,
    /// Safe data level
    pub safe_data_level: u8,
    /// Attributes published to the external change log for adds and modifies
    pub ecl_includes: BTreeSet<String>,
    /// Attributes published to the external change log for deletes
    pub ecl_includes_for_deletes: BTreeSet<String>,
}

impl StartSessionMsg {
    /// Create a non-assured start-session message
    pub fn new(status: ServerStatus, referral_urls: Vec<String>) -> Self {
        Self {
            status,
            referral_urls,
            assured: false,
            assured_mode: AssuredMode::SafeData,
            safe_data_level: 1,
            ecl_includes: BTreeSet::new(),
            ecl_includes_for_deletes: BTreeSet::new(),
        }
    }

    /// Request assured replication
    pub fn with_assured(mut self, mode: AssuredMode, safe_data_level: u8) -> Self {
        self.assured = true;
        self.assured_mode = mode;
        self.safe_data_level = safe_data_level;
        self
    }

    /// Attach external change log attribute names
    pub fn with_ecl_includes(
        mut self,
        includes: BTreeSet<String>,
        includes_for_deletes: BTreeSet<String>,
    ) -> Self {
        self.ecl_includes = includes;
        self.ecl_includes_for_deletes = includes_for_deletes;
        self
    }
}

impl WireMessage for StartSessionMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::StartSession
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_u8(self.status as u8);
        w.put_bool(self.assured);
        w.put_u8(self.assured_mode as u8);
        w.put_u8(self.safe_data_level);
        if version.supports(Feature::EclIncludes) {
            put_counted(&mut w, self.referral_urls.iter())?;
            put_counted(&mut w, self.ecl_includes.iter())?;
            if version.supports(Feature::EclIncludesForDeletes) {
                put_counted(&mut w, self.ecl_includes_for_deletes.iter())?;
            }
        } else {
            for url in &self.referral_urls {
                w.put_str(url)?;
            }
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let mut msg = Self::new(ServerStatus::try_from(r.get_u8()?)?, Vec::new());
        msg.assured = r.get_bool()?;
        msg.assured_mode = AssuredMode::try_from(r.get_u8()?)?;
        msg.safe_data_level = r.get_u8()?;
        if version.supports(Feature::EclIncludes) {
            msg.referral_urls = get_counted(&mut r)?;
            msg.ecl_includes = get_counted(&mut r)?.into_iter().collect();
            if version.supports(Feature::EclIncludesForDeletes) {
                msg.ecl_includes_for_deletes = get_counted(&mut r)?.into_iter().collect();
            }
        } else {
            while !r.is_empty() {
                msg.referral_urls.push(r.get_str()?);
            }
        }
        r.finish()?;
        Ok(msg)
    }
}

/// Status transition request or announcement
///
/// Whether the transition is legal is for the engine to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatusMsg {
    /// Status the sender asks the receiver to enter
    pub requested_status: Option<ServerStatus>,
    /// Status the sender entered
    pub new_status: Option<ServerStatus>,
}

impl ChangeStatusMsg {
    /// Ask the peer to change status
    pub fn request(status: ServerStatus) -> Self {
        Self {
            requested_status: Some(status),
            new_status: None,
        }
    }

    /// Announce a status change
    pub fn announce(status: ServerStatus) -> Self {
        Self {
            requested_status: None,
            new_status: Some(status),
        }
    }
}

fn put_status(w: &mut ByteWriter, status: Option<ServerStatus>) {
    w.put_u8(status.map_or(NO_STATUS, |s| s as u8));
}

fn get_status(r: &mut ByteReader<'_>) -> Result<Option<ServerStatus>> {
    match r.get_u8()? {
        NO_STATUS => Ok(None),
        other => ServerStatus::try_from(other).map(Some),
    }
}

impl WireMessage for ChangeStatusMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::ChangeStatus
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        put_status(&mut w, self.requested_status);
        put_status(&mut w, self.new_status);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let msg = Self {
            requested_status: get_status(&mut r)?,
            new_status: get_status(&mut r)?,
        };
        r.finish()?;
        Ok(msg)
    }
}

/// Graceful end of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StopMsg;

impl WireMessage for StopMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::Stop
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        Ok(start_message::<Self>(version)?.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        open_message::<Self>(bytes, version)?.finish()?;
        Ok(Self)
    }
}

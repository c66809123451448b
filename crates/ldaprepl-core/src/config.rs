//! Replication configuration
//!
//! Loaded from TOML; durations are given in milliseconds.
//!
//! ```toml
//! server_id = 12
//! server_url = "ldap1.example.com:8989"
//! base_dn = "dc=example,dc=com"
//! window_size = 100
//! heartbeat_interval = 10000
//! assured = true
//! assured_mode = "SafeRead"
//! ```

use crate::protocol::{AssuredMode, ProtocolVersion, ServerStartMsg, ServerStatus, StartSessionMsg};
use crate::server_state::ServerState;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Smallest frame limit accepted by [`ReplicationConfig::validate`]
pub const MIN_FRAME_SIZE: usize = 1024;

/// Replication configuration of one directory server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Replica id stamped into every CSN this server generates
    pub server_id: u16,

    /// Address peers use to reach this server
    pub server_url: String,

    /// Replicated suffix
    pub base_dn: String,

    /// Replication group, 1 to 127
    pub group_id: u8,

    /// Highest protocol version offered during the handshake
    pub max_protocol_version: ProtocolVersion,

    /// Updates accepted before the peer must wait for a window message
    pub window_size: i32,

    /// Heartbeat interval requested from the replication server
    #[serde(with = "serde_millis")]
    pub heartbeat_interval: Duration,

    /// Encrypt the session
    pub ssl_encryption: bool,

    /// Send updates in assured mode
    pub assured: bool,

    /// Assured sub-mode
    pub assured_mode: AssuredMode,

    /// Replication servers that must store an update in safe data mode
    pub safe_data_level: u8,

    /// Queue length at which a peer is considered degraded
    pub degraded_status_threshold: i32,

    /// LDAP URLs clients may be referred to
    pub referral_urls: Vec<String>,

    /// Largest frame accepted on a session, in bytes
    pub max_frame_size: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            server_id: 1,
            server_url: "localhost:8989".to_string(),
            base_dn: "dc=example,dc=com".to_string(),
            group_id: 1,
            max_protocol_version: ProtocolVersion::CURRENT,
            window_size: 100,
            heartbeat_interval: Duration::from_secs(10),
            ssl_encryption: false,
            assured: false,
            assured_mode: AssuredMode::SafeData,
            safe_data_level: 1,
            degraded_status_threshold: 5000,
            referral_urls: Vec::new(),
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

impl ReplicationConfig {
    /// Configuration for `server_id` replicating `base_dn`
    pub fn new(server_id: u16, base_dn: impl Into<String>) -> Self {
        Self {
            server_id,
            base_dn: base_dn.into(),
            ..Default::default()
        }
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::debug!(
            "Loaded replication config for server {} on {} from {}",
            config.server_id,
            config.base_dn,
            path.display()
        );
        Ok(config)
    }

    /// Set the server URL
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set the replication group
    pub fn with_group_id(mut self, group_id: u8) -> Self {
        self.group_id = group_id;
        self
    }

    /// Set the window size
    pub fn with_window_size(mut self, window_size: i32) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enable assured replication
    pub fn with_assured(mut self, mode: AssuredMode, safe_data_level: u8) -> Self {
        self.assured = true;
        self.assured_mode = mode;
        self.safe_data_level = safe_data_level;
        self
    }

    /// Cap the protocol version offered to peers
    pub fn with_max_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.max_protocol_version = version;
        self
    }

    /// Set the referral URLs
    pub fn with_referral_urls(mut self, urls: Vec<String>) -> Self {
        self.referral_urls = urls;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server_id == 0 {
            return Err(Error::config("server_id must be between 1 and 65535"));
        }
        if self.base_dn.trim().is_empty() {
            return Err(Error::config("base_dn must not be empty"));
        }
        if !(1..=127).contains(&self.group_id) {
            return Err(Error::config(format!(
                "group_id must be between 1 and 127, got {}",
                self.group_id
            )));
        }
        if self.window_size < 1 {
            return Err(Error::config("window_size must be at least 1"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat_interval must not be zero"));
        }
        if self.assured && self.assured_mode == AssuredMode::SafeData && self.safe_data_level == 0 {
            return Err(Error::config("safe_data_level must be at least 1 in safe data mode"));
        }
        if self.degraded_status_threshold < 0 {
            return Err(Error::config("degraded_status_threshold must not be negative"));
        }
        if self.max_frame_size < MIN_FRAME_SIZE {
            return Err(Error::config(format!(
                "max_frame_size must be at least {} bytes",
                MIN_FRAME_SIZE
            )));
        }
        for (field, value) in [("server_url", &self.server_url), ("base_dn", &self.base_dn)] {
            if value.contains('\0') {
                return Err(Error::config(format!("{} contains a NUL byte", field)));
            }
        }
        Ok(())
    }

    /// Start message this server opens a session with
    pub fn server_start_msg(&self, server_state: ServerState, generation_id: i64) -> ServerStartMsg {
        let mut msg = ServerStartMsg::new(
            i32::from(self.server_id),
            self.server_url.clone(),
            self.base_dn.clone(),
            self.window_size,
            server_state,
            generation_id,
            self.ssl_encryption,
            self.group_id,
        );
        msg.protocol_version = self.max_protocol_version;
        msg.heartbeat_interval = i64::try_from(self.heartbeat_interval.as_millis()).unwrap_or(i64::MAX);
        msg
    }

    /// Start-session message sent once the handshake completed
    pub fn start_session_msg(&self, status: ServerStatus) -> StartSessionMsg {
        let msg = StartSessionMsg::new(status, self.referral_urls.clone());
        if self.assured {
            msg.with_assured(self.assured_mode, self.safe_data_level)
        } else {
            msg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ReplicationConfig::default();
        assert_eq!(config.max_protocol_version, ProtocolVersion::CURRENT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        assert!(ReplicationConfig::new(0, "dc=x").validate().is_err());
        assert!(ReplicationConfig::new(1, "").validate().is_err());
        assert!(ReplicationConfig::new(1, "dc=x").with_group_id(128).validate().is_err());
        assert!(ReplicationConfig::new(1, "dc=x").with_window_size(0).validate().is_err());
        assert!(
            ReplicationConfig::new(1, "dc=x")
                .with_heartbeat_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ReplicationConfig::new(1, "dc=x")
                .with_assured(AssuredMode::SafeData, 0)
                .validate()
                .is_err()
        );
        assert!(
            ReplicationConfig::new(1, "dc=x")
                .with_assured(AssuredMode::SafeRead, 0)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server_id = 12
server_url = "ldap1.example.com:8989"
base_dn = "o=test"
heartbeat_interval = 2500
assured = true
assured_mode = "SafeRead"
max_protocol_version = 4
referral_urls = ["ldap://ldap1.example.com/o=test"]
"#
        )
        .unwrap();
        let config = ReplicationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server_id, 12);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(2500));
        assert_eq!(config.assured_mode, AssuredMode::SafeRead);
        assert_eq!(config.max_protocol_version, ProtocolVersion::V4);
        assert_eq!(config.window_size, 100);
    }

    #[test]
    fn test_from_file_rejects_bad_version() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_protocol_version = 9").unwrap();
        assert!(matches!(
            ReplicationConfig::from_file(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_messages_from_config() {
        let config = ReplicationConfig::new(7, "o=test")
            .with_max_protocol_version(ProtocolVersion::V3)
            .with_assured(AssuredMode::SafeRead, 2);
        let start = config.server_start_msg(ServerState::new(), 42);
        assert_eq!(start.server_id, 7);
        assert_eq!(start.protocol_version, ProtocolVersion::V3);
        assert_eq!(start.heartbeat_interval, 10_000);
        assert_eq!(start.generation_id, 42);

        let session = config.start_session_msg(ServerStatus::Normal);
        assert!(session.assured);
        assert_eq!(session.assured_mode, AssuredMode::SafeRead);
        assert_eq!(session.safe_data_level, 2);
    }
}

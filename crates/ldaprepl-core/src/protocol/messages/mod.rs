//! Message families

pub mod ack;
pub mod flow;
pub mod handshake;
pub mod monitor;
pub mod resync;
pub mod topology;
pub mod update;

pub use ack::AckMsg;
pub use flow::{ChangeTimeHeartbeatMsg, HeartbeatMsg, ReplicaOfflineMsg, WindowMsg, WindowProbeMsg};
pub use handshake::{
    ChangeStatusMsg, DEFAULT_DEGRADED_STATUS_THRESHOLD, DEFAULT_GROUP_ID, ReplServerStartMsg, ServerStartMsg,
    ServerStatus, StartSessionMsg, StopMsg,
};
pub use monitor::{MonitorMsg, MonitorRequestMsg, PeerMonitorData};
pub use resync::{
    DEFAULT_INIT_WINDOW, DoneMsg, EntryMsg, ErrorMsg, InitializeRcvAckMsg, InitializeRequestMsg, InitializeTargetMsg,
    ResetGenerationIdMsg,
};
pub use topology::{DEFAULT_RS_WEIGHT, DsInfo, RsInfo, TopologyMsg};
pub use update::{
    AddMsg, AssuredMode, DeleteMsg, GenericUpdateMsg, LdapUpdate, ModifyDnMsg, ModifyMsg, UpdateHeader, UpdateMessage,
};

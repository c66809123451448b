//! Directory operations exchanged with the operation-processing engine
//!
//! The engine hands locally processed operations to
//! [`LdapUpdate::from_operation`](crate::protocol::LdapUpdate::from_operation)
//! and replays remote changes from operations built by
//! `create_operation`. Only the fields replication needs are modelled.

use crate::csn::Csn;
use crate::ldap::{Modification, RawAttribute};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Replication data attached to an operation by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    /// CSN stamped on the change
    pub csn: Csn,
    /// entryUUID of the target entry
    pub entry_uuid: String,
    /// entryUUID of the parent (add) or of the new superior (modify-DN)
    pub parent_entry_uuid: Option<String>,
}

impl OperationContext {
    /// Create a context without parent linkage
    pub fn new(csn: Csn, entry_uuid: impl Into<String>) -> Self {
        Self {
            csn,
            entry_uuid: entry_uuid.into(),
            parent_entry_uuid: None,
        }
    }

    /// Attach the parent or new-superior entryUUID
    pub fn with_parent_entry_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.parent_entry_uuid = Some(uuid.into());
        self
    }
}

/// Kind-specific part of a directory operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Entry creation
    Add {
        /// Object classes of the new entry
        object_classes: Vec<String>,
        /// User attributes
        user_attributes: Vec<RawAttribute>,
        /// Operational attributes
        operational_attributes: Vec<RawAttribute>,
    },
    /// Attribute changes
    Modify {
        /// Ordered modifications
        modifications: Vec<Modification>,
    },
    /// Entry removal
    Delete {
        /// Whole subtree removed with the subtree-delete control
        subtree: bool,
        /// Requester DN recorded for the change log
        initiators_name: Option<String>,
    },
    /// Rename or move
    ModifyDn {
        /// New RDN
        new_rdn: String,
        /// Remove the old RDN values from the entry
        delete_old_rdn: bool,
        /// New parent DN when the entry moves
        new_superior: Option<String>,
        /// Modifications applied along with the rename
        modifications: Vec<Modification>,
    },
}

/// A directory operation as seen by replication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapOperation {
    /// Operation id allocated by the connection
    pub operation_id: u64,
    /// LDAP message id allocated by the connection
    pub message_id: u32,
    /// Target entry DN
    pub dn: String,
    /// Replication context, `None` until the engine stamps a CSN
    pub context: Option<OperationContext>,
    /// Replay of a remote change rather than a client request
    pub synchronization: bool,
    /// What the operation does
    pub kind: OperationKind,
}

impl LdapOperation {
    /// Create a client operation without replication context
    pub fn new(conn: &dyn Connection, dn: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            operation_id: conn.next_operation_id(),
            message_id: conn.next_message_id(),
            dn: dn.into(),
            context: None,
            synchronization: false,
            kind,
        }
    }

    /// Attach the replication context
    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = Some(context);
        self
    }

    /// CSN of the change, if stamped
    pub fn csn(&self) -> Option<Csn> {
        self.context.as_ref().map(|ctx| ctx.csn)
    }
}

/// Source of operation and message ids
pub trait Connection: Send + Sync {
    /// Connection identifier
    fn connection_id(&self) -> u64;

    /// Next operation id on this connection
    fn next_operation_id(&self) -> u64;

    /// Next LDAP message id on this connection
    fn next_message_id(&self) -> u32;
}

/// Connection used to replay replicated changes
#[derive(Debug)]
pub struct InternalConnection {
    id: u64,
    next_operation: AtomicU64,
    next_message: AtomicU32,
}

impl InternalConnection {
    /// Create an internal connection
    pub fn new(id: u64) -> Self {
        Self {
            id,
            next_operation: AtomicU64::new(0),
            next_message: AtomicU32::new(1),
        }
    }
}

impl Default for InternalConnection {
    fn default() -> Self {
        Self::new(u64::MAX)
    }
}

impl Connection for InternalConnection {
    fn connection_id(&self) -> u64 {
        self.id
    }

    fn next_operation_id(&self) -> u64 {
        self.next_operation.fetch_add(1, Ordering::Relaxed)
    }

    fn next_message_id(&self) -> u32 {
        self.next_message.fetch_add(1, Ordering::Relaxed)
    }
}

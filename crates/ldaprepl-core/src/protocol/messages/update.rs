//! Update messages
//!
//! Add, modify, delete and modify-DN share one envelope:
//!
//! ```text
//! V1   [tag][csn\0][dn\0][entryUUID\0][assured]
//! V2+  [tag][version][csn\0][dn\0][entryUUID\0][assured][mode][safeDataLevel]
//! ```
//!
//! followed by a kind-specific body. Up to V3 the bodies are the legacy
//! layouts; from V4 every LDAP block is length-prefixed and the external
//! change log attributes close the message.

use crate::csn::Csn;
use crate::ldap::{Modification, OBJECT_CLASS, RawAttribute, is_operational_attribute};
use crate::operation::{Connection, LdapOperation, OperationContext, OperationKind};
use crate::protocol::ber;
use crate::protocol::codec::{ByteReader, ByteWriter};
use crate::protocol::message_type::MessageType;
use crate::protocol::version::{Feature, ProtocolVersion};
use crate::protocol::{WireMessage, open_message, start_message};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Sub-mode of assured replication
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AssuredMode {
    /// Acknowledged once enough directory servers can serve the change
    SafeRead = 1,
    /// Acknowledged once `safe_data_level` replication servers stored the change
    #[default]
    SafeData = 2,
}

impl TryFrom<u8> for AssuredMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::SafeRead),
            2 => Ok(Self::SafeData),
            _ => Err(Error::malformed(format!("unknown assured mode {}", value))),
        }
    }
}

/// Fields shared by every LDAP update message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateHeader {
    csn: Csn,
    dn: String,
    entry_uuid: String,
    assured: bool,
    assured_mode: AssuredMode,
    safe_data_level: u8,
    ecl_includes: Vec<RawAttribute>,
}

impl UpdateHeader {
    fn new(csn: Csn, dn: String, entry_uuid: String) -> Self {
        Self {
            csn,
            dn,
            entry_uuid,
            assured: false,
            assured_mode: AssuredMode::SafeData,
            safe_data_level: 1,
            ecl_includes: Vec::new(),
        }
    }

    fn encode(&self, w: &mut ByteWriter, version: ProtocolVersion) -> Result<()> {
        let full = version.supports(Feature::AssuredUpdateHeader);
        if full {
            w.put_u8(version.as_u8());
        }
        w.put_csn(&self.csn);
        w.put_str(&self.dn)?;
        w.put_str(&self.entry_uuid)?;
        w.put_bool(self.assured);
        if full {
            w.put_u8(self.assured_mode as u8);
            w.put_u8(self.safe_data_level);
        }
        Ok(())
    }

    fn decode(r: &mut ByteReader<'_>, version: ProtocolVersion) -> Result<Self> {
        let full = version.supports(Feature::AssuredUpdateHeader);
        if full {
            check_embedded_version(r.get_u8()?, version)?;
        }
        let mut header = Self::new(r.get_csn()?, r.get_str()?, r.get_str()?);
        header.assured = r.get_bool()?;
        if full {
            header.assured_mode = AssuredMode::try_from(r.get_u8()?)?;
            header.safe_data_level = r.get_u8()?;
        }
        Ok(header)
    }

    fn context(&self, parent: Option<String>) -> OperationContext {
        OperationContext {
            csn: self.csn,
            entry_uuid: self.entry_uuid.clone(),
            parent_entry_uuid: parent,
        }
    }
}

fn check_embedded_version(found: u8, version: ProtocolVersion) -> Result<()> {
    if found != version.as_u8() {
        return Err(Error::version_mismatch(format!(
            "update encoded for protocol {} received on a {} session",
            found, version
        )));
    }
    Ok(())
}

fn put_ecl(w: &mut ByteWriter, header: &UpdateHeader, version: ProtocolVersion) {
    if version.supports(Feature::EclIncludes) {
        w.put_slice(&ber::encode_attributes(&header.ecl_includes));
    }
}

fn get_ecl(r: &mut ByteReader<'_>, header: &mut UpdateHeader, version: ProtocolVersion) -> Result<()> {
    if version.supports(Feature::EclIncludes) {
        header.ecl_includes = ber::decode_attributes(r.get_rest())?;
    }
    Ok(())
}

fn put_block(w: &mut ByteWriter, block: &[u8]) {
    w.put_num(block.len());
    w.put_slice(block);
}

fn get_block<'a>(r: &mut ByteReader<'a>) -> Result<&'a [u8]> {
    let len: usize = r.get_num()?;
    r.get_slice(len)
}

/// Legacy modification list: BER sequences then a NUL byte
fn put_legacy_mods(w: &mut ByteWriter, mods: &[Modification]) {
    w.put_slice(&ber::encode_modifications(mods));
    w.put_u8(0);
}

fn get_legacy_mods(r: &mut ByteReader<'_>) -> Result<Vec<Modification>> {
    let rest = r.get_rest();
    let len = ber::modifications_len(rest)?;
    if rest[len..] != [0u8] {
        return Err(Error::malformed("modification list is not NUL-terminated"));
    }
    ber::decode_modifications(&rest[..len])
}

mod sealed {
    pub trait HeaderAccess {
        fn header_mut(&mut self) -> &mut super::UpdateHeader;
    }
}

/// Accessors and builders common to the four LDAP update messages
///
/// The `with_*` builders consume the message, so once a message is shared or
/// encoded it can no longer change.
pub trait UpdateMessage: sealed::HeaderAccess + Sized {
    /// Shared envelope
    fn header(&self) -> &UpdateHeader;

    /// CSN of the change
    fn csn(&self) -> Csn {
        self.header().csn
    }

    /// Target DN
    fn dn(&self) -> &str {
        &self.header().dn
    }

    /// entryUUID of the target entry
    fn entry_uuid(&self) -> &str {
        &self.header().entry_uuid
    }

    /// Whether the sender waits for an acknowledgment
    fn is_assured(&self) -> bool {
        self.header().assured
    }

    /// Assured sub-mode
    fn assured_mode(&self) -> AssuredMode {
        self.header().assured_mode
    }

    /// Number of replication servers that must store the change
    fn safe_data_level(&self) -> u8 {
        self.header().safe_data_level
    }

    /// Attributes published to the external change log
    fn ecl_includes(&self) -> &[RawAttribute] {
        &self.header().ecl_includes
    }

    /// Set the assured flag
    fn with_assured(mut self, assured: bool) -> Self {
        self.header_mut().assured = assured;
        self
    }

    /// Set the assured sub-mode
    fn with_assured_mode(mut self, mode: AssuredMode) -> Self {
        self.header_mut().assured_mode = mode;
        self
    }

    /// Set the safe data level
    fn with_safe_data_level(mut self, level: u8) -> Self {
        self.header_mut().safe_data_level = level;
        self
    }

    /// Attach external change log attributes
    fn with_ecl_includes(mut self, attrs: Vec<RawAttribute>) -> Self {
        self.header_mut().ecl_includes = attrs;
        self
    }
}

macro_rules! update_header_access {
    ($($msg:ty),*) => {
        $(
            impl sealed::HeaderAccess for $msg {
                fn header_mut(&mut self) -> &mut UpdateHeader {
                    &mut self.header
                }
            }

            impl UpdateMessage for $msg {
                fn header(&self) -> &UpdateHeader {
                    &self.header
                }
            }
        )*
    };
}

update_header_access!(AddMsg, ModifyMsg, DeleteMsg, ModifyDnMsg);

/// Entry creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMsg {
    header: UpdateHeader,
    parent_entry_uuid: Option<String>,
    object_classes: Vec<String>,
    user_attributes: Vec<RawAttribute>,
    operational_attributes: Vec<RawAttribute>,
}

impl AddMsg {
    /// Create an add message
    ///
    /// An `objectClass` user attribute is folded into the object classes,
    /// which is where the wire form puts it back when decoding.
    pub fn new(
        csn: Csn,
        dn: impl Into<String>,
        entry_uuid: impl Into<String>,
        parent_entry_uuid: Option<String>,
        object_classes: Vec<String>,
        user_attributes: Vec<RawAttribute>,
        operational_attributes: Vec<RawAttribute>,
    ) -> Self {
        let mut msg = Self {
            header: UpdateHeader::new(csn, dn.into(), entry_uuid.into()),
            parent_entry_uuid,
            object_classes,
            user_attributes: Vec::new(),
            operational_attributes,
        };
        msg.absorb(user_attributes, false);
        msg
    }

    /// entryUUID of the parent entry
    pub fn parent_entry_uuid(&self) -> Option<&str> {
        self.parent_entry_uuid.as_deref()
    }

    /// Object classes of the new entry
    pub fn object_classes(&self) -> &[String] {
        &self.object_classes
    }

    /// User attributes
    pub fn user_attributes(&self) -> &[RawAttribute] {
        &self.user_attributes
    }

    /// Operational attributes
    pub fn operational_attributes(&self) -> &[RawAttribute] {
        &self.operational_attributes
    }

    fn entry_block(&self) -> Vec<u8> {
        let object_class = (!self.object_classes.is_empty())
            .then(|| RawAttribute::new(OBJECT_CLASS, self.object_classes.iter().cloned()));
        ber::encode_attributes(object_class.iter().chain(self.user_attributes.iter()))
    }

    fn absorb(&mut self, attrs: Vec<RawAttribute>, split_operational: bool) {
        for attr in attrs {
            if attr.is_named(OBJECT_CLASS) {
                self.object_classes.extend(attr.values);
            } else if split_operational && is_operational_attribute(&attr.name) {
                self.operational_attributes.push(attr);
            } else {
                self.user_attributes.push(attr);
            }
        }
    }

    /// Build the replay operation
    pub fn create_operation(&self, conn: &dyn Connection) -> LdapOperation {
        replay(
            conn,
            &self.header,
            self.parent_entry_uuid.clone(),
            OperationKind::Add {
                object_classes: self.object_classes.clone(),
                user_attributes: self.user_attributes.clone(),
                operational_attributes: self.operational_attributes.clone(),
            },
        )
    }
}

impl WireMessage for AddMsg {
    fn message_type(version: ProtocolVersion) -> MessageType {
        if version.supports(Feature::AssuredUpdateHeader) {
            MessageType::Add
        } else {
            MessageType::AddV1
        }
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        self.header.encode(&mut w, version)?;
        w.put_opt_str(self.parent_entry_uuid.as_deref())?;
        if version.supports(Feature::EclIncludes) {
            put_block(&mut w, &self.entry_block());
            put_block(&mut w, &ber::encode_attributes(&self.operational_attributes));
            put_ecl(&mut w, &self.header, version);
        } else {
            w.put_slice(&self.entry_block());
            w.put_slice(&ber::encode_attributes(&self.operational_attributes));
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let header = UpdateHeader::decode(&mut r, version)?;
        let mut msg = Self {
            header,
            parent_entry_uuid: r.get_opt_str()?,
            object_classes: Vec::new(),
            user_attributes: Vec::new(),
            operational_attributes: Vec::new(),
        };
        if version.supports(Feature::EclIncludes) {
            let entry = ber::decode_attributes(get_block(&mut r)?)?;
            msg.absorb(entry, false);
            msg.operational_attributes = ber::decode_attributes(get_block(&mut r)?)?;
            get_ecl(&mut r, &mut msg.header, version)?;
        } else {
            let attrs = ber::decode_attributes(r.get_rest())?;
            msg.absorb(attrs, true);
        }
        r.finish()?;
        Ok(msg)
    }
}

/// Attribute modifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyMsg {
    header: UpdateHeader,
    modifications: Vec<Modification>,
}

impl ModifyMsg {
    /// Create a modify message
    pub fn new(
        csn: Csn,
        dn: impl Into<String>,
        entry_uuid: impl Into<String>,
        modifications: Vec<Modification>,
    ) -> Self {
        Self {
            header: UpdateHeader::new(csn, dn.into(), entry_uuid.into()),
            modifications,
        }
    }

    /// Ordered modifications
    pub fn modifications(&self) -> &[Modification] {
        &self.modifications
    }

    /// Build the replay operation
    pub fn create_operation(&self, conn: &dyn Connection) -> LdapOperation {
        replay(
            conn,
            &self.header,
            None,
            OperationKind::Modify {
                modifications: self.modifications.clone(),
            },
        )
    }
}

impl WireMessage for ModifyMsg {
    fn message_type(version: ProtocolVersion) -> MessageType {
        if version.supports(Feature::AssuredUpdateHeader) {
            MessageType::Modify
        } else {
            MessageType::ModifyV1
        }
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        self.header.encode(&mut w, version)?;
        if version.supports(Feature::EclIncludes) {
            put_block(&mut w, &ber::encode_modifications(&self.modifications));
            put_ecl(&mut w, &self.header, version);
        } else {
            put_legacy_mods(&mut w, &self.modifications);
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let mut header = UpdateHeader::decode(&mut r, version)?;
        let modifications = if version.supports(Feature::EclIncludes) {
            let mods = ber::decode_modifications(get_block(&mut r)?)?;
            get_ecl(&mut r, &mut header, version)?;
            mods
        } else {
            get_legacy_mods(&mut r)?
        };
        r.finish()?;
        Ok(Self {
            header,
            modifications,
        })
    }
}

/// Entry removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMsg {
    header: UpdateHeader,
    subtree: bool,
    initiators_name: Option<String>,
}

impl DeleteMsg {
    /// Create a delete message
    pub fn new(csn: Csn, dn: impl Into<String>, entry_uuid: impl Into<String>) -> Self {
        Self {
            header: UpdateHeader::new(csn, dn.into(), entry_uuid.into()),
            subtree: false,
            initiators_name: None,
        }
    }

    /// Mark as a subtree delete
    pub fn with_subtree(mut self, subtree: bool) -> Self {
        self.subtree = subtree;
        self
    }

    /// Record the requester DN
    pub fn with_initiators_name(mut self, name: impl Into<String>) -> Self {
        self.initiators_name = Some(name.into());
        self
    }

    /// Whether the whole subtree was removed
    pub fn is_subtree_delete(&self) -> bool {
        self.subtree
    }

    /// Requester DN, if recorded
    pub fn initiators_name(&self) -> Option<&str> {
        self.initiators_name.as_deref()
    }

    /// Build the replay operation
    pub fn create_operation(&self, conn: &dyn Connection) -> LdapOperation {
        replay(
            conn,
            &self.header,
            None,
            OperationKind::Delete {
                subtree: self.subtree,
                initiators_name: self.initiators_name.clone(),
            },
        )
    }
}

impl WireMessage for DeleteMsg {
    fn message_type(version: ProtocolVersion) -> MessageType {
        if version.supports(Feature::AssuredUpdateHeader) {
            MessageType::Delete
        } else {
            MessageType::DeleteV1
        }
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        self.header.encode(&mut w, version)?;
        if version.supports(Feature::DeleteInitiator) {
            w.put_opt_str(self.initiators_name.as_deref())?;
            w.put_bool(self.subtree);
        }
        put_ecl(&mut w, &self.header, version);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let mut header = UpdateHeader::decode(&mut r, version)?;
        let mut initiators_name = None;
        let mut subtree = false;
        if version.supports(Feature::DeleteInitiator) {
            initiators_name = r.get_opt_str()?;
            subtree = r.get_bool()?;
        }
        get_ecl(&mut r, &mut header, version)?;
        r.finish()?;
        Ok(Self {
            header,
            subtree,
            initiators_name,
        })
    }
}

/// Rename or move, optionally bundled with modifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyDnMsg {
    header: UpdateHeader,
    new_rdn: String,
    delete_old_rdn: bool,
    new_superior: Option<String>,
    new_superior_entry_uuid: Option<String>,
    modifications: Vec<Modification>,
}

impl ModifyDnMsg {
    /// Create a modify-DN message
    pub fn new(
        csn: Csn,
        dn: impl Into<String>,
        entry_uuid: impl Into<String>,
        new_rdn: impl Into<String>,
        delete_old_rdn: bool,
    ) -> Self {
        Self {
            header: UpdateHeader::new(csn, dn.into(), entry_uuid.into()),
            new_rdn: new_rdn.into(),
            delete_old_rdn,
            new_superior: None,
            new_superior_entry_uuid: None,
            modifications: Vec::new(),
        }
    }

    /// Move under a new parent
    pub fn with_new_superior(
        mut self,
        new_superior: impl Into<String>,
        new_superior_entry_uuid: Option<String>,
    ) -> Self {
        self.new_superior = Some(new_superior.into());
        self.new_superior_entry_uuid = new_superior_entry_uuid;
        self
    }

    /// Attach modifications applied with the rename
    pub fn with_modifications(mut self, modifications: Vec<Modification>) -> Self {
        self.modifications = modifications;
        self
    }

    /// New RDN
    pub fn new_rdn(&self) -> &str {
        &self.new_rdn
    }

    /// Whether old RDN values are removed
    pub fn delete_old_rdn(&self) -> bool {
        self.delete_old_rdn
    }

    /// New parent DN
    pub fn new_superior(&self) -> Option<&str> {
        self.new_superior.as_deref()
    }

    /// entryUUID of the new parent
    pub fn new_superior_entry_uuid(&self) -> Option<&str> {
        self.new_superior_entry_uuid.as_deref()
    }

    /// Modifications applied with the rename
    pub fn modifications(&self) -> &[Modification] {
        &self.modifications
    }

    /// DN of the entry after the rename
    pub fn new_dn(&self) -> String {
        let parent = match &self.new_superior {
            Some(sup) => sup.as_str(),
            None => parent_dn(&self.header.dn),
        };
        if parent.is_empty() {
            self.new_rdn.clone()
        } else {
            format!("{},{}", self.new_rdn, parent)
        }
    }

    /// Build the replay operation
    pub fn create_operation(&self, conn: &dyn Connection) -> LdapOperation {
        replay(
            conn,
            &self.header,
            self.new_superior_entry_uuid.clone(),
            OperationKind::ModifyDn {
                new_rdn: self.new_rdn.clone(),
                delete_old_rdn: self.delete_old_rdn,
                new_superior: self.new_superior.clone(),
                modifications: self.modifications.clone(),
            },
        )
    }
}

/// Parent of a DN in string form; escaped commas are not separators
fn parent_dn(dn: &str) -> &str {
    let bytes = dn.as_bytes();
    let mut escaped = false;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'\\' if !escaped => escaped = true,
            b',' if !escaped => return dn[i + 1..].trim_start(),
            _ => escaped = false,
        }
    }
    ""
}

impl WireMessage for ModifyDnMsg {
    fn message_type(version: ProtocolVersion) -> MessageType {
        if version.supports(Feature::AssuredUpdateHeader) {
            MessageType::ModifyDn
        } else {
            MessageType::ModifyDnV1
        }
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        self.header.encode(&mut w, version)?;
        w.put_str(&self.new_rdn)?;
        w.put_opt_str(self.new_superior.as_deref())?;
        w.put_opt_str(self.new_superior_entry_uuid.as_deref())?;
        w.put_bool(self.delete_old_rdn);
        if version.supports(Feature::EclIncludes) {
            put_block(&mut w, &ber::encode_modifications(&self.modifications));
            put_ecl(&mut w, &self.header, version);
        } else if version.supports(Feature::ModifyDnModifications) {
            put_legacy_mods(&mut w, &self.modifications);
        }
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        let mut header = UpdateHeader::decode(&mut r, version)?;
        let new_rdn = r.get_str()?;
        let new_superior = r.get_opt_str()?;
        let new_superior_entry_uuid = r.get_opt_str()?;
        let delete_old_rdn = r.get_bool()?;
        let modifications = if version.supports(Feature::EclIncludes) {
            let mods = ber::decode_modifications(get_block(&mut r)?)?;
            get_ecl(&mut r, &mut header, version)?;
            mods
        } else if version.supports(Feature::ModifyDnModifications) {
            get_legacy_mods(&mut r)?
        } else {
            Vec::new()
        };
        r.finish()?;
        Ok(Self {
            header,
            new_rdn,
            delete_old_rdn,
            new_superior,
            new_superior_entry_uuid,
            modifications,
        })
    }
}

fn replay(
    conn: &dyn Connection,
    header: &UpdateHeader,
    parent: Option<String>,
    kind: OperationKind,
) -> LdapOperation {
    LdapOperation {
        operation_id: conn.next_operation_id(),
        message_id: conn.next_message_id(),
        dn: header.dn.clone(),
        context: Some(header.context(parent)),
        synchronization: true,
        kind,
    }
}

/// Opaque update whose payload only the application understands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericUpdateMsg {
    csn: Csn,
    assured: bool,
    assured_mode: AssuredMode,
    safe_data_level: u8,
    payload: Vec<u8>,
}

impl GenericUpdateMsg {
    /// Create a generic update
    pub fn new(csn: Csn, payload: Vec<u8>) -> Self {
        Self {
            csn,
            assured: false,
            assured_mode: AssuredMode::SafeData,
            safe_data_level: 1,
            payload,
        }
    }

    /// Request assured delivery
    pub fn with_assured(mut self, mode: AssuredMode, safe_data_level: u8) -> Self {
        self.assured = true;
        self.assured_mode = mode;
        self.safe_data_level = safe_data_level;
        self
    }

    /// CSN of the change
    pub fn csn(&self) -> Csn {
        self.csn
    }

    /// Whether the sender waits for an acknowledgment
    pub fn is_assured(&self) -> bool {
        self.assured
    }

    /// Assured sub-mode
    pub fn assured_mode(&self) -> AssuredMode {
        self.assured_mode
    }

    /// Safe data level
    pub fn safe_data_level(&self) -> u8 {
        self.safe_data_level
    }

    /// Application payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl WireMessage for GenericUpdateMsg {
    fn message_type(_version: ProtocolVersion) -> MessageType {
        MessageType::GenericUpdate
    }

    fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        let mut w = start_message::<Self>(version)?;
        w.put_u8(version.as_u8());
        w.put_csn(&self.csn);
        w.put_bool(self.assured);
        w.put_u8(self.assured_mode as u8);
        w.put_u8(self.safe_data_level);
        w.put_slice(&self.payload);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut r = open_message::<Self>(bytes, version)?;
        check_embedded_version(r.get_u8()?, version)?;
        Ok(Self {
            csn: r.get_csn()?,
            assured: r.get_bool()?,
            assured_mode: AssuredMode::try_from(r.get_u8()?)?,
            safe_data_level: r.get_u8()?,
            payload: r.get_rest().to_vec(),
        })
    }
}

/// Any of the four LDAP update messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LdapUpdate {
    /// Entry creation
    Add(AddMsg),
    /// Attribute modifications
    Modify(ModifyMsg),
    /// Entry removal
    Delete(DeleteMsg),
    /// Rename or move
    ModifyDn(ModifyDnMsg),
}

impl LdapUpdate {
    /// Build the update message for a locally processed operation
    ///
    /// The operation must carry the replication context the engine attaches
    /// when it stamps a CSN on the change.
    pub fn from_operation(op: &LdapOperation) -> Result<Self> {
        let ctx = op.context.as_ref().ok_or_else(|| {
            Error::operation(format!("operation on '{}' has no replication context", op.dn))
        })?;
        let csn = ctx.csn;
        let uuid = ctx.entry_uuid.clone();
        let update = match &op.kind {
            OperationKind::Add {
                object_classes,
                user_attributes,
                operational_attributes,
            } => Self::Add(AddMsg::new(
                csn,
                op.dn.clone(),
                uuid,
                ctx.parent_entry_uuid.clone(),
                object_classes.clone(),
                user_attributes.clone(),
                operational_attributes.clone(),
            )),
            OperationKind::Modify { modifications } => Self::Modify(ModifyMsg::new(
                csn,
                op.dn.clone(),
                uuid,
                modifications.clone(),
            )),
            OperationKind::Delete {
                subtree,
                initiators_name,
            } => {
                let mut msg = DeleteMsg::new(csn, op.dn.clone(), uuid).with_subtree(*subtree);
                if let Some(name) = initiators_name {
                    msg = msg.with_initiators_name(name.clone());
                }
                Self::Delete(msg)
            }
            OperationKind::ModifyDn {
                new_rdn,
                delete_old_rdn,
                new_superior,
                modifications,
            } => {
                let mut msg = ModifyDnMsg::new(csn, op.dn.clone(), uuid, new_rdn.clone(), *delete_old_rdn)
                    .with_modifications(modifications.clone());
                if let Some(sup) = new_superior {
                    msg = msg.with_new_superior(sup.clone(), ctx.parent_entry_uuid.clone());
                }
                Self::ModifyDn(msg)
            }
        };
        Ok(update)
    }

    /// Build the operation replaying this update locally
    pub fn create_operation(&self, conn: &dyn Connection) -> LdapOperation {
        match self {
            Self::Add(msg) => msg.create_operation(conn),
            Self::Modify(msg) => msg.create_operation(conn),
            Self::Delete(msg) => msg.create_operation(conn),
            Self::ModifyDn(msg) => msg.create_operation(conn),
        }
    }

    /// Shared envelope
    pub fn header(&self) -> &UpdateHeader {
        match self {
            Self::Add(msg) => msg.header(),
            Self::Modify(msg) => msg.header(),
            Self::Delete(msg) => msg.header(),
            Self::ModifyDn(msg) => msg.header(),
        }
    }

    /// CSN of the change
    pub fn csn(&self) -> Csn {
        self.header().csn
    }

    /// Target DN
    pub fn dn(&self) -> &str {
        &self.header().dn
    }

    /// Tag used at `version`
    pub fn message_type(&self, version: ProtocolVersion) -> MessageType {
        match self {
            Self::Add(_) => AddMsg::message_type(version),
            Self::Modify(_) => ModifyMsg::message_type(version),
            Self::Delete(_) => DeleteMsg::message_type(version),
            Self::ModifyDn(_) => ModifyDnMsg::message_type(version),
        }
    }

    /// Encode whichever update this is
    pub fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        match self {
            Self::Add(msg) => msg.encode(version),
            Self::Modify(msg) => msg.encode(version),
            Self::Delete(msg) => msg.encode(version),
            Self::ModifyDn(msg) => msg.encode(version),
        }
    }
}

impl UpdateHeader {
    /// CSN of the change
    pub fn csn(&self) -> Csn {
        self.csn
    }

    /// Target DN
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// entryUUID of the target entry
    pub fn entry_uuid(&self) -> &str {
        &self.entry_uuid
    }

    /// Whether the sender waits for an acknowledgment
    pub fn is_assured(&self) -> bool {
        self.assured
    }

    /// Assured sub-mode
    pub fn assured_mode(&self) -> AssuredMode {
        self.assured_mode
    }

    /// Safe data level
    pub fn safe_data_level(&self) -> u8 {
        self.safe_data_level
    }

    /// External change log attributes
    pub fn ecl_includes(&self) -> &[RawAttribute] {
        &self.ecl_includes
    }
}

//! LDAP attribute and modification values carried by update messages

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Attribute names the directory maintains itself
const OPERATIONAL_ATTRIBUTES: &[&str] = &[
    "createtimestamp",
    "creatorsname",
    "modifytimestamp",
    "modifiersname",
    "entryuuid",
    "entrydn",
    "subschemasubentry",
    "hassubordinates",
    "numsubordinates",
    "structuralobjectclass",
    "governingstructurerule",
    "pwdchangedtime",
    "pwdaccountlockedtime",
    "pwdfailuretime",
    "pwdgraceusetime",
    "pwdhistory",
    "pwdreset",
    "ds-sync-hist",
    "ds-sync-conflict",
    "ds-pwp-account-disabled",
    "ds-pwp-last-login-time",
];

/// Name of the attribute holding an entry's object classes
pub const OBJECT_CLASS: &str = "objectClass";

/// True for directory-maintained attributes such as `creatorsName`
pub fn is_operational_attribute(name: &str) -> bool {
    let base = name.split(';').next().unwrap_or(name);
    OPERATIONAL_ATTRIBUTES
        .iter()
        .any(|op| op.eq_ignore_ascii_case(base))
}

/// Attribute description with its values, as found in an LDAP PDU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttribute {
    /// Attribute description, options included
    pub name: String,
    /// Values in their LDAP string form
    pub values: Vec<String>,
}

impl RawAttribute {
    /// Create an attribute with values
    pub fn new<N, I, V>(name: N, values: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an attribute with no values
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// Case-insensitive attribute description match
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// LDAP modify operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModificationType {
    /// Add values
    Add = 0,
    /// Delete values, or the whole attribute when none are listed
    Delete = 1,
    /// Replace all values
    Replace = 2,
    /// Increment an integer value
    Increment = 3,
}

impl TryFrom<u8> for ModificationType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Add),
            1 => Ok(Self::Delete),
            2 => Ok(Self::Replace),
            3 => Ok(Self::Increment),
            _ => Err(Error::malformed(format!(
                "unknown modification type {}",
                value
            ))),
        }
    }
}

/// One change of an LDAP modify request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    /// What to do with the values
    pub kind: ModificationType,
    /// Attribute and values affected
    pub attribute: RawAttribute,
}

impl Modification {
    /// Create a modification
    pub fn new(kind: ModificationType, attribute: RawAttribute) -> Self {
        Self { kind, attribute }
    }
}

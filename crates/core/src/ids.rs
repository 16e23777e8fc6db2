//! Object and versioned identifiers
//!
//! An [`ObjectId`] names a logical document across all of its versions and
//! corrections. A [`UniqueId`] additionally pins one stored row through an
//! optional version component. Both render as `~`-separated tokens:
//! `scheme~value` and `scheme~value~version`.

use crate::error::{MasterError, MasterResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '~';

/// Anything that can name the logical document it belongs to
pub trait ObjectIdentifiable: fmt::Display {
    /// Scheme of the master that issued the identifier
    fn scheme(&self) -> &str;

    /// Scheme-local value (the numeric object id for this master)
    fn value(&self) -> &str;

    /// The object-level identifier
    fn object_id(&self) -> ObjectId;
}

/// Stable identifier of a logical document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    scheme: String,
    value: String,
}

impl ObjectId {
    /// Create an object identifier; neither part may be empty or contain `~`
    pub fn of(scheme: impl Into<String>, value: impl Into<String>) -> MasterResult<Self> {
        let scheme = scheme.into();
        let value = value.into();
        check_part(&scheme, "scheme", &scheme, &value)?;
        check_part(&value, "value", &scheme, &value)?;
        Ok(ObjectId { scheme, value })
    }

    // Parts already validated by the caller.
    pub(crate) fn from_parts(scheme: String, value: String) -> Self {
        ObjectId { scheme, value }
    }

    /// Identifier of the latest row of this object (no version component)
    pub fn at_latest(&self) -> UniqueId {
        UniqueId {
            scheme: self.scheme.clone(),
            value: self.value.clone(),
            version: None,
        }
    }

    /// Identifier of a specific row of this object
    pub fn at_version(&self, version: impl Into<String>) -> UniqueId {
        UniqueId {
            scheme: self.scheme.clone(),
            value: self.value.clone(),
            version: Some(version.into()),
        }
    }
}

impl ObjectIdentifiable for ObjectId {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn object_id(&self) -> ObjectId {
        self.clone()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SEPARATOR, self.value)
    }
}

impl FromStr for ObjectId {
    type Err = MasterError;

    fn from_str(s: &str) -> MasterResult<Self> {
        let parsed: UniqueId = s.parse()?;
        if parsed.is_versioned() {
            return Err(MasterError::malformed(s, "object identifier must not carry a version"));
        }
        Ok(parsed.object_id())
    }
}

/// Identifier of a document, optionally pinned to one stored row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueId {
    scheme: String,
    value: String,
    version: Option<String>,
}

impl UniqueId {
    /// Create an identifier from its parts
    pub fn of(
        scheme: impl Into<String>,
        value: impl Into<String>,
        version: Option<String>,
    ) -> MasterResult<Self> {
        let object = ObjectId::of(scheme, value)?;
        match version {
            Some(v) => {
                check_part(&v, "version", &object.scheme, &object.value)?;
                Ok(object.at_version(v))
            }
            None => Ok(object.at_latest()),
        }
    }

    /// The version component, if any
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// True when the identifier pins a specific row
    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    /// Same object, version component dropped
    pub fn to_latest(&self) -> UniqueId {
        UniqueId {
            version: None,
            ..self.clone()
        }
    }
}

impl ObjectIdentifiable for UniqueId {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn object_id(&self) -> ObjectId {
        ObjectId {
            scheme: self.scheme.clone(),
            value: self.value.clone(),
        }
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SEPARATOR, self.value)?;
        if let Some(version) = &self.version {
            write!(f, "{}{}", SEPARATOR, version)?;
        }
        Ok(())
    }
}

impl FromStr for UniqueId {
    type Err = MasterError;

    fn from_str(s: &str) -> MasterResult<Self> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        match parts.as_slice() {
            [scheme, value] => UniqueId::of(*scheme, *value, None),
            [scheme, value, version] => UniqueId::of(*scheme, *value, Some(version.to_string())),
            _ => Err(MasterError::malformed(
                s,
                "expected scheme~value or scheme~value~version",
            )),
        }
        .map_err(|e| match e {
            MasterError::MalformedIdentifier { reason, .. } => MasterError::malformed(s, reason),
            other => other,
        })
    }
}

fn check_part(part: &str, what: &str, scheme: &str, value: &str) -> MasterResult<()> {
    if part.is_empty() {
        return Err(MasterError::malformed(
            format!("{}{}{}", scheme, SEPARATOR, value),
            format!("empty {}", what),
        ));
    }
    if part.contains(SEPARATOR) {
        return Err(MasterError::malformed(
            format!("{}{}{}", scheme, SEPARATOR, value),
            format!("{} contains '{}'", what, SEPARATOR),
        ));
    }
    Ok(())
}

//! Identifier codec
//!
//! Maps between external identifiers and the integer keys of the row table.
//! The object value is the object id (`oid`); the version component is the
//! offset of the row id from the oid, so `row_id = oid + version`. The first
//! row of an object has `row_id == oid` and therefore version `0`.

use crate::error::{MasterError, MasterResult};
use crate::ids::{ObjectId, ObjectIdentifiable, UniqueId};

/// Converts identifiers for one master's scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCodec {
    scheme: String,
}

impl IdCodec {
    /// Codec for the given scheme
    ///
    /// The scheme must be non-empty and must not contain the `~` separator.
    pub fn new(scheme: impl Into<String>) -> MasterResult<Self> {
        let scheme = scheme.into();
        if scheme.is_empty() || scheme.contains('~') {
            return Err(MasterError::config(format!(
                "invalid scheme {:?}: must be non-empty and must not contain '~'",
                scheme
            )));
        }
        Ok(IdCodec { scheme })
    }

    /// The configured scheme
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Fail unless the identifier was issued under this scheme
    pub fn check_scheme<I: ObjectIdentifiable + ?Sized>(&self, id: &I) -> MasterResult<()> {
        if id.scheme() != self.scheme {
            return Err(MasterError::SchemeMismatch {
                expected: self.scheme.clone(),
                actual: id.scheme().to_string(),
            });
        }
        Ok(())
    }

    /// Numeric object id carried by the identifier
    pub fn extract_oid<I: ObjectIdentifiable + ?Sized>(&self, id: &I) -> MasterResult<i64> {
        parse_non_negative(id.value()).ok_or_else(|| {
            MasterError::malformed(id, "not from this master (non-numeric object id)")
        })
    }

    /// Row id of a versioned identifier
    pub fn extract_row_id(&self, id: &UniqueId) -> MasterResult<i64> {
        let oid = self.extract_oid(id)?;
        let version = id
            .version()
            .ok_or_else(|| MasterError::malformed(id, "missing version component"))?;
        let offset = parse_non_negative(version).ok_or_else(|| {
            MasterError::malformed(id, "not from this master (non-numeric version)")
        })?;
        oid.checked_add(offset)
            .ok_or_else(|| MasterError::malformed(id, "row id out of range"))
    }

    /// Object identifier for an oid
    pub fn make_object_id(&self, oid: i64) -> ObjectId {
        ObjectId::from_parts(self.scheme.clone(), oid.to_string())
    }

    /// Versioned identifier for a row of the given object
    pub fn make_unique_id(&self, oid: i64, row_id: i64) -> UniqueId {
        self.make_object_id(oid)
            .at_version((row_id - oid).to_string())
    }
}

fn parse_non_negative(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok()
}

//! Document envelope

use crate::ids::{ObjectId, ObjectIdentifiable, UniqueId};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Business content wrapped with its identifier and both time intervals
///
/// Documents handed to `add` carry no identifier and no intervals; every
/// document returned by the master has all fields populated. Open-ended
/// interval ends are [`Timestamp::MAX`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T> {
    /// Versioned identifier of the row this document was read from
    pub unique_id: Option<UniqueId>,
    /// Start of the valid-time interval (inclusive)
    pub version_from: Option<Timestamp>,
    /// End of the valid-time interval (exclusive)
    pub version_to: Option<Timestamp>,
    /// Start of the transaction-time interval (inclusive)
    pub correction_from: Option<Timestamp>,
    /// End of the transaction-time interval (exclusive)
    pub correction_to: Option<Timestamp>,
    /// Business content
    pub content: T,
}

impl<T> Document<T> {
    /// A fresh document with no identifier or intervals
    pub fn new(content: T) -> Self {
        Document {
            unique_id: None,
            version_from: None,
            version_to: None,
            correction_from: None,
            correction_to: None,
            content,
        }
    }

    /// Set the identifier
    pub fn with_unique_id(mut self, unique_id: UniqueId) -> Self {
        self.unique_id = Some(unique_id);
        self
    }

    /// Set the start of the valid-time interval
    pub fn with_version_from(mut self, instant: Timestamp) -> Self {
        self.version_from = Some(instant);
        self
    }

    /// Set the end of the valid-time interval
    pub fn with_version_to(mut self, instant: Timestamp) -> Self {
        self.version_to = Some(instant);
        self
    }

    /// Object identifier, if the document has been stored
    pub fn object_id(&self) -> Option<ObjectId> {
        self.unique_id.as_ref().map(|id| id.object_id())
    }

    /// True when the valid-time interval is open-ended
    pub fn is_latest_version(&self) -> bool {
        self.version_to.map_or(false, |t| t.is_open_ended())
    }

    /// True when the transaction-time interval is open-ended
    pub fn is_latest_correction(&self) -> bool {
        self.correction_to.map_or(false, |t| t.is_open_ended())
    }

    /// Replace the content, keeping identifier and intervals
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Document<U> {
        Document {
            unique_id: self.unique_id,
            version_from: self.version_from,
            version_to: self.version_to,
            correction_from: self.correction_from,
            correction_to: self.correction_to,
            content: f(self.content),
        }
    }
}

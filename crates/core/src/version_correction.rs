//! Bitemporal query coordinate

use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on both time axes: valid time (`version_as_of`) and transaction
/// time (`corrected_to`). `None` on either axis means "latest".
///
/// Latest components must be pinned to a concrete instant with
/// [`VersionCorrection::with_latest_fixed`] before a lookup, so the same
/// coordinate always selects the same row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VersionCorrection {
    version_as_of: Option<Timestamp>,
    corrected_to: Option<Timestamp>,
}

impl VersionCorrection {
    /// Latest version, latest correction
    pub const LATEST: VersionCorrection = VersionCorrection {
        version_as_of: None,
        corrected_to: None,
    };

    /// Coordinate from optional components
    pub const fn of(version_as_of: Option<Timestamp>, corrected_to: Option<Timestamp>) -> Self {
        VersionCorrection {
            version_as_of,
            corrected_to,
        }
    }

    /// Version as of an instant, latest correction
    pub const fn of_version_as_of(version_as_of: Timestamp) -> Self {
        Self::of(Some(version_as_of), None)
    }

    /// Latest version, corrected to an instant
    pub const fn of_corrected_to(corrected_to: Timestamp) -> Self {
        Self::of(None, Some(corrected_to))
    }

    /// Valid-time component
    pub fn version_as_of(&self) -> Option<Timestamp> {
        self.version_as_of
    }

    /// Transaction-time component
    pub fn corrected_to(&self) -> Option<Timestamp> {
        self.corrected_to
    }

    /// True if either component is "latest"
    pub fn contains_latest(&self) -> bool {
        self.version_as_of.is_none() || self.corrected_to.is_none()
    }

    /// Replace "latest" components with `now`
    pub fn with_latest_fixed(&self, now: Timestamp) -> Self {
        VersionCorrection {
            version_as_of: Some(self.version_as_of.unwrap_or(now)),
            corrected_to: Some(self.corrected_to.unwrap_or(now)),
        }
    }
}

impl fmt::Display for VersionCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("V")?;
        match self.version_as_of {
            Some(v) => write!(f, "{}", v)?,
            None => f.write_str("LATEST")?,
        }
        f.write_str(".C")?;
        match self.corrected_to {
            Some(c) => write!(f, "{}", c),
            None => f.write_str("LATEST"),
        }
    }
}

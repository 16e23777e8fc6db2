//! Microsecond-precision instant on either time axis
//!
//! Timestamps are microseconds since the Unix epoch. [`Timestamp::MAX`] is the
//! sentinel for an open-ended interval ("+∞"): it is stored in the `*_to`
//! columns of rows that have not been closed and compares greater than every
//! real instant, so predicates never need a null branch.
//!
//! ```
//! use docmaster_core::Timestamp;
//!
//! let t = Timestamp::from_secs(1_000);
//! assert!(t < Timestamp::MAX);
//! assert!(Timestamp::MAX.is_open_ended());
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microsecond-precision instant
///
/// ## Invariants
///
/// - Always non-negative
/// - Totally ordered, `MAX` is the greatest value
/// - `MAX` never denotes a real instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Sentinel for "+∞", the end of an interval that is still open
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Current wall-clock instant
    ///
    /// Returns epoch if the system clock reads before the Unix epoch.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as u64)
    }

    /// From microseconds since epoch
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// From milliseconds since epoch
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1_000))
    }

    /// From seconds since epoch
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// From a UTC date-time; instants before the epoch clamp to epoch
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Timestamp(dt.timestamp_micros().max(0) as u64)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Microseconds since epoch
    #[inline]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Milliseconds since epoch (truncates)
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000
    }

    /// Seconds since epoch (truncates)
    #[inline]
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// True for the open-ended sentinel
    #[inline]
    pub const fn is_open_ended(&self) -> bool {
        self.0 == u64::MAX
    }

    /// As a UTC date-time, `None` for the sentinel or out-of-range values
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if self.is_open_ended() {
            return None;
        }
        i64::try_from(self.0)
            .ok()
            .and_then(DateTime::from_timestamp_micros)
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    /// Duration since an earlier instant, `None` if `earlier` is later
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        self.0
            .checked_sub(earlier.0)
            .map(Duration::from_micros)
    }

    /// Add a duration; the sentinel stays the sentinel
    pub fn saturating_add(&self, duration: Duration) -> Self {
        if self.is_open_ended() {
            return *self;
        }
        let added = self.0.saturating_add(duration.as_micros() as u64);
        // never produce the sentinel from a real instant
        Timestamp(added.min(u64::MAX - 1))
    }

    /// Subtract a duration, saturating at epoch
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration.as_micros() as u64))
    }

    /// Check if this instant is before another
    #[inline]
    pub fn is_before(&self, other: Timestamp) -> bool {
        self.0 < other.0
    }

    /// Check if this instant is after another
    #[inline]
    pub fn is_after(&self, other: Timestamp) -> bool {
        self.0 > other.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_open_ended() {
            return f.write_str("+inf");
        }
        match self.to_datetime() {
            Some(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => write!(f, "{}us", self.0),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::from_datetime(dt)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

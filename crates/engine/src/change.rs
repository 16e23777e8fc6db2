//! Change notification
//!
//! After a mutation commits, the master publishes one [`ChangeEvent`] to every
//! registered [`ChangeListener`]. Listeners run synchronously on the
//! mutating thread. A failing listener is logged and skipped; it can never
//! undo or fail the mutation that produced the event.

use docmaster_core::{ObjectId, Timestamp, UniqueId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// A new object
    Added,
    /// A new version superseded the latest one
    Updated,
    /// A version was corrected
    Corrected,
    /// The object no longer has a latest version
    Removed,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeType::Added => "added",
            ChangeType::Updated => "updated",
            ChangeType::Corrected => "corrected",
            ChangeType::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// One committed change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened
    pub change_type: ChangeType,
    /// Object affected
    pub object_id: ObjectId,
    /// Identifier of the row that was superseded, if any
    pub before_id: Option<UniqueId>,
    /// Identifier of the row that now represents the object, if any
    pub after_id: Option<UniqueId>,
    /// Start of the affected valid-time window
    pub version_from: Timestamp,
    /// End of the affected valid-time window
    pub version_to: Timestamp,
    /// Transaction time of the change
    pub effective_instant: Timestamp,
}

/// Receives committed changes
pub trait ChangeListener: Send + Sync {
    /// Called once per committed change
    ///
    /// # Errors
    ///
    /// Errors are logged by the publisher and otherwise ignored.
    fn entity_changed(&self, event: &ChangeEvent) -> anyhow::Result<()>;
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn entity_changed(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Fan-out of change events to registered listeners
#[derive(Default)]
pub struct ChangeManager {
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl ChangeManager {
    /// Manager with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.write().push(listener);
    }

    /// Unregister a listener; returns false if it was not registered
    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver an event to every listener
    pub fn publish(&self, event: &ChangeEvent) {
        // Snapshot so a listener may register others without deadlocking.
        let listeners: Vec<Arc<dyn ChangeListener>> = self.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.entity_changed(event) {
                warn!(
                    target: "docmaster::master",
                    change = %event.change_type,
                    object_id = %event.object_id,
                    error = %e,
                    "change listener failed"
                );
            }
        }
    }
}

impl fmt::Debug for ChangeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeManager")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

//! Blacklist Gate: handles barred from registering and withdrawing

use bounty_types::ExternalHandle;
use std::collections::HashSet;
use tracing::info;

/// External handles barred from registering or claiming
#[derive(Clone, Debug, Default)]
pub struct BlacklistGate {
    handles: HashSet<ExternalHandle>,
}

impl BlacklistGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blacklisted(&self, handle: &ExternalHandle) -> bool {
        self.handles.contains(handle)
    }

    /// Returns whether the set changed; adding twice is a no-op
    pub fn add(&mut self, handle: ExternalHandle) -> bool {
        let added = self.handles.insert(handle.clone());
        if added {
            info!(handle = %handle, "Handle blacklisted");
        }
        added
    }

    /// Returns whether the set changed; removing an absent entry is a no-op
    pub fn remove(&mut self, handle: &ExternalHandle) -> bool {
        let removed = self.handles.remove(handle);
        if removed {
            info!(handle = %handle, "Handle removed from blacklist");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

//! Single-owner playback slot.
//!
//! Only one track may play at a time. Instead of a process-wide "current
//! audio" reference, a player acquires a [`PlaybackLease`] from a shared
//! [`PlaybackArbiter`]. Acquiring preempts the previous holder; the preempted
//! lease observes the change through [`PlaybackLease::is_current`] or
//! [`PlaybackLease::preempted`] and stops its audio.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Owner of the playback slot at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOwner {
    pub lease_id: u64,
    pub track_id: String,
}

/// Hands out the playback slot to one lease at a time.
#[derive(Debug, Clone)]
pub struct PlaybackArbiter {
    next_id: Arc<AtomicU64>,
    owner: Arc<watch::Sender<Option<SlotOwner>>>,
}

impl PlaybackArbiter {
    pub fn new() -> Self {
        let (owner, _) = watch::channel(None);
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            owner: Arc::new(owner),
        }
    }

    /// Takes the slot for `track_id`, preempting any current holder.
    pub fn acquire(&self, track_id: impl Into<String>) -> PlaybackLease {
        let lease_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let track_id = track_id.into();
        self.owner.send_replace(Some(SlotOwner {
            lease_id,
            track_id: track_id.clone(),
        }));
        tracing::debug!(lease_id, track_id = %track_id, "playback slot acquired");

        PlaybackLease {
            lease_id,
            track_id,
            owner: self.owner.clone(),
            watcher: self.owner.subscribe(),
        }
    }

    /// Current slot owner, if any.
    pub fn current(&self) -> Option<SlotOwner> {
        self.owner.borrow().clone()
    }
}

impl Default for PlaybackArbiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Right to play one track. Released on drop.
#[derive(Debug)]
pub struct PlaybackLease {
    lease_id: u64,
    track_id: String,
    owner: Arc<watch::Sender<Option<SlotOwner>>>,
    watcher: watch::Receiver<Option<SlotOwner>>,
}

impl PlaybackLease {
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Returns true while no other lease has taken the slot.
    pub fn is_current(&self) -> bool {
        self.watcher
            .borrow()
            .as_ref()
            .is_some_and(|o| o.lease_id == self.lease_id)
    }

    /// Resolves once another lease takes the slot (or the slot is released).
    pub async fn preempted(&mut self) {
        let lease_id = self.lease_id;
        let arbiter_gone = self
            .watcher
            .wait_for(|o| o.as_ref().is_none_or(|o| o.lease_id != lease_id))
            .await
            .is_err();
        if arbiter_gone {
            // The arbiter is gone, which also ends this lease
            tracing::trace!(lease_id, "playback arbiter dropped");
        }
    }
}

impl Drop for PlaybackLease {
    fn drop(&mut self) {
        let lease_id = self.lease_id;
        // Only clear the slot if this lease still holds it
        self.owner.send_if_modified(|owner| {
            if owner.as_ref().is_some_and(|o| o.lease_id == lease_id) {
                *owner = None;
                true
            } else {
                false
            }
        });
    }
}

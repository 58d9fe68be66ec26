// Copyright (c) 2026 Virtfs contributors

// SPDX-License-Identifier: MIT
// All contributions are certified under the DCO

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NON-INFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

// ----------------------------------------------------------------------------

//! Change coordination.

use crossbeam::channel::{unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::fmt;

use crate::stat::Stat;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Watcher notification.
///
/// Backends deliver these through the [`ChangeSink`] they receive when the
/// file system registers its watchers. Notifications cross the boundary
/// from the backend's watcher thread into the single-threaded core, so they
/// carry plain data only.
#[derive(Clone, Debug)]
pub enum Notification {
    /// A path may have changed.
    ///
    /// A `None` path denotes a wholesale change, where arbitrary parts of
    /// the file system may differ. The stat snapshot is attached when the
    /// backend still observed the target after the change.
    Change {
        /// Changed path, or `None` for a wholesale change.
        path: Option<String>,
        /// Stat snapshot taken after the change, if available.
        stat: Option<Stat>,
    },

    /// The watcher infrastructure went away.
    ///
    /// All watched roots are torn down and caches invalidated in response.
    Offline,
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Watcher notification sink.
///
/// Cloneable sending half handed to the backend at watcher registration.
/// Sends never block and are silently dropped once the owning file system
/// is gone.
#[derive(Clone)]
pub struct ChangeSink {
    /// Notification sender.
    sender: Sender<Notification>,
}

// ----------------------------------------------------------------------------

/// External change.
///
/// A single deferred change notification, queued while an in-process
/// mutation is active.
#[derive(Debug)]
pub(crate) struct ExternalChange {
    /// Changed path, or `None` for a wholesale change.
    pub path: Option<String>,
    /// Stat snapshot taken after the change, if available.
    pub stat: Option<Stat>,
}

// ----------------------------------------------------------------------------

/// Change coordinator.
///
/// Tracks the active-mutation refcount that brackets in-process mutations,
/// and defers externally observed changes while the count is positive. The
/// point of the deferral is rename fidelity: an in-process rename updates
/// the index and fires its own event before the watcher's unrelated
/// delete/add pair for the same operation is allowed through, at which
/// point the pair resolves against the already-renamed index and collapses
/// into benign (or no) change events.
pub(crate) struct Coordinator {
    /// Active-mutation refcount.
    active: u32,
    /// Deferred external changes.
    pending: VecDeque<ExternalChange>,
    /// Notification receiver.
    receiver: Receiver<Notification>,
    /// Notification sender, cloned into sinks for backends.
    sender: Sender<Notification>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl ChangeSink {
    /// Reports a change at the given path.
    pub fn notify(&self, path: impl Into<String>, stat: Option<Stat>) {
        let _ = self.sender.send(Notification::Change {
            path: Some(path.into()),
            stat,
        });
    }

    /// Reports a wholesale change.
    pub fn notify_wholesale(&self) {
        let _ = self
            .sender
            .send(Notification::Change { path: None, stat: None });
    }

    /// Reports that the watcher infrastructure went offline.
    pub fn offline(&self) {
        let _ = self.sender.send(Notification::Offline);
    }
}

impl Coordinator {
    /// Creates a change coordinator.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            active: 0,
            pending: VecDeque::new(),
            receiver,
            sender,
        }
    }

    /// Returns a sink for watcher notifications.
    pub fn sink(&self) -> ChangeSink {
        ChangeSink { sender: self.sender.clone() }
    }

    /// Enters an in-process mutation.
    pub fn begin(&mut self) {
        self.active += 1;
    }

    /// Leaves an in-process mutation.
    ///
    /// Unbalanced calls are an invariant violation on the caller's side. We
    /// log and saturate at zero instead of going negative, so a stray call
    /// cannot wedge change delivery for the rest of the session.
    pub fn end(&mut self) {
        if self.active == 0 {
            tracing::warn!("unbalanced end of change, refcount already zero");
        } else {
            self.active -= 1;
        }
    }

    /// Returns whether an in-process mutation is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active > 0
    }

    /// Transfers pending watcher notifications into the deferred queue.
    ///
    /// Returns whether an offline notification was seen. Changes that
    /// arrived before the offline signal remain queued in arrival order.
    pub fn pump(&mut self) -> bool {
        let mut offline = false;
        while let Ok(notification) = self.receiver.try_recv() {
            match notification {
                Notification::Change { path, stat } => {
                    self.pending.push_back(ExternalChange { path, stat });
                }
                Notification::Offline => offline = true,
            }
        }
        offline
    }

    /// Takes the next deferred change, if the core is quiescent.
    ///
    /// Returns `None` while an in-process mutation is active, which is what
    /// keeps external change handling from running re-entrantly inside a
    /// bracketed mutation.
    pub fn pop_ready(&mut self) -> Option<ExternalChange> {
        if self.active == 0 {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /// Drops all deferred changes.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl fmt::Debug for ChangeSink {
    /// Formats the sink for debugging.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ChangeSink").finish_non_exhaustive()
    }
}

impl fmt::Debug for Coordinator {
    /// Formats the coordinator for debugging.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("active", &self.active)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defers_while_active() {
        let mut coordinator = Coordinator::new();
        let sink = coordinator.sink();

        coordinator.begin();
        sink.notify("/p/f.txt", None);
        assert!(!coordinator.pump());
        assert!(coordinator.pop_ready().is_none());

        coordinator.end();
        let change = coordinator.pop_ready().unwrap();
        assert_eq!(change.path.as_deref(), Some("/p/f.txt"));
    }

    #[test]
    fn test_preserves_arrival_order() {
        let mut coordinator = Coordinator::new();
        let sink = coordinator.sink();
        sink.notify("/a", None);
        sink.notify("/b", None);
        coordinator.pump();

        assert_eq!(coordinator.pop_ready().unwrap().path.as_deref(), Some("/a"));
        assert_eq!(coordinator.pop_ready().unwrap().path.as_deref(), Some("/b"));
    }

    #[test]
    fn test_unbalanced_end_saturates() {
        let mut coordinator = Coordinator::new();
        coordinator.end();
        assert!(!coordinator.is_active());

        // The refcount recovers for the next bracketed mutation
        coordinator.begin();
        assert!(coordinator.is_active());
        coordinator.end();
        assert!(!coordinator.is_active());
    }

    #[test]
    fn test_offline_signal() {
        let mut coordinator = Coordinator::new();
        let sink = coordinator.sink();
        sink.notify("/a", None);
        sink.offline();

        assert!(coordinator.pump());
        assert!(coordinator.pop_ready().is_some());
    }
}

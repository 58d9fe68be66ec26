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

//! Watched roots.

use ahash::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::entry::Entry;
use crate::error::{Error, Result};

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Watch request intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WatchIntent {
    /// Start watching a subtree.
    Watch,
    /// Stop watching a subtree.
    Unwatch,
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Watched root.
///
/// A subtree registered for change delivery, with an include filter over
/// `(name, parent_path)` that decides which children are indexed and
/// watched. A root is active only between successful watch completion and
/// the start of its unwatch.
pub(crate) struct WatchedRoot {
    /// Root entry.
    pub entry: Entry,
    /// Include filter.
    pub filter: WatchFilter,
    /// Whether the backend watch completed and still stands.
    pub active: bool,
}

// ----------------------------------------------------------------------------

/// Watched root registry.
///
/// Keyed by canonical root path. No two active roots may stand in an
/// ancestor/descendant relation to each other - some watcher backends
/// misbehave under overlapping watches, so overlap is rejected outright
/// rather than reconciled.
#[derive(Default)]
pub(crate) struct WatchedRoots {
    /// Watched roots by canonical path.
    roots: HashMap<String, WatchedRoot>,
}

// ----------------------------------------------------------------------------

/// Watch request.
pub(crate) struct WatchRequest {
    /// Request intent.
    pub intent: WatchIntent,
    /// Subtree the request targets.
    pub entry: Entry,
    /// Filter of the owning watched root.
    pub filter: WatchFilter,
    /// Path of the owning watched root.
    pub root_path: String,
}

// ----------------------------------------------------------------------------

/// Watch request queue.
///
/// Backend watcher APIs are assumed unsafe under concurrently issued watch
/// and unwatch requests on overlapping subtrees, so requests execute
/// strictly serially in submission order. The queue itself is passive
/// storage plus the draining flag; the file system runs the drain loop, as
/// executing a request needs backend access.
#[derive(Default)]
pub(crate) struct RequestQueue {
    /// Pending requests in submission order.
    items: VecDeque<WatchRequest>,
    /// Whether a drain loop is running.
    draining: bool,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl WatchedRoots {
    /// Checks that watching the given path would not overlap.
    ///
    /// Any active root in strict prefix relation blocks the new watch, in
    /// either direction. A root registered at the identical path blocks as
    /// well - silently replacing it would clobber its filter.
    ///
    /// # Errors
    ///
    /// [`Error::ParentAlreadyWatched`] when an active root covers the path,
    /// [`Error::ChildAlreadyWatched`] when the path would cover an active
    /// root.
    pub fn check_overlap(&self, path: &str) -> Result {
        for (root_path, root) in &self.roots {
            if !root.active {
                continue;
            }
            if path.starts_with(root_path.as_str()) {
                return Err(Error::ParentAlreadyWatched(path.to_string()));
            }
            if root_path.starts_with(path) {
                return Err(Error::ChildAlreadyWatched(path.to_string()));
            }
        }
        Ok(())
    }

    /// Registers a root at the given path.
    pub fn insert(&mut self, path: String, root: WatchedRoot) {
        self.roots.insert(path, root);
    }

    /// Removes and returns the root at the given path.
    pub fn remove(&mut self, path: &str) -> Option<WatchedRoot> {
        self.roots.remove(path)
    }

    /// Returns the root at the given path.
    pub fn get(&self, path: &str) -> Option<&WatchedRoot> {
        self.roots.get(path)
    }

    /// Marks the root at the given path active or inactive.
    pub fn set_active(&mut self, path: &str, active: bool) {
        if let Some(root) = self.roots.get_mut(path) {
            root.active = active;
        }
    }

    /// Returns the active root covering the given path, if any.
    ///
    /// The overlap invariant guarantees at most one candidate. A root
    /// covers its own path as well as everything beneath it.
    pub fn active_root_covering(&self, path: &str) -> Option<&WatchedRoot> {
        self.roots.iter().find_map(|(root_path, root)| {
            (root.active && path.starts_with(root_path.as_str()))
                .then_some(root)
        })
    }

    /// Returns the paths of all registered roots.
    pub fn paths(&self) -> Vec<String> {
        self.roots.keys().cloned().collect()
    }

    /// Removes all registered roots.
    pub fn clear(&mut self) {
        self.roots.clear();
    }
}

impl RequestQueue {
    /// Appends a request in submission order.
    pub fn push(&mut self, request: WatchRequest) {
        self.items.push_back(request);
    }

    /// Takes the next request to execute.
    pub fn pop(&mut self) -> Option<WatchRequest> {
        self.items.pop_front()
    }

    /// Returns whether a drain loop is running.
    #[inline]
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Marks the drain loop as running or stopped.
    pub fn set_draining(&mut self, draining: bool) {
        self.draining = draining;
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl fmt::Debug for WatchedRoots {
    /// Formats the registry for debugging.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WatchedRoots")
            .field("roots", &self.roots.keys())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for RequestQueue {
    /// Formats the queue for debugging.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("pending", &self.items.len())
            .field("draining", &self.draining)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Type aliases
// ----------------------------------------------------------------------------

/// Watched root include filter over `(name, parent_path)`.
pub type WatchFilter = Rc<dyn Fn(&str, &str) -> bool>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;

    fn root(path: &str, active: bool) -> WatchedRoot {
        WatchedRoot {
            entry: Entry::new(EntryKind::Directory, path.to_string()),
            filter: Rc::new(|_, _| true),
            active,
        }
    }

    #[test]
    fn test_overlap_detection() {
        let mut roots = WatchedRoots::default();
        roots.insert(String::from("/proj/"), root("/proj/", true));

        assert!(matches!(
            roots.check_overlap("/proj/sub/"),
            Err(Error::ParentAlreadyWatched(_))
        ));
        assert!(matches!(
            roots.check_overlap("/"),
            Err(Error::ChildAlreadyWatched(_))
        ));
        assert!(matches!(
            roots.check_overlap("/proj/"),
            Err(Error::ParentAlreadyWatched(_))
        ));
        assert!(roots.check_overlap("/other/").is_ok());
    }

    #[test]
    fn test_overlap_ignores_inactive() {
        let mut roots = WatchedRoots::default();
        roots.insert(String::from("/proj/"), root("/proj/", false));

        assert!(roots.check_overlap("/proj/sub/").is_ok());
        assert!(roots.active_root_covering("/proj/sub/a.txt").is_none());

        roots.set_active("/proj/", true);
        assert!(roots.active_root_covering("/proj/sub/a.txt").is_some());
    }
}

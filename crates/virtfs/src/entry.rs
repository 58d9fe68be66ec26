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

//! File system entry.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::stat::Stat;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Entry kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// File.
    File,
    /// Directory.
    Directory,
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// File system entry.
///
/// An entry is a cheap handle onto the state the file system keeps for one
/// canonical path. Handles are interned: resolving the same path twice hands
/// out the very same underlying state, which is why equality between entries
/// is identity, not path comparison. An entry may refer to a path that does
/// not exist on the backend - handles are obtained freely and only touch the
/// backend when asked to.
///
/// The cached stat snapshot and directory contents are owned by the file
/// system core: they are populated while the entry lies within an active
/// watched root, and invalidated when external changes or unwatching make
/// them unreliable.
#[derive(Clone)]
pub struct Entry {
    /// Shared entry state.
    inner: Rc<EntryData>,
}

// ----------------------------------------------------------------------------

/// Shared entry state.
struct EntryData {
    /// Entry kind.
    kind: EntryKind,
    /// Entry location, updated in place on rename.
    location: RefCell<Location>,
    /// Cached stat snapshot.
    stat: RefCell<Option<Stat>>,
    /// Cached directory contents.
    contents: RefCell<Option<Vec<Entry>>>,
}

// ----------------------------------------------------------------------------

/// Entry location.
struct Location {
    /// Canonical path.
    full_path: String,
    /// Last path segment.
    name: String,
    /// Canonical path of the parent directory, empty at the root.
    parent_path: String,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Entry {
    /// Creates an entry for the given canonical path.
    pub(crate) fn new(kind: EntryKind, full_path: String) -> Self {
        Self {
            inner: Rc::new(EntryData {
                kind,
                location: RefCell::new(Location::from_path(full_path)),
                stat: RefCell::new(None),
                contents: RefCell::new(None),
            }),
        }
    }

    /// Returns the cached stat snapshot, if any.
    #[must_use]
    pub fn cached_stat(&self) -> Option<Stat> {
        self.inner.stat.borrow().clone()
    }

    /// Replaces the cached stat snapshot.
    pub(crate) fn set_stat(&self, stat: Stat) {
        *self.inner.stat.borrow_mut() = Some(stat);
    }

    /// Returns the cached directory contents, if any.
    pub(crate) fn cached_contents(&self) -> Option<Vec<Entry>> {
        self.inner.contents.borrow().clone()
    }

    /// Replaces the cached directory contents.
    pub(crate) fn set_contents(&self, contents: Vec<Entry>) {
        *self.inner.contents.borrow_mut() = Some(contents);
    }

    /// Clears the cached stat snapshot and directory contents.
    pub(crate) fn clear_caches(&self) {
        *self.inner.stat.borrow_mut() = None;
        *self.inner.contents.borrow_mut() = None;
    }

    /// Rewrites the location after a rename of the entry or an ancestor.
    ///
    /// The caller guarantees that the current path starts with `old_prefix`.
    /// Identity is deliberately preserved - all handles onto this entry
    /// observe the new location.
    pub(crate) fn relocate(&self, old_prefix: &str, new_prefix: &str) {
        let mut location = self.inner.location.borrow_mut();
        debug_assert!(location.full_path.starts_with(old_prefix));

        let suffix = location.full_path[old_prefix.len()..].to_string();
        *location = Location::from_path(format!("{new_prefix}{suffix}"));
    }
}

#[allow(clippy::must_use_candidate)]
impl Entry {
    /// Returns the entry kind.
    #[inline]
    pub fn kind(&self) -> EntryKind {
        self.inner.kind
    }

    /// Returns whether the entry is a file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.inner.kind == EntryKind::File
    }

    /// Returns whether the entry is a directory.
    #[inline]
    pub fn is_directory(&self) -> bool {
        self.inner.kind == EntryKind::Directory
    }

    /// Returns the canonical path.
    #[inline]
    pub fn full_path(&self) -> String {
        self.inner.location.borrow().full_path.clone()
    }

    /// Returns the last path segment.
    #[inline]
    pub fn name(&self) -> String {
        self.inner.location.borrow().name.clone()
    }

    /// Returns the canonical path of the parent directory, which is empty
    /// for the file system root.
    #[inline]
    pub fn parent_path(&self) -> String {
        self.inner.location.borrow().parent_path.clone()
    }
}

impl Location {
    /// Derives a location from a canonical path.
    fn from_path(full_path: String) -> Self {
        // The root itself has neither name nor parent
        let trimmed = full_path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Self {
                full_path,
                name: String::new(),
                parent_path: String::new(),
            };
        }

        // The name is the segment after the last separator, ignoring the
        // trailing slash of directories. Drive-letter roots like `C:/` have
        // no separator left after trimming and are their own name.
        let (name, parent_path) = match trimmed.rfind('/') {
            Some(position) => (
                trimmed[position + 1..].to_string(),
                full_path[..=position].to_string(),
            ),
            None => (trimmed.to_string(), String::new()),
        };
        Self { full_path, name, parent_path }
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl PartialEq for Entry {
    /// Compares entries by identity.
    ///
    /// Two handles are equal exactly when they refer to the same interned
    /// entry, regardless of the path they currently carry.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Entry {}

// ----------------------------------------------------------------------------

impl fmt::Debug for Entry {
    /// Formats the entry for debugging.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Entry")
            .field("kind", &self.inner.kind)
            .field("full_path", &self.inner.location.borrow().full_path)
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
    fn test_location() {
        let test_cases = vec![
            ("/a/b/c.txt", EntryKind::File, "c.txt", "/a/b/"),
            ("/a/b/", EntryKind::Directory, "b", "/a/"),
            ("/a", EntryKind::File, "a", "/"),
            ("/", EntryKind::Directory, "", ""),
            ("C:/", EntryKind::Directory, "C:", ""),
        ];

        for (path, kind, name, parent) in test_cases {
            let entry = Entry::new(kind, path.to_string());
            assert_eq!(entry.full_path(), path, "Failed for path: {path}");
            assert_eq!(entry.name(), name, "Failed for path: {path}");
            assert_eq!(entry.parent_path(), parent, "Failed for path: {path}");
        }
    }

    #[test]
    fn test_relocate() {
        let entry =
            Entry::new(EntryKind::File, String::from("/a/b/c.txt"));
        entry.relocate("/a/b/", "/a/d/");

        assert_eq!(entry.full_path(), "/a/d/c.txt");
        assert_eq!(entry.name(), "c.txt");
        assert_eq!(entry.parent_path(), "/a/d/");
    }

    #[test]
    fn test_identity() {
        let entry = Entry::new(EntryKind::File, String::from("/a"));
        let other = Entry::new(EntryKind::File, String::from("/a"));

        assert_eq!(entry, entry.clone());
        assert_ne!(entry, other);
    }
}

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

//! File index.

use std::collections::BTreeMap;

use crate::entry::Entry;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// File index.
///
/// The intern table mapping canonical paths to entries. Paths are kept in a
/// [`BTreeMap`] so that subtree operations - renames and pruning - can scan
/// an ordered prefix range instead of the whole table. At most one entry
/// exists per canonical path, and every handle handed out for a path aliases
/// the entry stored here, which is what makes handle identity stable.
#[derive(Default)]
pub(crate) struct FileIndex {
    /// Interned entries by canonical path.
    entries: BTreeMap<String, Entry>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl FileIndex {
    /// Returns the entry at the given canonical path, if interned.
    pub fn get(&self, path: &str) -> Option<Entry> {
        self.entries.get(path).cloned()
    }

    /// Interns the given entry.
    ///
    /// The caller guarantees that no entry exists at the path yet, checking
    /// with [`FileIndex::get`] first - silently replacing an entry would
    /// break handle identity for everyone holding the old one.
    pub fn add(&mut self, entry: &Entry) {
        let path = entry.full_path();
        debug_assert!(!self.entries.contains_key(&path));
        self.entries.insert(path, entry.clone());
    }

    /// Removes the given entry.
    pub fn remove(&mut self, entry: &Entry) {
        self.entries.remove(&entry.full_path());
    }

    /// Visits all interned entries in unspecified order.
    pub fn visit_all<F>(&self, mut visitor: F)
    where
        F: FnMut(&Entry),
    {
        for entry in self.entries.values() {
            visitor(entry);
        }
    }

    /// Removes all interned entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Re-keys all entries affected by a rename.
    ///
    /// Every entry whose path starts with `old_path` has that prefix
    /// replaced by `new_path`, both in its own location and in the table
    /// key. Entry identity is preserved - handles held by callers observe
    /// the new location. For files, only the exact path is re-keyed, as a
    /// file path is also a plain string prefix of its siblings with longer
    /// names, like `/a/b.txt` and `/a/b.txt.bak`.
    pub fn entry_renamed(
        &mut self, old_path: &str, new_path: &str, is_directory: bool,
    ) {
        let paths = if is_directory {
            self.paths_with_prefix(old_path)
        } else {
            self.entries
                .contains_key(old_path)
                .then(|| vec![old_path.to_string()])
                .unwrap_or_default()
        };

        for path in paths {
            if let Some(entry) = self.entries.remove(&path) {
                entry.relocate(old_path, new_path);
                self.entries.insert(entry.full_path(), entry);
            }
        }
    }

    /// Removes all entries whose path starts with the given prefix,
    /// including the entry at the prefix itself.
    pub fn prune(&mut self, prefix: &str) {
        for path in self.paths_with_prefix(prefix) {
            self.entries.remove(&path);
        }
    }

    /// Removes all entries strictly below the given directory path.
    pub fn prune_children(&mut self, prefix: &str) {
        for path in self.paths_with_prefix(prefix) {
            if path != prefix {
                self.entries.remove(&path);
            }
        }
    }

    /// Collects the paths of all entries with the given prefix.
    ///
    /// We collect into a vector, as the table cannot be mutated while
    /// iterating over it.
    fn paths_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;

    fn file(path: &str) -> Entry {
        Entry::new(EntryKind::File, path.to_string())
    }

    fn directory(path: &str) -> Entry {
        Entry::new(EntryKind::Directory, path.to_string())
    }

    #[test]
    fn test_add_get_identity() {
        let mut index = FileIndex::default();
        let entry = file("/a/b.txt");
        index.add(&entry);

        assert_eq!(index.get("/a/b.txt"), Some(entry));
        assert_eq!(index.get("/a/c.txt"), None);
    }

    #[test]
    fn test_entry_renamed_directory() {
        let mut index = FileIndex::default();
        let root = directory("/a/b/");
        let child = file("/a/b/c.txt");
        let nested = file("/a/b/d/e.txt");
        let sibling = file("/a/bc.txt");
        for entry in [&child, &nested, &sibling] {
            index.add(entry);
        }
        index.add(&root);

        index.entry_renamed("/a/b/", "/a/x/", true);

        // Identity is preserved while keys and locations move
        assert_eq!(index.get("/a/x/c.txt"), Some(child.clone()));
        assert_eq!(index.get("/a/x/d/e.txt"), Some(nested));
        assert_eq!(index.get("/a/x/"), Some(root));
        assert_eq!(child.full_path(), "/a/x/c.txt");

        // Untouched siblings keep their keys
        assert_eq!(index.get("/a/bc.txt"), Some(sibling));
        assert_eq!(index.get("/a/b/c.txt"), None);
    }

    #[test]
    fn test_entry_renamed_file_exact_match() {
        let mut index = FileIndex::default();
        let renamed = file("/a/b.txt");
        let lookalike = file("/a/b.txt.bak");
        index.add(&renamed);
        index.add(&lookalike);

        index.entry_renamed("/a/b.txt", "/a/c.txt", false);

        assert_eq!(index.get("/a/c.txt"), Some(renamed));
        assert_eq!(index.get("/a/b.txt.bak"), Some(lookalike));
    }

    #[test]
    fn test_prune() {
        let mut index = FileIndex::default();
        let root = directory("/a/b/");
        let child = file("/a/b/c.txt");
        let outside = file("/a/c.txt");
        index.add(&root);
        index.add(&child);
        index.add(&outside);

        index.prune("/a/b/");

        assert_eq!(index.get("/a/b/"), None);
        assert_eq!(index.get("/a/b/c.txt"), None);
        assert_eq!(index.get("/a/c.txt"), Some(outside));
    }

    #[test]
    fn test_prune_children() {
        let mut index = FileIndex::default();
        let root = directory("/a/b/");
        let child = file("/a/b/c.txt");
        index.add(&root);
        index.add(&child);

        index.prune_children("/a/b/");

        assert_eq!(index.get("/a/b/"), Some(root));
        assert_eq!(index.get("/a/b/c.txt"), None);
    }
}

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

//! In-memory backend.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::change::ChangeSink;
use crate::entry::EntryKind;
use crate::error::{Error, Result};
use crate::stat::Stat;

use super::{Backend, OpenDialogOptions, SaveDialogOptions};

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// In-memory backend.
///
/// A complete backend over an in-memory node tree, primarily serving as the
/// canonical test double for the file system core. The backend is a shared
/// handle: clones refer to the same tree, so a test can keep one clone for
/// seeding and mutation while the file system owns another.
///
/// Mutation helpers like [`MemoryBackend::touch`] emit watcher
/// notifications through the sink once one is registered, which makes
/// externally observed changes scriptable. Seeding before the file system
/// is constructed stays silent, as no sink exists yet.
///
/// # Examples
///
/// ```
/// use virtfs::{FileSystem, MemoryBackend};
///
/// // Seed a small tree and hand the backend to a file system
/// let backend = MemoryBackend::new();
/// backend.put_file("/docs/index.md", 64);
/// let mut fs = FileSystem::new(backend.clone());
///
/// let file = fs.get_file_for_path("/docs/index.md").unwrap();
/// assert!(fs.exists(&file).unwrap());
/// ```
#[derive(Clone)]
pub struct MemoryBackend {
    /// Shared backend state.
    state: Rc<RefCell<State>>,
}

// ----------------------------------------------------------------------------

/// Shared backend state.
struct State {
    /// Nodes by canonical path.
    nodes: BTreeMap<String, Node>,
    /// Notification sink, registered by the file system.
    sink: Option<ChangeSink>,
    /// Whether watches cover whole subtrees.
    recursive: bool,
    /// Monotonic clock in milliseconds, for deterministic mtimes.
    clock: u64,
    /// Watched paths in watch order.
    watched: Vec<String>,
    /// Failure injected into the next watch request.
    fail_watch: Option<String>,
    /// Canned open dialog selection.
    open_selection: Vec<String>,
    /// Canned save dialog choice.
    save_choice: Option<String>,
}

// ----------------------------------------------------------------------------

/// In-memory node.
struct Node {
    /// Node kind.
    kind: EntryKind,
    /// Size in bytes.
    size: u64,
    /// Modification time.
    mtime: SystemTime,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl MemoryBackend {
    /// Creates an in-memory backend containing only the root directory.
    ///
    /// The backend declares recursive watching by default; see
    /// [`MemoryBackend::with_recursive_watch`] to exercise per-directory
    /// watch dispatch instead.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            String::from("/"),
            Node {
                kind: EntryKind::Directory,
                size: 0,
                mtime: UNIX_EPOCH,
            },
        );
        Self {
            state: Rc::new(RefCell::new(State {
                nodes,
                sink: None,
                recursive: true,
                clock: 0,
                watched: Vec::new(),
                fail_watch: None,
                open_selection: Vec::new(),
                save_choice: None,
            })),
        }
    }

    /// Sets whether watches cover whole subtrees.
    #[must_use]
    pub fn with_recursive_watch(self, recursive: bool) -> Self {
        self.state.borrow_mut().recursive = recursive;
        self
    }

    /// Creates a file, along with any missing ancestor directories.
    pub fn put_file(&self, path: &str, size: u64) {
        let mut state = self.state.borrow_mut();
        let mtime = state.tick();
        state.ensure_parents(path);
        state.nodes.insert(
            path.to_string(),
            Node { kind: EntryKind::File, size, mtime },
        );
    }

    /// Creates a directory, along with any missing ancestor directories.
    pub fn put_directory(&self, path: &str) {
        let mut state = self.state.borrow_mut();
        let key = directory_key(path);
        let mtime = state.tick();
        state.ensure_parents(&key);
        state.nodes.insert(
            key,
            Node { kind: EntryKind::Directory, size: 0, mtime },
        );
    }

    /// Bumps the modification time of a node.
    pub fn touch(&self, path: &str) {
        let mut state = self.state.borrow_mut();
        let mtime = state.tick();
        if let Some(node) = state.node_mut(path) {
            node.mtime = mtime;
        }
    }

    /// Removes a node, along with everything beneath it.
    pub fn remove(&self, path: &str) {
        let mut state = self.state.borrow_mut();

        // Files are removed directly, while directories take their whole
        // subtree with them. The key decides: plain file paths are never a
        // string prefix of their directory siblings, directory keys are.
        let key = if state.nodes.contains_key(path) {
            path.to_string()
        } else {
            directory_key(path)
        };
        if key.ends_with('/') {
            let beneath: Vec<String> = state
                .nodes
                .range(key.clone()..)
                .take_while(|(check, _)| check.starts_with(&key))
                .map(|(check, _)| check.clone())
                .collect();
            for check in beneath {
                state.nodes.remove(&check);
            }
        } else {
            state.nodes.remove(&key);
        }
    }

    /// Emits a watcher notification for the given path.
    ///
    /// The stat snapshot is attached when the node still exists, mirroring
    /// how native watchers report changes and deletions.
    pub fn emit_change(&self, path: &str) {
        let state = self.state.borrow();
        let stat = state.stat_of(path).ok();
        if let Some(sink) = &state.sink {
            sink.notify(path, stat);
        }
    }

    /// Emits a wholesale change notification.
    pub fn emit_wholesale(&self) {
        if let Some(sink) = &self.state.borrow().sink {
            sink.notify_wholesale();
        }
    }

    /// Emits an offline notification.
    pub fn go_offline(&self) {
        if let Some(sink) = &self.state.borrow().sink {
            sink.offline();
        }
    }

    /// Injects a failure into the next watch request.
    pub fn fail_next_watch(&self, message: impl Into<String>) {
        self.state.borrow_mut().fail_watch = Some(message.into());
    }

    /// Returns the currently watched paths, in watch order.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<String> {
        self.state.borrow().watched.clone()
    }

    /// Sets the selection returned by the open dialog.
    pub fn set_open_selection(&self, selection: Vec<String>) {
        self.state.borrow_mut().open_selection = selection;
    }

    /// Sets the choice returned by the save dialog.
    pub fn set_save_choice(&self, choice: Option<String>) {
        self.state.borrow_mut().save_choice = choice;
    }
}

impl State {
    /// Advances the clock and returns the new time.
    ///
    /// Millisecond steps keep mtimes deterministic and distinct, which is
    /// exactly the granularity stat freshness is compared at.
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        UNIX_EPOCH + Duration::from_millis(self.clock)
    }

    /// Creates all missing ancestor directories of the given path.
    fn ensure_parents(&mut self, path: &str) {
        for (position, _) in path.match_indices('/').skip(1) {
            let ancestor = &path[..=position];
            if !self.nodes.contains_key(ancestor) {
                let mtime = self.tick();
                self.nodes.insert(
                    ancestor.to_string(),
                    Node { kind: EntryKind::Directory, size: 0, mtime },
                );
            }
        }
    }

    /// Looks up a node, trying the directory key as fallback.
    fn node(&self, path: &str) -> Option<&Node> {
        self.nodes
            .get(path)
            .or_else(|| self.nodes.get(&directory_key(path)))
    }

    /// Looks up a node mutably, trying the directory key as fallback.
    fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
        if self.nodes.contains_key(path) {
            self.nodes.get_mut(path)
        } else {
            self.nodes.get_mut(&directory_key(path))
        }
    }

    /// Returns a stat snapshot for the node at the given path.
    fn stat_of(&self, path: &str) -> Result<Stat> {
        self.node(path).map_or_else(
            || Err(Error::NotFound(path.to_string())),
            |node| {
                Ok(match node.kind {
                    EntryKind::File => Stat::file(node.size, node.mtime),
                    EntryKind::Directory => Stat::directory(node.mtime),
                })
            },
        )
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl Backend for MemoryBackend {
    /// Registers the notification sink.
    fn init_watchers(&mut self, sink: ChangeSink) {
        self.state.borrow_mut().sink = Some(sink);
    }

    /// Returns a stat snapshot for the given path.
    fn stat(&mut self, path: &str) -> Result<Stat> {
        self.state.borrow().stat_of(path)
    }

    /// Returns the names and stat snapshots of a directory's children.
    fn read_dir(&mut self, path: &str) -> Result<Vec<(String, Stat)>> {
        let state = self.state.borrow();
        let key = directory_key(path);
        if state.node(&key).is_none() {
            return Err(Error::NotFound(path.to_string()));
        }

        // Children are the nodes exactly one level beneath the directory,
        // in tree order - deeper descendants carry another separator in
        // their relative path and are skipped
        let mut contents = Vec::new();
        for (check, node) in state.nodes.range(key.clone()..) {
            if !check.starts_with(&key) {
                break;
            }
            let relative = check[key.len()..].trim_end_matches('/');
            if relative.is_empty() || relative.contains('/') {
                continue;
            }
            let stat = match node.kind {
                EntryKind::File => Stat::file(node.size, node.mtime),
                EntryKind::Directory => Stat::directory(node.mtime),
            };
            contents.push((relative.to_string(), stat));
        }
        Ok(contents)
    }

    /// Renames a node, along with everything beneath it.
    ///
    /// Directory paths carry their trailing slash, so the subtree re-key
    /// never captures siblings that merely share a name prefix.
    fn rename(&mut self, old_path: &str, new_path: &str) -> Result {
        let mut state = self.state.borrow_mut();
        if !state.nodes.contains_key(old_path) {
            return Err(Error::NotFound(old_path.to_string()));
        }

        if old_path.ends_with('/') {
            let moved: Vec<String> = state
                .nodes
                .range(old_path.to_string()..)
                .take_while(|(check, _)| check.starts_with(old_path))
                .map(|(check, _)| check.clone())
                .collect();
            for check in moved {
                if let Some(node) = state.nodes.remove(&check) {
                    let target =
                        format!("{new_path}{}", &check[old_path.len()..]);
                    state.nodes.insert(target, node);
                }
            }
        } else if let Some(node) = state.nodes.remove(old_path) {
            state.nodes.insert(new_path.to_string(), node);
        }
        Ok(())
    }

    /// Creates a directory.
    fn mkdir(&mut self, path: &str) -> Result<Stat> {
        let mut state = self.state.borrow_mut();
        let key = directory_key(path);
        if state.nodes.contains_key(&key) {
            return Err(Error::Backend(format!("already exists: {path}")));
        }
        let mtime = state.tick();
        state.ensure_parents(&key);
        state.nodes.insert(
            key,
            Node { kind: EntryKind::Directory, size: 0, mtime },
        );
        Ok(Stat::directory(mtime))
    }

    /// Removes a node, along with everything beneath it.
    fn unlink(&mut self, path: &str) -> Result {
        let state = self.state.borrow();
        if state.node(path).is_none() {
            return Err(Error::NotFound(path.to_string()));
        }
        drop(state);
        self.remove(path);
        Ok(())
    }

    /// Starts watching the given path.
    fn watch_path(&mut self, path: &str) -> Result {
        let mut state = self.state.borrow_mut();
        if let Some(message) = state.fail_watch.take() {
            return Err(Error::Backend(message));
        }
        state.watched.push(path.to_string());
        Ok(())
    }

    /// Stops watching the given path.
    fn unwatch_path(&mut self, path: &str) -> Result {
        self.state.borrow_mut().watched.retain(|check| check != path);
        Ok(())
    }

    /// Stops watching all paths.
    fn unwatch_all(&mut self) -> Result {
        self.state.borrow_mut().watched.clear();
        Ok(())
    }

    /// Returns the canned open dialog selection.
    fn show_open_dialog(
        &mut self, _options: &OpenDialogOptions,
    ) -> Result<Vec<String>> {
        Ok(self.state.borrow().open_selection.clone())
    }

    /// Returns the canned save dialog choice.
    fn show_save_dialog(
        &mut self, _options: &SaveDialogOptions,
    ) -> Result<Option<String>> {
        Ok(self.state.borrow().save_choice.clone())
    }

    /// Returns whether watches cover whole subtrees.
    fn recursive_watch(&self) -> bool {
        self.state.borrow().recursive
    }

    /// Returns whether UNC path syntax should be preserved.
    fn normalize_unc_paths(&self) -> bool {
        false
    }
}

// ----------------------------------------------------------------------------

impl Default for MemoryBackend {
    /// Creates an in-memory backend containing only the root directory.
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Returns the canonical directory key for a path.
fn directory_key(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_dir_single_level() {
        let mut backend = MemoryBackend::new();
        backend.put_file("/p/a.txt", 1);
        backend.put_file("/p/sub/deep.txt", 2);
        backend.put_directory("/p/sub");

        let names: Vec<String> = backend
            .read_dir("/p/")
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["a.txt", "sub"]);
    }

    #[test]
    fn test_stat_directory_without_slash() {
        let mut backend = MemoryBackend::new();
        backend.put_directory("/p/sub");

        assert!(!backend.stat("/p/sub").unwrap().is_file());
        assert!(matches!(
            backend.stat("/p/missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_rename_subtree() {
        let mut backend = MemoryBackend::new();
        backend.put_file("/a/b/c.txt", 1);
        backend.rename("/a/b/", "/a/d/").unwrap();

        assert!(backend.stat("/a/d/c.txt").is_ok());
        assert!(backend.stat("/a/b/c.txt").is_err());
    }
}

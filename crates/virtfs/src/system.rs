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

//! File system facade.

use ahash::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::backend::{Backend, OpenDialogOptions, SaveDialogOptions};
use crate::change::{Coordinator, ExternalChange};
use crate::entry::{Entry, EntryKind};
use crate::error::{Error, Result};
use crate::event::{ChangeEvent, HandlerId, Observers};
use crate::index::FileIndex;
use crate::path;
use crate::stat::Stat;
use crate::watch::{
    RequestQueue, WatchFilter, WatchIntent, WatchRequest, WatchedRoot,
    WatchedRoots,
};

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// File system facade.
///
/// The single entry point between application code and a storage backend.
/// The facade normalizes paths, interns entry handles so that every
/// canonical path resolves to exactly one handle, caches listings and stat
/// snapshots for watched subtrees, and coordinates in-process mutations
/// with externally observed changes so that renames are not misread as
/// unrelated delete/add pairs.
///
/// All state is owned here and accessed single-threaded: the only other
/// thread in the picture is a backend's watcher, which communicates
/// exclusively through the notification channel drained by
/// [`FileSystem::poll`]. Suspension points are the synchronous backend
/// calls; observers run synchronously at fire time and must not mutate the
/// file system.
///
/// # Examples
///
/// ```
/// use virtfs::{FileSystem, MemoryBackend};
///
/// // Seed a backend and construct the facade over it
/// let backend = MemoryBackend::new();
/// backend.put_file("/docs/index.md", 64);
/// let mut fs = FileSystem::new(backend);
///
/// // Handles are interned by canonical path
/// let file = fs.get_file_for_path("/docs//index.md").unwrap();
/// assert_eq!(file.full_path(), "/docs/index.md");
/// ```
pub struct FileSystem {
    /// Storage backend.
    backend: Box<dyn Backend>,
    /// Entry index.
    index: FileIndex,
    /// Watched roots.
    roots: WatchedRoots,
    /// Watch request queue.
    queue: RequestQueue,
    /// Change coordinator.
    coordinator: Coordinator,
    /// Observer registry.
    observers: Observers,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl FileSystem {
    /// Creates a file system over the given backend.
    ///
    /// Construction is the one-shot initialization: the backend is consumed
    /// and its watchers are registered exactly once, here.
    pub fn new<B>(backend: B) -> Self
    where
        B: 'static + Backend,
    {
        let coordinator = Coordinator::new();
        let mut backend = Box::new(backend);
        backend.init_watchers(coordinator.sink());
        Self {
            backend,
            index: FileIndex::default(),
            roots: WatchedRoots::default(),
            queue: RequestQueue::default(),
            coordinator,
            observers: Observers::default(),
        }
    }

    /// Shuts the file system down.
    ///
    /// Unwatches everything on the backend and clears the index, the
    /// watched roots, and any deferred changes. Handles held by callers
    /// stay valid as plain data but are no longer interned.
    pub fn close(&mut self) {
        if let Err(err) = self.backend.unwatch_all() {
            tracing::warn!("unwatch on close failed: {err}");
        }
        self.roots.clear();
        self.index.clear();
        self.coordinator.clear();
    }

    /// Returns the file handle for the given path.
    ///
    /// Never touches the backend - the returned handle may refer to a file
    /// that does not exist. Two lookups whose paths normalize to the same
    /// canonical path return the identical handle.
    ///
    /// # Errors
    ///
    /// Path validity errors from [`path::normalize`] only.
    pub fn get_file_for_path(&mut self, path: &str) -> Result<Entry> {
        let canonical = self.normalize(path, false)?;
        Ok(self.intern(EntryKind::File, canonical))
    }

    /// Returns the directory handle for the given path.
    ///
    /// The canonical path of a directory always carries a trailing slash,
    /// whether or not the input did.
    ///
    /// # Errors
    ///
    /// Path validity errors from [`path::normalize`] only.
    pub fn get_directory_for_path(&mut self, path: &str) -> Result<Entry> {
        let canonical = self.normalize(path, true)?;
        Ok(self.intern(EntryKind::Directory, canonical))
    }

    /// Resolves a path of unknown kind to an entry and its stat snapshot.
    ///
    /// Interned entries are preferred: the path is looked up as a file
    /// first and as a directory second. Only when neither is interned is
    /// the backend consulted with the raw path, and the reported kind picks
    /// the handle constructor.
    ///
    /// # Errors
    ///
    /// Path validity errors, [`Error::NotFound`] when no such target
    /// exists, and backend stat failures.
    pub fn resolve(&mut self, path: &str) -> Result<(Entry, Stat)> {
        let as_file = self.normalize(path, false)?;
        let mut found = self.index.get(&as_file);
        if found.is_none() {
            let as_directory = self.normalize(path, true)?;
            found = self.index.get(&as_directory);
        }
        if let Some(entry) = found {
            let stat = self.stat(&entry)?;
            return Ok((entry, stat));
        }

        // Nothing interned - stat the path without a speculative trailing
        // slash and let the backend tell us what it is
        let stat = self.backend.stat(&as_file)?;
        let entry = if stat.is_file() {
            self.intern(EntryKind::File, as_file)
        } else {
            let as_directory = self.normalize(path, true)?;
            self.intern(EntryKind::Directory, as_directory)
        };
        if self.is_watched(&entry) {
            entry.set_stat(stat.clone());
        }
        Ok((entry, stat))
    }

    /// Returns a stat snapshot for the given entry.
    ///
    /// Served from cache when present; otherwise the backend is consulted,
    /// and the snapshot is retained only when the entry lies inside an
    /// active watched root, where watcher events keep it fresh.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the entry's target does not exist, and
    /// backend stat failures.
    pub fn stat(&mut self, entry: &Entry) -> Result<Stat> {
        if let Some(stat) = entry.cached_stat() {
            return Ok(stat);
        }
        let stat = self.backend.stat(&entry.full_path())?;
        if self.is_watched(entry) {
            entry.set_stat(stat.clone());
        }
        Ok(stat)
    }

    /// Returns whether the entry's target currently exists.
    ///
    /// # Errors
    ///
    /// Backend stat failures other than a missing target.
    pub fn exists(&mut self, entry: &Entry) -> Result<bool> {
        match self.stat(entry) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Returns the children of the given directory.
    ///
    /// Children are interned as they are discovered, subject to the filter
    /// of the covering active watched root; outside any watched root, all
    /// children are included. Backend listing order is preserved. The
    /// listing is cached on the directory while it is watched.
    ///
    /// # Errors
    ///
    /// [`Error::NotDirectory`] for file entries, [`Error::NotFound`] when
    /// the directory does not exist, and backend failures.
    pub fn get_contents(&mut self, directory: &Entry) -> Result<Vec<Entry>> {
        if !directory.is_directory() {
            return Err(Error::NotDirectory(directory.full_path()));
        }
        if let Some(contents) = directory.cached_contents() {
            return Ok(contents);
        }

        let parent_path = directory.full_path();
        let listing = self.backend.read_dir(&parent_path)?;
        let mut contents = Vec::with_capacity(listing.len());
        for (name, stat) in listing {
            if !self.should_index(&parent_path, &name) {
                continue;
            }
            let entry = if stat.is_file() {
                self.intern(EntryKind::File, format!("{parent_path}{name}"))
            } else {
                self.intern(
                    EntryKind::Directory,
                    format!("{parent_path}{name}/"),
                )
            };
            if self.is_watched(&entry) {
                entry.set_stat(stat);
            }
            contents.push(entry);
        }
        if self.is_watched(directory) {
            directory.set_contents(contents.clone());
        }
        Ok(contents)
    }

    /// Visits an entry and everything beneath it, in pre-order.
    ///
    /// The visitor returning `false` prunes the subtree below the visited
    /// entry. Directories reached through symbolic links are visited at
    /// most once, keyed by their resolved path, so link cycles terminate.
    ///
    /// # Errors
    ///
    /// Backend stat and listing failures encountered during traversal.
    pub fn visit<F>(&mut self, entry: &Entry, visitor: &mut F) -> Result
    where
        F: FnMut(&Entry) -> bool,
    {
        let mut visited = HashSet::default();
        self.visit_inner(entry, visitor, &mut visited)
    }

    /// Renames an entry.
    ///
    /// The whole operation is bracketed as an in-process mutation: the
    /// backend renames first, then the index re-keys the affected subtree
    /// in place, then the `rename` event fires - and only then are deferred
    /// watcher notifications for the same operation allowed through, where
    /// they resolve against the already-renamed index.
    ///
    /// # Errors
    ///
    /// Path validity errors and backend rename failures.
    pub fn rename(&mut self, entry: &Entry, new_path: &str) -> Result {
        let old = entry.full_path();
        let new = self.normalize(new_path, entry.is_directory())?;

        self.begin_change();
        let result = self.backend.rename(&old, &new);
        if result.is_ok() {
            self.index.entry_renamed(&old, &new, entry.is_directory());
            self.observers.fire_rename(&old, &new);
        }
        self.end_change();
        result
    }

    /// Removes an entry's target, and everything beneath it.
    ///
    /// On success, the parent directory is reconciled through the regular
    /// directory change path, so listeners observe a listing diff and
    /// watched roots stay consistent.
    ///
    /// # Errors
    ///
    /// Backend unlink failures.
    pub fn unlink(&mut self, entry: &Entry) -> Result {
        let full_path = entry.full_path();

        self.begin_change();
        let result = self.backend.unlink(&full_path);
        if result.is_ok() {
            let parent_path = entry.parent_path();
            if !parent_path.is_empty() {
                let parent = self.intern(EntryKind::Directory, parent_path);
                self.handle_directory_change(&parent, None);
            }

            // The deleted entry keeps its handle but leaves the intern
            // table, so a later creation at the same path gets a fresh
            // identity
            entry.clear_caches();
            if entry.is_directory() {
                self.index.prune(&full_path);
            } else {
                self.index.remove(entry);
            }
        }
        self.end_change();
        result
    }

    /// Creates the directory an entry refers to.
    ///
    /// # Errors
    ///
    /// [`Error::NotDirectory`] for file entries, and backend failures.
    pub fn create_directory(&mut self, directory: &Entry) -> Result<Stat> {
        if !directory.is_directory() {
            return Err(Error::NotDirectory(directory.full_path()));
        }
        let full_path = directory.full_path();

        self.begin_change();
        let result = self.backend.mkdir(&full_path);
        if let Ok(stat) = &result {
            if self.is_watched(directory) {
                directory.set_stat(stat.clone());
            }
            let parent_path = directory.parent_path();
            if !parent_path.is_empty() {
                let parent = self.intern(EntryKind::Directory, parent_path);
                self.handle_directory_change(&parent, None);
            }
        }
        self.end_change();
        result
    }

    /// Starts watching the subtree at the given entry.
    ///
    /// The filter decides, per `(name, parent_path)`, which children are
    /// indexed and watched; returning `false` prunes the subtree. Watched
    /// roots must not overlap: any active root in ancestor or descendant
    /// relation rejects the new watch. A failed backend watch does not
    /// poison the registry - the root is removed again and the error
    /// returned.
    ///
    /// # Errors
    ///
    /// [`Error::ParentAlreadyWatched`], [`Error::ChildAlreadyWatched`], and
    /// backend watch failures.
    ///
    /// # Examples
    ///
    /// ```
    /// use virtfs::{FileSystem, MemoryBackend};
    ///
    /// let backend = MemoryBackend::new();
    /// backend.put_file("/proj/src/main.rs", 128);
    /// let mut fs = FileSystem::new(backend);
    ///
    /// // Watch the project, ignoring dotfiles
    /// let root = fs.get_directory_for_path("/proj").unwrap();
    /// fs.watch(&root, |name, _| !name.starts_with('.')).unwrap();
    /// ```
    pub fn watch<F>(&mut self, entry: &Entry, filter: F) -> Result
    where
        F: 'static + Fn(&str, &str) -> bool,
    {
        let root_path = entry.full_path();
        self.roots.check_overlap(&root_path)?;

        // Register the root inactive first: it only becomes active once the
        // backend watch completed successfully
        let filter: WatchFilter = Rc::new(filter);
        self.roots.insert(
            root_path.clone(),
            WatchedRoot {
                entry: entry.clone(),
                filter: Rc::clone(&filter),
                active: false,
            },
        );

        let result = self
            .submit_request(WatchRequest {
                intent: WatchIntent::Watch,
                entry: entry.clone(),
                filter,
                root_path: root_path.clone(),
            })
            .unwrap_or(Ok(()));
        match result {
            Ok(()) => {
                self.roots.set_active(&root_path, true);
                Ok(())
            }
            Err(err) => {
                self.roots.remove(&root_path);
                Err(err)
            }
        }
    }

    /// Stops watching the subtree at the given entry.
    ///
    /// Fail-forward: whatever the backend says, the root leaves the
    /// registry and the subtree is pruned from the index, then the error is
    /// surfaced. Cached data under an unwatched root is unreliable, as no
    /// watcher refreshes it anymore.
    ///
    /// # Errors
    ///
    /// [`Error::NotWatched`] when no root is registered at the entry's
    /// path, and backend unwatch failures.
    pub fn unwatch(&mut self, entry: &Entry) -> Result {
        let root_path = entry.full_path();
        let Some(root) = self.roots.get(&root_path) else {
            return Err(Error::NotWatched(root_path));
        };
        let filter = Rc::clone(&root.filter);
        self.roots.set_active(&root_path, false);

        let result = self
            .submit_request(WatchRequest {
                intent: WatchIntent::Unwatch,
                entry: entry.clone(),
                filter,
                root_path: root_path.clone(),
            })
            .unwrap_or(Ok(()));
        self.roots.remove(&root_path);
        self.index.prune(&root_path);
        result
    }

    /// Shows the backend's dialog for choosing existing targets.
    ///
    /// Cancellation is success with an empty selection.
    ///
    /// # Errors
    ///
    /// Backend dialog failures.
    pub fn show_open_dialog(
        &mut self, options: &OpenDialogOptions,
    ) -> Result<Vec<String>> {
        self.backend.show_open_dialog(options)
    }

    /// Shows the backend's dialog for choosing a save destination.
    ///
    /// Cancellation is success with `None`.
    ///
    /// # Errors
    ///
    /// Backend dialog failures.
    pub fn show_save_dialog(
        &mut self, options: &SaveDialogOptions,
    ) -> Result<Option<String>> {
        self.backend.show_save_dialog(options)
    }

    /// Registers a change handler.
    pub fn on_change<F>(&mut self, handler: F) -> HandlerId
    where
        F: 'static + Fn(&ChangeEvent),
    {
        self.observers.on_change(handler)
    }

    /// Unregisters a change handler, returning whether it was registered.
    pub fn off_change(&mut self, id: HandlerId) -> bool {
        self.observers.off_change(id)
    }

    /// Registers a rename handler, receiving old and new canonical paths.
    pub fn on_rename<F>(&mut self, handler: F) -> HandlerId
    where
        F: 'static + Fn(&str, &str),
    {
        self.observers.on_rename(handler)
    }

    /// Unregisters a rename handler, returning whether it was registered.
    pub fn off_rename(&mut self, id: HandlerId) -> bool {
        self.observers.off_rename(id)
    }

    /// Enters an in-process mutation.
    ///
    /// While at least one mutation is active, externally observed changes
    /// are deferred; they drain once the matching [`FileSystem::end_change`]
    /// brings the count back to zero. Entry operations living outside this
    /// crate bracket themselves with this pair exactly like the built-in
    /// ones do.
    pub fn begin_change(&mut self) {
        self.coordinator.begin();
    }

    /// Leaves an in-process mutation.
    ///
    /// Pending watcher notifications are collected and, once no mutation
    /// remains active, drained in arrival order.
    pub fn end_change(&mut self) {
        self.coordinator.end();
        self.poll();
    }

    /// Processes pending watcher notifications.
    ///
    /// Notifications received while a mutation was active stay deferred;
    /// everything else is delivered to observers now, in arrival order.
    pub fn poll(&mut self) {
        if self.coordinator.pump() {
            self.handle_offline();
        }
        while let Some(change) = self.coordinator.pop_ready() {
            self.handle_external_change(change);
        }
    }
}

// ----------------------------------------------------------------------------

impl FileSystem {
    /// Normalizes a path under the backend's UNC capability.
    fn normalize(&self, path: &str, is_directory: bool) -> Result<String> {
        path::normalize(path, is_directory, self.backend.normalize_unc_paths())
    }

    /// Returns the interned entry at the canonical path, creating it if
    /// necessary.
    fn intern(&mut self, kind: EntryKind, canonical: String) -> Entry {
        if let Some(entry) = self.index.get(&canonical) {
            return entry;
        }
        let entry = Entry::new(kind, canonical);
        self.index.add(&entry);
        entry
    }

    /// Returns whether the entry lies inside an active watched root.
    fn is_watched(&self, entry: &Entry) -> bool {
        self.roots.active_root_covering(&entry.full_path()).is_some()
    }

    /// Decides whether a discovered child should be indexed.
    ///
    /// Inside an active watched root, the root's filter decides. Outside,
    /// everything is included: explicitly requested handles and listings
    /// outside any watched root must still work in full.
    fn should_index(&self, parent_path: &str, name: &str) -> bool {
        match self.roots.active_root_covering(parent_path) {
            Some(root) => (root.filter)(name, parent_path),
            None => true,
        }
    }

    /// Recursive step of [`FileSystem::visit`].
    fn visit_inner<F>(
        &mut self, entry: &Entry, visitor: &mut F,
        visited: &mut HashSet<String>,
    ) -> Result
    where
        F: FnMut(&Entry) -> bool,
    {
        if !visitor(entry) || !entry.is_directory() {
            return Ok(());
        }

        // Key visited directories by their resolved path, so that the same
        // target reached through a symbolic link is not descended twice
        let stat = self.stat(entry)?;
        let key = stat
            .real_path()
            .map_or_else(|| entry.full_path(), str::to_string);
        if !visited.insert(key) {
            return Ok(());
        }

        for child in self.get_contents(entry)? {
            self.visit_inner(&child, visitor, visited)?;
        }
        Ok(())
    }

    /// Submits a watch request for serial execution.
    ///
    /// Requests execute strictly in submission order. When no drain loop is
    /// running the queue drains right here and the submitted request's
    /// outcome is returned; a submission from within a running drain loop
    /// returns `None` and is picked up by that loop, which logs failures.
    fn submit_request(&mut self, request: WatchRequest) -> Option<Result> {
        self.queue.push(request);
        if self.queue.is_draining() {
            return None;
        }
        Some(self.drain_requests())
    }

    /// Drains the watch request queue.
    ///
    /// Returns the outcome of the first request, which is the one the
    /// non-re-entrant submitter just pushed onto the empty queue. Outcomes
    /// of requests queued behind it are logged.
    fn drain_requests(&mut self) -> Result {
        self.queue.set_draining(true);
        let mut first = None;
        while let Some(request) = self.queue.pop() {
            let result = self.execute_request(&request);
            if first.is_some() {
                if let Err(err) = &result {
                    tracing::debug!(
                        "queued watch request failed for {}: {err}",
                        request.root_path
                    );
                }
            } else {
                first = Some(result);
            }
        }
        self.queue.set_draining(false);
        first.unwrap_or(Ok(()))
    }

    /// Executes a single watch request against the backend.
    fn execute_request(&mut self, request: &WatchRequest) -> Result {
        match request.intent {
            WatchIntent::Watch => {
                let mut outcome = Ok(());
                for target in self.request_targets(request)? {
                    let result = self.backend.watch_path(&target);
                    if let Err(err) = result {
                        if outcome.is_ok() {
                            outcome = Err(err);
                        } else {
                            tracing::debug!("watch failed for {target}: {err}");
                        }
                    }
                }
                outcome
            }
            WatchIntent::Unwatch => {
                // Fail-forward: the cache invalidation below runs whether or
                // not the backend cooperated
                let mut outcome = Ok(());
                match self.request_targets(request) {
                    Ok(targets) => {
                        for target in targets {
                            let result = self.backend.unwatch_path(&target);
                            if let Err(err) = result {
                                if outcome.is_ok() {
                                    outcome = Err(err);
                                } else {
                                    tracing::debug!(
                                        "unwatch failed for {target}: {err}"
                                    );
                                }
                            }
                        }
                    }
                    Err(err) => outcome = Err(err),
                }

                // Once unwatched, cached data is no longer refreshed by
                // watcher events and must not be served stale
                let prefix = request.entry.full_path();
                self.index.visit_all(|entry| {
                    if entry.full_path().starts_with(&prefix) {
                        entry.clear_caches();
                    }
                });
                outcome
            }
        }
    }

    /// Computes the backend targets of a watch request.
    ///
    /// On recursive backends a single call on the watched root covers the
    /// whole subtree, so requests for non-root descendants dissolve into
    /// no-ops. Non-recursive backends get one call per directory accepted
    /// by the root's filter, the root itself always included.
    fn request_targets(
        &mut self, request: &WatchRequest,
    ) -> Result<Vec<String>> {
        let entry_path = request.entry.full_path();
        if self.backend.recursive_watch() {
            if entry_path == request.root_path {
                return Ok(vec![entry_path]);
            }
            return Ok(Vec::new());
        }

        let filter = Rc::clone(&request.filter);
        let root = request.entry.clone();
        let mut targets = Vec::new();
        self.visit(&request.entry, &mut |child| {
            if *child == root {
                targets.push(child.full_path());
                return true;
            }
            if !(filter)(&child.name(), &child.parent_path()) {
                return false;
            }
            if child.is_directory() {
                targets.push(child.full_path());
            }
            true
        })?;
        Ok(targets)
    }

    /// Handles one externally observed change.
    fn handle_external_change(&mut self, change: ExternalChange) {
        debug_assert!(!self.coordinator.is_active());
        let Some(raw) = change.path else {
            self.handle_wholesale_change();
            return;
        };

        // Watchers may omit the trailing slash for directories, and for
        // deletions nothing is left to tell the kinds apart - look the path
        // up as a file first and as a directory second
        let Ok(as_file) = self.normalize(&raw, false) else {
            tracing::warn!("ignoring change with malformed path: {raw}");
            return;
        };
        let entry = self.index.get(&as_file).or_else(|| {
            self.normalize(&raw, true)
                .ok()
                .and_then(|as_directory| self.index.get(&as_directory))
        });

        // Paths we never handed out a handle for are not speculatively
        // instantiated
        let Some(entry) = entry else { return };
        if entry.is_file() {
            self.handle_file_change(&entry, change.stat);
        } else {
            self.handle_directory_change(&entry, change.stat);
        }
    }

    /// Invalidates every cache and reports a wholesale change.
    fn handle_wholesale_change(&mut self) {
        self.index.visit_all(Entry::clear_caches);
        self.observers.fire_change(&ChangeEvent::wholesale());
    }

    /// Handles an external change to a file.
    fn handle_file_change(&mut self, entry: &Entry, stat: Option<Stat>) {
        // A matching modification time means the change was already
        // observed - typically our own mutation echoed back by the watcher
        if let (Some(new), Some(cached)) = (&stat, entry.cached_stat()) {
            if new.same_mtime(&cached) {
                return;
            }
        }

        entry.clear_caches();
        if let Some(new) = stat {
            if self.is_watched(entry) {
                entry.set_stat(new);
            }
        }
        self.observers.fire_change(&ChangeEvent::single(entry.clone()));
    }

    /// Handles an external change to a directory.
    fn handle_directory_change(
        &mut self, directory: &Entry, stat: Option<Stat>,
    ) {
        let old_contents = directory.cached_contents().unwrap_or_default();
        directory.clear_caches();

        // Reload and diff the listing by entry identity. When the reload
        // fails - the directory may just have disappeared - the change is
        // surfaced without a diff.
        let Ok(new_contents) = self.get_contents(directory) else {
            self.observers
                .fire_change(&ChangeEvent::single(directory.clone()));
            return;
        };
        let added: Vec<Entry> = new_contents
            .iter()
            .filter(|entry| !old_contents.contains(entry))
            .cloned()
            .collect();
        let removed: Vec<Entry> = old_contents
            .iter()
            .filter(|entry| !new_contents.contains(entry))
            .cloned()
            .collect();

        let covering = self
            .roots
            .active_root_covering(&directory.full_path())
            .map(|root| (Rc::clone(&root.filter), root.entry.full_path()));
        match covering {
            // Outside any active watched root, there is no watch to adjust;
            // the index is pruned beneath the removed entries by hand
            None => {
                for entry in &removed {
                    entry.clear_caches();
                    if entry.is_directory() {
                        self.index.prune_children(&entry.full_path());
                    }
                }
            }

            // Inside one, added entries are watched and removed entries
            // unwatched against that root before the event fires
            Some((filter, root_path)) => {
                for entry in &added {
                    let _ = self.submit_request(WatchRequest {
                        intent: WatchIntent::Watch,
                        entry: entry.clone(),
                        filter: Rc::clone(&filter),
                        root_path: root_path.clone(),
                    });
                }
                for entry in &removed {
                    let _ = self.submit_request(WatchRequest {
                        intent: WatchIntent::Unwatch,
                        entry: entry.clone(),
                        filter: Rc::clone(&filter),
                        root_path: root_path.clone(),
                    });
                }
                if let Some(stat) = stat {
                    directory.set_stat(stat);
                }
            }
        }
        self.observers.fire_change(&ChangeEvent::directory(
            directory.clone(),
            added,
            removed,
        ));
    }

    /// Tears all watched roots down after the watchers went offline.
    fn handle_offline(&mut self) {
        tracing::warn!("watchers offline, tearing down all watched roots");
        for root_path in self.roots.paths() {
            self.roots.set_active(&root_path, false);
            if let Some(root) = self.roots.remove(&root_path) {
                let _ = self.submit_request(WatchRequest {
                    intent: WatchIntent::Unwatch,
                    entry: root.entry,
                    filter: root.filter,
                    root_path,
                });
            }
        }
        self.handle_wholesale_change();
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl fmt::Debug for FileSystem {
    /// Formats the file system for debugging.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("roots", &self.roots)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::backend::MemoryBackend;

    /// Records the entry path of every change event, `None` for wholesale.
    fn collect_changes(
        fs: &mut FileSystem,
    ) -> Rc<RefCell<Vec<Option<String>>>> {
        let changes = Rc::new(RefCell::new(Vec::new()));
        fs.on_change({
            let changes = Rc::clone(&changes);
            move |event| {
                changes
                    .borrow_mut()
                    .push(event.entry.as_ref().map(Entry::full_path));
            }
        });
        changes
    }

    /// Records the added and removed names of every change event.
    fn collect_diffs(
        fs: &mut FileSystem,
    ) -> Rc<RefCell<Vec<(Vec<String>, Vec<String>)>>> {
        let diffs = Rc::new(RefCell::new(Vec::new()));
        fs.on_change({
            let diffs = Rc::clone(&diffs);
            move |event| {
                let added =
                    event.added.iter().flatten().map(Entry::name).collect();
                let removed =
                    event.removed.iter().flatten().map(Entry::name).collect();
                diffs.borrow_mut().push((added, removed));
            }
        });
        diffs
    }

    #[test]
    fn test_interning_dedupes_normalized_paths() {
        let mut fs = FileSystem::new(MemoryBackend::new());
        let first = fs.get_file_for_path("/a//b/../b/c.txt").unwrap();
        let second = fs.get_file_for_path("/a/b/c.txt").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.full_path(), "/a/b/c.txt");
    }

    #[test]
    fn test_directory_paths_carry_trailing_slash() {
        let mut fs = FileSystem::new(MemoryBackend::new());
        let directory = fs.get_directory_for_path("/x/y").unwrap();

        assert_eq!(directory.full_path(), "/x/y/");
    }

    #[test]
    fn test_path_validity_errors() {
        let mut fs = FileSystem::new(MemoryBackend::new());

        assert!(matches!(
            fs.get_file_for_path("/../a"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            fs.get_file_for_path("relative"),
            Err(Error::AbsolutePathRequired(_))
        ));
    }

    #[test]
    fn test_deferred_external_change() {
        let backend = MemoryBackend::new();
        backend.put_file("/p/f.txt", 1);
        let mut fs = FileSystem::new(backend.clone());
        let _file = fs.get_file_for_path("/p/f.txt").unwrap();
        let changes = collect_changes(&mut fs);

        // Changes observed during an in-process mutation stay deferred
        fs.begin_change();
        backend.touch("/p/f.txt");
        backend.emit_change("/p/f.txt");
        fs.poll();
        assert!(changes.borrow().is_empty());

        // ... and drain exactly once on quiescence
        fs.end_change();
        assert_eq!(*changes.borrow(), [Some(String::from("/p/f.txt"))]);
    }

    #[test]
    fn test_rename_not_misread_as_delete_add() {
        let backend = MemoryBackend::new();
        backend.put_file("/a/b", 1);
        let mut fs = FileSystem::new(backend.clone());
        let file = fs.get_file_for_path("/a/b").unwrap();
        let changes = collect_changes(&mut fs);
        let renames = Rc::new(RefCell::new(Vec::new()));
        fs.on_rename({
            let renames = Rc::clone(&renames);
            move |old, new| {
                renames
                    .borrow_mut()
                    .push((old.to_string(), new.to_string()));
            }
        });

        // The watcher reports the rename as an unrelated deletion and
        // addition while the mutation is still bracketed
        fs.begin_change();
        fs.rename(&file, "/a/c").unwrap();
        backend.emit_change("/a/b");
        backend.emit_change("/a/c");
        fs.poll();
        assert!(changes.borrow().is_empty());
        fs.end_change();

        // Exactly one rename; the deletion resolved against the renamed
        // index and was dropped, the addition collapsed into one benign
        // change for the new path
        assert_eq!(
            *renames.borrow(),
            [(String::from("/a/b"), String::from("/a/c"))]
        );
        assert_eq!(*changes.borrow(), [Some(String::from("/a/c"))]);
        assert_eq!(file.full_path(), "/a/c");
    }

    #[test]
    fn test_external_change_deduped_by_mtime() {
        let backend = MemoryBackend::new();
        backend.put_file("/p/f.txt", 1);
        let mut fs = FileSystem::new(backend.clone());
        let root = fs.get_directory_for_path("/p").unwrap();
        fs.watch(&root, |_, _| true).unwrap();
        let file = fs.get_file_for_path("/p/f.txt").unwrap();
        fs.stat(&file).unwrap();
        let changes = collect_changes(&mut fs);

        // An echo with an unchanged mtime was already observed
        backend.emit_change("/p/f.txt");
        fs.poll();
        assert!(changes.borrow().is_empty());

        backend.touch("/p/f.txt");
        backend.emit_change("/p/f.txt");
        fs.poll();
        assert_eq!(changes.borrow().len(), 1);
    }

    #[test]
    fn test_watched_root_overlap_rejected() {
        let backend = MemoryBackend::new();
        backend.put_directory("/proj/sub");
        let mut fs = FileSystem::new(backend);
        let proj = fs.get_directory_for_path("/proj").unwrap();
        let sub = fs.get_directory_for_path("/proj/sub").unwrap();
        let top = fs.get_directory_for_path("/").unwrap();

        fs.watch(&proj, |_, _| true).unwrap();
        assert!(matches!(
            fs.watch(&sub, |_, _| true),
            Err(Error::ParentAlreadyWatched(_))
        ));
        assert!(matches!(
            fs.watch(&top, |_, _| true),
            Err(Error::ChildAlreadyWatched(_))
        ));
    }

    #[test]
    fn test_unwatch_prunes_subtree() {
        let backend = MemoryBackend::new();
        backend.put_file("/proj/a.txt", 1);
        let mut fs = FileSystem::new(backend);
        let root = fs.get_directory_for_path("/proj").unwrap();
        fs.watch(&root, |_, _| true).unwrap();
        let before = fs.get_file_for_path("/proj/a.txt").unwrap();

        fs.unwatch(&root).unwrap();

        // Nothing beneath the root survived in the index, so a fresh
        // lookup interns a fresh handle
        let after = fs.get_file_for_path("/proj/a.txt").unwrap();
        assert_ne!(before, after);
        assert!(matches!(
            fs.unwatch(&root),
            Err(Error::NotWatched(_))
        ));
    }

    #[test]
    fn test_watch_failure_does_not_poison_registry() {
        let backend = MemoryBackend::new();
        backend.put_directory("/proj");
        let mut fs = FileSystem::new(backend.clone());
        let root = fs.get_directory_for_path("/proj").unwrap();

        backend.fail_next_watch("device busy");
        let err = fs.watch(&root, |_, _| true).unwrap_err();
        assert_eq!(err.to_string(), "device busy");

        // The failed root left no residue behind
        fs.watch(&root, |_, _| true).unwrap();
    }

    #[test]
    fn test_wholesale_change_clears_caches() {
        let backend = MemoryBackend::new();
        backend.put_file("/p/f.txt", 1);
        let mut fs = FileSystem::new(backend.clone());
        let root = fs.get_directory_for_path("/p").unwrap();
        fs.watch(&root, |_, _| true).unwrap();
        let file = fs.get_file_for_path("/p/f.txt").unwrap();
        fs.stat(&file).unwrap();
        let changes = collect_changes(&mut fs);

        backend.emit_wholesale();
        fs.poll();

        assert_eq!(*changes.borrow(), [None]);
        assert!(file.cached_stat().is_none());
    }

    #[test]
    fn test_offline_tears_down_watched_roots() {
        let backend = MemoryBackend::new();
        backend.put_directory("/proj");
        let mut fs = FileSystem::new(backend.clone());
        let root = fs.get_directory_for_path("/proj").unwrap();
        fs.watch(&root, |_, _| true).unwrap();
        let changes = collect_changes(&mut fs);

        backend.go_offline();
        fs.poll();

        assert_eq!(*changes.borrow(), [None]);
        assert!(backend.watched_paths().is_empty());

        // Roots can be registered anew afterwards
        fs.watch(&root, |_, _| true).unwrap();
    }

    #[test]
    fn test_resolve() {
        let backend = MemoryBackend::new();
        backend.put_file("/proj/a.txt", 7);
        backend.put_directory("/proj/sub");
        let mut fs = FileSystem::new(backend);

        let (file, stat) = fs.resolve("/proj/a.txt").unwrap();
        assert!(file.is_file());
        assert_eq!(stat.size(), 7);

        // Directories resolve without a trailing slash in the input
        let (directory, stat) = fs.resolve("/proj/sub").unwrap();
        assert!(directory.is_directory());
        assert_eq!(directory.full_path(), "/proj/sub/");
        assert!(!stat.is_file());

        // Interned handles are preferred over a backend round trip
        assert_eq!(fs.resolve("/proj/a.txt").unwrap().0, file);
        assert!(matches!(
            fs.resolve("/missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_directory_change_reports_diff() {
        let backend = MemoryBackend::new();
        backend.put_file("/proj/a.txt", 1);
        let mut fs = FileSystem::new(backend.clone());
        let root = fs.get_directory_for_path("/proj").unwrap();
        fs.watch(&root, |_, _| true).unwrap();
        fs.get_contents(&root).unwrap();
        let diffs = collect_diffs(&mut fs);

        backend.put_file("/proj/new.txt", 2);
        backend.touch("/proj");
        backend.emit_change("/proj");
        fs.poll();

        assert_eq!(
            *diffs.borrow(),
            [(vec![String::from("new.txt")], Vec::new())]
        );
    }

    #[test]
    fn test_non_recursive_watch_enumerates_directories() {
        let backend = MemoryBackend::new().with_recursive_watch(false);
        backend.put_file("/proj/src/main.rs", 1);
        backend.put_directory("/proj/.git");
        let mut fs = FileSystem::new(backend.clone());
        let root = fs.get_directory_for_path("/proj").unwrap();

        // One backend call per directory accepted by the filter, pruned
        // subtrees excluded, the root always included
        fs.watch(&root, |name, _| !name.starts_with('.')).unwrap();
        assert_eq!(backend.watched_paths(), ["/proj/", "/proj/src/"]);

        fs.unwatch(&root).unwrap();
        assert!(backend.watched_paths().is_empty());
    }

    #[test]
    fn test_listing_respects_watched_root_filter() {
        let backend = MemoryBackend::new();
        backend.put_file("/proj/.hidden", 1);
        backend.put_file("/proj/visible.txt", 1);
        let mut fs = FileSystem::new(backend);
        let root = fs.get_directory_for_path("/proj").unwrap();
        fs.watch(&root, |name, _| !name.starts_with('.')).unwrap();

        let names: Vec<String> = fs
            .get_contents(&root)
            .unwrap()
            .iter()
            .map(Entry::name)
            .collect();
        assert_eq!(names, ["visible.txt"]);

        // Outside any watched root, listings include everything
        fs.unwatch(&root).unwrap();
        let root = fs.get_directory_for_path("/proj").unwrap();
        let names: Vec<String> = fs
            .get_contents(&root)
            .unwrap()
            .iter()
            .map(Entry::name)
            .collect();
        assert_eq!(names, [".hidden", "visible.txt"]);
    }

    #[test]
    fn test_unlink_reconciles_parent() {
        let backend = MemoryBackend::new();
        backend.put_file("/proj/a.txt", 1);
        let mut fs = FileSystem::new(backend);
        let root = fs.get_directory_for_path("/proj").unwrap();
        fs.watch(&root, |_, _| true).unwrap();
        fs.get_contents(&root).unwrap();
        let file = fs.get_file_for_path("/proj/a.txt").unwrap();
        let diffs = collect_diffs(&mut fs);

        fs.unlink(&file).unwrap();

        assert_eq!(
            *diffs.borrow(),
            [(Vec::new(), vec![String::from("a.txt")])]
        );
        assert!(!fs.exists(&file).unwrap());
    }

    #[test]
    fn test_create_directory_reconciles_parent() {
        let backend = MemoryBackend::new();
        backend.put_directory("/proj");
        let mut fs = FileSystem::new(backend);
        let root = fs.get_directory_for_path("/proj").unwrap();
        fs.watch(&root, |_, _| true).unwrap();
        fs.get_contents(&root).unwrap();
        let diffs = collect_diffs(&mut fs);

        let sub = fs.get_directory_for_path("/proj/sub").unwrap();
        let stat = fs.create_directory(&sub).unwrap();

        assert!(!stat.is_file());
        assert_eq!(
            *diffs.borrow(),
            [(vec![String::from("sub")], Vec::new())]
        );
        assert!(fs.exists(&sub).unwrap());
    }

    #[test]
    fn test_visit_prunes_subtrees() {
        let backend = MemoryBackend::new();
        backend.put_file("/proj/src/main.rs", 1);
        backend.put_file("/proj/target/out.bin", 1);
        let mut fs = FileSystem::new(backend);
        let root = fs.get_directory_for_path("/proj").unwrap();

        let mut names = Vec::new();
        fs.visit(&root, &mut |entry| {
            if entry.name() == "target" {
                return false;
            }
            names.push(entry.name());
            true
        })
        .unwrap();

        assert!(names.contains(&String::from("main.rs")));
        assert!(!names.contains(&String::from("out.bin")));
    }

    #[test]
    fn test_dialog_passthrough() {
        let backend = MemoryBackend::new();
        backend.set_open_selection(vec![String::from("/proj/a.txt")]);
        let mut fs = FileSystem::new(backend);

        let selection =
            fs.show_open_dialog(&OpenDialogOptions::default()).unwrap();
        assert_eq!(selection, ["/proj/a.txt"]);

        // Cancellation is success with no choice
        let choice =
            fs.show_save_dialog(&SaveDialogOptions::default()).unwrap();
        assert_eq!(choice, None);
    }
}

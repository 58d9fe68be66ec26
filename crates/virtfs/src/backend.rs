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

//! Storage backend contract.

use crate::change::ChangeSink;
use crate::error::Result;
use crate::stat::Stat;

mod memory;

pub use memory::MemoryBackend;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Open dialog options.
#[derive(Clone, Debug, Default)]
pub struct OpenDialogOptions {
    /// Whether multiple targets may be selected.
    pub allow_multiple: bool,
    /// Whether directories are selectable instead of files.
    pub choose_directories: bool,
    /// Dialog title.
    pub title: String,
    /// Path the dialog initially shows.
    pub initial_path: Option<String>,
    /// File type filters.
    pub file_types: Vec<String>,
}

// ----------------------------------------------------------------------------

/// Save dialog options.
#[derive(Clone, Debug, Default)]
pub struct SaveDialogOptions {
    /// Dialog title.
    pub title: String,
    /// Path the dialog initially shows.
    pub initial_path: Option<String>,
    /// Proposed file name.
    pub proposed_name: String,
}

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// Storage backend.
///
/// The low-level half of the file system: byte storage, metadata, native
/// watchers, and platform dialogs. The core consumes this trait and never
/// interprets backend failures - their messages surface verbatim. Paths
/// handed to a backend are canonical (see [`crate::path`]), except that a
/// raw, possibly slash-less path is used when the core does not yet know
/// whether the target is a file or a directory.
///
/// Backends distinguish a missing target with [`Error::NotFound`], which the
/// core relies on to answer existence queries; everything else is opaque.
///
/// A backend may be watched from another thread. All change traffic flows
/// through the [`ChangeSink`] registered at [`Backend::init_watchers`] -
/// backends never call back into the core directly.
///
/// [`Error::NotFound`]: crate::Error::NotFound
pub trait Backend {
    /// Registers the notification sink for watcher events.
    ///
    /// Called exactly once, at file system construction.
    fn init_watchers(&mut self, sink: ChangeSink);

    /// Returns a stat snapshot for the given path.
    fn stat(&mut self, path: &str) -> Result<Stat>;

    /// Returns the names and stat snapshots of a directory's children.
    ///
    /// The returned order is preserved by the core and surfaced to callers
    /// as-is; it is implementation-defined.
    fn read_dir(&mut self, path: &str) -> Result<Vec<(String, Stat)>>;

    /// Renames an entry.
    fn rename(&mut self, old_path: &str, new_path: &str) -> Result;

    /// Creates a directory, returning its stat snapshot.
    fn mkdir(&mut self, path: &str) -> Result<Stat>;

    /// Removes a file, or a directory with everything beneath it.
    fn unlink(&mut self, path: &str) -> Result;

    /// Starts watching the given path.
    ///
    /// Watches one directory level on non-recursive backends, and the whole
    /// subtree when [`Backend::recursive_watch`] is declared.
    fn watch_path(&mut self, path: &str) -> Result;

    /// Stops watching the given path.
    fn unwatch_path(&mut self, path: &str) -> Result;

    /// Stops watching all paths.
    fn unwatch_all(&mut self) -> Result;

    /// Shows a dialog for choosing one or more existing targets.
    ///
    /// Cancellation is not an error: it completes successfully with an
    /// empty selection.
    fn show_open_dialog(
        &mut self, options: &OpenDialogOptions,
    ) -> Result<Vec<String>>;

    /// Shows a dialog for choosing a save destination.
    ///
    /// Cancellation is not an error: it completes successfully with `None`.
    fn show_save_dialog(
        &mut self, options: &SaveDialogOptions,
    ) -> Result<Option<String>>;

    /// Returns whether watching a directory covers its whole subtree.
    fn recursive_watch(&self) -> bool;

    /// Returns whether UNC path syntax should be preserved.
    fn normalize_unc_paths(&self) -> bool;
}

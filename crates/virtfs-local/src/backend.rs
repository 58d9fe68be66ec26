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

//! Local disk backend.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use virtfs::{Backend, ChangeSink, Error, Result, Stat};
use virtfs::{OpenDialogOptions, SaveDialogOptions};

use crate::watcher;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Local disk backend.
///
/// Serves the backend contract straight from [`std::fs`], translating
/// between the virtual slash-separated path format and operating system
/// paths. Watching is recursive - the [`notify`] watcher covers whole
/// subtrees with a single registration - and change events arrive on the
/// watcher's thread, from where they are bridged into the core's
/// notification channel.
///
/// This backend is headless: the open and save dialogs of the contract are
/// reported as unsupported.
///
/// # Examples
///
/// ``` no_run
/// use virtfs::FileSystem;
/// use virtfs_local::LocalBackend;
///
/// let mut fs = FileSystem::new(LocalBackend::new());
/// let home = fs.get_directory_for_path("/home/user").unwrap();
/// assert!(home.is_directory());
/// ```
#[derive(Default)]
pub struct LocalBackend {
    /// Native watcher, created when the sink is registered.
    watcher: Option<RecommendedWatcher>,
    /// Watched virtual paths.
    watched: Vec<String>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl LocalBackend {
    /// Creates a local disk backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the watcher, or an error when it failed to start.
    fn watcher(&mut self) -> Result<&mut RecommendedWatcher> {
        self.watcher
            .as_mut()
            .ok_or_else(|| Error::Backend(String::from("watcher unavailable")))
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl Backend for LocalBackend {
    /// Starts the native watcher and registers the notification sink.
    fn init_watchers(&mut self, sink: ChangeSink) {
        match watcher::spawn(sink) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(err) => {
                // The backend stays usable for plain I/O; watch requests
                // will report the failure
                tracing::warn!("failed to start watcher: {err}");
            }
        }
    }

    /// Returns a stat snapshot for the given path.
    fn stat(&mut self, path: &str) -> Result<Stat> {
        stat_path(&to_os_path(path))
    }

    /// Returns the names and stat snapshots of a directory's children.
    ///
    /// Children whose metadata cannot be read - racing deletions, broken
    /// links, permission holes - are skipped rather than failing the whole
    /// listing.
    fn read_dir(&mut self, path: &str) -> Result<Vec<(String, Stat)>> {
        let entries = fs::read_dir(to_os_path(path))
            .map_err(|err| convert_io(err, path))?;

        let mut contents = Vec::new();
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let name = entry.file_name().to_string_lossy().into_owned();
            match stat_path(&entry.path()) {
                Ok(stat) => contents.push((name, stat)),
                Err(err) => {
                    tracing::debug!("skipping unreadable child {name}: {err}");
                }
            }
        }
        Ok(contents)
    }

    /// Renames an entry.
    fn rename(&mut self, old_path: &str, new_path: &str) -> Result {
        fs::rename(to_os_path(old_path), to_os_path(new_path))
            .map_err(|err| convert_io(err, old_path))
    }

    /// Creates a directory.
    fn mkdir(&mut self, path: &str) -> Result<Stat> {
        let os_path = to_os_path(path);
        fs::create_dir(&os_path).map_err(|err| convert_io(err, path))?;
        stat_path(&os_path)
    }

    /// Removes a file, or a directory with everything beneath it.
    fn unlink(&mut self, path: &str) -> Result {
        let os_path = to_os_path(path);
        let metadata = fs::symlink_metadata(&os_path)
            .map_err(|err| convert_io(err, path))?;
        if metadata.is_dir() {
            fs::remove_dir_all(&os_path)
        } else {
            fs::remove_file(&os_path)
        }
        .map_err(|err| convert_io(err, path))
    }

    /// Starts watching the given path, recursively.
    fn watch_path(&mut self, path: &str) -> Result {
        let os_path = to_os_path(path);
        self.watcher()?
            .watch(&os_path, RecursiveMode::Recursive)
            .map_err(convert_notify)?;
        self.watched.push(path.to_string());
        Ok(())
    }

    /// Stops watching the given path.
    fn unwatch_path(&mut self, path: &str) -> Result {
        let os_path = to_os_path(path);
        let result =
            self.watcher()?.unwatch(&os_path).map_err(convert_notify);
        self.watched.retain(|check| check != path);
        result
    }

    /// Stops watching all paths.
    fn unwatch_all(&mut self) -> Result {
        let mut outcome = Ok(());
        for path in std::mem::take(&mut self.watched) {
            let result = self
                .watcher()
                .and_then(|watcher| {
                    watcher.unwatch(&to_os_path(&path)).map_err(convert_notify)
                });
            if let Err(err) = result {
                if outcome.is_ok() {
                    outcome = Err(err);
                } else {
                    tracing::debug!("unwatch failed for {path}: {err}");
                }
            }
        }
        outcome
    }

    /// Reports the open dialog as unsupported.
    fn show_open_dialog(
        &mut self, _options: &OpenDialogOptions,
    ) -> Result<Vec<String>> {
        Err(Error::Backend(String::from(
            "open dialog not supported by the local backend",
        )))
    }

    /// Reports the save dialog as unsupported.
    fn show_save_dialog(
        &mut self, _options: &SaveDialogOptions,
    ) -> Result<Option<String>> {
        Err(Error::Backend(String::from(
            "save dialog not supported by the local backend",
        )))
    }

    /// Returns whether watching a directory covers its whole subtree.
    fn recursive_watch(&self) -> bool {
        true
    }

    /// Returns whether UNC path syntax should be preserved.
    fn normalize_unc_paths(&self) -> bool {
        cfg!(target_os = "windows")
    }
}

// ----------------------------------------------------------------------------

impl fmt::Debug for LocalBackend {
    /// Formats the backend for debugging.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LocalBackend")
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Returns a stat snapshot for the file or directory at the given path.
///
/// Symbolic links are resolved, and the resolved path travels with the
/// snapshot so the core can identify link targets during traversal.
pub(crate) fn stat_path(os_path: &Path) -> Result<Stat> {
    let virtual_path = to_virtual_path(os_path);
    let metadata = fs::symlink_metadata(os_path)
        .map_err(|err| convert_io(err, &virtual_path))?;

    if metadata.file_type().is_symlink() {
        let target = fs::canonicalize(os_path)
            .map_err(|err| convert_io(err, &virtual_path))?;
        let metadata = fs::metadata(&target)
            .map_err(|err| convert_io(err, &virtual_path))?;
        Ok(stat_from(&metadata).with_real_path(to_virtual_path(&target)))
    } else {
        Ok(stat_from(&metadata))
    }
}

/// Builds a stat snapshot from file metadata.
fn stat_from(metadata: &fs::Metadata) -> Stat {
    let mtime = metadata.modified().unwrap_or(UNIX_EPOCH);
    if metadata.is_dir() {
        Stat::directory(mtime)
    } else {
        Stat::file(metadata.len(), mtime)
    }
}

/// Converts an operating system path to the virtual path format.
pub(crate) fn to_virtual_path(os_path: &Path) -> String {
    let path = os_path.to_string_lossy();
    if cfg!(target_os = "windows") {
        path.replace('\\', "/")
    } else {
        path.into_owned()
    }
}

/// Converts a virtual path to an operating system path.
///
/// The trailing slash of canonical directory paths is dropped, as the
/// operating system APIs neither need nor preserve it.
fn to_os_path(path: &str) -> PathBuf {
    let trimmed = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    PathBuf::from(trimmed)
}

/// Converts an I/O error, distinguishing a missing target.
fn convert_io(err: std::io::Error, path: &str) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(path.to_string())
    } else {
        Error::Io(err)
    }
}

/// Converts a watcher error into an opaque backend error.
fn convert_notify(err: notify::Error) -> Error {
    Error::Backend(err.to_string())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use virtfs::FileSystem;

    use super::*;

    #[test]
    fn test_stat_and_listing_through_facade() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), b"contents").unwrap();
        let root_path = to_virtual_path(dir.path());

        let mut fs = FileSystem::new(LocalBackend::new());
        let root = fs.get_directory_for_path(&root_path).unwrap();
        let names: Vec<String> = fs
            .get_contents(&root)
            .unwrap()
            .iter()
            .map(virtfs::Entry::name)
            .collect();
        assert!(names.contains(&String::from("a.txt")));
        assert!(names.contains(&String::from("sub")));

        let (file, stat) =
            fs.resolve(&format!("{root_path}/a.txt")).unwrap();
        assert!(file.is_file());
        assert_eq!(stat.size(), 8);

        let (sub, stat) = fs.resolve(&format!("{root_path}/sub")).unwrap();
        assert!(sub.is_directory());
        assert!(!stat.is_file());
    }

    #[test]
    fn test_rename_mkdir_unlink() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let root_path = to_virtual_path(dir.path());
        let mut backend = LocalBackend::new();

        backend
            .rename(
                &format!("{root_path}/a.txt"),
                &format!("{root_path}/b.txt"),
            )
            .unwrap();
        assert!(dir.path().join("b.txt").exists());

        let stat = backend.mkdir(&format!("{root_path}/made/")).unwrap();
        assert!(!stat.is_file());

        backend.unlink(&format!("{root_path}/made/")).unwrap();
        assert!(matches!(
            backend.stat(&format!("{root_path}/made")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_watch_and_unwatch_through_facade() {
        let dir = tempdir().unwrap();
        let root_path = to_virtual_path(dir.path());

        let mut fs = FileSystem::new(LocalBackend::new());
        let root = fs.get_directory_for_path(&root_path).unwrap();
        fs.watch(&root, |_, _| true).unwrap();
        fs.unwatch(&root).unwrap();
    }

    #[test]
    fn test_dialogs_unsupported() {
        let mut backend = LocalBackend::new();
        assert!(backend
            .show_open_dialog(&OpenDialogOptions::default())
            .is_err());
    }
}

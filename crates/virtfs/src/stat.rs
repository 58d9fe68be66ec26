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

//! Stat snapshot.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::entry::EntryKind;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Stat snapshot.
///
/// An immutable record of an entry's metadata as observed at one point in
/// time. Snapshots are compared for freshness by modification time at
/// millisecond precision, since that is the finest granularity backends can
/// be relied upon to report consistently.
#[derive(Clone, Debug)]
pub struct Stat {
    /// Entry kind.
    kind: EntryKind,
    /// Size in bytes.
    size: u64,
    /// Modification time.
    mtime: SystemTime,
    /// Resolved path, if the entry is reached through a symbolic link.
    real_path: Option<String>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Stat {
    /// Creates a stat snapshot for a file.
    #[must_use]
    pub fn file(size: u64, mtime: SystemTime) -> Self {
        Self { kind: EntryKind::File, size, mtime, real_path: None }
    }

    /// Creates a stat snapshot for a directory.
    #[must_use]
    pub fn directory(mtime: SystemTime) -> Self {
        Self { kind: EntryKind::Directory, size: 0, mtime, real_path: None }
    }

    /// Attaches the resolved path of a symbolic link target.
    #[must_use]
    pub fn with_real_path(mut self, real_path: impl Into<String>) -> Self {
        self.real_path = Some(real_path.into());
        self
    }

    /// Checks whether this snapshot and the given one share a modification
    /// time, at millisecond precision.
    #[must_use]
    pub fn same_mtime(&self, other: &Stat) -> bool {
        self.mtime_millis() == other.mtime_millis()
    }

    /// Returns the modification time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn mtime_millis(&self) -> u128 {
        self.mtime
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_millis())
    }
}

#[allow(clippy::must_use_candidate)]
impl Stat {
    /// Returns the entry kind.
    #[inline]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Returns whether the snapshot describes a file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Returns the size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the modification time.
    #[inline]
    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    /// Returns the resolved path, if the entry is a symbolic link.
    #[inline]
    pub fn real_path(&self) -> Option<&str> {
        self.real_path.as_deref()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_same_mtime_millisecond_precision() {
        let base = UNIX_EPOCH + Duration::from_millis(1_000);
        let a = Stat::file(1, base);
        let b = Stat::file(2, base + Duration::from_micros(400));
        let c = Stat::file(1, base + Duration::from_millis(1));

        assert!(a.same_mtime(&b));
        assert!(!a.same_mtime(&c));
    }
}

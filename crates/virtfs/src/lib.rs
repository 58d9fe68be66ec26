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

//! Virtual file system facade over pluggable storage backends.
//!
//! Application code talks to a [`FileSystem`], which interns stable entry
//! handles by canonical path, caches listings and stat snapshots under
//! watched roots, and coordinates in-process mutations with externally
//! observed changes. Storage itself - bytes, metadata, native watchers,
//! platform dialogs - lives behind the [`Backend`] trait; the in-memory
//! backend ships here, a local-disk backend in the sibling crate.
//!
//! The core is deliberately single-threaded: a backend's watcher thread
//! communicates over a channel only, and everything else runs under plain
//! mutable access with no locks involved.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]

pub mod backend;
pub mod change;
pub mod entry;
pub mod error;
pub mod event;
pub mod path;
pub mod stat;
pub mod system;
pub mod watch;

mod index;

pub use backend::{
    Backend, MemoryBackend, OpenDialogOptions, SaveDialogOptions,
};
pub use change::{ChangeSink, Notification};
pub use entry::{Entry, EntryKind};
pub use error::{Error, Result};
pub use event::{ChangeEvent, HandlerId};
pub use path::is_absolute_path;
pub use stat::Stat;
pub use system::FileSystem;
pub use watch::WatchFilter;

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

//! File system error.

use std::{io, result};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// File system error.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Path is not absolute.
    #[error("path is not absolute: {0}")]
    AbsolutePathRequired(String),

    /// Path is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// An ancestor of the path is already watched.
    #[error("an ancestor of the path is already watched: {0}")]
    ParentAlreadyWatched(String),

    /// A descendant of the path is already watched.
    #[error("a descendant of the path is already watched: {0}")]
    ChildAlreadyWatched(String),

    /// Path is not watched.
    #[error("path is not watched: {0}")]
    NotWatched(String),

    /// No entry exists at the path.
    #[error("no entry exists at path: {0}")]
    NotFound(String),

    /// Entry is not a directory.
    #[error("entry is not a directory: {0}")]
    NotDirectory(String),

    /// Opaque backend error, surfaced verbatim.
    #[error("{0}")]
    Backend(String),
}

// ----------------------------------------------------------------------------
// Type aliases
// ----------------------------------------------------------------------------

/// File system result.
pub type Result<T = ()> = result::Result<T, Error>;

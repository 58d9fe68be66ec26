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

//! Path utilities.
//!
//! Canonical paths are virtual: always absolute, separated by forward
//! slashes, free of duplicate slashes and `..` segments, and ending in a
//! trailing slash if and only if they denote a directory. They are plain
//! strings rather than [`std::path::Path`], as the platform path type cannot
//! represent the trailing-slash distinction or keep forward slashes stable
//! across operating systems.

use crate::error::{Error, Result};

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Checks whether the given path is absolute.
///
/// A path is considered absolute if it starts with a slash, or if its second
/// character is a colon, which covers drive-letter syntax like `C:/temp`.
///
/// # Examples
///
/// ```
/// use virtfs::path::is_absolute_path;
///
/// assert!(is_absolute_path("/usr/share"));
/// assert!(is_absolute_path("C:/temp"));
/// assert!(!is_absolute_path("relative/path"));
/// ```
#[must_use]
pub fn is_absolute_path(path: &str) -> bool {
    let mut chars = path.chars();
    match chars.next() {
        Some('/') => true,
        Some(_) => chars.next() == Some(':'),
        None => false,
    }
}

/// Normalizes the given path into its canonical form.
///
/// Runs of two or more slashes are collapsed into one, `..` segments are
/// resolved against their preceding segment, and a single trailing slash is
/// ensured when the path denotes a directory. When `allow_unc` is set and
/// the path starts with two or more slashes, one leading slash is restored
/// after collapsing, preserving UNC syntax like `//server/share`.
///
/// Normalization is idempotent, and canonical path equality is exact string
/// equality.
///
/// # Errors
///
/// [`Error::AbsolutePathRequired`] is returned when the path is relative,
/// and [`Error::InvalidPath`] when a `..` segment would escape beyond the
/// root of the path.
///
/// # Examples
///
/// ```
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// use virtfs::path::normalize;
///
/// assert_eq!(normalize("/a//b/../b/c.txt", false, false)?, "/a/b/c.txt");
/// assert_eq!(normalize("/x/y", true, false)?, "/x/y/");
/// # Ok(())
/// # }
/// ```
pub fn normalize(path: &str, is_directory: bool, allow_unc: bool) -> Result<String> {
    if !is_absolute_path(path) {
        return Err(Error::AbsolutePathRequired(path.to_string()));
    }

    // Remember whether the path uses UNC syntax, which is only honored when
    // the backend declared support for it - the leading slash lost to the
    // collapsing step below is restored at the very end
    let unc = allow_unc && path.starts_with("//");

    // Collapse runs of two or more slashes into a single one
    let mut result = String::with_capacity(path.len());
    let mut previous = '\0';
    for current in path.chars() {
        if current != '/' || previous != '/' {
            result.push(current);
        }
        previous = current;
    }

    // Resolve `..` segments, if any. The substring check is a fast path that
    // also matches segments merely containing two dots, like `a..b`, but the
    // segment scan below only ever removes exact `..` segments, so those
    // paths pass through unchanged.
    if result.contains("..") {
        let mut parts: Vec<&str> = result.split('/').collect();

        // Scan from the second segment upward. A `..` before any resolvable
        // segment would escape the root, which is malformed input. On each
        // resolution, the `..` and its preceding segment are removed, and
        // the scan resumes at the segment that moved into their place.
        let mut index = 1;
        while index < parts.len() {
            if parts[index] == ".." {
                if index < 2 {
                    return Err(Error::InvalidPath(path.to_string()));
                }
                parts.drain(index - 1..=index);
                index -= 1;
            } else {
                index += 1;
            }
        }
        result = parts.join("/");
    }

    // Ensure exactly one trailing slash for directories
    if is_directory && !result.ends_with('/') {
        result.push('/');
    }

    // Restore the UNC prefix
    if unc {
        result.insert(0, '/');
    }
    Ok(result)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_absolute_path() {
        assert!(is_absolute_path("/"));
        assert!(is_absolute_path("/a/b"));
        assert!(is_absolute_path("C:/temp"));
        assert!(is_absolute_path("c:"));
        assert!(!is_absolute_path("a/b"));
        assert!(!is_absolute_path(""));
        assert!(!is_absolute_path("x"));
    }

    #[test]
    fn test_normalize() {
        let test_cases = vec![
            ("/a/b/c.txt", false, "/a/b/c.txt"),
            ("/a//b///c.txt", false, "/a/b/c.txt"),
            ("/a//b/../b/c.txt", false, "/a/b/c.txt"),
            ("/a/b/..", false, "/a"),
            ("/a/b/..", true, "/a/"),
            ("/x/y", true, "/x/y/"),
            ("/x/y/", true, "/x/y/"),
            ("/", true, "/"),
            ("/a/b..c/d", false, "/a/b..c/d"),
            ("C:/foo/../bar", false, "C:/bar"),
        ];

        for (path, is_directory, expected) in test_cases {
            let result = normalize(path, is_directory, false).unwrap();
            assert_eq!(result, expected, "Failed for path: {path}");
        }
    }

    #[test]
    fn test_normalize_idempotent() {
        for (path, is_directory) in
            [("/a//b/../b/c.txt", false), ("/x//y", true), ("//s/t", true)]
        {
            let once = normalize(path, is_directory, true).unwrap();
            let twice = normalize(&once, is_directory, true).unwrap();
            assert_eq!(once, twice, "Failed for path: {path}");
        }
    }

    #[test]
    fn test_normalize_unc() {
        assert_eq!(
            normalize("//server/share/x", false, true).unwrap(),
            "//server/share/x"
        );
        assert_eq!(
            normalize("//server/share/x", false, false).unwrap(),
            "/server/share/x"
        );
    }

    #[test]
    fn test_normalize_invalid() {
        assert!(matches!(
            normalize("/../a", false, false),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            normalize("/a/../../b", false, false),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            normalize("relative", false, false),
            Err(Error::AbsolutePathRequired(_))
        ));
    }
}

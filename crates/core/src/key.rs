//! Hierarchical keys
//!
//! A [`Key`] is a slash-delimited path such as `/a/b/c`. Keys are stored in
//! the engine as the raw UTF-8 bytes of the path, so the ordering of keys is
//! the byte ordering of their strings. That ordering is also the iteration
//! order of queries.
//!
//! # Design Notes
//!
//! - `Key::new` always produces a clean path: a leading `/`, no trailing `/`,
//!   no empty, `.` or `..` segments.
//! - `Key::raw` skips cleaning for keys that come back from the engine, which
//!   were clean when they were written.

use std::fmt;

use crate::error::{Error, Result};

/// Path separator used by keys
pub const SEPARATOR: char = '/';

/// Immutable slash-delimited hierarchical key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    path: String,
}

impl Key {
    /// Create a key from a path, cleaning it first
    ///
    /// ```
    /// use cairn_core::Key;
    ///
    /// assert_eq!(Key::new("a//b/./c/").as_str(), "/a/b/c");
    /// assert_eq!(Key::new("/a/b/../c").as_str(), "/a/c");
    /// assert_eq!(Key::new("").as_str(), "/");
    /// ```
    pub fn new(path: impl AsRef<str>) -> Self {
        Key {
            path: clean(path.as_ref()),
        }
    }

    /// Create a key without cleaning
    ///
    /// The caller guarantees that `path` is already clean.
    pub fn raw(path: impl Into<String>) -> Self {
        Key { path: path.into() }
    }

    /// Decode a key from the bytes stored in the engine
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        std::str::from_utf8(bytes)
            .map(Key::raw)
            .map_err(|e| Error::InvalidArgument(format!("key is not valid UTF-8: {}", e)))
    }

    /// The path as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// The byte encoding used by the engine
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.path.as_bytes()
    }

    /// Consume the key and return its path
    pub fn into_string(self) -> String {
        self.path
    }

    /// Path segments, without the empty root segment
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Last segment of the path (`"c"` for `/a/b/c`)
    pub fn name(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    /// Parent key (`/a/b` for `/a/b/c`); the root is its own parent
    pub fn parent(&self) -> Key {
        match self.path.rfind(SEPARATOR) {
            Some(0) | None => Key::raw("/"),
            Some(idx) => Key::raw(&self.path[..idx]),
        }
    }

    /// Child key formed by appending `name` as new segments
    pub fn child(&self, name: impl AsRef<str>) -> Key {
        Key::new(format!("{}/{}", self.path, name.as_ref()))
    }

    /// Whether this key is a strict ancestor of `other`
    ///
    /// `/a` is an ancestor of `/a/b` but not of `/ab` nor of itself.
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        if self.path == "/" {
            return other.path != "/";
        }
        other.path.len() > self.path.len()
            && other.path.starts_with(&self.path)
            && other.path.as_bytes()[self.path.len()] == b'/'
    }

    /// Whether the key has exactly one segment
    pub fn is_top_level(&self) -> bool {
        self.segments().count() == 1
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl From<&str> for Key {
    fn from(path: &str) -> Self {
        Key::new(path)
    }
}

impl From<String> for Key {
    fn from(path: String) -> Self {
        Key::new(path)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Lexically clean a path into key form
fn clean(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }

    let mut out = String::with_capacity(path.len() + 1);
    if stack.is_empty() {
        out.push(SEPARATOR);
        return out;
    }
    for segment in stack {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    out
}

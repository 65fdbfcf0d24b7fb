//! Field paths into a form value tree.
//!
//! A path is a sequence of segments. Each segment is either an object key or
//! an array index. Paths have one canonical text form, dot-joined
//! (`items.0.name`), and numeric-looking keys are always stored as indices so
//! that `items.0`, `items[0]` and `items["0"]` all name the same path.

use crate::error::{PathError, PathResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Keys that are never written into a tree.
pub const UNSAFE_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// A single segment in a field path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Seg {
    /// Object key access.
    Key(String),
    /// Array index access.
    Index(usize),
}

impl Seg {
    /// Create a segment from a key. Canonical decimal keys become indices.
    #[inline]
    pub fn key(k: impl Into<String>) -> Self {
        let k = k.into();
        match canonical_index(&k) {
            Some(i) => Seg::Index(i),
            None => Seg::Key(k),
        }
    }

    /// Create an index segment.
    #[inline]
    pub fn index(i: usize) -> Self {
        Seg::Index(i)
    }

    /// Returns true if this is a key segment.
    #[inline]
    pub fn is_key(&self) -> bool {
        matches!(self, Seg::Key(_))
    }

    /// Returns true if this is an index segment.
    #[inline]
    pub fn is_index(&self) -> bool {
        matches!(self, Seg::Index(_))
    }

    /// Get the key if this is a key segment.
    #[inline]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Seg::Key(k) => Some(k),
            Seg::Index(_) => None,
        }
    }

    /// Get the index if this is an index segment.
    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Key(_) => None,
            Seg::Index(i) => Some(*i),
        }
    }

    /// True for keys that could reach an object's prototype machinery.
    #[inline]
    pub fn is_unsafe(&self) -> bool {
        match self {
            Seg::Key(k) => UNSAFE_KEYS.contains(&k.as_str()),
            Seg::Index(_) => false,
        }
    }

    /// The object key this segment addresses when applied to an object.
    pub fn to_key_string(&self) -> String {
        match self {
            Seg::Key(k) => k.clone(),
            Seg::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => f.write_str(k),
            Seg::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::key(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::key(s)
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

fn canonical_index(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    s.parse().ok()
}

/// A complete path into a form value tree.
///
/// Serializes as its canonical dot-joined string.
///
/// # Examples
///
/// ```
/// use formstate_tree::{Path, Seg};
///
/// let a = Path::from("users[0].name");
/// let b = Path::root().key("users").index(0).key("name");
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "users.0.name");
/// assert_eq!(a[1], Seg::Index(0));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Path(Vec<Seg>);

impl Path {
    /// Create an empty path (root).
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create an empty path (alias for `new`).
    #[inline]
    pub fn root() -> Self {
        Self::new()
    }

    /// Create a path from a vector of segments.
    #[inline]
    pub fn from_segments(segments: Vec<Seg>) -> Self {
        Self(segments)
    }

    /// Parse a path, accepting dotted keys, bracketed indices and quoted
    /// bracketed keys. Malformed brackets are absorbed as plain keys.
    pub fn parse(input: &str) -> Self {
        match tokenize(input, false) {
            Ok(segs) => Self(segs),
            Err(_) => Self(vec![Seg::key(input)]),
        }
    }

    /// Append a key segment and return self (builder pattern).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::key(k));
        self
    }

    /// Append an index segment and return self (builder pattern).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment onto the path (mutating).
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// Pop the last segment from the path.
    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    /// Get the segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Check if this path is empty (root).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of segments in this path.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the last segment.
    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }

    /// Join this path with another path.
    #[inline]
    pub fn join(&self, other: &Path) -> Path {
        let mut result = self.clone();
        result.0.extend(other.0.iter().cloned());
        result
    }

    /// Append a segment and return a new path (non-mutating builder).
    #[inline]
    pub fn with_segment(&self, seg: impl Into<Seg>) -> Path {
        let mut result = self.clone();
        result.0.push(seg.into());
        result
    }

    /// Get the parent path (path without the last segment).
    #[inline]
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// True if `self` equals `prefix` or lies strictly beneath it.
    ///
    /// Matching is segment-wise, so `ab` is not under `a`. The root path is
    /// a prefix of everything.
    ///
    /// ```
    /// use formstate_tree::Path;
    ///
    /// assert!(Path::from("a.b").is_under(&Path::from("a")));
    /// assert!(Path::from("a").is_under(&Path::from("a")));
    /// assert!(!Path::from("ab").is_under(&Path::from("a")));
    /// ```
    #[inline]
    pub fn is_under(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// True if one path is an ancestor of (or equal to) the other.
    #[inline]
    pub fn overlaps(&self, other: &Path) -> bool {
        self.is_under(other) || other.is_under(self)
    }

    /// Iterate over the segments.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Seg> {
        self.0.iter()
    }

    /// True if any segment is one of [`UNSAFE_KEYS`].
    pub fn has_unsafe_segment(&self) -> bool {
        self.0.iter().any(Seg::is_unsafe)
    }
}

fn tokenize(input: &str, strict: bool) -> PathResult<Vec<Seg>> {
    let mut segs = Vec::new();
    let mut current = String::new();
    let mut chars = input.char_indices().peekable();

    fn flush(current: &mut String, segs: &mut Vec<Seg>) {
        if !current.is_empty() {
            segs.push(Seg::key(std::mem::take(current)));
        }
    }

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '.' | ']' => flush(&mut current, &mut segs),
            '[' => {
                flush(&mut current, &mut segs);
                match chars.peek().copied() {
                    Some((quote_at, quote @ ('"' | '\''))) => {
                        chars.next();
                        let mut key = String::new();
                        let mut closed = false;
                        for (_, c) in chars.by_ref() {
                            if c == quote {
                                closed = true;
                                break;
                            }
                            key.push(c);
                        }
                        if !closed && strict {
                            return Err(PathError::UnterminatedQuote {
                                input: input.to_owned(),
                                offset: quote_at,
                            });
                        }
                        if closed {
                            match chars.peek().copied() {
                                Some((_, ']')) => {
                                    chars.next();
                                }
                                other if strict => {
                                    return Err(PathError::ExpectedCloseBracket {
                                        input: input.to_owned(),
                                        offset: other.map_or(input.len(), |(o, _)| o),
                                    });
                                }
                                _ => {}
                            }
                        }
                        segs.push(Seg::key(key));
                    }
                    _ => {
                        let mut inner = String::new();
                        let mut closed = false;
                        for (_, c) in chars.by_ref() {
                            if c == ']' {
                                closed = true;
                                break;
                            }
                            inner.push(c);
                        }
                        if !closed && strict {
                            return Err(PathError::UnterminatedBracket {
                                input: input.to_owned(),
                                offset,
                            });
                        }
                        let inner = inner.trim();
                        if !inner.is_empty() {
                            segs.push(Seg::key(inner));
                        }
                    }
                }
            }
            c => current.push(c),
        }
    }
    flush(&mut current, &mut segs);
    Ok(segs)
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> PathResult<Self> {
        tokenize(s, true).map(Path)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::parse(&s)
    }
}

impl From<&String> for Path {
    fn from(s: &String) -> Self {
        Path::parse(s)
    }
}

impl From<&Path> for Path {
    fn from(p: &Path) -> Self {
        p.clone()
    }
}

impl From<Seg> for Path {
    fn from(seg: Seg) -> Self {
        Path(vec![seg])
    }
}

impl From<Vec<Seg>> for Path {
    fn from(segs: Vec<Seg>) -> Self {
        Path(segs)
    }
}

impl From<Path> for String {
    fn from(p: Path) -> Self {
        p.to_string()
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl IntoIterator for Path {
    type Item = Seg;
    type IntoIter = std::vec::IntoIter<Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Construct a `Path` from a sequence of segments.
///
/// ```
/// use formstate_tree::path;
///
/// let p = path!("items", 0, "name");
/// assert_eq!(p.to_string(), "items.0.name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}

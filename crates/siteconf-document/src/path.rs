//! Document paths for addressing within JSON trees
//!
//! Provides [`DocPath`], an ordered list of object keys and array indices.
//! Paths render as RFC 6901 JSON Pointers (`/theme/colors/0`).

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One step of a [`DocPath`]
///
/// Segments parsed from a pointer string become [`Segment::Index`] whenever
/// they look like a canonical array index. Resolution against a document is
/// driven by the container actually found there, so an object key `"0"`
/// still resolves through an `Index(0)` segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Object member name
    Key(String),
    /// Array position
    Index(usize),
}

impl Segment {
    /// Segment viewed as an object key
    #[inline]
    #[must_use]
    pub fn key(&self) -> Cow<'_, str> {
        match self {
            Self::Key(key) => Cow::Borrowed(key),
            Self::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Segment viewed as an array index
    ///
    /// Keys only qualify when they are canonical decimal numbers
    /// (`"0"`, `"17"`, never `"01"` or `"-1"`).
    #[inline]
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Key(key) => parse_index(key),
        }
    }

    fn from_token(token: String) -> Self {
        match parse_index(&token) {
            Some(index) => Self::Index(index),
            None => Self::Key(token),
        }
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(&key.replace('~', "~0").replace('/', "~1")),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

fn parse_index(token: &str) -> Option<usize> {
    let canonical = token == "0"
        || (!token.is_empty()
            && !token.starts_with('0')
            && token.bytes().all(|b| b.is_ascii_digit()));
    if canonical {
        token.parse().ok()
    } else {
        None
    }
}

/// Location within a document tree
///
/// The empty path addresses the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath(Vec<Segment>);

impl DocPath {
    /// Create path from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// Empty path (root)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path segments, root first
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parent path and terminal segment, `None` at the root
    #[inline]
    #[must_use]
    pub fn split_last(&self) -> Option<(&[Segment], &Segment)> {
        self.0.split_last().map(|(last, parent)| (parent, last))
    }

    /// Terminal segment
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Append a segment, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Whether `self` is `other` or one of its ancestors
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.0.len() <= other.0.len() && self.0 == other.0[..self.0.len()]
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for DocPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }

        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| PathError::MissingLeadingSlash(s.to_string()))?;

        rest.split('/')
            .map(|token| unescape(token).map(Segment::from_token))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

fn unescape(token: &str) -> Result<String, PathError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return Err(PathError::InvalidEscape(token.to_string())),
        }
    }
    Ok(out)
}

impl From<Vec<Segment>> for DocPath {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl serde::Serialize for DocPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for DocPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let pointer = <Cow<'de, str>>::deserialize(deserializer)?;
        pointer.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors related to document paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Non-empty pointer without leading `/`
    #[error("pointer must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    /// `~` not followed by `0` or `1`
    #[error("invalid escape sequence in segment {0:?}")]
    InvalidEscape(String),
}

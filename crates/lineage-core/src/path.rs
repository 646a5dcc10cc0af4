//! Derivation paths addressing sub-parts of a document.
//!
//! Human transforms record which part of their source document they edited as a
//! small path string: `"$"` for the whole document, `"[0]"` for the first item
//! of a collection, `"[0].title"` for a field within it. Paths are parsed once
//! into a [`DerivationPath`] and compared structurally from then on.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// One step of a derivation path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    /// Array position, written `[n]`.
    Index(usize),
    /// Object key, written `.name`.
    Field(String),
}

/// Parsed derivation path. The empty path is the document root (`"$"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DerivationPath(Vec<PathSegment>);

/// Failure to parse a derivation path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} at position {position} in path '{input}'")]
pub struct PathParseError {
    input: String,
    position: usize,
    reason: &'static str,
}

impl PathParseError {
    fn new(input: &str, position: usize, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            position,
            reason,
        }
    }

    /// The string that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl DerivationPath {
    /// The whole-document path.
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Create a path from segments.
    #[must_use]
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Path addressing a single collection item.
    #[must_use]
    pub fn index(index: usize) -> Self {
        Self(vec![PathSegment::Index(index)])
    }

    /// Parse a path string.
    pub fn parse(input: &str) -> Result<Self, PathParseError> {
        input.parse()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this path addresses the whole document.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The index of the first segment, when the path starts inside an array.
    pub fn leading_index(&self) -> Option<usize> {
        match self.0.first() {
            Some(PathSegment::Index(i)) => Some(*i),
            _ => None,
        }
    }

    /// Whether `self` addresses `other` or an ancestor of it.
    ///
    /// The root is a prefix of every path, and every path is a prefix of itself.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// The remainder of `self` below `prefix`, relative to the sub-value `prefix`
    /// addresses.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Self) -> Option<Self> {
        if prefix.is_prefix_of(self) {
            Some(Self(self.0[prefix.0.len()..].to_vec()))
        } else {
            None
        }
    }

    /// Append `other` to this path.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// Parent path (if not root).
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Extract the sub-value this path addresses.
    pub fn select<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(value, |current, segment| match segment {
            PathSegment::Index(i) => current.as_array()?.get(*i),
            PathSegment::Field(name) => current.as_object()?.get(name),
        })
    }
}

impl FromStr for DerivationPath {
    type Err = PathParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let bytes = trimmed.as_bytes();
        let mut segments = Vec::new();
        let mut pos = 0;

        if bytes.first() == Some(&b'$') {
            pos = 1;
        }

        while pos < bytes.len() {
            match bytes[pos] {
                b'[' => {
                    let start = pos + 1;
                    let end = trimmed[start..]
                        .find(']')
                        .map(|offset| start + offset)
                        .ok_or_else(|| PathParseError::new(input, pos, "unclosed '['"))?;
                    let digits = &trimmed[start..end];
                    if digits.is_empty() {
                        return Err(PathParseError::new(input, start, "empty index"));
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| PathParseError::new(input, start, "index is not a number"))?;
                    segments.push(PathSegment::Index(index));
                    pos = end + 1;
                }
                b'.' => {
                    let (name, next) = read_field(trimmed, pos + 1);
                    if name.is_empty() {
                        return Err(PathParseError::new(input, pos + 1, "empty field name"));
                    }
                    segments.push(PathSegment::Field(name.to_string()));
                    pos = next;
                }
                b']' => return Err(PathParseError::new(input, pos, "unexpected ']'")),
                _ if pos == 0 => {
                    // Bare leading key, e.g. "title".
                    let (name, next) = read_field(trimmed, pos);
                    segments.push(PathSegment::Field(name.to_string()));
                    pos = next;
                }
                _ => return Err(PathParseError::new(input, pos, "expected '.' or '['")),
            }
        }

        Ok(Self(segments))
    }
}

fn read_field(s: &str, start: usize) -> (&str, usize) {
    let end = s[start..]
        .find(['.', '[', ']'])
        .map(|offset| start + offset)
        .unwrap_or(s.len());
    (&s[start..end], end)
}

impl Display for DerivationPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("$");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
                PathSegment::Field(name) if i == 0 => write!(f, "$.{}", name)?,
                PathSegment::Field(name) => write!(f, ".{}", name)?,
            }
        }
        Ok(())
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

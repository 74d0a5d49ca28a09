// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Field paths
//!
//! A path like `gen.element.title` (or its canonical form `gen$element$title`)
//! is split into segments once. The literal segment `element` marks the
//! iteration point of a fan-out.

use serde_json::Value;
use std::fmt;

/// Segment marking "each item of the list before me"
pub const ELEMENT: &str = "element";

/// Canonical separator used in template placeholders and input keys
pub const SEPARATOR: char = '$';

/// Parsed field reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
    /// Index of the first `element` segment
    element: Option<usize>,
}

impl FieldPath {
    /// Parse a dotted or `$`-separated name
    pub fn parse(name: &str) -> Self {
        let segments: Vec<String> = name
            .split(|c| c == '.' || c == SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Self::from_segments(segments)
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        let element = segments.iter().position(|s| s == ELEMENT);
        Self { segments, element }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First segment, if any
    pub fn head(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Segments after the first
    pub fn tail(&self) -> &[String] {
        self.segments.get(1..).unwrap_or(&[])
    }

    /// Whether the path is a single plain key
    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }

    /// Whether the path contains an iteration point
    pub fn is_element(&self) -> bool {
        self.element.is_some()
    }

    /// Segments before the iteration point (the iterable field)
    pub fn iterable(&self) -> &[String] {
        match self.element {
            Some(i) => &self.segments[..i],
            None => &self.segments,
        }
    }

    /// Segments after the iteration point (the sub-path into each element)
    pub fn within_element(&self) -> &[String] {
        match self.element {
            Some(i) => &self.segments[i + 1..],
            None => &[],
        }
    }

    /// Whether the path starts with `name`
    pub fn starts_with(&self, name: &str) -> bool {
        self.head() == Some(name)
    }

    /// New path with `prefix` segments in front
    pub fn prefixed(&self, prefix: &[&str]) -> Self {
        let mut segments: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        segments.extend(self.segments.iter().cloned());
        Self::from_segments(segments)
    }

    /// Path relative to one element of `list_owner`'s output: leading
    /// `list_owner` and `element` segments are dropped
    pub fn relative_to_element(&self, list_owner: &str) -> &[String] {
        let mut rest = self.segments.as_slice();
        if rest.first().map(String::as_str) == Some(list_owner) {
            rest = &rest[1..];
        }
        if rest.first().map(String::as_str) == Some(ELEMENT) {
            rest = &rest[1..];
        }
        rest
    }

    /// Canonical `$`-joined form
    pub fn canonical(&self) -> String {
        self.segments.join("$")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Walk `segments` into `value`; numeric segments index arrays
///
/// Returns `None` as soon as a segment is absent.
pub fn traverse<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

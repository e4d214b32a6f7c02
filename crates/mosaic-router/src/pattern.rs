//! Route pattern compilation and matching.

use std::collections::BTreeMap;

use crate::error::RouterError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    /// `*`: every path.
    CatchAll,
    /// Path must have exactly these segments.
    Exact,
    /// `/prefix/*`: the prefix itself or anything below it.
    Prefix,
}

/// Result of matching a path against a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternMatch {
    /// Part of the path matched by the non-wildcard segments.
    pub base_path: String,
    /// Values of `:name` segments.
    pub params: BTreeMap<String, String>,
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    shape: Shape,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compile a pattern.
    pub fn parse(pattern: &str) -> Result<Self, RouterError> {
        let invalid = |reason: &str| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern == "*" {
            return Ok(Self {
                source: pattern.to_string(),
                shape: Shape::CatchAll,
                segments: Vec::new(),
            });
        }

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/' or be '*'"));
        }

        let (body, shape) = match pattern.strip_suffix("/*") {
            Some(prefix) => (prefix, Shape::Prefix),
            None => (pattern, Shape::Exact),
        };

        let mut segments = Vec::new();
        for raw in body.split('/').filter(|s| !s.is_empty()) {
            if raw.contains('*') {
                return Err(invalid("'*' is only allowed as the last segment"));
            }
            match raw.strip_prefix(':') {
                Some("") => return Err(invalid("empty parameter name")),
                Some(name) => segments.push(Segment::Param(name.to_string())),
                None => segments.push(Segment::Static(raw.to_string())),
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            shape,
            segments,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a normalized path.
    pub fn matches(&self, path: &str) -> Option<PatternMatch> {
        if self.shape == Shape::CatchAll {
            return Some(PatternMatch {
                base_path: "/".to_string(),
                params: BTreeMap::new(),
            });
        }

        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let enough = match self.shape {
            Shape::Exact => parts.len() == self.segments.len(),
            _ => parts.len() >= self.segments.len(),
        };
        if !enough {
            return None;
        }

        let mut params = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts.iter()) {
            match segment {
                Segment::Static(expected) if expected == part => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }

        let base_path = format!("/{}", parts[..self.segments.len()].join("/"));
        Some(PatternMatch { base_path, params })
    }
}

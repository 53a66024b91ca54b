//! Route matching logic.
//!
//! # Responsibilities
//! - Match the request method (HEAD is served by GET routes)
//! - Match the full request path against a compiled regex
//! - Extract positional capture groups
//!
//! # Design Decisions
//! - Patterns are anchored at both ends when compiled
//! - The matched span is re-checked against the path length; a prefix
//!   match never counts
//! - Optional groups that did not participate capture as empty strings

use std::fmt;

use axum::http::Method;
use regex::Regex;

/// Methods a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    /// Map a wire method. Anything outside the supported set is `None`.
    pub fn from_http(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Self::Get),
            Method::POST => Some(Self::Post),
            Method::PUT => Some(Self::Put),
            Method::DELETE => Some(Self::Delete),
            Method::HEAD => Some(Self::Head),
            _ => None,
        }
    }

    /// Returns true if a route registered for `self` serves `request`.
    pub fn accepts(self, request: HttpMethod) -> bool {
        self == request || (request == HttpMethod::Head && self == HttpMethod::Get)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled, fully anchored route pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    regex: Regex,
}

impl RoutePattern {
    /// Compile `pattern` so that it can only match a whole path.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of capture groups, excluding the implicit whole-match group.
    pub fn capture_count(&self) -> usize {
        self.regex.captures_len() - 1
    }

    /// Match the whole of `path`, returning the captured groups in order.
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(path)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != path.len() {
            return None;
        }
        Some(
            caps.iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}

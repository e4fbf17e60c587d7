//! Request matching logic.
//!
//! Matches incoming requests against the rules registered for their path.
//! Each predicate is pure; a rule is a candidate only when all of them hold.

use crate::config::{RequestMatcher, RuleDefinition};
use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use std::collections::HashMap;

/// Method assumed when a rule does not name one.
pub const DEFAULT_METHOD: &str = "GET";

/// A request as seen by the matcher, with its body already buffered.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Case-insensitive method comparison; an empty expectation means GET.
pub fn method_matches(expected: &str, actual: &str) -> bool {
    let expected = if expected.is_empty() {
        DEFAULT_METHOD
    } else {
        expected
    };
    expected.eq_ignore_ascii_case(actual)
}

/// Every declared header must be present with exactly the declared value.
///
/// Names are looked up case-insensitively; only the first value of a
/// repeated header is considered.
pub fn headers_match(expected: &HashMap<String, String>, actual: &HeaderMap) -> bool {
    expected.iter().all(|(name, value)| {
        actual
            .get(name.as_str())
            .is_some_and(|v| v.as_bytes() == value.as_bytes())
    })
}

/// An empty expectation matches any body; otherwise bytes must be identical.
pub fn body_matches(expected: &str, actual: &[u8]) -> bool {
    expected.is_empty() || expected.as_bytes() == actual
}

impl RequestMatcher {
    /// Whether `request` satisfies the method, header and body predicates.
    ///
    /// The path is not compared here; rules are only ever evaluated against
    /// requests routed to the path they were registered under.
    pub fn matches(&self, request: &InboundRequest) -> bool {
        method_matches(&self.method, request.method.as_str())
            && headers_match(&self.headers, &request.headers)
            && body_matches(&self.body, &request.body)
    }
}

/// Pick the rule to apply: the last candidate in configuration order.
///
/// Later rules override earlier ones, so a general rule can be listed first
/// and more specific ones after it.
pub fn select<'a>(
    rules: &'a [RuleDefinition],
    request: &InboundRequest,
) -> Option<&'a RuleDefinition> {
    rules.iter().fold(None, |selected, rule| {
        if rule.request.matches(request) {
            Some(rule)
        } else {
            selected
        }
    })
}

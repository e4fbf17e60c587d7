//! Configuration for the mock server.
//!
//! Defines the listener settings, request matchers, canned responses and
//! latency simulation. Everything here is decoded and validated once at
//! startup; a configuration that fails to load never reaches the server.

use axum::http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("matcher {index}: {reason}")]
    Invalid { index: usize, reason: String },
}

impl ConfigError {
    fn invalid(index: usize, reason: impl Into<String>) -> Self {
        Self::Invalid {
            index,
            reason: reason.into(),
        }
    }
}

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging switches
    #[serde(default)]
    pub settings: LogSettings,

    /// Rule definitions, in the order they were written
    #[serde(default)]
    pub matchers: Vec<RuleDefinition>,
}

impl MockConfig {
    /// Decode and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // distinct paths seen so far
        let mut routes: Vec<(&str, Vec<Segment<'_>>)> = Vec::new();

        for (index, rule) in self.matchers.iter().enumerate() {
            rule.validate()
                .map_err(|reason| ConfigError::invalid(index, reason))?;
            self.validate_latency(&rule.response)
                .map_err(|reason| ConfigError::invalid(index, reason))?;

            let path = rule.request.path.as_str();
            if routes.iter().any(|(existing, _)| *existing == path) {
                continue;
            }

            let segments =
                parse_route(path).map_err(|reason| ConfigError::invalid(index, reason))?;
            let conflict = routes.iter().find(|(_, other)| routes_conflict(&segments, other));
            if let Some((existing, _)) = conflict {
                return Err(ConfigError::invalid(
                    index,
                    format!("path {path} conflicts with {existing}"),
                ));
            }
            routes.push((path, segments));
        }
        Ok(())
    }

    /// A delay the request timeout always cuts short would never be answered.
    fn validate_latency(&self, response: &ResponseDefinition) -> Result<(), String> {
        let Some(latency) = &response.latency else {
            return Ok(());
        };
        let timeout = self.server.request_timeout;
        if latency.kind != LatencyKind::None && latency.delay >= timeout {
            return Err(format!(
                "latency delay {} must be shorter than the request timeout {}",
                humantime::format_duration(latency.delay),
                humantime::format_duration(timeout),
            ));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on handling a single request, latency included
    #[serde(default = "default_request_timeout", with = "duration_str")]
    pub request_timeout: Duration,

    /// Largest request body that will be buffered for matching
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

/// Logging switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    /// Log every request that selected a rule
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests that fell through to the not-found response
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A single rule: what to match and what to answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    /// Request matcher
    pub request: RequestMatcher,

    /// Response to return
    pub response: ResponseDefinition,
}

impl RuleDefinition {
    fn validate(&self) -> Result<(), String> {
        self.request.validate()?;
        self.response.validate()
    }
}

/// Request matching configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestMatcher {
    /// Route the rule is registered under
    pub path: String,

    /// HTTP method (empty = GET)
    #[serde(default)]
    pub method: String,

    /// Headers that must all be present with exactly these values
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Exact request body (empty = any)
    #[serde(default)]
    pub body: String,
}

impl RequestMatcher {
    fn validate(&self) -> Result<(), String> {
        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid request header name: {name:?}"))?;
            HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for request header {name}"))?;
        }
        Ok(())
    }
}

/// Response definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status_code: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: String,

    /// Latency simulation
    #[serde(default)]
    pub latency: Option<LatencyConfig>,
}

fn default_status() -> u16 {
    200
}

impl ResponseDefinition {
    fn validate(&self) -> Result<(), String> {
        if !(100..=599).contains(&self.status_code) {
            return Err(format!("invalid status code: {}", self.status_code));
        }
        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid response header name: {name:?}"))?;
            HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for response header {name}"))?;
        }
        if let Some(latency) = &self.latency {
            latency.validate()?;
        }
        Ok(())
    }
}

/// Kind of artificial delay applied before responding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyKind {
    /// No delay
    #[default]
    None,
    /// Sleep for exactly `delay`
    Simple,
    /// Sleep for a uniform draw from `[0, delay)`
    Random,
}

/// Latency simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LatencyConfig {
    #[serde(rename = "type", default)]
    pub kind: LatencyKind,

    #[serde(default, with = "duration_str")]
    pub delay: Duration,
}

impl LatencyConfig {
    fn validate(&self) -> Result<(), String> {
        if self.kind == LatencyKind::Random && self.delay.is_zero() {
            return Err("random latency requires a positive delay".to_string());
        }
        Ok(())
    }
}

/// One segment of a route as the router sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    CatchAll(&'a str),
}

/// Split a route into segments, rejecting syntax the router would refuse
/// to register.
fn parse_route(path: &str) -> Result<Vec<Segment<'_>>, String> {
    if !path.starts_with('/') {
        return Err(format!("path must start with '/': {path:?}"));
    }

    let raw: Vec<&str> = path.split('/').skip(1).collect();
    let mut segments = Vec::with_capacity(raw.len());

    for (i, segment) in raw.iter().enumerate() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err(format!(
                "unsupported segment {segment:?} in {path}, use {{name}} or {{*name}}"
            ));
        }
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(param) => {
                let name = param.strip_prefix('*').unwrap_or(param);
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(format!("invalid parameter segment {segment:?} in {path}"));
                }
                if param.starts_with('*') {
                    if i + 1 != raw.len() {
                        return Err(format!("catch-all must be the last segment in {path}"));
                    }
                    segments.push(Segment::CatchAll(name));
                } else {
                    segments.push(Segment::Param(name));
                }
            }
            None if segment.contains(['{', '}']) => {
                return Err(format!("invalid parameter segment {segment:?} in {path}"));
            }
            None => segments.push(Segment::Static(segment)),
        }
    }
    Ok(segments)
}

/// Whether the router would refuse to hold both routes.
///
/// Static segments may sit next to parameters, but along a shared prefix
/// two parameters at the same position must agree in kind and name.
fn routes_conflict(a: &[Segment<'_>], b: &[Segment<'_>]) -> bool {
    for (x, y) in a.iter().zip(b) {
        match (x, y) {
            (Segment::Static(x), Segment::Static(y)) if x != y => return false,
            (Segment::Static(_), Segment::Static(_)) => {}
            (Segment::Static(_), _) | (_, Segment::Static(_)) => return false,
            (x, y) if x != y => return true,
            _ => {}
        }
    }
    false
}

/// Human-readable durations such as `1s` or `250ms`.
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

//! Resolved node configuration.
//!
//! Parsing of the process environment happens in the binary (clap);
//! the values here are what the core consumes once resolved.

use std::{fmt, str::FromStr, sync::Arc};

use rama::http::Uri;

/// Simulated load intensity, resolved once at startup
/// and shared read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadParameters {
    /// Base delay per request in milliseconds.
    pub delay_time_ms: u64,
    /// Maximum deviation (both directions) applied to `delay_time_ms`.
    pub delay_jitter_ms: u64,
    /// CPU stress units, see [`crate::stress::CPU_OPS_BASE`].
    pub cpu_units: u64,
    /// I/O stress units, see [`crate::stress::IO_OPS_BASE`].
    pub io_units: u64,
    /// Network units. Accepted and reported, no stress phase uses them.
    pub net_units: u64,
    /// Memory units (≈ MiB), consumed once at startup.
    pub memory_units: u64,
}

impl LoadParameters {
    /// Jitter used when none is configured: a tenth of the delay.
    pub fn default_delay_jitter_ms(delay_time_ms: u64) -> u64 {
        delay_time_ms / 10
    }
}

/// Name and subsystem of this node, used as metric and response labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub name: Arc<str>,
    pub subsystem: Arc<str>,
}

impl NodeIdentity {
    pub fn new(name: impl Into<Arc<str>>, subsystem: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            subsystem: subsystem.into(),
        }
    }
}

/// What to do when the I/O stress phase fails half-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoFailurePolicy {
    /// Log and abort the process: a partial stress run breaks the load contract.
    #[default]
    Abort,
    /// Fail only the request that ran into the I/O failure.
    FailRequest,
}

impl fmt::Display for IoFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoFailurePolicy::Abort => f.write_str("abort"),
            IoFailurePolicy::FailRequest => f.write_str("fail-request"),
        }
    }
}

impl FromStr for IoFailurePolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("abort") {
            Ok(IoFailurePolicy::Abort)
        } else if s.eq_ignore_ascii_case("fail-request") {
            Ok(IoFailurePolicy::FailRequest)
        } else {
            Err(ConfigurationError::UnknownIoFailurePolicy(s.to_owned()))
        }
    }
}

/// A resolved downstream endpoint: an absolute http(s) URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget(Uri);

impl CallTarget {
    pub fn uri(&self) -> &Uri {
        &self.0
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CallTarget {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigurationError::InvalidCallTarget {
            value: s.to_owned(),
            reason: reason.to_owned(),
        };

        let uri = s
            .parse::<Uri>()
            .map_err(|err| invalid(&err.to_string()))?;

        match uri.scheme_str() {
            Some(scheme)
                if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") => {}
            Some(_) => return Err(invalid("scheme must be http or https")),
            None => return Err(invalid("missing scheme")),
        }
        if uri.authority().is_none() {
            return Err(invalid("missing host"));
        }

        Ok(Self(uri))
    }
}

/// Ordered downstream targets, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallList(Arc<[CallTarget]>);

impl CallList {
    pub fn new(targets: impl IntoIterator<Item = CallTarget>) -> Self {
        Self(targets.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallTarget> {
        self.0.iter()
    }
}

impl fmt::Display for CallList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("[empty call list]");
        }
        for (idx, target) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            target.fmt(f)?;
        }
        Ok(())
    }
}

/// Parses a whitespace-separated list of targets.
/// An empty or blank string yields an empty list.
impl FromStr for CallList {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_whitespace()
            .map(CallTarget::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    InvalidCallTarget { value: String, reason: String },
    UnknownIoFailurePolicy(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::InvalidCallTarget { value, reason } => {
                write!(f, "invalid call target '{value}': {reason}")
            }
            ConfigurationError::UnknownIoFailurePolicy(value) => write!(
                f,
                "unknown io failure policy '{value}' (expected 'abort' or 'fail-request')"
            ),
        }
    }
}

impl std::error::Error for ConfigurationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delay_jitter_is_a_tenth() {
        assert_eq!(LoadParameters::default_delay_jitter_ms(0), 0);
        assert_eq!(LoadParameters::default_delay_jitter_ms(9), 0);
        assert_eq!(LoadParameters::default_delay_jitter_ms(100), 10);
        assert_eq!(LoadParameters::default_delay_jitter_ms(1234), 123);
    }

    #[test]
    fn test_call_list_empty() {
        for input in ["", "   ", "\n\t "] {
            let list: CallList = input.parse().unwrap();
            assert!(list.is_empty(), "input = {input:?}");
            assert_eq!(list.to_string(), "[empty call list]");
        }
    }

    #[test]
    fn test_call_list_keeps_order() {
        let list: CallList = "http://a.internal:8080/  http://b.internal/x\nhttps://c.internal"
            .parse()
            .unwrap();
        let hosts: Vec<_> = list
            .iter()
            .map(|target| target.uri().host().unwrap().to_owned())
            .collect();
        assert_eq!(hosts, ["a.internal", "b.internal", "c.internal"]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_call_target_rejects_relative_and_foreign_schemes() {
        for input in ["/just/a/path", "ftp://files.internal/", "a.internal:8080"] {
            let err = input.parse::<CallTarget>().unwrap_err();
            assert!(
                matches!(&err, ConfigurationError::InvalidCallTarget { value, .. } if value == input),
                "input = {input:?}; err = {err}"
            );
        }
    }

    #[test]
    fn test_call_list_names_offending_target() {
        let err = "http://ok.internal/ not a url"
            .parse::<CallList>()
            .unwrap_err();
        assert!(err.to_string().contains("'not'"), "err = {err}");
    }

    #[test]
    fn test_io_failure_policy_parse() {
        assert_eq!(
            "abort".parse::<IoFailurePolicy>().unwrap(),
            IoFailurePolicy::Abort
        );
        assert_eq!(
            " Fail-Request ".parse::<IoFailurePolicy>().unwrap(),
            IoFailurePolicy::FailRequest
        );
        assert!("panic".parse::<IoFailurePolicy>().is_err());
        assert_eq!(IoFailurePolicy::FailRequest.to_string(), "fail-request");
    }
}

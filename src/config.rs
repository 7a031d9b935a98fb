//! Connection configuration.
//!
//! A [`ConnectionConfig`] fully describes one endpoint: scheme, host, port,
//! timeout, blocking flag and TLS flag. It is validated once, when built, and
//! is immutable afterwards.
//!
//! # Example
//!
//! ```
//! use serverquery_client::config::ConnectionConfig;
//!
//! let config = ConnectionConfig::builder()
//!     .host("127.0.0.1")
//!     .port(10011)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.endpoint(), "127.0.0.1:10011");
//! assert!(config.blocking());
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{QueryError, Result};

/// Default I/O timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest line accepted before the terminator arrives.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Banner prefix a ServerQuery server sends right after accepting a connection.
pub const DEFAULT_GREETING: &str = "TS3";

/// Protocol family of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Stream socket, `\n`-terminated lines.
    #[default]
    Tcp,
    /// Datagram socket, one payload per datagram.
    Udp,
}

impl Scheme {
    /// Whether this scheme is stream-oriented.
    #[inline]
    pub fn is_stream(self) -> bool {
        matches!(self, Scheme::Tcp)
    }
}

/// Validated, immutable connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    timeout: Duration,
    blocking: bool,
    tls: bool,
    scheme: Scheme,
    wait_limit: Option<Duration>,
    greeting: Option<String>,
    max_line_length: usize,
}

impl ConnectionConfig {
    /// Create a new config builder.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// Parse and validate a config from JSON.
    ///
    /// Durations are given in (fractional) seconds:
    ///
    /// ```json
    /// { "host": "127.0.0.1", "port": 10011, "timeout": 5, "blocking": false }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| QueryError::Config(format!("invalid config document: {}", e)))?;

        let mut builder = ConnectionConfigBuilder::new()
            .timeout(secs(raw.timeout)?)
            .blocking(raw.blocking)
            .tls(raw.tls)
            .scheme(raw.scheme)
            .greeting(raw.greeting)
            .max_line_length(raw.max_line_length);

        if let Some(host) = raw.host {
            builder = builder.host(host);
        }
        if let Some(port) = raw.port {
            builder = builder.port(port);
        }
        if let Some(limit) = raw.wait_limit {
            builder = builder.wait_limit(secs(limit)?);
        }

        builder.build()
    }

    /// Host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connect and I/O timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether reads block (under `timeout`) instead of polling for readiness.
    pub fn blocking(&self) -> bool {
        self.blocking
    }

    /// Whether the stream is wrapped in TLS.
    pub fn tls(&self) -> bool {
        self.tls
    }

    /// Socket family.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Upper bound on a single non-blocking readiness wait (`None` = unbounded).
    pub fn wait_limit(&self) -> Option<Duration> {
        self.wait_limit
    }

    /// Expected banner prefix, if the server sends one.
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    /// Longest line a read accepts before failing with a protocol error.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// `host:port`, with IPv6 literals wrapped in brackets.
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Host name suitable for TLS server-name indication (no brackets).
    pub(crate) fn server_name(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

/// Fluent builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    timeout: Duration,
    blocking: bool,
    tls: bool,
    scheme: Scheme,
    wait_limit: Option<Duration>,
    greeting: Option<String>,
    max_line_length: usize,
}

impl ConnectionConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            host: None,
            port: None,
            timeout: DEFAULT_TIMEOUT,
            blocking: true,
            tls: false,
            scheme: Scheme::Tcp,
            wait_limit: None,
            greeting: Some(DEFAULT_GREETING.to_string()),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Set the host (required).
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port (required).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the connect and I/O timeout.
    ///
    /// Default: 10 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Choose blocking reads or readiness polling.
    ///
    /// Default: true
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Wrap the stream in TLS.
    ///
    /// Default: false
    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Set the socket family.
    ///
    /// Default: [`Scheme::Tcp`]
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Bound the non-blocking readiness wait.
    ///
    /// Default: unbounded
    pub fn wait_limit(mut self, limit: Duration) -> Self {
        self.wait_limit = Some(limit);
        self
    }

    /// Set the banner prefix expected on connect; `None` disables the check.
    ///
    /// Default: `Some("TS3")`
    pub fn greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = greeting;
        self
    }

    /// Cap the length of a single received line.
    ///
    /// Default: 16 MiB
    pub fn max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }

    /// Validate and build the config.
    pub fn build(self) -> Result<ConnectionConfig> {
        let host = match self.host {
            Some(host) if !host.trim().is_empty() => host.trim().to_string(),
            _ => return Err(QueryError::Config("host is required".into())),
        };

        let port = match self.port {
            Some(port) if port != 0 => port,
            _ => return Err(QueryError::Config("port is required".into())),
        };

        if self.timeout.is_zero() {
            return Err(QueryError::Config("timeout must be greater than zero".into()));
        }

        if self.max_line_length == 0 {
            return Err(QueryError::Config(
                "max line length must be greater than zero".into(),
            ));
        }

        if self.tls && !self.scheme.is_stream() {
            return Err(QueryError::Config(
                "TLS is only available on stream connections".into(),
            ));
        }

        Ok(ConnectionConfig {
            host,
            port,
            timeout: self.timeout,
            blocking: self.blocking,
            tls: self.tls,
            scheme: self.scheme,
            wait_limit: self.wait_limit,
            greeting: self.greeting,
            max_line_length: self.max_line_length,
        })
    }
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form of [`ConnectionConfig`].
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    host: Option<String>,
    port: Option<u16>,
    #[serde(default = "default_timeout_secs")]
    timeout: f64,
    #[serde(default = "default_true")]
    blocking: bool,
    #[serde(default)]
    tls: bool,
    #[serde(default)]
    scheme: Scheme,
    #[serde(default)]
    wait_limit: Option<f64>,
    #[serde(default = "default_greeting")]
    greeting: Option<String>,
    #[serde(default = "default_max_line_length")]
    max_line_length: usize,
}

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT.as_secs_f64()
}

fn default_true() -> bool {
    true
}

fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

fn default_greeting() -> Option<String> {
    Some(DEFAULT_GREETING.to_string())
}

fn secs(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| QueryError::Config(format!("invalid duration {}: {}", value, e)))
}

//! Absolute `http`/`https` URL parsing.
//!
//! [`Url`] is small: scheme, host, port and the raw remainder
//! (path, query and fragment as written). No percent-decoding, credentials or
//! IPv6 literals. Relative references are resolved with the `url` crate and
//! then parsed back through [`Url::parse`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error_handling::UrlError;
use crate::utils::compile_regex_unsafe;

const URL_PATTERN: &str = r"^(https?)://([^:/#?]+)(?::([0-9]+))?([/#?].*)?$";

static URL_RE: LazyLock<Regex> = LazyLock::new(|| compile_regex_unsafe(URL_PATTERN, "URL_RE"));

/// Supported URL schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed absolute URL. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
}

impl Url {
    /// Parses `scheme://host[:port][path]`.
    ///
    /// # Errors
    ///
    /// `UrlError::Invalid` for anything that is not an absolute http/https
    /// URL, `UrlError::InvalidPort` for a port outside `0..=65535`.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let caps = URL_RE
            .captures(input)
            .ok_or_else(|| UrlError::Invalid(input.to_string()))?;

        let scheme = match &caps[1] {
            "https" => Scheme::Https,
            _ => Scheme::Http,
        };
        let port = match caps.get(3) {
            Some(port) => port
                .as_str()
                .parse::<u16>()
                .map_err(|_| UrlError::InvalidPort(input.to_string()))?,
            None => scheme.default_port(),
        };

        Ok(Self {
            scheme,
            host: caps[2].to_string(),
            port,
            path: caps.get(4).map_or_else(String::new, |m| m.as_str().to_string()),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path, query and fragment exactly as written; may be empty.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// The request-target sent on the request line: the path without its
    /// fragment, `/` when that is empty, and a `/` prefix before a bare query.
    pub fn request_target(&self) -> String {
        let target = self.path.split('#').next().unwrap_or_default();
        if target.is_empty() {
            "/".to_string()
        } else if target.starts_with('/') {
            target.to_string()
        } else {
            format!("/{target}")
        }
    }

    /// Value for the `Host` header: the host, plus the port when it is not
    /// the scheme's default.
    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Resolves `reference` (absolute or relative) against this URL.
    ///
    /// # Errors
    ///
    /// Returns `UrlError::Invalid` if the reference cannot be resolved or the
    /// result is not an http/https URL.
    pub fn join(&self, reference: &str) -> Result<Self, UrlError> {
        let reference = reference.trim();
        if let Ok(absolute) = Self::parse(reference) {
            return Ok(absolute);
        }
        let base = ::url::Url::parse(&self.to_string())
            .map_err(|_| UrlError::Invalid(self.to_string()))?;
        let joined = base
            .join(reference)
            .map_err(|_| UrlError::Invalid(reference.to_string()))?;
        Self::parse(joined.as_str())
    }
}

impl FromStr for Url {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority(), self.path)
    }
}

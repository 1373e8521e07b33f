//! Hostname validation and subdomain extraction
//!
//! Everything in this module is pure: no I/O, no shared state.
//!
//! ## Extraction Rules
//!
//! Given a hostname and a base domain, [`extract_subdomain`] returns:
//!
//! ```text
//! foo.example.com      + example.com → Some("foo")
//! a.b.example.com      + example.com → Some("a.b")
//! example.com          + example.com → None   (zone apex, ignored)
//! myhost               + example.com → Some("myhost")  (bare-name shorthand)
//! foo.other.org        + example.com → None   (foreign zone)
//! ```
//!
//! The suffix match is always tried before the single-label fallback.

use crate::error::{Error, Result};
use std::fmt;

/// Maximum length of a full domain name, without the root dot (RFC 1035)
const MAX_DOMAIN_LEN: usize = 253;

/// Maximum length of a single label (RFC 1035)
const MAX_LABEL_LEN: usize = 63;

fn strip_root(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && !label.starts_with('-')
        && !label.ends_with('-')
}

fn labels_valid(name: &str) -> bool {
    let name = strip_root(name);
    !name.is_empty() && name.len() <= MAX_DOMAIN_LEN && name.split('.').all(is_valid_label)
}

/// Check whether a string is a syntactically valid hostname
///
/// Single-label names (`"myhost"`) are accepted. A single trailing root dot
/// is tolerated.
pub fn is_valid_hostname(name: &str) -> bool {
    labels_valid(name)
}

/// Canonical form of a configured domain: surrounding whitespace and a
/// single trailing root dot removed
///
/// Providers build URLs and record names from this form.
pub fn normalize_domain(name: &str) -> String {
    strip_root(name.trim()).to_string()
}

/// Validate a fully qualified domain name
///
/// Stricter than [`is_valid_hostname`]: at least two labels are required and
/// the top-level label cannot be all digits.
///
/// # Returns
///
/// - `Ok(name)`: The input, unchanged
/// - `Err(Error::InvalidDomain)`: If the name is malformed
pub fn validate_domain(name: &str) -> Result<&str> {
    if !labels_valid(name) {
        return Err(Error::invalid_domain(name));
    }

    let stripped = strip_root(name);
    let mut labels = stripped.rsplit('.');
    let tld = labels.next().unwrap_or_default();
    if labels.next().is_none() || tld.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_domain(name));
    }

    Ok(name)
}

/// Extract the subdomain of `full_domain` relative to `base_domain`
///
/// Invalid input on either side yields `None`: a hostname the pipeline cannot
/// route is not an error.
pub fn extract_subdomain(full_domain: &str, base_domain: &str) -> Option<String> {
    if !is_valid_hostname(full_domain) || !is_valid_hostname(base_domain) {
        return None;
    }

    let full_parts: Vec<&str> = strip_root(full_domain).split('.').collect();
    let base_parts: Vec<&str> = strip_root(base_domain).split('.').collect();

    if full_parts.len() >= base_parts.len() {
        let (prefix, suffix) = full_parts.split_at(full_parts.len() - base_parts.len());
        if suffix == base_parts.as_slice() {
            return if prefix.is_empty() {
                None
            } else {
                Some(prefix.join("."))
            };
        }
    }

    if full_parts.len() == 1 {
        return Some(strip_root(full_domain).to_string());
    }

    None
}

/// The managed zone, split into labels once at startup
///
/// Immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDomain {
    name: String,
    parts: Vec<String>,
}

impl BaseDomain {
    /// Build a base domain from a validated domain string
    ///
    /// # Returns
    ///
    /// - `Ok(BaseDomain)`: The parsed domain
    /// - `Err(Error::InvalidDomain)`: If `name` fails [`validate_domain`]
    pub fn parse(name: &str) -> Result<Self> {
        let name = strip_root(validate_domain(name)?).to_string();
        let parts = name.split('.').map(str::to_string).collect();
        Ok(Self { name, parts })
    }

    /// The domain name, without a trailing root dot
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The ordered labels of the domain
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Always false; a base domain has at least two labels
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Extract the subdomain of `full_domain` within this zone
    pub fn extract(&self, full_domain: &str) -> Option<String> {
        extract_subdomain(full_domain, &self.name)
    }

    /// Fully qualified name of a subdomain in this zone
    pub fn fqdn(&self, subdomain: &str) -> String {
        format!("{}.{}", subdomain, self.name)
    }
}

impl fmt::Display for BaseDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

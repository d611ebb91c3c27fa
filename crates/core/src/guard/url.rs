//! Pre-flight URL checks.

use std::net::IpAddr;

use url::{Host, Url};

use super::ssrf::is_private_or_reserved;

/// Longest URL accepted, in characters.
pub const MAX_URL_LEN: usize = 2048;

/// Hostnames that always point at the local machine or a cloud metadata service.
pub const BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "0.0.0.0",
    "::1",
    "metadata.google.internal",
    "169.254.169.254",
    "metadata.azure.com",
];

/// Hostname fragments treated as a sign of an internal service.
pub const SUSPICIOUS_HOST_PARTS: &[&str] = &["admin", "internal", "private"];

/// Why a URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlRejection {
    #[error("URL must be a non-empty string")]
    Empty,

    #[error("URL too long (max 2048 characters)")]
    TooLong,

    #[error("Invalid URL format")]
    Unparseable,

    #[error("Only HTTP and HTTPS URLs are allowed")]
    UnsupportedScheme,

    #[error("URL must have a valid hostname")]
    MissingHost,

    #[error("Access to this domain is not allowed")]
    BlockedHost,

    #[error("Access to private IP addresses is not allowed")]
    PrivateAddress,

    #[error("Suspicious hostname detected")]
    SuspiciousHost,
}

/// URL validator with an optional operator-supplied denylist.
#[derive(Debug, Clone, Default)]
pub struct UrlGuard {
    denylist: Vec<String>,
}

impl UrlGuard {
    pub fn new(denylist: &[String]) -> Self {
        let denylist = denylist
            .iter()
            .map(|d| d.trim().trim_end_matches('.').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { denylist }
    }

    /// Validate a URL, short-circuiting on the first failed check.
    ///
    /// Returns the parsed URL on success.
    pub fn validate(&self, input: &str) -> Result<Url, UrlRejection> {
        if input.trim().is_empty() {
            return Err(UrlRejection::Empty);
        }

        if input.chars().count() > MAX_URL_LEN {
            return Err(UrlRejection::TooLong);
        }

        let parsed = Url::parse(input.trim()).map_err(|e| match e {
            url::ParseError::RelativeUrlWithoutBase => UrlRejection::UnsupportedScheme,
            url::ParseError::EmptyHost => UrlRejection::MissingHost,
            _ => UrlRejection::Unparseable,
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UrlRejection::UnsupportedScheme);
        }

        let host = parsed.host().ok_or(UrlRejection::MissingHost)?;
        let (name, ip) = match host {
            Host::Domain(domain) => (domain.trim_end_matches('.').to_lowercase(), None),
            Host::Ipv4(v4) => (v4.to_string(), Some(IpAddr::V4(v4))),
            Host::Ipv6(v6) => (v6.to_string(), Some(IpAddr::V6(v6))),
        };

        if name.is_empty() {
            return Err(UrlRejection::MissingHost);
        }

        if BLOCKED_HOSTS.contains(&name.as_str()) || self.is_denylisted(&name) {
            tracing::warn!(host = %name, "blocked host attempted");
            return Err(UrlRejection::BlockedHost);
        }

        if let Some(ip) = ip
            && is_private_or_reserved(ip)
        {
            tracing::warn!(host = %name, "private address attempted");
            return Err(UrlRejection::PrivateAddress);
        }

        if SUSPICIOUS_HOST_PARTS.iter().any(|part| name.contains(part)) {
            tracing::warn!(host = %name, "suspicious hostname");
            return Err(UrlRejection::SuspiciousHost);
        }

        Ok(parsed)
    }

    fn is_denylisted(&self, host: &str) -> bool {
        self.denylist
            .iter()
            .any(|d| host == d || host.strip_suffix(d.as_str()).is_some_and(|rest| rest.ends_with('.')))
    }
}

/// Validate a URL against the built-in rules only.
pub fn validate_url(input: &str) -> Result<Url, UrlRejection> {
    UrlGuard::default().validate(input)
}

/// Stable cache identity for a validated URL.
///
/// Hosts are already lowercased by the parser; the fragment never reaches the
/// server so it is dropped. The query string is kept as-is.
pub fn canonical_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_public_https() {
        let url = validate_url("https://example.com/page").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert!(validate_url("http://example.com").is_ok());
    }

    #[test]
    fn test_rejects_loopback_names() {
        assert_eq!(validate_url("http://localhost/x"), Err(UrlRejection::BlockedHost));
        assert_eq!(validate_url("http://LOCALHOST./x"), Err(UrlRejection::BlockedHost));
        assert_eq!(validate_url("http://127.0.0.1/"), Err(UrlRejection::BlockedHost));
        assert_eq!(validate_url("http://[::1]/"), Err(UrlRejection::BlockedHost));
        assert_eq!(validate_url("http://0.0.0.0/"), Err(UrlRejection::BlockedHost));
    }

    #[test]
    fn test_rejects_metadata_hosts() {
        assert_eq!(validate_url("http://169.254.169.254/latest/meta-data"), Err(UrlRejection::BlockedHost));
        assert_eq!(validate_url("http://metadata.google.internal/"), Err(UrlRejection::BlockedHost));
        assert_eq!(validate_url("https://metadata.azure.com/"), Err(UrlRejection::BlockedHost));
    }

    #[test]
    fn test_rejects_private_ranges() {
        assert_eq!(validate_url("http://192.168.1.5/"), Err(UrlRejection::PrivateAddress));
        assert_eq!(validate_url("http://10.1.2.3/"), Err(UrlRejection::PrivateAddress));
        assert_eq!(validate_url("http://172.20.0.1/"), Err(UrlRejection::PrivateAddress));
        assert_eq!(validate_url("http://127.0.0.2/"), Err(UrlRejection::PrivateAddress));
        assert_eq!(validate_url("http://169.254.1.1/"), Err(UrlRejection::PrivateAddress));
        assert_eq!(validate_url("http://[fe80::1]/"), Err(UrlRejection::PrivateAddress));
        assert_eq!(validate_url("http://[fd00::1]/"), Err(UrlRejection::PrivateAddress));
        assert_eq!(validate_url("http://[::ffff:127.0.0.1]/"), Err(UrlRejection::PrivateAddress));
    }

    #[test]
    fn test_rejects_numeric_host_encodings() {
        // The parser normalizes decimal and hex forms to dotted IPv4.
        assert!(validate_url("http://2130706433/").is_err());
        assert!(validate_url("http://0x7f.0.0.1/").is_err());
    }

    #[test]
    fn test_rejects_bad_scheme() {
        assert_eq!(validate_url("ftp://example.com/"), Err(UrlRejection::UnsupportedScheme));
        assert_eq!(validate_url("file:///etc/passwd"), Err(UrlRejection::UnsupportedScheme));
        assert_eq!(validate_url("example.com/page"), Err(UrlRejection::UnsupportedScheme));
    }

    #[test]
    fn test_rejects_empty_and_long() {
        assert_eq!(validate_url(""), Err(UrlRejection::Empty));
        assert_eq!(validate_url("   "), Err(UrlRejection::Empty));

        let long = format!("https://example.com/{}", "a".repeat(3000));
        assert_eq!(validate_url(&long), Err(UrlRejection::TooLong));
    }

    #[test]
    fn test_rejects_missing_host() {
        assert_eq!(validate_url("http://:80/path"), Err(UrlRejection::MissingHost));
    }

    #[test]
    fn test_rejects_suspicious_hosts() {
        assert_eq!(validate_url("https://admin.example.com/"), Err(UrlRejection::SuspiciousHost));
        assert_eq!(validate_url("https://internal-api.example.com/"), Err(UrlRejection::SuspiciousHost));
        assert_eq!(validate_url("https://myprivatesite.com/"), Err(UrlRejection::SuspiciousHost));
    }

    #[test]
    fn test_denylist_matches_subdomains() {
        let guard = UrlGuard::new(&["Tracker.Example".to_string()]);
        assert_eq!(guard.validate("https://tracker.example/"), Err(UrlRejection::BlockedHost));
        assert_eq!(guard.validate("https://cdn.tracker.example/"), Err(UrlRejection::BlockedHost));
        assert!(guard.validate("https://nottracker.example/").is_ok());
    }

    #[test]
    fn test_canonical_key() {
        let url = validate_url("https://EXAMPLE.com/Path?b=2&a=1#frag").unwrap();
        assert_eq!(canonical_key(&url), "https://example.com/Path?b=2&a=1");
    }
}

//! Client key derivation and handling.

use axum::http::HeaderMap;

/// Key used when no caller identity can be derived.
pub const ANONYMOUS_KEY: &str = "anon";

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// A key that identifies a caller for rate limiting purposes.
///
/// Never empty: blank input collapses to [`ANONYMOUS_KEY`], so every request
/// maps to some bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a key from a raw identity string.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Self::anonymous()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// The shared key for callers without an identity.
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_KEY.to_string())
    }

    /// Derive the key from reverse-proxy address headers.
    ///
    /// Takes the first hop of `X-Forwarded-For`, then `X-Real-IP`, then falls
    /// back to the anonymous key.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());

        let real_ip = || {
            headers
                .get(REAL_IP)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        };

        forwarded
            .or_else(real_ip)
            .map(Self::new)
            .unwrap_or_else(Self::anonymous)
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the shared anonymous key.
    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_KEY
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

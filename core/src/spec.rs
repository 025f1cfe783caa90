//! The `RedcapSpec` configuration contract.
//!
//! # Design
//! A spec is the tuple (api_url, token, username) identifying one REDCap
//! project and the account that owns its API token. Validation happens at
//! construction, not at first use: an empty field or a malformed URL is
//! caught before any request is built. The `username` field cannot be
//! verified locally — it only has to match the token's owner once the user
//! export comes back — which is exactly why access validation exists.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use url::{Host, Url};

use crate::error::RedcapError;

/// Immutable configuration for one REDCap project.
///
/// Construct with [`RedcapSpec::new`] or deserialize from the JSON shape
/// used by project config files (`api-url`, `token`, `username`; unknown
/// keys are rejected). Fields are private so a spec can only exist in a
/// validated state.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSpec")]
pub struct RedcapSpec {
    api_url: String,
    token: String,
    username: String,
}

/// On-disk shape of a spec. Missing and unrecognized keys are hard errors
/// rather than lookup-with-default.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSpec {
    #[serde(rename = "api-url", alias = "api_url")]
    api_url: String,
    token: String,
    username: String,
}

impl TryFrom<RawSpec> for RedcapSpec {
    type Error = RedcapError;

    fn try_from(raw: RawSpec) -> Result<Self, Self::Error> {
        Self::new(raw.api_url, raw.token, raw.username)
    }
}

impl RedcapSpec {
    /// Validate and construct a spec.
    ///
    /// All three fields must be non-empty and `api_url` must parse as an
    /// http(s) URL. Plain `http` is only accepted for loopback hosts, so
    /// tests can target a local stub while a production token never travels
    /// unencrypted.
    ///
    /// # Errors
    /// Returns [`RedcapError::InvalidSpec`] when any field fails validation.
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<Self, RedcapError> {
        let api_url = api_url.into();
        let token = token.into();
        let username = username.into();

        if api_url.is_empty() {
            return Err(RedcapError::InvalidSpec("api-url is empty".to_string()));
        }
        if token.is_empty() {
            return Err(RedcapError::InvalidSpec("token is empty".to_string()));
        }
        if username.is_empty() {
            return Err(RedcapError::InvalidSpec("username is empty".to_string()));
        }

        let url = Url::parse(&api_url)
            .map_err(|e| RedcapError::InvalidSpec(format!("api-url is not a valid URL: {e}")))?;
        match url.scheme() {
            "https" => {}
            "http" if is_loopback(&url) => {}
            "http" => {
                return Err(RedcapError::InvalidSpec(
                    "insecure api-url: the REDCap API must be reached over HTTPS".to_string(),
                ));
            }
            other => {
                return Err(RedcapError::InvalidSpec(format!(
                    "api-url has unsupported scheme [{other}]"
                )));
            }
        }

        Ok(Self {
            api_url,
            token,
            username,
        })
    }

    /// Deserialize a spec from a JSON document.
    ///
    /// # Errors
    /// Returns [`RedcapError::InvalidSpec`] on malformed JSON, unknown or
    /// missing keys, or field validation failure.
    pub fn from_json(json: &str) -> Result<Self, RedcapError> {
        serde_json::from_str(json).map_err(|e| RedcapError::InvalidSpec(e.to_string()))
    }

    /// Load a spec from a JSON config file.
    ///
    /// # Errors
    /// Returns [`RedcapError::InvalidSpec`] when the file cannot be read or
    /// its contents fail [`RedcapSpec::from_json`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RedcapError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RedcapError::InvalidSpec(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

// The token is a live credential; keep it out of Debug output and logs.
impl fmt::Debug for RedcapSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedcapSpec")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(d)) => d == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_https_spec() {
        let spec = RedcapSpec::new("https://example.org/api/", "ABC123", "alice").unwrap();
        assert_eq!(spec.api_url(), "https://example.org/api/");
        assert_eq!(spec.token(), "ABC123");
        assert_eq!(spec.username(), "alice");
    }

    #[test]
    fn http_loopback_is_allowed() {
        assert!(RedcapSpec::new("http://127.0.0.1:3000/", "T", "alice").is_ok());
        assert!(RedcapSpec::new("http://localhost:3000/", "T", "alice").is_ok());
    }

    #[test]
    fn http_remote_is_rejected() {
        let err = RedcapSpec::new("http://example.org/api/", "T", "alice").unwrap_err();
        assert!(matches!(err, RedcapError::InvalidSpec(_)));
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert!(RedcapSpec::new("", "T", "alice").is_err());
        assert!(RedcapSpec::new("https://example.org/api/", "", "alice").is_err());
        assert!(RedcapSpec::new("https://example.org/api/", "T", "").is_err());
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let err = RedcapSpec::new("ftp://example.org/api/", "T", "alice").unwrap_err();
        assert!(matches!(err, RedcapError::InvalidSpec(_)));
    }

    #[test]
    fn not_a_url_is_rejected() {
        let err = RedcapSpec::new("example dot org", "T", "alice").unwrap_err();
        assert!(matches!(err, RedcapError::InvalidSpec(_)));
    }

    #[test]
    fn from_json_uses_config_file_keys() {
        let spec = RedcapSpec::from_json(
            r#"{"api-url":"https://example.org/api/","token":"ABC123","username":"alice"}"#,
        )
        .unwrap();
        assert_eq!(spec.username(), "alice");
    }

    #[test]
    fn from_json_rejects_unknown_keys() {
        let err = RedcapSpec::from_json(
            r#"{"api-url":"https://example.org/api/","token":"T","username":"alice","pid":"42"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RedcapError::InvalidSpec(_)));
    }

    #[test]
    fn from_json_rejects_missing_keys() {
        let err =
            RedcapSpec::from_json(r#"{"api-url":"https://example.org/api/","token":"T"}"#)
                .unwrap_err();
        assert!(matches!(err, RedcapError::InvalidSpec(_)));
    }

    #[test]
    fn debug_redacts_token() {
        let spec = RedcapSpec::new("https://example.org/api/", "SECRET", "alice").unwrap();
        let dbg = format!("{spec:?}");
        assert!(!dbg.contains("SECRET"));
        assert!(dbg.contains("<redacted>"));
    }
}

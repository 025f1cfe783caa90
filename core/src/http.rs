//! Wire-level request and response types.
//!
//! # Design
//! The REDCap API is a single endpoint accepting form-encoded POSTs, so a
//! request is just the endpoint URL, an ordered list of form fields, and an
//! optional file part for multipart imports. These types are plain data:
//! `RedcapApi` builds `ApiRequest` values and consumes `ApiResponse` values
//! without touching the network, and the transport layer sits in between.
//! Response bodies stay as raw bytes because file exports are binary.

use crate::error::RedcapError;

/// A single form-encoded (or multipart, when `file` is set) POST against
/// the REDCap API endpoint.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub url: String,
    pub form: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

impl ApiRequest {
    /// Value of the `content` form field, for logging and diagnostics.
    pub fn content(&self) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == "content")
            .map(|(_, v)| v.as_str())
    }
}

/// A file to upload as the `file` part of a multipart import.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// The raw outcome of executing an [`ApiRequest`].
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Look up a header by name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// View the body as UTF-8 text.
    ///
    /// # Errors
    /// Returns [`RedcapError::Protocol`] when the body is not valid UTF-8.
    pub fn text(&self) -> Result<&str, RedcapError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| RedcapError::Protocol(format!("response body is not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = ApiResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: Vec::new(),
        };
        assert_eq!(resp.header("content-type"), Some("text/plain"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(resp.header("content-length"), None);
    }

    #[test]
    fn text_rejects_invalid_utf8() {
        let resp = ApiResponse {
            status: 200,
            headers: Vec::new(),
            body: vec![0xff, 0xfe],
        };
        assert!(matches!(resp.text(), Err(RedcapError::Protocol(_))));
    }

    #[test]
    fn content_reads_the_content_field() {
        let req = ApiRequest {
            url: "https://example.org/api/".to_string(),
            form: vec![
                ("token".to_string(), "T".to_string()),
                ("content".to_string(), "user".to_string()),
            ],
            file: None,
        };
        assert_eq!(req.content(), Some("user"));
    }
}

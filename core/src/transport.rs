//! HTTP execution of [`ApiRequest`] values.
//!
//! # Design
//! `Transport` owns a configured `reqwest::Client` and is the only place in
//! the crate that touches the network. Redirects are never followed: a
//! redirected API URL is a configuration problem the caller must see, not
//! something to chase with a token attached. The caller-supplied `deadline`
//! bounds one whole call; when it elapses the in-flight request is aborted
//! and the call fails with [`RedcapError::Cancelled`], leaving no partial
//! state. Dropping the returned future aborts the request the same way.
//!
//! The token travels only in the form body; log output carries the URL and
//! the `content` discriminator, never the form itself.

use std::time::Duration;

use tracing::debug;

use crate::error::RedcapError;
use crate::http::{ApiRequest, ApiResponse};

/// Timeout knobs for one [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on establishing the connection; expiry is a `Transport` error.
    pub connect_timeout: Duration,
    /// Overall bound on one API call; expiry is `Cancelled`. `None` waits
    /// indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            deadline: Some(Duration::from_secs(180)),
        }
    }
}

/// Executes requests against the REDCap API endpoint.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl Transport {
    /// # Errors
    /// Returns [`RedcapError::Transport`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: TransportConfig) -> Result<Self, RedcapError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, config })
    }

    /// Execute one request, honoring the configured deadline.
    ///
    /// # Errors
    /// [`RedcapError::Transport`] on connection failure,
    /// [`RedcapError::Cancelled`] when the deadline elapses first.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, RedcapError> {
        match self.config.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.send(request))
                .await
                .map_err(|_| RedcapError::Cancelled)?,
            None => self.send(request).await,
        }
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, RedcapError> {
        debug!(
            url = %request.url,
            content = request.content().unwrap_or("-"),
            multipart = request.file.is_some(),
            "POST to REDCap API"
        );

        let builder = self.client.post(&request.url);
        let builder = match request.file {
            Some(file) => {
                let mut form = reqwest::multipart::Form::new();
                for (key, value) in request.form {
                    form = form.text(key, value);
                }
                let part = reqwest::multipart::Part::bytes(file.data)
                    .file_name(file.filename)
                    .mime_str(&file.content_type)?;
                builder.multipart(form.part("file", part))
            }
            None => builder.form(&request.form),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        debug!(status, bytes = body.len(), "REDCap API response");

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_deadline() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.deadline, Some(Duration::from_secs(180)));
    }
}

//! HTTP collaborator (feature `api-direct`)

use super::{GenerationCall, JsonTransport};
use crate::workflow::GenerationError;
use async_trait::async_trait;
use tracing::debug;

/// Generator that POSTs each call to `{base_url}/{call}`
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, call: GenerationCall) -> String {
        format!("{}/{}", self.base_url, call.name())
    }
}

#[async_trait]
impl JsonTransport for HttpGenerator {
    async fn exchange(&self, call: GenerationCall, request: String) -> Result<String, GenerationError> {
        let url = self.endpoint(call);
        debug!(%call, %url, "posting generation request");

        let remote = |message: String| GenerationError::Remote { call, message };

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request)
            .send()
            .await
            .map_err(|e| remote(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| remote(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(remote(format!("{} returned {}: {}", url, status, body)));
        }
        Ok(body)
    }
}

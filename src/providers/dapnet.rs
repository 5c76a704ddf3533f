//! DAPNET pager gateway. Credentials with the no-call sentinel keep the
//! feature visible but disabled.

use serde_json::json;

use super::{ProviderError, ProviderResult};

pub struct DapnetClient {
    client: reqwest::Client,
    api_url: String,
    user: String,
    password: String,
    enabled: bool,
}

impl DapnetClient {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        user: String,
        password: String,
        enabled: bool,
    ) -> Self {
        Self {
            client,
            api_url,
            user,
            password,
            enabled,
        }
    }

    /// Send a pager call to the destination callsign. DAPNET caps the
    /// message at 80 characters; longer texts are truncated upstream, so
    /// they are cut here for predictable output.
    pub async fn send(
        &self,
        destination: &str,
        message: &str,
        high_priority: bool,
    ) -> ProviderResult<()> {
        if !self.enabled {
            return Err(ProviderError::Disabled);
        }
        let text: String = message.chars().take(80).collect();
        let body = json!({
            "text": text,
            "callSignNames": [destination.to_lowercase()],
            "transmitterGroupNames": ["all"],
            "emergency": high_priority,
        });

        let response = self
            .client
            .post(&self.api_url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 201 => Ok(()),
            404 => Err(ProviderError::NotFound),
            status => Err(ProviderError::Unavailable(format!(
                "dapnet returned {}",
                status
            ))),
        }
    }
}

use anyhow::{bail, Result};
use serde::Deserialize;

use gatehouse_shared::schemas::{CreatePromptRequest, Decision, InteractivePrompt};

use crate::config::Configuration;

/// HTTP API client for the gatehouse hub.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct PromptResponse {
    prompt: InteractivePrompt,
}

#[derive(Deserialize)]
struct DecideResponse {
    decision: Decision,
}

impl ApiClient {
    pub fn new(config: &Configuration) -> Result<Self> {
        if config.api_token.is_empty() {
            bail!("GATEHOUSE_API_TOKEN is required. Set it in the environment or in settings.json.");
        }
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            base_url: config.api_url.clone(),
            token: config.api_token.clone(),
        })
    }

    pub async fn health(&self) -> Result<()> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("hub health check failed ({})", resp.status());
        }
        Ok(())
    }

    pub async fn create_prompt(&self, req: &CreatePromptRequest) -> Result<InteractivePrompt> {
        let resp = self
            .http
            .post(format!("{}/cli/prompts", self.base_url))
            .bearer_auth(&self.token)
            .json(req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("POST /cli/prompts failed ({status}): {text}");
        }

        let parsed: PromptResponse = resp.json().await?;
        Ok(parsed.prompt)
    }

    /// Fetch a prompt by id. A 404 maps to `Ok(None)` so the caller can
    /// tell "prompt gone" apart from transport errors.
    pub async fn get_prompt(&self, id: &str) -> Result<Option<InteractivePrompt>> {
        let resp = self
            .http
            .get(format!("{}/cli/prompts/{id}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("GET /cli/prompts/{id} failed ({status}): {text}");
        }

        let parsed: PromptResponse = resp.json().await?;
        Ok(Some(parsed.prompt))
    }

    pub async fn expire_prompt(&self, id: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/cli/prompts/{id}/expire", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("POST /cli/prompts/{id}/expire failed ({status}): {text}");
        }
        Ok(())
    }

    pub async fn decide(
        &self,
        tool: &str,
        action: &str,
        resource: &str,
        scope: &str,
    ) -> Result<Decision> {
        let body = serde_json::json!({
            "tool": tool,
            "action": action,
            "resource": resource,
            "scope": scope,
        });

        let resp = self
            .http
            .post(format!("{}/cli/permissions/decide", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("POST /cli/permissions/decide failed ({status}): {text}");
        }

        let parsed: DecideResponse = resp.json().await?;
        Ok(parsed.decision)
    }
}

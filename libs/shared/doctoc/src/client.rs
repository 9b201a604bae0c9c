use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

/// Client for the Doctoc cloud-function API. Every endpoint is a POST with a
/// JSON body; responses are JSON.
pub struct DoctocClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl DoctocClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.doctoc_base_url.clone(),
            api_token: config.doctoc_api_token.clone(),
        }
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if !self.api_token.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    pub async fn call<T>(&self, path: &str, body: Value) -> Result<T>
    where T: DeserializeOwned {
        let url = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        debug!("Making request to {}", url);

        let response = self.client.post(&url)
            .headers(self.get_headers())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Doctoc API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("Doctoc API error ({}): {}", status, error_text),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Fetch sections of a user's org profile (e.g. `calendarInfo` for a
    /// doctor's schedule configuration).
    pub async fn get_user_info(
        &self,
        org_id: &str,
        user_id: &str,
        sections: &[&str],
    ) -> Result<Value> {
        self.call(
            "/manageUserInfoAPIV2",
            json!({
                "action": "get",
                "orgID": org_id,
                "uid": user_id,
                "type": "user",
                "sections": sections,
            }),
        ).await
    }

    /// Fetch one day's occupied time ranges for a doctor. The endpoint
    /// excludes cancelled appointments before returning. Depending on the
    /// deployed version the response is either a bare array or an object
    /// wrapping a `busy_ranges` array, so this returns the raw value.
    pub async fn get_busy_ranges(
        &self,
        org_id: &str,
        day_key: &str,
        user_id: Option<&str>,
    ) -> Result<Value> {
        let mut body = json!({
            "orgID": org_id,
            "dayKey": day_key,
            "format": "busy_ranges",
        });
        if let Some(uid) = user_id {
            body["userId"] = json!(uid);
        }

        self.call("/getDayQuotesAPIV2", body).await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

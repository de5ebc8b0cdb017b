use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::{MessagingError, Result};
use crate::types::{Chat, ChatMessage, ConnectionStatus, Profile};

/// Common interface for LinkedIn connection/messaging automation, implemented
/// by the concrete provider client and by test doubles.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn get_profile(&self, provider_id: &str) -> Result<Profile>;
    async fn send_invitation(&self, provider_id: &str, message: &str) -> Result<()>;
    async fn get_chats(&self, limit: u32) -> Result<Vec<Chat>>;
    async fn get_chat_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<ChatMessage>>;
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;
    async fn check_connection_status(&self) -> Result<ConnectionStatus>;
}

/// LinkedIn profile URLs this client knows how to resolve to a provider id.
const PROFILE_URL_PATTERNS: &[&str] = &["linkedin.com/in/", "linkedin.com/sales/people/"];

/// Pulls the handle out of a LinkedIn profile URL — mirrors the reference
/// service's regex extraction without needing a regex crate for two
/// fixed prefixes.
pub fn extract_provider_id(profile_url: &str) -> Option<String> {
    for pattern in PROFILE_URL_PATTERNS {
        if let Some(idx) = profile_url.find(pattern) {
            let rest = &profile_url[idx + pattern.len()..];
            let handle = rest.split(['/', '?']).next().unwrap_or("");
            if !handle.is_empty() {
                return Some(handle.to_string());
            }
        }
    }
    None
}

pub struct UnipileClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    account_id: String,
}

impl UnipileClient {
    pub fn new(base_url: String, api_key: String, account_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            account_id,
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("X-API-KEY", &self.api_key)
            .header("content-type", "application/json")
    }

    async fn check_status(resp: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5_000);
            return Err(MessagingError::RateLimited {
                retry_after_ms: retry,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(status, body = %text, action, "unipile api error");
            return Err(MessagingError::SendFailed {
                status,
                message: text,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl MessagingProvider for UnipileClient {
    async fn get_profile(&self, provider_id: &str) -> Result<Profile> {
        let url = format!("{}/users/{provider_id}", self.base_url);
        debug!(provider_id, "fetching linkedin profile");
        let resp = self
            .auth(self.client.get(&url))
            .query(&[("account_id", &self.account_id)])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        let resp = Self::check_status(resp, "get_profile").await?;
        let body: serde_json::Value = resp.json().await?;
        Ok(Profile {
            provider_id: provider_id.to_string(),
            name: body.get("name").and_then(|v| v.as_str()).map(String::from),
            headline: body
                .get("headline")
                .and_then(|v| v.as_str())
                .map(String::from),
            raw: body,
        })
    }

    /// Message is hard-capped at 300 chars regardless of what the caller
    /// passes — the analyzer already enforces this, this is the safety net.
    async fn send_invitation(&self, provider_id: &str, message: &str) -> Result<()> {
        let url = format!("{}/users/invite", self.base_url);
        let truncated: String = message.chars().take(300).collect();
        let payload = serde_json::json!({
            "provider_id": provider_id,
            "account_id": self.account_id,
            "message": truncated,
        });
        let resp = self
            .auth(self.client.post(&url))
            .json(&payload)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        Self::check_status(resp, "send_invitation").await?;
        info!(provider_id, "invitation sent");
        Ok(())
    }

    async fn get_chats(&self, limit: u32) -> Result<Vec<Chat>> {
        let url = format!("{}/chats", self.base_url);
        let resp = self
            .auth(self.client.get(&url))
            .query(&[("account_id", self.account_id.as_str())])
            .query(&[("limit", limit)])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        let resp = Self::check_status(resp, "get_chats").await?;
        let body: serde_json::Value = resp.json().await?;
        let chats = body
            .get("items")
            .cloned()
            .unwrap_or(body)
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        Ok(chats)
    }

    async fn get_chat_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<ChatMessage>> {
        let url = format!("{}/chats/{chat_id}/messages", self.base_url);
        let resp = self
            .auth(self.client.get(&url))
            .query(&[("account_id", self.account_id.as_str())])
            .query(&[("limit", limit)])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        let resp = Self::check_status(resp, "get_chat_messages").await?;
        let body: serde_json::Value = resp.json().await?;
        let messages = body
            .get("items")
            .cloned()
            .unwrap_or(body)
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        Ok(messages)
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/chats/{chat_id}/messages", self.base_url);
        let payload = serde_json::json!({
            "account_id": self.account_id,
            "text": text,
        });
        let resp = self
            .auth(self.client.post(&url))
            .json(&payload)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        Self::check_status(resp, "send_message").await?;
        info!(chat_id, "message sent");
        Ok(())
    }

    async fn check_connection_status(&self) -> Result<ConnectionStatus> {
        let url = format!("{}/accounts/{}", self.base_url, self.account_id);
        let resp = self
            .auth(self.client.get(&url))
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        match Self::check_status(resp, "check_connection_status").await {
            Ok(_) => Ok(ConnectionStatus { connected: true }),
            Err(MessagingError::RateLimited { .. }) => Ok(ConnectionStatus { connected: true }),
            Err(_) => Ok(ConnectionStatus { connected: false }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_provider_id_from_standard_profile_url() {
        assert_eq!(
            extract_provider_id("https://www.linkedin.com/in/johndoe/"),
            Some("johndoe".to_string())
        );
    }

    #[test]
    fn extracts_provider_id_from_sales_navigator_url() {
        assert_eq!(
            extract_provider_id("https://www.linkedin.com/sales/people/ABC123,NAME"),
            Some("ABC123,NAME".to_string())
        );
    }

    #[test]
    fn returns_none_for_non_linkedin_url() {
        assert_eq!(extract_provider_id("https://example.com/in/johndoe"), None);
    }
}

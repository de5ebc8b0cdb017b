use serde::{Deserialize, Serialize};

/// A LinkedIn chat thread as returned by the provider's `/chats` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub attendee_provider_id: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
    pub last_message_at: Option<String>,
}

fn default_true() -> bool {
    true
}

/// A single message within a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub text: Option<String>,
    pub timestamp: String,
    /// Missing from a provider payload conservatively means "our own
    /// message" so reply detection doesn't trigger on malformed data.
    #[serde(default = "default_true")]
    pub is_sender: bool,
}

/// A LinkedIn profile as returned by the provider's `/users/{id}` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub provider_id: String,
    pub name: Option<String>,
    pub headline: Option<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
}

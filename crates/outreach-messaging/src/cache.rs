use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;

use crate::types::{Chat, ChatMessage};

const CHATS_TTL_MIN_SECS: i64 = 30 * 60;
const CHATS_TTL_MAX_SECS: i64 = 60 * 60;
const PROFILES_TTL_MIN_SECS: i64 = 24 * 60 * 60;
const PROFILES_TTL_MAX_SECS: i64 = 30 * 60 * 60;
const MESSAGES_TTL_MIN_SECS: i64 = 5 * 60;
const MESSAGES_TTL_MAX_SECS: i64 = 10 * 60;

struct Entry<T> {
    data: T,
    expires_at: DateTime<Utc>,
    last_message_hash: Option<String>,
}

/// Rate-limiting and response cache for the messaging provider — LinkedIn
/// automation safety depends on not hammering the API, so every resource
/// class gets a randomized TTL rather than a fixed one.
/// Chats are keyed by the caller-chosen account key so one process-wide
/// cache can safely serve many users' messaging accounts without contending
/// on a single lock.
pub struct ResponseCache {
    chats: DashMap<String, Entry<Vec<Chat>>>,
    profiles: DashMap<String, Entry<serde_json::Value>>,
    messages: DashMap<String, Entry<Vec<ChatMessage>>>,
    last_api_call: Mutex<Option<DateTime<Utc>>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            chats: DashMap::new(),
            profiles: DashMap::new(),
            messages: DashMap::new(),
            last_api_call: Mutex::new(None),
        }
    }

    fn random_ttl(min_secs: i64, max_secs: i64) -> chrono::Duration {
        let mut rng = rand::thread_rng();
        chrono::Duration::seconds(rng.gen_range(min_secs..=max_secs))
    }

    fn hash_messages(messages: &[ChatMessage]) -> String {
        match messages.first() {
            Some(m) => format!("{}-{}", m.id, m.timestamp),
            None => String::new(),
        }
    }

    pub fn get_chats(&self, account_key: &str, now: DateTime<Utc>) -> Option<Vec<Chat>> {
        self.chats
            .get(account_key)
            .filter(|e| now <= e.expires_at)
            .map(|e| e.data.clone())
    }

    pub fn set_chats(&self, account_key: &str, data: Vec<Chat>, now: DateTime<Utc>) {
        let ttl = Self::random_ttl(CHATS_TTL_MIN_SECS, CHATS_TTL_MAX_SECS);
        self.chats.insert(
            account_key.to_string(),
            Entry {
                data,
                expires_at: now + ttl,
                last_message_hash: None,
            },
        );
    }

    pub fn get_profile(&self, provider_id: &str, now: DateTime<Utc>) -> Option<serde_json::Value> {
        self.profiles
            .get(provider_id)
            .filter(|e| now <= e.expires_at)
            .map(|e| e.data.clone())
    }

    pub fn set_profile(&self, provider_id: &str, data: serde_json::Value, now: DateTime<Utc>) {
        let ttl = Self::random_ttl(PROFILES_TTL_MIN_SECS, PROFILES_TTL_MAX_SECS);
        self.profiles.insert(
            provider_id.to_string(),
            Entry {
                data,
                expires_at: now + ttl,
                last_message_hash: None,
            },
        );
    }

    pub fn get_messages(&self, chat_id: &str, now: DateTime<Utc>) -> Option<Vec<ChatMessage>> {
        self.messages
            .get(chat_id)
            .filter(|e| now <= e.expires_at)
            .map(|e| e.data.clone())
    }

    /// Caches `messages` for `chat_id` and reports whether the newest
    /// message differs from the previously cached one.
    pub fn set_messages(
        &self,
        chat_id: &str,
        messages: Vec<ChatMessage>,
        now: DateTime<Utc>,
    ) -> bool {
        let new_hash = Self::hash_messages(&messages);
        let has_new = self
            .messages
            .get(chat_id)
            .and_then(|e| e.last_message_hash.clone())
            .map(|old| old != new_hash)
            .unwrap_or(false);

        let ttl = Self::random_ttl(MESSAGES_TTL_MIN_SECS, MESSAGES_TTL_MAX_SECS);
        self.messages.insert(
            chat_id.to_string(),
            Entry {
                data: messages,
                expires_at: now + ttl,
                last_message_hash: Some(new_hash),
            },
        );
        has_new
    }

    /// True if at least `min_interval` has elapsed since the last recorded
    /// outbound API call (or none has been recorded yet).
    pub fn can_make_api_call(&self, min_interval: chrono::Duration, now: DateTime<Utc>) -> bool {
        match *self.last_api_call.lock().unwrap() {
            Some(last) => now - last >= min_interval,
            None => true,
        }
    }

    /// Records `now` as the instant of the most recent outbound API call.
    pub fn record_api_call(&self, now: DateTime<Utc>) {
        *self.last_api_call.lock().unwrap() = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, ts: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            text: None,
            timestamp: ts.to_string(),
            is_sender: false,
        }
    }

    #[test]
    fn first_cache_write_reports_no_new_messages() {
        let cache = ResponseCache::new();
        let now = Utc::now();
        let has_new = cache.set_messages("chat-1", vec![msg("m1", "t1")], now);
        assert!(!has_new);
    }

    #[test]
    fn differing_head_message_reports_new_messages() {
        let cache = ResponseCache::new();
        let now = Utc::now();
        cache.set_messages("chat-1", vec![msg("m1", "t1")], now);
        let has_new = cache.set_messages("chat-1", vec![msg("m2", "t2")], now);
        assert!(has_new);
    }

    #[test]
    fn identical_head_message_reports_no_new_messages() {
        let cache = ResponseCache::new();
        let now = Utc::now();
        cache.set_messages("chat-1", vec![msg("m1", "t1")], now);
        let has_new = cache.set_messages("chat-1", vec![msg("m1", "t1")], now);
        assert!(!has_new);
    }

    #[test]
    fn expired_chats_entry_is_not_returned() {
        let cache = ResponseCache::new();
        let now = Utc::now();
        cache.set_chats("user-1", vec![], now);
        let far_future = now + chrono::Duration::hours(40);
        assert!(cache.get_chats("user-1", far_future).is_none());
    }
}

//! Cross-cutting helpers shared by the classic and pipeline engines: owning-
//! user resolution (leads and enrollments carry no direct `user_id`),
//! per-user messaging client construction, and the analyzer-context
//! conversions between `outreach_db::types` and `outreach_lm::types`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use outreach_core::config::OutreachConfig;
use outreach_db::repo::{business_profiles, messaging_accounts, sequences};
use outreach_db::types::{BusinessProfile, Lead};
use outreach_lm::types::{BusinessContext, LeadContext, SenderContext};
use outreach_messaging::types::{Chat, ChatMessage};
use outreach_messaging::{MessagingProvider, ResponseCache, UnipileClient};
use rusqlite::Connection;

use crate::error::{EngineError, Result};

/// `sequence -> business_profile -> user_id`. A sequence with no business
/// profile, or a profile with no owner, has no resolvable user.
pub fn resolve_owning_user(conn: &Connection, sequence_id: &str) -> Result<Option<String>> {
    let Some(seq) = sequences::get(conn, sequence_id)? else {
        return Ok(None);
    };
    let Some(bp_id) = seq.business_profile_id else {
        return Ok(None);
    };
    Ok(business_profiles::get(conn, &bp_id)?.and_then(|bp| bp.user_id))
}

/// Builds a [`MessagingProvider`] for a user. The reference service decrypts
/// a per-user API key stored on a `LinkedInAccount` row; this workspace's
/// `MessagingAccount` model carries only a per-user
/// `external_account_id`, not a per-user key, so the app-level provider key
/// from configuration is shared across users and only the account id varies
/// (recorded in DESIGN.md as a deliberate simplification).
pub trait MessagingClientFactory: Send + Sync {
    fn client_for_user(&self, conn: &Connection, user_id: &str) -> Result<Arc<dyn MessagingProvider>>;
}

pub struct UnipileClientFactory {
    base_url: String,
    api_key: String,
}

impl UnipileClientFactory {
    pub fn new(config: &OutreachConfig) -> Self {
        Self {
            base_url: config.messaging.base_url.clone(),
            api_key: config.messaging.api_key.clone(),
        }
    }
}

impl MessagingClientFactory for UnipileClientFactory {
    fn client_for_user(&self, conn: &Connection, user_id: &str) -> Result<Arc<dyn MessagingProvider>> {
        let account = messaging_accounts::get_by_user(conn, user_id)?.ok_or_else(|| {
            EngineError::MissingMessagingAccount {
                user_id: user_id.to_string(),
            }
        })?;
        Ok(Arc::new(UnipileClient::new(
            self.base_url.clone(),
            self.api_key.clone(),
            account.external_account_id,
        )))
    }
}

pub fn lead_context(lead: &Lead) -> LeadContext {
    LeadContext {
        first_name: lead.first_name.clone(),
        job_title: lead.job_title.clone(),
        headline: lead.headline.clone(),
        company_name: lead.company_name.clone(),
        company_industry: lead.company_industry.clone(),
        company_size: lead.company_size.map(|n| n.to_string()),
        country: lead.country.clone(),
    }
}

pub fn sender_context(bp: &BusinessProfile) -> SenderContext {
    SenderContext {
        sender_name: bp.sender_name.clone(),
        sender_role: bp.sender_role.clone(),
        sender_company: bp.sender_company.clone(),
        sender_context: bp.sender_context.clone(),
    }
}

pub fn business_context(bp: &BusinessProfile) -> BusinessContext {
    BusinessContext {
        ideal_customer: bp.ideal_customer.clone(),
        target_industries: bp.target_industries.clone(),
        target_company_sizes: bp.target_company_sizes.clone(),
        target_job_titles: bp.target_job_titles.clone(),
    }
}

/// Renders a chat history for the analyzer/author prompts: chronological,
/// the last `max_lines` non-empty messages, `"You: ..."` for our own sends
/// and `contact_label` for the counterparty.
pub fn format_conversation(messages: &[ChatMessage], max_lines: usize, contact_label: &str) -> String {
    let mut sorted: Vec<&ChatMessage> = messages.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let lines: Vec<String> = sorted
        .into_iter()
        .filter_map(|m| {
            let text = m.text.as_deref()?;
            if text.is_empty() {
                return None;
            }
            let sender = if m.is_sender { "You" } else { contact_label };
            Some(format!("{sender}: {text}"))
        })
        .collect();

    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Chat list lookup through the shared response cache.
/// `account_key` (the owning user id) keys the cache entry so one
/// process-wide [`ResponseCache`] can serve every user's messaging account
/// without one user's chat list shadowing another's.
pub async fn get_chats_cached(
    messaging: &dyn MessagingProvider,
    cache: &ResponseCache,
    account_key: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Chat>> {
    if let Some(chats) = cache.get_chats(account_key, now) {
        return Ok(chats);
    }
    let chats = messaging.get_chats(200).await?;
    cache.set_chats(account_key, chats.clone(), now);
    Ok(chats)
}

/// Message-history lookup through the shared response cache. Reply detection
/// passes `force_refresh = true` since a stale cache hit would silently miss
/// a new inbound message; context-only fetches (nurture, reactivation,
/// deferred apertura) accept the cached copy.
pub async fn get_chat_messages_cached(
    messaging: &dyn MessagingProvider,
    cache: &ResponseCache,
    chat_id: &str,
    limit: u32,
    now: DateTime<Utc>,
    force_refresh: bool,
) -> Result<Vec<ChatMessage>> {
    if !force_refresh {
        if let Some(messages) = cache.get_messages(chat_id, now) {
            return Ok(messages);
        }
    }
    let messages = messaging.get_chat_messages(chat_id, limit).await?;
    cache.set_messages(chat_id, messages.clone(), now);
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str, ts: &str, is_sender: bool) -> ChatMessage {
        ChatMessage {
            id: "m1".to_string(),
            text: Some(text.to_string()),
            timestamp: ts.to_string(),
            is_sender,
        }
    }

    #[test]
    fn formats_in_chronological_order_with_labels() {
        let messages = vec![
            msg("hello", "2026-01-02T00:00:00Z", true),
            msg("hi there", "2026-01-01T00:00:00Z", false),
        ];
        let rendered = format_conversation(&messages, 10, "Them");
        assert_eq!(rendered, "Them: hi there\nYou: hello");
    }

    #[test]
    fn truncates_to_last_n_lines() {
        let messages: Vec<ChatMessage> = (0..5)
            .map(|i| msg(&format!("msg{i}"), &format!("2026-01-0{}T00:00:00Z", i + 1), false))
            .collect();
        let rendered = format_conversation(&messages, 2, "Them");
        assert_eq!(rendered, "Them: msg3\nThem: msg4");
    }
}

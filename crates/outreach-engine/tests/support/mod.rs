//! Fixtures and fakes shared by the engine integration tests. Inserts go
//! straight through SQL for the tables the `outreach-db` repo layer only
//! exposes read/update helpers for (business profiles, sequences, steps,
//! leads) and through the repo layer for everything else.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use outreach_db::repo::{enrollments, messaging_accounts, users};
use outreach_db::types::{ConnectionState, SequenceEnrollment};
use outreach_engine::context::MessagingClientFactory;
use outreach_engine::Result as EngineResult;
use outreach_lm::provider::{CompletionRequest, LlmProvider};
use outreach_lm::Result as LmResult;
use outreach_messaging::types::{Chat, ChatMessage, ConnectionStatus, Profile};
use outreach_messaging::{MessagingProvider, Result as MsgResult};
use rusqlite::Connection;

pub fn open_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    outreach_db::init_db(&conn).unwrap();
    conn
}

pub fn new_user(conn: &Connection) -> String {
    let user = users::create_user(conn, "rep@example.com", "hash").unwrap();
    messaging_accounts::upsert(conn, &user.id, "acct_ext_1", true, ConnectionState::Ok).unwrap();
    user.id
}

pub fn new_business_profile(conn: &Connection, user_id: &str) -> String {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO business_profiles
            (id, user_id, name, target_industries, target_company_sizes, target_job_titles,
             target_locations, key_benefits, sender_name, sender_role, sender_company,
             sender_context, is_default)
         VALUES (?1, ?2, 'Acme', '[]', '[]', '[]', '[]', '[]', 'Pablo', 'Founder', 'Acme', NULL, 1)",
        rusqlite::params![id, user_id],
    )
    .unwrap();
    id
}

pub fn new_sequence(conn: &Connection, business_profile_id: &str, mode: &str) -> String {
    let id = uuid::Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO sequences (id, name, status, mode, business_profile_id, created_at, updated_at)
         VALUES (?1, 'Test sequence', 'active', ?2, ?3, ?4, ?4)",
        rusqlite::params![id, mode, business_profile_id, now],
    )
    .unwrap();
    id
}

pub fn new_sequence_step(
    conn: &Connection,
    sequence_id: &str,
    step_order: u32,
    step_type: &str,
    delay_days: u32,
) {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO sequence_steps (id, sequence_id, step_order, step_type, delay_days)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id, sequence_id, step_order, step_type, delay_days],
    )
    .unwrap();
}

pub fn new_lead(conn: &Connection, profile_url: Option<&str>, chat_id: Option<&str>) -> String {
    let id = uuid::Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO leads (id, first_name, external_profile_url, external_chat_id, created_at, updated_at)
         VALUES (?1, 'Jordan', ?2, ?3, ?4, ?4)",
        rusqlite::params![id, profile_url, chat_id, now],
    )
    .unwrap();
    id
}

pub fn enroll(conn: &Connection, lead_id: &str, sequence_id: &str) -> SequenceEnrollment {
    enrollments::enroll(conn, lead_id, sequence_id).unwrap()
}

/// Canned [`MessagingProvider`] — queues chats/messages to hand back and
/// records every outbound send so a test can assert on what was sent.
pub struct FakeMessaging {
    chats: Mutex<Vec<Chat>>,
    messages: Mutex<Vec<ChatMessage>>,
    pub sent_invitations: Mutex<Vec<(String, String)>>,
    pub sent_messages: Mutex<Vec<(String, String)>>,
    pub fail_sends: Mutex<bool>,
}

impl FakeMessaging {
    pub fn new() -> Self {
        Self {
            chats: Mutex::new(vec![]),
            messages: Mutex::new(vec![]),
            sent_invitations: Mutex::new(vec![]),
            sent_messages: Mutex::new(vec![]),
            fail_sends: Mutex::new(false),
        }
    }

    pub fn with_chats(self, chats: Vec<Chat>) -> Self {
        *self.chats.lock().unwrap() = chats;
        self
    }

    pub fn with_messages(self, messages: Vec<ChatMessage>) -> Self {
        *self.messages.lock().unwrap() = messages;
        self
    }

    pub fn set_chats(&self, chats: Vec<Chat>) {
        *self.chats.lock().unwrap() = chats;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().unwrap() = fail;
    }
}

#[async_trait]
impl MessagingProvider for FakeMessaging {
    async fn get_profile(&self, provider_id: &str) -> MsgResult<Profile> {
        Ok(Profile {
            provider_id: provider_id.to_string(),
            name: None,
            headline: None,
            raw: serde_json::Value::Null,
        })
    }

    async fn send_invitation(&self, provider_id: &str, message: &str) -> MsgResult<()> {
        if *self.fail_sends.lock().unwrap() {
            return Err(outreach_messaging::MessagingError::SendFailed { status: 500, message: "simulated failure".to_string() });
        }
        self.sent_invitations
            .lock()
            .unwrap()
            .push((provider_id.to_string(), message.to_string()));
        Ok(())
    }

    async fn get_chats(&self, _limit: u32) -> MsgResult<Vec<Chat>> {
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn get_chat_messages(&self, _chat_id: &str, _limit: u32) -> MsgResult<Vec<ChatMessage>> {
        Ok(self.messages.lock().unwrap().clone())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> MsgResult<()> {
        if *self.fail_sends.lock().unwrap() {
            return Err(outreach_messaging::MessagingError::SendFailed { status: 500, message: "simulated failure".to_string() });
        }
        self.sent_messages
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn check_connection_status(&self) -> MsgResult<ConnectionStatus> {
        Ok(ConnectionStatus { connected: true })
    }
}

/// Hands back canned completions in call order; a phase-analysis call
/// expects a JSON body, a message-generation call expects plain text.
pub struct FakeLlm {
    responses: Mutex<VecDeque<String>>,
}

impl FakeLlm {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    async fn complete(&self, _req: &CompletionRequest) -> LmResult<String> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "noted".to_string()))
    }
}

/// [`MessagingClientFactory`] that hands back the same provider for every
/// user, sidestepping the `messaging_accounts` lookup the production
/// factory does.
pub struct FakeFactory(pub Arc<dyn MessagingProvider>);

impl MessagingClientFactory for FakeFactory {
    fn client_for_user(&self, _conn: &Connection, _user_id: &str) -> EngineResult<Arc<dyn MessagingProvider>> {
        Ok(self.0.clone())
    }
}

pub fn chat(id: &str, attendee_provider_id: &str) -> Chat {
    Chat {
        id: id.to_string(),
        attendee_provider_id: Some(attendee_provider_id.to_string()),
        unread_count: 0,
        last_message_at: None,
    }
}

pub fn inbound_message(text: &str, ts: &str) -> ChatMessage {
    ChatMessage {
        id: uuid::Uuid::now_v7().to_string(),
        text: Some(text.to_string()),
        timestamp: ts.to_string(),
        is_sender: false,
    }
}

//! The data model, as plain structs returned by the
//! repository functions in `crate::repo`. No ORM, no hidden session — a
//! repository call either returns one of these or an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Ok,
    Credentials,
    Checkpoint,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Ok => "ok",
            ConnectionState::Credentials => "credentials",
            ConnectionState::Checkpoint => "checkpoint",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ConnectionState {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ok" => Ok(ConnectionState::Ok),
            "credentials" => Ok(ConnectionState::Credentials),
            "checkpoint" => Ok(ConnectionState::Checkpoint),
            other => Err(format!("unknown connection state: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingAccount {
    pub id: String,
    pub user_id: String,
    pub external_account_id: String,
    pub connected: bool,
    pub connection_state: ConnectionState,
    pub pending_checkpoint_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BusinessProfile {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub ideal_customer: Option<String>,
    pub target_industries: Vec<String>,
    pub target_company_sizes: Vec<String>,
    pub target_job_titles: Vec<String>,
    pub target_locations: Vec<String>,
    pub value_proposition: Option<String>,
    pub key_benefits: Vec<String>,
    pub sender_name: Option<String>,
    pub sender_role: Option<String>,
    pub sender_company: Option<String>,
    pub sender_context: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub business_profile_id: Option<String>,
    pub total_leads: u32,
    pub verified_leads: u32,
    pub contacted_leads: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLabel {
    Hot,
    Warm,
    Cold,
}

impl ScoreLabel {
    /// >=80 hot, 50-79 warm, else cold.
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            ScoreLabel::Hot
        } else if score >= 50 {
            ScoreLabel::Warm
        } else {
            ScoreLabel::Cold
        }
    }
}

impl fmt::Display for ScoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoreLabel::Hot => "hot",
            ScoreLabel::Warm => "warm",
            ScoreLabel::Cold => "cold",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ScoreLabel {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hot" => Ok(ScoreLabel::Hot),
            "warm" => Ok(ScoreLabel::Warm),
            "cold" => Ok(ScoreLabel::Cold),
            other => Err(format!("unknown score label: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    InvitationSent,
    Connected,
    InConversation,
    MeetingScheduled,
    Disqualified,
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::InvitationSent => "invitation_sent",
            LeadStatus::Connected => "connected",
            LeadStatus::InConversation => "in_conversation",
            LeadStatus::MeetingScheduled => "meeting_scheduled",
            LeadStatus::Disqualified => "disqualified",
        };
        write!(f, "{s}")
    }
}

impl FromStr for LeadStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "invitation_sent" => Ok(LeadStatus::InvitationSent),
            "connected" => Ok(LeadStatus::Connected),
            "in_conversation" => Ok(LeadStatus::InConversation),
            "meeting_scheduled" => Ok(LeadStatus::MeetingScheduled),
            "disqualified" => Ok(LeadStatus::Disqualified),
            other => Err(format!("unknown lead status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub campaign_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub job_title: Option<String>,
    pub headline: Option<String>,
    pub company_name: Option<String>,
    pub company_industry: Option<String>,
    pub company_size: Option<u32>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub external_profile_url: Option<String>,
    pub external_chat_id: Option<String>,
    pub status: LeadStatus,
    pub score: Option<u8>,
    pub score_label: Option<ScoreLabel>,
    pub score_reason: Option<String>,
    pub connection_message: Option<String>,
    pub connection_sent_at: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub active_sequence_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Mirrors `original_source/backend/app/models/lead.py`'s `display_name`
    /// property: prefer `full_name`, else join first+last, else "Unknown".
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.full_name {
            if !name.is_empty() {
                return name.clone();
            }
        }
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            "Unknown".to_string()
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSettings {
    pub user_id: String,
    pub enabled: bool,
    pub work_start_hour: u8,
    pub work_start_minute: u8,
    pub work_end_hour: u8,
    pub work_end_minute: u8,
    /// Mon..Sun -> bits 1..64.
    pub working_days: u8,
    pub timezone: String,
    pub daily_limit: u32,
    pub min_delay_seconds: u32,
    pub max_delay_seconds: u32,
    pub min_lead_score: Option<u8>,
    pub target_statuses: Vec<String>,
    pub target_campaign_id: Option<String>,
    pub invitations_sent_today: u32,
    pub last_invitation_at: Option<DateTime<Utc>>,
    pub last_reset_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationLog {
    pub id: String,
    pub user_id: String,
    pub lead_id: String,
    pub campaign_id: Option<String>,
    pub success: bool,
    pub message_preview: String,
    pub status_code: Option<i32>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Archived,
}

impl fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SequenceStatus::Draft => "draft",
            SequenceStatus::Active => "active",
            SequenceStatus::Paused => "paused",
            SequenceStatus::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SequenceStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SequenceStatus::Draft),
            "active" => Ok(SequenceStatus::Active),
            "paused" => Ok(SequenceStatus::Paused),
            "archived" => Ok(SequenceStatus::Archived),
            other => Err(format!("unknown sequence status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceMode {
    Classic,
    SmartPipeline,
}

impl fmt::Display for SequenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SequenceMode::Classic => "classic",
            SequenceMode::SmartPipeline => "smart_pipeline",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SequenceMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "classic" => Ok(SequenceMode::Classic),
            "smart_pipeline" => Ok(SequenceMode::SmartPipeline),
            other => Err(format!("unknown sequence mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStrategy {
    Hybrid,
    Direct,
    Gradual,
}

impl fmt::Display for MessageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageStrategy::Hybrid => "hybrid",
            MessageStrategy::Direct => "direct",
            MessageStrategy::Gradual => "gradual",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MessageStrategy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(MessageStrategy::Hybrid),
            "direct" => Ok(MessageStrategy::Direct),
            "gradual" => Ok(MessageStrategy::Gradual),
            other => Err(format!("unknown message strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    pub status: SequenceStatus,
    pub mode: SequenceMode,
    pub business_profile_id: Option<String>,
    pub message_strategy: MessageStrategy,
    pub enrolled_count: u32,
    pub active_count: u32,
    pub replied_count: u32,
    pub completed_count: u32,
    pub meeting_count: u32,
    pub parked_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    ConnectionRequest,
    FollowUpMessage,
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepType::ConnectionRequest => "connection_request",
            StepType::FollowUpMessage => "follow_up_message",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StepType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "connection_request" => Ok(StepType::ConnectionRequest),
            "follow_up_message" => Ok(StepType::FollowUpMessage),
            other => Err(format!("unknown step type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub id: String,
    pub sequence_id: String,
    pub step_order: u32,
    pub step_type: StepType,
    pub delay_days: u32,
    pub prompt_context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Paused,
    Completed,
    Replied,
    Failed,
    Withdrawn,
    Parked,
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Paused => "paused",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Replied => "replied",
            EnrollmentStatus::Failed => "failed",
            EnrollmentStatus::Withdrawn => "withdrawn",
            EnrollmentStatus::Parked => "parked",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EnrollmentStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "paused" => Ok(EnrollmentStatus::Paused),
            "completed" => Ok(EnrollmentStatus::Completed),
            "replied" => Ok(EnrollmentStatus::Replied),
            "failed" => Ok(EnrollmentStatus::Failed),
            "withdrawn" => Ok(EnrollmentStatus::Withdrawn),
            "parked" => Ok(EnrollmentStatus::Parked),
            other => Err(format!("unknown enrollment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Apertura,
    Calificacion,
    Valor,
    Nurture,
    Reactivacion,
}

impl PipelinePhase {
    /// Fixed evidence-driven progression used when the analyzer returns
    /// `advance` with no explicit `next_phase`.
    pub fn next_in_progression(self) -> Option<PipelinePhase> {
        match self {
            PipelinePhase::Apertura => Some(PipelinePhase::Calificacion),
            PipelinePhase::Calificacion => Some(PipelinePhase::Valor),
            PipelinePhase::Valor => None,
            PipelinePhase::Nurture => None,
            PipelinePhase::Reactivacion => None,
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelinePhase::Apertura => "apertura",
            PipelinePhase::Calificacion => "calificacion",
            PipelinePhase::Valor => "valor",
            PipelinePhase::Nurture => "nurture",
            PipelinePhase::Reactivacion => "reactivacion",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PipelinePhase {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "apertura" => Ok(PipelinePhase::Apertura),
            "calificacion" => Ok(PipelinePhase::Calificacion),
            "valor" => Ok(PipelinePhase::Valor),
            "nurture" => Ok(PipelinePhase::Nurture),
            "reactivacion" => Ok(PipelinePhase::Reactivacion),
            other => Err(format!("unknown pipeline phase: {other}")),
        }
    }
}

/// Structured phase-response analyzer output, persisted verbatim on the
/// enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseAnalysis {
    pub outcome: String,
    pub next_phase: Option<String>,
    pub sentiment: String,
    pub buying_signals: Vec<String>,
    pub signal_strength: String,
    pub suggested_angle: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEnrollment {
    pub id: String,
    pub lead_id: String,
    pub sequence_id: String,
    pub status: EnrollmentStatus,
    pub current_step_order: u32,
    pub next_step_due_at: Option<DateTime<Utc>>,
    pub last_step_completed_at: Option<DateTime<Utc>>,
    pub messages_sent: Vec<String>,
    pub failed_reason: Option<String>,
    /// Consecutive transient send failures of the *same* step. Not part of
    /// the baseline classic schema the source exposes; ambient bookkeeping
    /// added here so repeated transient errors eventually fail the
    /// enrollment instead of retrying forever.
    pub consecutive_failures: u32,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    // Pipeline-only fields (null in classic mode).
    pub current_phase: Option<PipelinePhase>,
    pub phase_entered_at: Option<DateTime<Utc>>,
    pub last_response_at: Option<DateTime<Utc>>,
    pub last_response_text: Option<String>,
    pub phase_analysis: Option<PhaseAnalysis>,
    pub messages_in_phase: u32,
    pub nurture_count: u32,
    pub reactivation_count: u32,
    pub total_messages_sent: u32,
}

impl SequenceEnrollment {
    pub fn is_pipeline(&self) -> bool {
        self.current_phase.is_some() || self.nurture_count > 0 || self.reactivation_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_full_name() {
        let lead = Lead {
            full_name: Some("Ada Lovelace".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            ..blank_lead()
        };
        assert_eq!(lead.display_name(), "Ada Lovelace");
    }

    #[test]
    fn display_name_falls_back_to_first_last() {
        let lead = Lead {
            full_name: None,
            first_name: Some("Grace".to_string()),
            last_name: Some("Hopper".to_string()),
            ..blank_lead()
        };
        assert_eq!(lead.display_name(), "Grace Hopper");
    }

    #[test]
    fn display_name_falls_back_to_unknown() {
        let lead = Lead {
            full_name: None,
            first_name: None,
            last_name: None,
            ..blank_lead()
        };
        assert_eq!(lead.display_name(), "Unknown");
    }

    #[test]
    fn score_label_bands_match_spec() {
        assert_eq!(ScoreLabel::from_score(80), ScoreLabel::Hot);
        assert_eq!(ScoreLabel::from_score(79), ScoreLabel::Warm);
        assert_eq!(ScoreLabel::from_score(50), ScoreLabel::Warm);
        assert_eq!(ScoreLabel::from_score(49), ScoreLabel::Cold);
    }

    fn blank_lead() -> Lead {
        Lead {
            id: "lead-1".into(),
            campaign_id: None,
            first_name: None,
            last_name: None,
            full_name: None,
            email: None,
            email_verified: false,
            job_title: None,
            headline: None,
            company_name: None,
            company_industry: None,
            company_size: None,
            city: None,
            country: None,
            external_profile_url: None,
            external_chat_id: None,
            status: LeadStatus::New,
            score: None,
            score_label: None,
            score_reason: None,
            connection_message: None,
            connection_sent_at: None,
            connected_at: None,
            last_message_at: None,
            active_sequence_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

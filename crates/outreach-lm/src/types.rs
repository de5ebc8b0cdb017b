use serde::{Deserialize, Serialize};

/// What the analyzer needs to know about the lead being written to or
/// scored — a narrow view, not the full `outreach_db::types::Lead`, since
/// this crate has no database dependency.
#[derive(Debug, Clone, Default)]
pub struct LeadContext {
    pub first_name: Option<String>,
    pub job_title: Option<String>,
    pub headline: Option<String>,
    pub company_name: Option<String>,
    pub company_industry: Option<String>,
    pub company_size: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SenderContext {
    pub sender_name: Option<String>,
    pub sender_role: Option<String>,
    pub sender_company: Option<String>,
    pub sender_context: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BusinessContext {
    pub ideal_customer: Option<String>,
    pub target_industries: Vec<String>,
    pub target_company_sizes: Vec<String>,
    pub target_job_titles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub contact_job_title: Option<Vec<String>>,
    pub contact_seniority: Option<Vec<String>>,
    pub contact_location: Option<Vec<String>>,
    pub company_industry: Option<Vec<String>>,
    pub company_size: Option<Vec<String>>,
    pub company_location: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct NlFiltersResult {
    pub filters: SearchFilters,
    pub interpretation: String,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct LeadScore {
    pub score: u8,
    pub label: String,
    pub reason: String,
}

/// Mirrors `outreach_db::types::PhaseAnalysis` field-for-field but lives in
/// this crate so the analyzer has no database dependency; `outreach-engine`
/// converts between the two when persisting.
#[derive(Debug, Clone, Deserialize)]
pub struct PhaseAnalysisOutput {
    pub outcome: String,
    pub reason: String,
    pub sentiment: String,
    #[serde(default)]
    pub buying_signals: Vec<String>,
    pub signal_strength: String,
    pub next_phase: Option<String>,
    pub suggested_angle: String,
}

impl PhaseAnalysisOutput {
    pub fn conservative_default(error: &str) -> Self {
        Self {
            outcome: "stay".to_string(),
            reason: format!("Analysis failed: {error}"),
            sentiment: "warm".to_string(),
            buying_signals: vec![],
            signal_strength: "none".to_string(),
            next_phase: None,
            suggested_angle: "Continue the conversation naturally.".to_string(),
        }
    }
}

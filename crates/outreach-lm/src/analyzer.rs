use tracing::{info, warn};

use crate::error::Result;
use crate::provider::{CompletionRequest, LlmProvider};
use crate::types::{
    BusinessContext, LeadContext, LeadScore, NlFiltersResult, PhaseAnalysisOutput, SearchFilters,
    SenderContext,
};

/// Strips a fenced code block (```json ... ``` or ``` ... ```) if present,
/// otherwise returns the text unchanged. Every structured prompt below asks
/// for bare JSON but models sometimes wrap it anyway.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        return rest.trim_end_matches("```").trim();
    }
    if let Some(rest) = text.strip_prefix("```") {
        return rest.trim_end_matches("```").trim();
    }
    text
}

/// Enforces the 300-character hard cap the provider's invitation endpoint
/// requires: cut at the last space at or before char 297, else hard-cut at
/// 297, then append an ellipsis.
pub fn truncate_connection_message(text: &str) -> String {
    let cleaned = text
        .replace("```", "")
        .replace('`', "")
        .replace("**", "")
        .replace('*', "")
        .trim()
        .to_string();

    if cleaned.chars().count() <= 300 {
        return cleaned;
    }

    let head: String = cleaned.chars().take(297).collect();
    match head.rfind(' ') {
        Some(idx) if idx > 0 => format!("{}...", &head[..idx]),
        _ => format!("{head}..."),
    }
}

/// Enforces a per-phase soft character budget: only truncates if the
/// message overshoots `max_chars` by more than a 50-char tolerance, and
/// cuts at the last sentence boundary (`.` or `?`) rather than a word
/// boundary. No ellipsis is appended — the cut is meant to read as a
/// complete sentence.
pub fn truncate_phase_message(text: &str, max_chars: usize) -> String {
    let message = text.trim();
    let message = message
        .strip_prefix('"')
        .and_then(|m| m.strip_suffix('"'))
        .unwrap_or(message);

    if message.chars().count() <= max_chars + 50 {
        return message.to_string();
    }

    let truncated: String = message.chars().take(max_chars).collect();
    let last_period = truncated.rfind('.');
    let last_question = truncated.rfind('?');
    let cut_point = last_period.into_iter().chain(last_question).max();

    match cut_point {
        Some(idx) if idx as f64 > max_chars as f64 * 0.5 => truncated[..=idx].to_string(),
        _ => truncated,
    }
}

const SENIOR_KEYWORDS: &[&str] = &[
    "director",
    "vp",
    "vice president",
    "founder",
    "co-founder",
    "cmo",
    "ceo",
    "cto",
    "coo",
    "chief",
    "head of",
    "svp",
    "senior vice",
    "managing director",
    "partner",
    "owner",
    "president",
];

/// Resolves the `"hybrid"` strategy to a concrete `"direct"`/`"gradual"`
/// choice based on seniority signals in the job title and headline.
pub fn resolve_hybrid_strategy(lead: &LeadContext) -> &'static str {
    let combined = format!(
        "{} {}",
        lead.job_title.as_deref().unwrap_or("").to_lowercase(),
        lead.headline.as_deref().unwrap_or("").to_lowercase(),
    );
    if SENIOR_KEYWORDS.iter().any(|kw| combined.contains(kw)) {
        "direct"
    } else {
        "gradual"
    }
}

pub async fn parse_search_query(
    provider: &dyn LlmProvider,
    query: &str,
) -> Result<NlFiltersResult> {
    let system = "You are a lead search query parser. Convert natural language queries into \
         structured filters for LinkedIn lead search.\n\n\
         Output JSON with these fields (use null if not mentioned): contact_job_title, \
         contact_seniority, contact_location, company_industry, company_size, company_location, \
         interpretation, confidence.\n\
         company_size must be one of: \"1-10\", \"11-50\", \"51-200\", \"201-500\", \"501-1000\", \
         \"1001-5000\", \"5001-10000\", \"10001+\".\n\
         Translate non-English location names to English. Output ONLY JSON."
        .to_string();

    let req = CompletionRequest {
        system,
        user: format!("Parse this lead search query: {query}"),
        max_tokens: 1024,
    };

    match provider.complete(&req).await {
        Ok(raw) => {
            let json_str = strip_code_fence(&raw);
            match serde_json::from_str::<serde_json::Value>(json_str) {
                Ok(data) => Ok(NlFiltersResult {
                    filters: serde_json::from_value(data.clone()).unwrap_or_default(),
                    interpretation: data
                        .get("interpretation")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Query parsed successfully")
                        .to_string(),
                    confidence: data
                        .get("confidence")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.8) as f32,
                }),
                Err(e) => {
                    warn!(error = %e, "failed to parse search filter response, using defaults");
                    Ok(NlFiltersResult {
                        filters: SearchFilters::default(),
                        interpretation: format!(
                            "Could not fully parse query, using defaults. Raw: {}",
                            raw.chars().take(200).collect::<String>()
                        ),
                        confidence: 0.3,
                    })
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "search filter parse request failed, using defaults");
            Ok(NlFiltersResult {
                filters: SearchFilters::default(),
                interpretation: "Could not parse query, provider unavailable.".to_string(),
                confidence: 0.0,
            })
        }
    }
}

pub async fn score_lead(
    provider: &dyn LlmProvider,
    lead: &LeadContext,
    business: &BusinessContext,
) -> Result<LeadScore> {
    let system = "You are a B2B lead scoring expert. Score leads based on how well they match \
         the ideal customer profile.\n\n\
         Score 0-100: 80-100 (hot) excellent fit; 50-79 (warm) good potential; 0-49 (cold) poor \
         fit.\n\
         Output JSON: {\"score\": number, \"label\": \"hot\"|\"warm\"|\"cold\", \"reason\": \
         string}. Output ONLY JSON."
        .to_string();

    let user = format!(
        "Score this lead:\nJob Title: {}\nCompany: {}\nIndustry: {}\nCompany Size: {}\n\
         Location: {}\n\nBusiness Context:\nTarget Customer: {}\nTarget Industries: {:?}\n\
         Target Company Sizes: {:?}\nTarget Titles: {:?}",
        lead.job_title.as_deref().unwrap_or("Unknown"),
        lead.company_name.as_deref().unwrap_or("Unknown"),
        lead.company_industry.as_deref().unwrap_or("Unknown"),
        lead.company_size.as_deref().unwrap_or("Unknown"),
        lead.country.as_deref().unwrap_or("Unknown"),
        business.ideal_customer.as_deref().unwrap_or("Any"),
        business.target_industries,
        business.target_company_sizes,
        business.target_job_titles,
    );

    let req = CompletionRequest {
        system,
        user,
        max_tokens: 512,
    };

    match provider.complete(&req).await {
        Ok(raw) => {
            let json_str = strip_code_fence(&raw);
            match serde_json::from_str::<serde_json::Value>(json_str) {
                Ok(data) => Ok(LeadScore {
                    score: data.get("score").and_then(|v| v.as_u64()).unwrap_or(50) as u8,
                    label: data
                        .get("label")
                        .and_then(|v| v.as_str())
                        .unwrap_or("warm")
                        .to_string(),
                    reason: data
                        .get("reason")
                        .and_then(|v| v.as_str())
                        .unwrap_or("No specific reason provided")
                        .to_string(),
                }),
                Err(e) => {
                    warn!(error = %e, "failed to parse lead scoring response, defaulting to warm");
                    Ok(LeadScore {
                        score: 50,
                        label: "warm".to_string(),
                        reason: "Could not parse AI response, defaulting to warm".to_string(),
                    })
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "lead scoring request failed, defaulting to warm");
            Ok(LeadScore {
                score: 50,
                label: "warm".to_string(),
                reason: "Scoring provider unavailable, defaulting to warm".to_string(),
            })
        }
    }
}

/// `strategy` is `"direct"`, `"gradual"`, or `"hybrid"` — callers should
/// resolve `"hybrid"` via [`resolve_hybrid_strategy`] before calling, or
/// pass it through and let this function resolve it.
pub async fn generate_connection_message(
    provider: &dyn LlmProvider,
    lead: &LeadContext,
    sender: &SenderContext,
    strategy: &str,
) -> Result<String> {
    let effective = if strategy == "hybrid" {
        resolve_hybrid_strategy(lead)
    } else {
        strategy
    };

    let system = if effective == "direct" {
        "You are a LinkedIn outreach specialist. Write a connection request that references the \
         contact's specific role/company/industry and states one clear value proposition. \
         MAXIMUM 300 characters. No flattery, no superlatives, no buzzwords. Output ONLY the \
         message."
    } else {
        "You are a LinkedIn connection request writer. Show genuine curiosity about the \
         contact's specific work, referencing their role or company. Do NOT mention selling \
         anything. MAXIMUM 300 characters. No flattery or superlatives. Output ONLY the message."
    };

    let user = format!(
        "Contact: {} — {} at {} ({})\nSender: {} ({} at {}) — {}",
        lead.first_name.as_deref().unwrap_or(""),
        lead.job_title.as_deref().unwrap_or(""),
        lead.company_name.as_deref().unwrap_or(""),
        lead.company_industry.as_deref().unwrap_or(""),
        sender.sender_name.as_deref().unwrap_or("Pablo"),
        sender.sender_role.as_deref().unwrap_or("Founder"),
        sender.sender_company.as_deref().unwrap_or(""),
        sender.sender_context.as_deref().unwrap_or(""),
    );

    let req = CompletionRequest {
        system: system.to_string(),
        user,
        max_tokens: 150,
    };

    let raw = provider.complete(&req).await?;
    Ok(truncate_connection_message(&raw))
}

pub async fn generate_follow_up(
    provider: &dyn LlmProvider,
    lead: &LeadContext,
    sender: &SenderContext,
    step_context: Option<&str>,
    conversation_history: Option<&str>,
    step_number: u32,
    total_steps: u32,
) -> Result<String> {
    let contact_name = lead.first_name.as_deref().unwrap_or("there");

    let mut system = format!(
        "You are {}, {} at {}. {}\n\n\
         You are writing follow-up message #{step_number} of {total_steps} in a LinkedIn \
         outreach sequence to {contact_name}, {} at {}.\n\n\
         RULES:\n\
         - Keep it SHORT (2-4 sentences max, under 500 characters)\n\
         - Reference the previous conversation naturally\n\
         - NO generic \"just following up\" or \"checking in\" openers\n\
         - Add new value or ask a specific question\n\
         - Sound human, not robotic\n\n",
        sender.sender_name.as_deref().unwrap_or("there"),
        sender.sender_role.as_deref().unwrap_or(""),
        sender.sender_company.as_deref().unwrap_or(""),
        sender.sender_context.as_deref().unwrap_or(""),
        lead.job_title.as_deref().unwrap_or("professional"),
        lead.company_name.as_deref().unwrap_or("your company"),
    );
    if let Some(ctx) = step_context {
        system.push_str(&format!("STEP GUIDANCE: {ctx}\n\n"));
    }
    if let Some(history) = conversation_history {
        system.push_str(&format!("CONVERSATION SO FAR:\n{history}\n\n"));
    }
    system.push_str("Output ONLY the message text, nothing else. No quotes, no labels.");

    let req = CompletionRequest {
        system,
        user: format!("Write the follow-up message for {contact_name}."),
        max_tokens: 300,
    };

    match provider.complete(&req).await {
        Ok(raw) => {
            let message = raw.trim();
            let message = message
                .strip_prefix('"')
                .and_then(|m| m.strip_suffix('"'))
                .unwrap_or(message);
            info!(contact_name, chars = message.len(), "generated sequence follow-up");
            Ok(message.to_string())
        }
        Err(e) => {
            warn!(error = %e, "failed to generate sequence follow-up, using fallback");
            Ok(format!(
                "Hi {contact_name}, wanted to follow up on our connection. Would love to hear your thoughts!"
            ))
        }
    }
}

fn phase_rules(phase: &str) -> &'static str {
    match phase {
        "apertura" => {
            "APERTURA (opening): ADVANCE to calificacion if the lead engages and asks back. \
             STAY if the reply is brief but not negative (max 2 messages in phase). NURTURE if \
             cold or dismissive without explicit refusal. EXIT on explicit rejection."
        }
        "calificacion" => {
            "CALIFICACION (qualification): ADVANCE to valor if the lead reveals growth signals \
             (scaling, investing in marketing, expanding). STAY if engaged but no growth signal \
             yet (max 2 messages). NURTURE if consolidating or cutting costs. PARK on zero fit. \
             EXIT on explicit rejection."
        }
        "valor" => {
            "VALOR (value): MEETING if the lead asks about pricing, details, or a call. STAY if \
             interested but not committed (max 2 messages). NURTURE on \"not right now\". PARK on \
             polite decline. EXIT on explicit rejection."
        }
        "nurture" => {
            "NURTURE (long-term light touch): ADVANCE to calificacion or valor if the lead \
             re-engages with business discussion or purchase intent. STAY if neutral. PARK if \
             unresponsive over many touches. EXIT on explicit rejection."
        }
        "reactivacion" => {
            "REACTIVACION (after 30+ days silence): ADVANCE to calificacion if the lead \
             re-engages positively. NURTURE if lukewarm. PARK if still unresponsive. EXIT on \
             explicit rejection."
        }
        _ => {
            "ADVANCE if the lead clearly engages. STAY if neutral. NURTURE if cold. EXIT on \
             explicit rejection."
        }
    }
}

/// Core analysis engine for the pipeline. Applies the max-2-messages post-
/// filter itself so callers never see a
/// `stay` outcome once the phase message budget is exhausted, and falls
/// back to a conservative "stay" on any provider/parse failure.
pub async fn analyze_phase_response(
    provider: &dyn LlmProvider,
    conversation_history: &str,
    current_phase: &str,
    lead: &LeadContext,
    sender: &SenderContext,
    messages_in_phase: u32,
) -> Result<PhaseAnalysisOutput> {
    let system = format!(
        "You are an AI sales development analyst evaluating a LinkedIn conversation.\n\n\
         Contact: {} at {} ({})\n\
         Current phase: {}\n\
         Messages sent in this phase: {messages_in_phase}\n\n\
         PHASE RULES:\n{}\n\n\
         CONSTRAINTS: maximum 2 outbound messages per phase — if messages_in_phase >= 2 and the \
         lead hasn't given a clear positive signal, you MUST recommend nurture, not stay. Phase \
         advancement is always based on response content, never time elapsed. Be conservative \
         with advance.\n\n\
         CONVERSATION HISTORY:\n{conversation_history}\n\n\
         Analyze the lead's LATEST response and return a JSON object with EXACTLY these keys: \
         outcome (advance|stay|nurture|park|meeting|exit), reason, sentiment (hot|warm|cold), \
         buying_signals (array), signal_strength (strong|moderate|weak|none), next_phase \
         (string or null), suggested_angle. Output ONLY JSON.",
        lead.first_name.as_deref().unwrap_or("the contact"),
        lead.company_name.as_deref().unwrap_or("their company"),
        lead.company_industry.as_deref().unwrap_or(""),
        current_phase.to_uppercase(),
        phase_rules(current_phase),
    );

    let req = CompletionRequest {
        system,
        user: "Analyze the latest response and provide your phase transition decision as JSON."
            .to_string(),
        max_tokens: 500,
    };

    let analysis = match provider.complete(&req).await {
        Ok(raw) => {
            let json_str = strip_code_fence(&raw);
            match serde_json::from_str::<PhaseAnalysisOutput>(json_str) {
                Ok(a) => a,
                Err(e) => {
                    warn!(error = %e, "failed to parse phase analysis, using conservative default");
                    PhaseAnalysisOutput::conservative_default(&e.to_string())
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "phase analysis request failed, using conservative default");
            PhaseAnalysisOutput::conservative_default(&e.to_string())
        }
    };

    Ok(apply_message_budget_override(analysis, messages_in_phase))
}

/// 2+ messages already sent in phase and the model still said "stay" forces
/// a move to nurture regardless of what it returned.
fn apply_message_budget_override(
    mut analysis: PhaseAnalysisOutput,
    messages_in_phase: u32,
) -> PhaseAnalysisOutput {
    if messages_in_phase >= 2 && analysis.outcome == "stay" {
        info!(messages_in_phase, "overriding stay -> nurture, phase message budget exhausted");
        analysis.outcome = "nurture".to_string();
        analysis.reason = format!(
            "Max messages in phase reached ({messages_in_phase}). Moving to nurture."
        );
        analysis.next_phase = Some("nurture".to_string());
    }
    analysis
}

pub async fn generate_phase_message(
    provider: &dyn LlmProvider,
    phase: &str,
    lead: &LeadContext,
    sender: &SenderContext,
    conversation_history: &str,
    suggested_angle: Option<&str>,
    messages_in_phase: u32,
) -> Result<String> {
    let (goal, max_chars): (&str, usize) = match phase {
        "apertura" => (
            "Ask ONE genuine curiosity question about their work, role, or industry. Do NOT \
             mention your company or anything you sell.",
            300,
        ),
        "calificacion" => (
            "Ask a question that naturally reveals whether they are investing in growth, \
             marketing, or visibility. Do NOT mention your offering yet.",
            350,
        ),
        "valor" => (
            "Connect their specific need with your offering. Include a soft call to action.",
            500,
        ),
        "nurture" => (
            "Send a light, low-pressure check-in referencing something recent in their world.",
            300,
        ),
        "reactivacion" => (
            "Re-open the conversation with a fresh angle after a long silence, low pressure.",
            300,
        ),
        _ => ("Continue the conversation naturally.", 400),
    };

    let mut system = format!(
        "You are {}, {} at {}. {}\n\n\
         Phase: {}. Goal: {goal}\n\
         Contact: {} — {} at {} ({})\n\
         Messages already sent in this phase: {messages_in_phase}\n\
         Keep the message under {max_chars} characters.\n",
        sender.sender_name.as_deref().unwrap_or(""),
        sender.sender_role.as_deref().unwrap_or(""),
        sender.sender_company.as_deref().unwrap_or(""),
        sender.sender_context.as_deref().unwrap_or(""),
        phase.to_uppercase(),
        lead.first_name.as_deref().unwrap_or("there"),
        lead.job_title.as_deref().unwrap_or("professional"),
        lead.company_name.as_deref().unwrap_or("your company"),
        lead.company_industry.as_deref().unwrap_or(""),
    );
    if let Some(angle) = suggested_angle {
        system.push_str(&format!("SUGGESTED ANGLE: {angle}\n"));
    }
    if !conversation_history.is_empty() {
        system.push_str(&format!("CONVERSATION SO FAR:\n{conversation_history}\n"));
    }
    system.push_str("Output ONLY the message text, nothing else.");

    let req = CompletionRequest {
        system,
        user: "Write the message for this phase.".to_string(),
        max_tokens: 300,
    };

    let raw = provider.complete(&req).await?;
    Ok(truncate_phase_message(&raw, max_chars))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_breaks_on_last_space_within_budget() {
        let long = "a".repeat(290) + " word beyond the limit keeps going";
        let result = truncate_connection_message(&long);
        assert!(result.ends_with("..."));
        assert!(result.chars().count() <= 300);
    }

    #[test]
    fn truncation_hard_cuts_when_no_space_found() {
        let long = "a".repeat(400);
        let result = truncate_connection_message(&long);
        assert_eq!(result.chars().count(), 300);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn short_message_is_untouched() {
        assert_eq!(truncate_connection_message("hello there"), "hello there");
    }

    #[test]
    fn phase_message_within_tolerance_is_untouched() {
        let msg = "a".repeat(340);
        assert_eq!(truncate_phase_message(&msg, 300), msg);
    }

    #[test]
    fn phase_message_cuts_at_last_sentence_boundary() {
        let msg = format!("{}.{}", "a".repeat(200), "a".repeat(200));
        let result = truncate_phase_message(&msg, 300);
        assert!(result.ends_with('.'));
        assert!(!result.ends_with("..."));
        assert_eq!(result.chars().count(), 201);
    }

    #[test]
    fn phase_message_hard_cuts_when_no_sentence_boundary_found() {
        let msg = "a".repeat(400);
        let result = truncate_phase_message(&msg, 300);
        assert_eq!(result.chars().count(), 300);
        assert!(!result.ends_with("..."));
    }

    #[test]
    fn hybrid_strategy_picks_direct_for_senior_title() {
        let lead = LeadContext {
            job_title: Some("VP of Sales".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_hybrid_strategy(&lead), "direct");
    }

    #[test]
    fn hybrid_strategy_picks_gradual_for_individual_contributor() {
        let lead = LeadContext {
            job_title: Some("Software Engineer".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_hybrid_strategy(&lead), "gradual");
    }

    #[test]
    fn message_budget_override_forces_nurture_after_two_messages() {
        let analysis = PhaseAnalysisOutput {
            outcome: "stay".to_string(),
            reason: "looks fine".to_string(),
            sentiment: "warm".to_string(),
            buying_signals: vec![],
            signal_strength: "weak".to_string(),
            next_phase: None,
            suggested_angle: "ask more".to_string(),
        };
        let result = apply_message_budget_override(analysis, 2);
        assert_eq!(result.outcome, "nurture");
        assert_eq!(result.next_phase.as_deref(), Some("nurture"));
    }

    #[test]
    fn message_budget_override_leaves_stay_alone_under_budget() {
        let analysis = PhaseAnalysisOutput {
            outcome: "stay".to_string(),
            reason: "looks fine".to_string(),
            sentiment: "warm".to_string(),
            buying_signals: vec![],
            signal_strength: "weak".to_string(),
            next_phase: None,
            suggested_angle: "ask more".to_string(),
        };
        let result = apply_message_budget_override(analysis, 1);
        assert_eq!(result.outcome, "stay");
    }
}

//! Plain-function repository layer — one module per entity. No ORM, no
//! hidden session: every function takes a `&Connection` and returns owned
//! data or `crate::error::DbError`. The commit point is always the caller's;
//! a repository function never opens its own transaction, so a caller can
//! compose several calls into one work-unit transaction.

pub mod automation_settings;
pub mod business_profiles;
pub mod campaigns;
pub mod enrollments;
pub mod invitation_logs;
pub mod leads;
pub mod messaging_accounts;
pub mod sequence_steps;
pub mod sequences;
pub mod users;

pub(crate) fn parse_datetime(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

pub(crate) fn parse_datetime_opt(s: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    s.map(|s| parse_datetime(&s))
}

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use rand::Rng;
use tracing::warn;

use outreach_db::types::AutomationSettings;

/// User ids that have already triggered the invalid-timezone fallback
/// warning, so a misconfigured settings row logs once rather than once per
/// tick for as long as the process runs.
fn warned_timezones() -> &'static DashMap<String, ()> {
    static WARNED: OnceLock<DashMap<String, ()>> = OnceLock::new();
    WARNED.get_or_init(DashMap::new)
}

/// Resolves `settings.timezone` to a `chrono_tz::Tz`, falling back to
/// Europe/Madrid on an invalid/unknown IANA name. Logs the fallback once per
/// offending settings row, not once per call.
fn resolve_timezone(settings: &AutomationSettings) -> Tz {
    settings.timezone.parse().unwrap_or_else(|_| {
        if warned_timezones()
            .insert(settings.user_id.clone(), ())
            .is_none()
        {
            warn!(timezone = %settings.timezone, user_id = %settings.user_id, "unknown timezone, falling back to Europe/Madrid");
        }
        chrono_tz::Europe::Madrid
    })
}

/// Whether `now` (UTC) falls within the user's configured working window,
/// re-zoned into their IANA timezone. Both the start and end bound are
/// inclusive, matching the reference model's `start_minutes <= current <=
/// end_minutes`.
pub fn in_working_hours(settings: &AutomationSettings, now: DateTime<Utc>) -> bool {
    let tz = resolve_timezone(settings);
    let local = now.with_timezone(&tz);

    // Monday = 0 .. Sunday = 6, matching Python's `weekday()`, bit i = day i.
    let day_bit = 1u8 << local.weekday().num_days_from_monday();
    if settings.working_days & day_bit == 0 {
        return false;
    }

    let current_minutes = local.hour() * 60 + local.minute();
    let start_minutes = settings.work_start_hour as u32 * 60 + settings.work_start_minute as u32;
    let end_minutes = settings.work_end_hour as u32 * 60 + settings.work_end_minute as u32;

    current_minutes >= start_minutes && current_minutes <= end_minutes
}

/// The three-part gate: daily quota, enabled flag, working hours — in that
/// order, mirroring the reference model's `can_send_invitation`.
pub fn can_send_invitation(settings: &AutomationSettings, now: DateTime<Utc>) -> bool {
    if settings.invitations_sent_today >= settings.daily_limit {
        return false;
    }
    if !settings.enabled {
        return false;
    }
    in_working_hours(settings, now)
}

/// Uniform random delay in `[min_delay_seconds, max_delay_seconds]` to
/// space out sends and avoid looking automated.
pub fn next_send_delay(settings: &AutomationSettings) -> std::time::Duration {
    let mut rng = rand::thread_rng();
    let secs = if settings.min_delay_seconds >= settings.max_delay_seconds {
        settings.min_delay_seconds
    } else {
        rng.gen_range(settings.min_delay_seconds..=settings.max_delay_seconds)
    };
    std::time::Duration::from_secs(secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_settings() -> AutomationSettings {
        AutomationSettings {
            user_id: "u1".to_string(),
            enabled: true,
            work_start_hour: 9,
            work_start_minute: 0,
            work_end_hour: 18,
            work_end_minute: 0,
            working_days: 0b0001_1111,
            timezone: "Europe/Madrid".to_string(),
            daily_limit: 40,
            min_delay_seconds: 60,
            max_delay_seconds: 300,
            min_lead_score: None,
            target_statuses: vec![],
            target_campaign_id: None,
            invitations_sent_today: 0,
            last_invitation_at: None,
            last_reset_date: None,
        }
    }

    #[test]
    fn wednesday_noon_madrid_is_working_hours() {
        let settings = base_settings();
        // 2026-07-29 12:00 UTC is a Wednesday, within CEST working hours.
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 10, 0, 0).unwrap();
        assert!(in_working_hours(&settings, now));
    }

    #[test]
    fn saturday_is_not_a_working_day_by_default() {
        let settings = base_settings();
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
        assert!(!in_working_hours(&settings, now));
    }

    #[test]
    fn exact_start_boundary_is_inclusive() {
        let settings = base_settings();
        // 09:00 Madrid (CEST = UTC+2) on a Wednesday = 07:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 7, 0, 0).unwrap();
        assert!(in_working_hours(&settings, now));
    }

    #[test]
    fn just_past_end_boundary_is_excluded() {
        let settings = base_settings();
        // 18:01 Madrid (CEST) on a Wednesday = 16:01 UTC.
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 16, 1, 0).unwrap();
        assert!(!in_working_hours(&settings, now));
    }

    #[test]
    fn quota_exhausted_blocks_sending_even_in_working_hours() {
        let mut settings = base_settings();
        settings.invitations_sent_today = 40;
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 10, 0, 0).unwrap();
        assert!(!can_send_invitation(&settings, now));
    }

    #[test]
    fn disabled_automation_blocks_sending() {
        let mut settings = base_settings();
        settings.enabled = false;
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 10, 0, 0).unwrap();
        assert!(!can_send_invitation(&settings, now));
    }

    #[test]
    fn invalid_timezone_falls_back_to_madrid() {
        let mut settings = base_settings();
        settings.timezone = "Not/ARealZone".to_string();
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 10, 0, 0).unwrap();
        assert!(in_working_hours(&settings, now));
    }
}

use rusqlite::Connection;

use crate::error::Result;

/// Initialise every table. Idempotent — safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_messaging_accounts_table(conn)?;
    create_business_profiles_table(conn)?;
    create_campaigns_table(conn)?;
    create_leads_table(conn)?;
    create_automation_settings_table(conn)?;
    create_invitation_logs_table(conn)?;
    create_sequences_table(conn)?;
    create_sequence_steps_table(conn)?;
    create_sequence_enrollments_table(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY NOT NULL,
            email         TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            active        INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn create_messaging_accounts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messaging_accounts (
            id                      TEXT PRIMARY KEY NOT NULL,
            user_id                 TEXT NOT NULL UNIQUE REFERENCES users(id),
            external_account_id     TEXT NOT NULL,
            connected               INTEGER NOT NULL DEFAULT 0,
            connection_state        TEXT NOT NULL DEFAULT 'ok',
            pending_checkpoint_type TEXT,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn create_business_profiles_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS business_profiles (
            id                    TEXT PRIMARY KEY NOT NULL,
            user_id               TEXT REFERENCES users(id),
            name                  TEXT NOT NULL,
            description           TEXT,
            ideal_customer        TEXT,
            target_industries     TEXT NOT NULL DEFAULT '[]',
            target_company_sizes  TEXT NOT NULL DEFAULT '[]',
            target_job_titles     TEXT NOT NULL DEFAULT '[]',
            target_locations      TEXT NOT NULL DEFAULT '[]',
            value_proposition     TEXT,
            key_benefits          TEXT NOT NULL DEFAULT '[]',
            sender_name           TEXT,
            sender_role           TEXT,
            sender_company        TEXT,
            sender_context        TEXT,
            is_default            INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_business_profiles_user ON business_profiles (user_id);",
    )?;
    Ok(())
}

fn create_campaigns_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS campaigns (
            id                  TEXT PRIMARY KEY NOT NULL,
            name                TEXT NOT NULL,
            description         TEXT,
            business_profile_id TEXT REFERENCES business_profiles(id),
            total_leads         INTEGER NOT NULL DEFAULT 0,
            verified_leads      INTEGER NOT NULL DEFAULT 0,
            contacted_leads     INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn create_leads_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS leads (
            id                   TEXT PRIMARY KEY NOT NULL,
            campaign_id          TEXT REFERENCES campaigns(id),
            first_name           TEXT,
            last_name            TEXT,
            full_name            TEXT,
            email                TEXT,
            email_verified       INTEGER NOT NULL DEFAULT 0,
            job_title            TEXT,
            headline             TEXT,
            company_name         TEXT,
            company_industry     TEXT,
            company_size         INTEGER,
            city                 TEXT,
            country              TEXT,
            external_profile_url TEXT,
            external_chat_id     TEXT,
            status               TEXT NOT NULL DEFAULT 'new',
            score                INTEGER,
            score_label          TEXT,
            score_reason         TEXT,
            connection_message   TEXT,
            connection_sent_at   TEXT,
            connected_at         TEXT,
            last_message_at      TEXT,
            active_sequence_id   TEXT,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_leads_campaign ON leads (campaign_id);
        CREATE INDEX IF NOT EXISTS idx_leads_active_sequence ON leads (active_sequence_id);
        CREATE INDEX IF NOT EXISTS idx_leads_external_chat ON leads (external_chat_id);",
    )?;
    Ok(())
}

fn create_automation_settings_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS automation_settings (
            user_id               TEXT PRIMARY KEY NOT NULL REFERENCES users(id),
            enabled               INTEGER NOT NULL DEFAULT 0,
            work_start_hour       INTEGER NOT NULL DEFAULT 9,
            work_start_minute     INTEGER NOT NULL DEFAULT 0,
            work_end_hour         INTEGER NOT NULL DEFAULT 18,
            work_end_minute       INTEGER NOT NULL DEFAULT 0,
            working_days          INTEGER NOT NULL DEFAULT 31,
            timezone              TEXT NOT NULL DEFAULT 'Europe/Madrid',
            daily_limit           INTEGER NOT NULL DEFAULT 40,
            min_delay_seconds     INTEGER NOT NULL DEFAULT 60,
            max_delay_seconds     INTEGER NOT NULL DEFAULT 300,
            min_lead_score        INTEGER,
            target_statuses       TEXT NOT NULL DEFAULT '[]',
            target_campaign_id    TEXT,
            invitations_sent_today INTEGER NOT NULL DEFAULT 0,
            last_invitation_at    TEXT,
            last_reset_date       TEXT
        );",
    )?;
    Ok(())
}

fn create_invitation_logs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS invitation_logs (
            id              TEXT PRIMARY KEY NOT NULL,
            user_id         TEXT NOT NULL REFERENCES users(id),
            lead_id         TEXT NOT NULL REFERENCES leads(id),
            campaign_id     TEXT,
            success         INTEGER NOT NULL,
            message_preview TEXT NOT NULL,
            status_code     INTEGER,
            error           TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_invitation_logs_user ON invitation_logs (user_id, created_at);",
    )?;
    Ok(())
}

fn create_sequences_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sequences (
            id                  TEXT PRIMARY KEY NOT NULL,
            name                TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'draft',
            mode                TEXT NOT NULL DEFAULT 'classic',
            business_profile_id TEXT REFERENCES business_profiles(id),
            message_strategy    TEXT NOT NULL DEFAULT 'hybrid',
            enrolled_count      INTEGER NOT NULL DEFAULT 0,
            active_count        INTEGER NOT NULL DEFAULT 0,
            replied_count       INTEGER NOT NULL DEFAULT 0,
            completed_count     INTEGER NOT NULL DEFAULT 0,
            meeting_count       INTEGER NOT NULL DEFAULT 0,
            parked_count        INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn create_sequence_steps_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sequence_steps (
            id             TEXT PRIMARY KEY NOT NULL,
            sequence_id    TEXT NOT NULL REFERENCES sequences(id),
            step_order     INTEGER NOT NULL,
            step_type      TEXT NOT NULL,
            delay_days     INTEGER NOT NULL DEFAULT 0,
            prompt_context TEXT,
            UNIQUE(sequence_id, step_order)
        );
        CREATE INDEX IF NOT EXISTS idx_sequence_steps_sequence ON sequence_steps (sequence_id, step_order);",
    )?;
    Ok(())
}

fn create_sequence_enrollments_table(conn: &Connection) -> Result<()> {
    // (lead_id, sequence_id) UNIQUE enforces at most one enrollment per
    // lead per sequence. The polling queries (classic/pipeline due scans)
    // filter on status and next_step_due_at, so both are indexed.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sequence_enrollments (
            id                      TEXT PRIMARY KEY NOT NULL,
            lead_id                 TEXT NOT NULL REFERENCES leads(id),
            sequence_id             TEXT NOT NULL REFERENCES sequences(id),
            status                  TEXT NOT NULL DEFAULT 'active',
            current_step_order      INTEGER NOT NULL DEFAULT 1,
            next_step_due_at        TEXT,
            last_step_completed_at  TEXT,
            messages_sent           TEXT NOT NULL DEFAULT '[]',
            failed_reason           TEXT,
            consecutive_failures    INTEGER NOT NULL DEFAULT 0,
            enrolled_at             TEXT NOT NULL,
            completed_at            TEXT,
            current_phase           TEXT,
            phase_entered_at        TEXT,
            last_response_at        TEXT,
            last_response_text      TEXT,
            phase_analysis          TEXT,
            messages_in_phase       INTEGER NOT NULL DEFAULT 0,
            nurture_count           INTEGER NOT NULL DEFAULT 0,
            reactivation_count      INTEGER NOT NULL DEFAULT 0,
            total_messages_sent     INTEGER NOT NULL DEFAULT 0,
            UNIQUE(lead_id, sequence_id)
        );
        CREATE INDEX IF NOT EXISTS idx_enrollments_status ON sequence_enrollments (status);
        CREATE INDEX IF NOT EXISTS idx_enrollments_due ON sequence_enrollments (status, next_step_due_at);
        CREATE INDEX IF NOT EXISTS idx_enrollments_sequence ON sequence_enrollments (sequence_id);",
    )?;
    Ok(())
}

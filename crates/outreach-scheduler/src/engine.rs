use std::sync::Arc;

use chrono::Utc;
use outreach_core::config::OutreachConfig;
use outreach_db::repo::users;
use outreach_engine::context::MessagingClientFactory;
use outreach_engine::{classic, connections, pipeline};
use outreach_lm::provider::LlmProvider;
use outreach_messaging::ResponseCache;
use rand::Rng;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::Result;

/// Drives the four staggered passes off one SQLite connection and one tick
/// timer. P1 runs every tick; P2/P3/P4 run on
/// their own randomized cadence so they don't all land on the same tick —
/// P3 and P4 get an extra starting offset so three passes touching the same
/// rows never collide on tick zero.
pub struct SchedulerEngine {
    conn: Connection,
    config: OutreachConfig,
    messaging_factory: Arc<dyn MessagingClientFactory>,
    lm: Arc<dyn LlmProvider>,
    cache: ResponseCache,
    tick_count: u64,
    next_p2_tick: u64,
    next_p3_tick: u64,
    next_p4_tick: u64,
}

impl SchedulerEngine {
    pub fn new(
        conn: Connection,
        config: OutreachConfig,
        messaging_factory: Arc<dyn MessagingClientFactory>,
        lm: Arc<dyn LlmProvider>,
    ) -> Self {
        let mut rng = rand::thread_rng();
        let stagger = |min: u32, max: u32| rng.gen_range(min as u64..=max as u64);
        let next_p2_tick = stagger(config.scheduler.stagger_min_ticks, config.scheduler.stagger_max_ticks);
        let next_p3_tick = next_p2_tick + stagger(25, 35);
        let next_p4_tick = next_p2_tick + stagger(40, 50);

        Self {
            conn,
            config,
            messaging_factory,
            lm,
            cache: ResponseCache::new(),
            tick_count: 0,
            next_p2_tick,
            next_p3_tick,
            next_p4_tick,
        }
    }

    /// Main event loop. Ticks at `config.scheduler.tick_seconds` until
    /// `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("outreach scheduler started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.scheduler.tick_seconds));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("outreach scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let now = Utc::now();
        self.tick_count += 1;

        self.run_p1(now).await?;

        if self.tick_count >= self.next_p2_tick {
            self.run_p2(now).await?;
            self.next_p2_tick = self.tick_count + self.next_stagger();
        }
        if self.tick_count >= self.next_p3_tick {
            self.run_p3(now).await?;
            self.next_p3_tick = self.tick_count + self.next_stagger();
        }
        if self.tick_count >= self.next_p4_tick {
            self.run_p4(now).await?;
            self.next_p4_tick = self.tick_count + self.next_stagger();
        }

        Ok(())
    }

    fn next_stagger(&self) -> u64 {
        rand::thread_rng().gen_range(
            self.config.scheduler.stagger_min_ticks as u64..=self.config.scheduler.stagger_max_ticks as u64,
        )
    }

    /// P1, every tick: send due connection requests (one user at a time, so
    /// each user's daily quota and working hours gate independently) and
    /// advance due classic follow-ups across every user.
    async fn run_p1(&mut self, now: chrono::DateTime<Utc>) -> Result<()> {
        for user in users::list_active_users(&self.conn)? {
            let messaging = match self.messaging_factory.client_for_user(&self.conn, &user.id) {
                Ok(m) => m,
                Err(e) => {
                    warn!(user_id = %user.id, error = %e, "no messaging client for user, skipping invitations");
                    continue;
                }
            };
            match classic::process_due_invitations(&self.conn, messaging.as_ref(), &self.cache, self.lm.as_ref(), &self.config, &user.id, now).await {
                Ok(sent) if sent > 0 => info!(user_id = %user.id, sent, "invitations sent"),
                Ok(_) => {}
                Err(e) => warn!(user_id = %user.id, error = %e, "invitation pass failed"),
            }
        }

        match classic::process_due_followups(&self.conn, self.messaging_factory.as_ref(), &self.cache, self.lm.as_ref(), &self.config, now).await {
            Ok(sent) if sent > 0 => info!(sent, "classic follow-ups sent"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "follow-up pass failed"),
        }
        Ok(())
    }

    /// P2: connection-acceptance detection for both classic and pipeline
    /// enrollments.
    async fn run_p2(&mut self, now: chrono::DateTime<Utc>) -> Result<()> {
        match connections::detect_connection_changes(&self.conn, self.messaging_factory.as_ref(), self.lm.as_ref(), &self.cache, &self.config, now).await {
            Ok(accepted) if accepted > 0 => info!(accepted, "connections accepted"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "connection-acceptance pass failed"),
        }
        Ok(())
    }

    /// P3: classic reply detection (auto-exit on any inbound message).
    async fn run_p3(&mut self, now: chrono::DateTime<Utc>) -> Result<()> {
        match classic::detect_replies(&self.conn, self.messaging_factory.as_ref(), &self.cache, now).await {
            Ok(replied) if replied > 0 => info!(replied, "classic replies detected"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "classic reply-detection pass failed"),
        }
        Ok(())
    }

    /// P4: pipeline reply-driven transitions plus the three time-based
    /// triggers (nurture cadence, reactivation, deferred apertura).
    async fn run_p4(&mut self, now: chrono::DateTime<Utc>) -> Result<()> {
        match pipeline::detect_pipeline_replies(&self.conn, self.messaging_factory.as_ref(), self.lm.as_ref(), &self.cache, &self.config, now).await {
            Ok(n) if n > 0 => info!(transitioned = n, "pipeline replies processed"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "pipeline reply-detection pass failed"),
        }
        match pipeline::process_time_based_pipeline_transitions(&self.conn, self.messaging_factory.as_ref(), self.lm.as_ref(), &self.cache, &self.config, now).await {
            Ok(n) if n > 0 => info!(handled = n, "pipeline time-based triggers processed"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "pipeline time-based trigger pass failed"),
        }
        Ok(())
    }
}

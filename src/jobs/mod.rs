use crate::context::AppContext;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::refresh_token_purge_job(Arc::clone(&self)));
        tokio::spawn(Self::rate_limit_compaction_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Purge expired refresh tokens (runs every hour)
    async fn refresh_token_purge_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            info!("Running expired refresh token purge");

            match tasks::purge_expired_refresh_tokens(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Purged {} expired refresh tokens", count);
                    } else {
                        info!("Refresh token purge: no expired tokens found");
                    }
                }
                Err(e) => error!("Failed to purge expired refresh tokens: {}", e),
            }
        }
    }

    /// Compact rate limiter state (runs every minute)
    async fn rate_limit_compaction_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            let tracked = tasks::compact_rate_limits(&scheduler.context);
            debug!("Rate limiter tracking {} keys", tracked);
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}

use crate::context::AppContext;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
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
        if self.context.config.session.sweep_interval.is_zero() {
            info!("Session sweep disabled");
            return;
        }

        info!("Starting background job scheduler");
        tokio::spawn(Self::expired_session_cleanup_job(Arc::clone(&self)));
    }

    /// Sweep expired sessions on the configured interval
    async fn expired_session_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(scheduler.context.config.session.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match tasks::cleanup_expired_sessions(&scheduler.context).await {
                Ok(0) => debug!("Session sweep: nothing expired"),
                Ok(count) => info!("Session sweep removed {} expired sessions", count),
                Err(e) => error!("Failed to sweep expired sessions: {}", e),
            }
        }
    }
}

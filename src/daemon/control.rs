use std::collections::HashMap;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::{
    blocking::{policy::BlockPolicy, registry::BlockStatus},
    error::BlockError,
    ledger::UsageLedger,
    notify::NotifiedSet,
    rules::{classify, threshold::BlockDirective, Category},
};

use super::tracker::TrackerHandle;

/// Everything the console can do with a running daemon.
pub struct Core<L> {
    policy: BlockPolicy<L>,
    tracker: TrackerHandle,
}

impl<L: UsageLedger> Core<L> {
    pub fn new(policy: BlockPolicy<L>, tracker: TrackerHandle) -> Self {
        Self { policy, tracker }
    }

    pub async fn start_tracking(&self) -> bool {
        self.tracker.start().await
    }

    pub async fn stop_tracking(&self) {
        self.tracker.stop().await
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    /// Records `seconds` of usage ending now and checks the limit right away.
    pub async fn manual_add_usage(
        &self,
        app_name: &str,
        seconds: u32,
    ) -> Result<Option<BlockDirective>> {
        let app_name = app_name.trim();
        if app_name.is_empty() {
            bail!("Application name can't be empty");
        }

        let end = self.policy.clock().time();
        let start = end - Duration::seconds(i64::from(seconds));
        let Some(session) = self.policy.ledger().append(app_name, start, end).await? else {
            debug!("Ignored empty manual entry for {app_name}");
            return Ok(None);
        };
        info!(
            "Added {}s of {} manually",
            session.duration.num_seconds(),
            session.app_name
        );

        self.policy.evaluate_and_maybe_block(app_name).await
    }

    pub fn manual_block(&self, key: &str, minutes: u32) -> Result<DateTime<Utc>, BlockError> {
        let until = self.policy.registry().block(key, minutes)?;
        info!("{key} manually blocked until {until}");
        Ok(until)
    }

    pub fn unblock(&self, key: &str) -> bool {
        self.policy.registry().unblock(key)
    }

    pub fn blocked_snapshot(&self) -> Vec<BlockStatus> {
        self.policy.registry().snapshot()
    }

    pub fn classify(&self, name: &str) -> Category {
        classify(name, &self.policy.config().rules())
    }

    pub async fn evaluate_and_maybe_block(&self, app_name: &str) -> Result<Option<BlockDirective>> {
        self.policy.evaluate_and_maybe_block(app_name).await
    }

    pub fn notified_snapshot(&self) -> NotifiedSet {
        self.policy.alerts().snapshot()
    }

    /// Seconds per application for the current local day.
    pub async fn today_totals(&self) -> Result<HashMap<String, i64>> {
        let today = self.policy.clock().today();
        Ok(self.policy.ledger().totals_for_date(today).await?)
    }
}

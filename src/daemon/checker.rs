use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument};

use crate::{blocking::policy::BlockPolicy, ledger::UsageLedger, rules::classify};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub blocked: Vec<String>,
    pub goals_reached: Vec<u32>,
}

/// Re-evaluates all of today's usage on a timer. Usage added manually never passes through the
/// tracker, so without this check it would never trigger a block.
pub struct PeriodicChecker<L> {
    policy: BlockPolicy<L>,
    shutdown: CancellationToken,
    check_frequency: Duration,
}

impl<L: UsageLedger> PeriodicChecker<L> {
    pub fn new(policy: BlockPolicy<L>, shutdown: CancellationToken, check_frequency: Duration) -> Self {
        Self {
            policy,
            shutdown,
            check_frequency,
        }
    }

    pub async fn check_once(&self) -> Result<CheckReport> {
        let config = self.policy.config().clone();
        tokio::task::spawn_blocking(move || config.reload()).await?;
        let config = self.policy.config();
        let rules = config.rules();
        let settings = config.settings();
        let goals = config.goals();

        let evicted = self.policy.registry().sweep();
        if evicted > 0 {
            debug!("{evicted} blocks expired");
        }

        let today = self.policy.clock().today();
        self.policy.alerts().roll_over(today);
        let totals = self.policy.ledger().totals_for_date(today).await?;

        let mut report = CheckReport::default();
        let mut apps = totals.keys().collect::<Vec<_>>();
        apps.sort();
        for app in apps {
            match self.policy.apply(app, &totals, &rules, &settings, today) {
                Ok(Some(directive)) if !report.blocked.contains(&directive.key) => {
                    report.blocked.push(directive.key)
                }
                Ok(_) => {}
                Err(e) => error!("Failed to apply limits to {app}: {e:?}"),
            }
        }

        for goal in goals.iter() {
            let seconds: i64 = totals
                .iter()
                .filter(|(app, _)| classify(app, &rules) == goal.category)
                .map(|(_, seconds)| *seconds)
                .sum();
            if seconds >= goal.target_seconds() {
                self.policy.alerts().goal_reached(today, goal);
                report.goals_reached.push(goal.id);
            }
        }

        Ok(report)
    }

    /// Executes the check loop until shutdown.
    pub async fn run(self) -> Result<()> {
        let clock = self.policy.clock();
        let mut check_point = clock.instant();
        loop {
            check_point += self.check_frequency;

            match self
                .check_once()
                .instrument(info_span!("Checking limits and goals"))
                .await
            {
                Ok(report) => debug!("Check finished {report:?}"),
                Err(e) => error!("Encountered an error during limit check {e:?}"),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = clock.sleep_until(check_point) => ()
            }
        }
    }
}

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::{
    config::{Settings, SharedConfig},
    ledger::UsageLedger,
    notify::Alerts,
    rules::{
        classify,
        threshold::{evaluate, BlockDirective},
        Category, RuleSet,
    },
    utils::clock::Clock,
};

use super::registry::BlockRegistry;

/// Connects threshold evaluation with the registry. Shared by the tracker, the periodic check and
/// manual commands, so every path blocks the same way.
pub struct BlockPolicy<L> {
    ledger: L,
    config: Arc<SharedConfig>,
    registry: Arc<BlockRegistry>,
    alerts: Arc<Alerts>,
    clock: Arc<dyn Clock>,
}

impl<L: Clone> Clone for BlockPolicy<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            alerts: self.alerts.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<L: UsageLedger> BlockPolicy<L> {
    pub fn new(
        ledger: L,
        config: Arc<SharedConfig>,
        registry: Arc<BlockRegistry>,
        alerts: Arc<Alerts>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            config,
            registry,
            alerts,
            clock,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &Arc<SharedConfig> {
        &self.config
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn alerts(&self) -> &Alerts {
        &self.alerts
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Loads today's usage and blocks `app_name` if it went over the limit. Calling this again
    /// while the app is blocked only refreshes the expiry.
    pub async fn evaluate_and_maybe_block(&self, app_name: &str) -> Result<Option<BlockDirective>> {
        let rules = self.config.rules();
        let settings = self.config.settings();
        if limit_scope(app_name, &rules, &settings) == LimitScope::Exempt {
            debug!("{app_name} isn't subject to usage limits");
            return Ok(None);
        }

        let today = self.clock.today();
        let totals = self.ledger.totals_for_date(today).await?;
        self.apply(app_name, &totals, &rules, &settings, today)
    }

    /// Same as [Self::evaluate_and_maybe_block] with totals the caller already loaded.
    pub fn apply(
        &self,
        app_name: &str,
        today_totals: &HashMap<String, i64>,
        rules: &RuleSet,
        settings: &Settings,
        today: NaiveDate,
    ) -> Result<Option<BlockDirective>> {
        let directive = match limit_scope(app_name, rules, settings) {
            LimitScope::Exempt => None,
            LimitScope::Aggregated => evaluate(app_name, today_totals, rules, settings),
            LimitScope::Own => evaluate(app_name, &own_usage(app_name, today_totals), rules, settings),
        };
        let Some(directive) = directive else {
            return Ok(None);
        };

        let until = self
            .registry
            .block(&directive.key, directive.duration_minutes)?;
        info!("{app_name} went over the limit, {} is blocked until {until}", directive.key);
        self.alerts.limit_reached(today, &directive, until);
        Ok(Some(directive))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitScope {
    /// Productive apps are never blocked.
    Exempt,
    /// Neutral apps are limited by their own usage only.
    Own,
    /// Distracting apps also count usage of everything matched by an unproductive keyword.
    Aggregated,
}

fn limit_scope(app_name: &str, rules: &RuleSet, settings: &Settings) -> LimitScope {
    let name = app_name.trim().to_lowercase();
    if name.is_empty() {
        return LimitScope::Exempt;
    }
    let declared = settings.unproductive_apps.iter().any(|declared| {
        let declared = declared.trim().to_lowercase();
        !declared.is_empty() && (name.contains(&declared) || declared.contains(&name))
    });
    match classify(&name, rules) {
        Category::Unproductive => LimitScope::Aggregated,
        _ if declared => LimitScope::Aggregated,
        Category::Productive => LimitScope::Exempt,
        Category::Neutral => LimitScope::Own,
    }
}

fn own_usage(app_name: &str, today_totals: &HashMap<String, i64>) -> HashMap<String, i64> {
    let name = app_name.trim().to_lowercase();
    today_totals
        .iter()
        .filter(|(app, _)| app.to_lowercase().contains(&name))
        .map(|(app, seconds)| (app.clone(), *seconds))
        .collect()
}

#[cfg(test)]
pub mod tests {
    use std::{num::NonZeroU32, path::PathBuf, sync::Arc};

    use anyhow::Result;
    use chrono::Duration;
    use tempfile::TempDir;

    use crate::{
        blocking::registry::BlockRegistry,
        config::{ConfigStore, JsonConfigStore, Settings, SharedConfig},
        ledger::{memory::MemoryLedger, UsageLedger},
        notify::{Alerts, MockNotificationSink, NotificationSink},
        rules::RuleSet,
        utils::clock::{test_clock::TestClock, Clock},
    };

    use super::{BlockDirective, BlockPolicy};

    pub struct PolicyFixture {
        pub clock: Arc<TestClock>,
        pub ledger: Arc<MemoryLedger>,
        pub registry: Arc<BlockRegistry>,
        pub config: Arc<SharedConfig>,
        pub policy: BlockPolicy<Arc<MemoryLedger>>,
        dir: TempDir,
    }

    impl PolicyFixture {
        pub fn config_dir(&self) -> PathBuf {
            self.dir.path().to_path_buf()
        }
    }

    /// Limit of 60 minutes, blocks of 30 minutes, `chrome` declared as distracting.
    pub fn fixture(sink: impl NotificationSink + 'static) -> PolicyFixture {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().to_path_buf()).unwrap();
        store
            .save_rules(&RuleSet::new(["code"], ["youtube", "reddit"]))
            .unwrap();
        store
            .save_settings(&Settings {
                unproductive_apps: vec!["chrome".into()],
                usage_limit_minutes: NonZeroU32::new(60).unwrap(),
                block_duration_minutes: NonZeroU32::new(30).unwrap(),
            })
            .unwrap();

        let clock = Arc::new(TestClock::new());
        let ledger = Arc::new(MemoryLedger::default());
        let registry = Arc::new(BlockRegistry::new(clock.clone()));
        let config = Arc::new(SharedConfig::load(store));
        let policy = BlockPolicy::new(
            ledger.clone(),
            config.clone(),
            registry.clone(),
            Arc::new(Alerts::new(Box::new(sink))),
            clock.clone(),
        );
        PolicyFixture {
            clock,
            ledger,
            registry,
            config,
            policy,
            dir,
        }
    }

    pub fn quiet_sink() -> MockNotificationSink {
        let mut sink = MockNotificationSink::new();
        sink.expect_notify().return_const(());
        sink
    }

    #[tokio::test]
    async fn test_blocks_over_limit_once() -> Result<()> {
        let mut sink = MockNotificationSink::new();
        sink.expect_notify().times(1).return_const(());
        let fixture = fixture(sink);
        let now = fixture.clock.time();
        fixture
            .ledger
            .append("YouTube - Chrome", now - Duration::minutes(61), now)
            .await?;

        let first = fixture.policy.evaluate_and_maybe_block("YouTube - Chrome").await?;
        let second = fixture.policy.evaluate_and_maybe_block("YouTube - Chrome").await?;

        assert_eq!(first.unwrap().key, "chrome");
        assert_eq!(second.unwrap().key, "chrome");
        let snapshot = fixture.registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].minutes_remaining, 30);
        Ok(())
    }

    #[tokio::test]
    async fn test_under_limit_doesnt_block() -> Result<()> {
        let fixture = fixture(MockNotificationSink::new());
        let now = fixture.clock.time();
        fixture
            .ledger
            .append("reddit", now - Duration::minutes(59), now)
            .await?;

        assert!(fixture.policy.evaluate_and_maybe_block("reddit").await?.is_none());
        assert!(fixture.registry.snapshot().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_productive_apps_are_never_limited() -> Result<()> {
        let fixture = fixture(MockNotificationSink::new());
        let now = fixture.clock.time();
        fixture
            .ledger
            .append("reddit", now - Duration::minutes(120), now)
            .await?;

        assert!(fixture.policy.evaluate_and_maybe_block("code").await?.is_none());
        assert!(fixture.policy.evaluate_and_maybe_block("calculator").await?.is_none());
        assert!(fixture.registry.snapshot().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_neutral_app_is_blocked_by_own_usage() -> Result<()> {
        let fixture = fixture(quiet_sink());
        let now = fixture.clock.time();
        fixture
            .ledger
            .append("solitaire", now - Duration::minutes(90), now)
            .await?;
        fixture
            .ledger
            .append("notes", now - Duration::minutes(10), now)
            .await?;
        fixture
            .ledger
            .append("reddit", now - Duration::minutes(59), now)
            .await?;

        let directive = fixture.policy.evaluate_and_maybe_block("Solitaire").await?;
        assert_eq!(
            directive,
            Some(BlockDirective {
                key: "solitaire".into(),
                duration_minutes: 30
            })
        );
        // Unproductive usage doesn't count towards a neutral app.
        assert!(fixture.policy.evaluate_and_maybe_block("notes").await?.is_none());
        assert!(fixture.registry.is_blocked("solitaire"));
        assert!(!fixture.registry.is_blocked("notes"));
        Ok(())
    }

    #[tokio::test]
    async fn test_rule_edits_apply_immediately() -> Result<()> {
        let fixture = fixture(quiet_sink());
        let now = fixture.clock.time();
        fixture
            .ledger
            .append("solitaire", now - Duration::minutes(90), now)
            .await?;
        fixture
            .config
            .replace_rules(RuleSet::new(["code", "solitaire"], ["youtube"]))?;
        assert!(fixture.policy.evaluate_and_maybe_block("solitaire").await?.is_none());

        fixture
            .config
            .replace_rules(RuleSet::new(["code"], ["solitaire"]))?;

        let directive = fixture.policy.evaluate_and_maybe_block("solitaire").await?;
        assert_eq!(directive.unwrap().key, "solitaire");
        assert!(fixture.registry.is_blocked("solitaire"));
        Ok(())
    }
}

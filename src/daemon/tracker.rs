use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    blocking::policy::BlockPolicy, error::SensorError, ledger::UsageLedger,
    window_api::ActivitySensor,
};

/// Span of usage that ended with an app switch or a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSession {
    pub app_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug)]
struct OpenSession {
    app_name: String,
    start: DateTime<Utc>,
}

/// Turns a sequence of samples into sessions. A session closes exactly when a different app is
/// sampled. Missing samples keep the current session open.
#[derive(Debug, Default)]
pub struct SessionTracker {
    open: Option<OpenSession>,
}

impl SessionTracker {
    pub fn observe(&mut self, sample: Option<&str>, now: DateTime<Utc>) -> Option<ClosedSession> {
        let app_name = sample?;
        match &self.open {
            Some(open) if open.app_name == app_name => None,
            _ => {
                let closed = self.flush(now);
                self.open = Some(OpenSession {
                    app_name: app_name.to_string(),
                    start: now,
                });
                closed
            }
        }
    }

    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<ClosedSession> {
        self.open.take().map(|open| ClosedSession {
            app_name: open.app_name,
            start: open.start,
            end: now,
        })
    }

    pub fn current_app(&self) -> Option<&str> {
        self.open.as_ref().map(|v| v.app_name.as_str())
    }
}

enum TrackerCommand {
    Start(oneshot::Sender<bool>),
    Stop(oneshot::Sender<()>),
}

/// Control side of [AutoTracker]. Cheap to clone.
#[derive(Clone)]
pub struct TrackerHandle {
    commands: mpsc::Sender<TrackerCommand>,
    tracking: Arc<AtomicBool>,
}

impl TrackerHandle {
    /// Returns false if the platform can't sample the active window or the tracker is gone.
    pub async fn start(&self) -> bool {
        let (reply, response) = oneshot::channel();
        if self.commands.send(TrackerCommand::Start(reply)).await.is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Resolves once the open session was persisted.
    pub async fn stop(&self) {
        let (reply, response) = oneshot::channel();
        if self.commands.send(TrackerCommand::Stop(reply)).await.is_ok() {
            let _ = response.await;
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }
}

/// Samples the active application while tracking is on, persists sessions and evaluates limits at
/// every session boundary.
pub struct AutoTracker<L> {
    sensor: Box<dyn ActivitySensor>,
    policy: BlockPolicy<L>,
    commands: mpsc::Receiver<TrackerCommand>,
    shutdown: CancellationToken,
    sample_frequency: Duration,
    sessions: SessionTracker,
    tracking: Arc<AtomicBool>,
}

impl<L: UsageLedger> AutoTracker<L> {
    pub fn new(
        sensor: Box<dyn ActivitySensor>,
        policy: BlockPolicy<L>,
        shutdown: CancellationToken,
        sample_frequency: Duration,
    ) -> (Self, TrackerHandle) {
        let (sender, commands) = mpsc::channel(4);
        let tracking = Arc::new(AtomicBool::new(false));
        let tracker = Self {
            sensor,
            policy,
            commands,
            shutdown,
            sample_frequency,
            sessions: SessionTracker::default(),
            tracking: tracking.clone(),
        };
        let handle = TrackerHandle {
            commands: sender,
            tracking,
        };
        (tracker, handle)
    }

    fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    fn sample(&mut self) -> Option<String> {
        match self.sensor.sample_active_app() {
            Ok(sample) => sample,
            Err(e) => {
                // Treated as a missing sample, the open session stays open.
                warn!("Encountered an error during sampling {e}");
                None
            }
        }
    }

    async fn start(&mut self) -> bool {
        if self.is_tracking() {
            return true;
        }
        let sample = match self.sensor.sample_active_app() {
            Ok(sample) => sample,
            Err(SensorError::Unavailable { reason }) => {
                warn!("Tracking can't be started, {reason}");
                return false;
            }
            Err(e) => {
                warn!("First sample failed {e}");
                None
            }
        };
        self.tracking.store(true, Ordering::Release);
        info!("Tracking started");
        self.record(sample).await;
        true
    }

    async fn stop(&mut self) {
        if !self.is_tracking() {
            return;
        }
        self.tracking.store(false, Ordering::Release);
        let now = self.policy.clock().time();
        if let Some(closed) = self.sessions.flush(now) {
            self.close(closed).await;
        }
        info!("Tracking stopped");
    }

    async fn record(&mut self, sample: Option<String>) {
        let now = self.policy.clock().time();
        if let Some(closed) = self.sessions.observe(sample.as_deref(), now) {
            self.close(closed).await;
        }
        debug!("Current app {:?}", self.sessions.current_app());
    }

    /// Persisting or evaluating can fail, the loop goes on either way.
    async fn close(&mut self, closed: ClosedSession) {
        match self
            .policy
            .ledger()
            .append(&closed.app_name, closed.start, closed.end)
            .await
        {
            Ok(Some(session)) => debug!("Persisted {session:?}"),
            Ok(None) => debug!("Dropped empty session of {}", closed.app_name),
            Err(e) => error!("Failed to persist session of {}: {e}", closed.app_name),
        }

        if let Err(e) = self.policy.evaluate_and_maybe_block(&closed.app_name).await {
            error!("Failed to evaluate limits for {}: {e:?}", closed.app_name);
        }
    }

    /// Executes the tracker event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut sample_point = self.policy.clock().instant();
        let mut commands_open = true;
        loop {
            let tracking = self.is_tracking();
            let clock = self.policy.clock();
            tokio::select! {
                // Flushing on shutdown keeps the last session when the process exits cleanly.
                _ = self.shutdown.cancelled() => {
                    self.stop().await;
                    return Ok(())
                }
                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(TrackerCommand::Start(reply)) => {
                            let started = self.start().await;
                            sample_point = self.policy.clock().instant() + self.sample_frequency;
                            let _ = reply.send(started);
                        }
                        Some(TrackerCommand::Stop(reply)) => {
                            self.stop().await;
                            let _ = reply.send(());
                        }
                        None => commands_open = false,
                    }
                }
                _ = clock.sleep_until(sample_point), if tracking => {
                    sample_point += self.sample_frequency;
                    let sample = self.sample();
                    self.record(sample).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, time::Duration};

    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use crate::{
        blocking::policy::tests::{fixture, quiet_sink},
        error::SensorError,
        ledger::UsageLedger,
        utils::{
            clock::{test_clock::TEST_START_DATE, Clock},
            logging::TEST_LOGGING,
        },
        window_api::MockActivitySensor,
    };

    use super::{AutoTracker, SessionTracker};

    #[test]
    fn test_session_per_switch() {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let mut tracker = SessionTracker::default();
        let samples = ["a", "a", "b", "b", "a"];
        let mut closed = vec![];
        for (index, sample) in samples.iter().enumerate() {
            let now = start + ChronoDuration::seconds(8 * index as i64);
            closed.extend(tracker.observe(Some(sample), now));
        }
        closed.extend(tracker.flush(start + ChronoDuration::seconds(40)));

        let summary = closed
            .iter()
            .map(|v| (v.app_name.as_str(), (v.end - v.start).num_seconds()))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![("a", 16), ("b", 16), ("a", 8)]);
    }

    #[test]
    fn test_missing_sample_keeps_session() {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let mut tracker = SessionTracker::default();
        assert!(tracker.observe(Some("a"), start).is_none());
        assert!(tracker
            .observe(None, start + ChronoDuration::seconds(8))
            .is_none());
        assert_eq!(tracker.current_app(), Some("a"));
        let closed = tracker
            .observe(Some("b"), start + ChronoDuration::seconds(16))
            .unwrap();
        assert_eq!(closed.end - closed.start, ChronoDuration::seconds(16));
    }

    #[test]
    fn test_flush_without_session() {
        let mut tracker = SessionTracker::default();
        assert!(tracker.flush(Utc::now()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_persists_sessions() {
        *TEST_LOGGING;
        let fixture = fixture(quiet_sink());
        let mut samples = VecDeque::from(["a", "a", "b", "b", "a"]);
        let mut sensor = MockActivitySensor::new();
        sensor
            .expect_sample_active_app()
            .times(5)
            .returning(move || Ok(samples.pop_front().map(String::from)));

        let shutdown = CancellationToken::new();
        let (tracker, handle) = AutoTracker::new(
            Box::new(sensor),
            fixture.policy.clone(),
            shutdown.clone(),
            Duration::from_secs(8),
        );

        let started_at = fixture.clock.time();
        let (result, _) = tokio::join!(tracker.run(), async {
            assert!(handle.start().await);
            assert!(handle.is_tracking());
            // Samples happen at 0, 8, 16, 24 and 32 seconds.
            tokio::time::sleep(Duration::from_secs(36)).await;
            handle.stop().await;
            assert!(!handle.is_tracking());
            shutdown.cancel();
        });
        result.unwrap();

        let sessions = fixture.ledger.all();
        let summary = sessions
            .iter()
            .map(|v| {
                (
                    v.app_name.to_string(),
                    (v.start - started_at).num_seconds(),
                    v.duration.num_seconds(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("a".to_string(), 0, 16),
                ("b".to_string(), 16, 16),
                ("a".to_string(), 32, 4),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_sensor_stays_idle() {
        let fixture = fixture(quiet_sink());
        let mut sensor = MockActivitySensor::new();
        sensor.expect_sample_active_app().times(1).returning(|| {
            Err(SensorError::Unavailable {
                reason: "test".into(),
            })
        });

        let shutdown = CancellationToken::new();
        let (tracker, handle) = AutoTracker::new(
            Box::new(sensor),
            fixture.policy.clone(),
            shutdown.clone(),
            Duration::from_secs(8),
        );

        let (result, _) = tokio::join!(tracker.run(), async {
            assert!(!handle.start().await);
            assert!(!handle.is_tracking());
            tokio::time::sleep(Duration::from_secs(30)).await;
            // Stopping while idle does nothing.
            handle.stop().await;
            shutdown.cancel();
        });
        result.unwrap();
        assert!(fixture.ledger.all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_over_limit_blocks() {
        let fixture = fixture(quiet_sink());
        let now = fixture.clock.time();
        fixture
            .ledger
            .append(
                "youtube",
                now - ChronoDuration::minutes(59) - ChronoDuration::seconds(55),
                now,
            )
            .await
            .unwrap();

        let mut samples = VecDeque::from(["youtube", "code"]);
        let mut sensor = MockActivitySensor::new();
        sensor
            .expect_sample_active_app()
            .returning(move || Ok(samples.pop_front().map(String::from)));

        let shutdown = CancellationToken::new();
        let (tracker, handle) = AutoTracker::new(
            Box::new(sensor),
            fixture.policy.clone(),
            shutdown.clone(),
            Duration::from_secs(8),
        );

        let (result, _) = tokio::join!(tracker.run(), async {
            assert!(handle.start().await);
            assert!(!fixture.registry.is_blocked("youtube"));
            // Switching to `code` at 8 seconds closes the youtube session and crosses the limit.
            tokio::time::sleep(Duration::from_secs(12)).await;
            assert!(fixture.registry.is_blocked("youtube"));
            shutdown.cancel();
        });
        result.unwrap();
        assert_eq!(fixture.registry.snapshot().len(), 1);
    }
}

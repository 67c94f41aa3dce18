use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use checker::PeriodicChecker;
use control::Core;
use sysinfo::get_current_pid;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracker::AutoTracker;

use crate::{
    blocking::{
        enforcer::Enforcer,
        policy::BlockPolicy,
        process_table::{ProcessTable, SysinfoProcessTable},
        registry::BlockRegistry,
    },
    cli::console::run_console,
    config::{JsonConfigStore, SharedConfig},
    ledger::{file_ledger::FileLedger, UsageLedger},
    notify::{Alerts, DesktopNotifier, NotificationSink, TracingNotifier},
    utils::clock::{Clock, DefaultClock},
    window_api::{ActivitySensor, GenericSensor},
};

pub mod args;
pub mod checker;
pub mod control;
pub mod shutdown;
pub mod tracker;

const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(8);
const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default)]
pub struct DaemonOptions {
    /// Start tracking the active window right away.
    pub track: bool,
    /// Read commands from stdin. Otherwise the daemon waits for a shutdown signal.
    pub interactive: bool,
    pub desktop_notifications: bool,
}

struct Components<P> {
    tracker: AutoTracker<Arc<FileLedger>>,
    enforcer: Enforcer<P>,
    checker: PeriodicChecker<Arc<FileLedger>>,
    core: Core<Arc<FileLedger>>,
}

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, options: DaemonOptions) -> Result<()> {
    let shutdown = CancellationToken::new();
    let sink: Box<dyn NotificationSink> = if options.desktop_notifications {
        Box::new(DesktopNotifier::new())
    } else {
        Box::new(TracingNotifier)
    };
    let protected_pid = get_current_pid().ok().map(|pid| pid.as_u32());

    let Components {
        tracker,
        enforcer,
        checker,
        core,
    } = create_components(
        &dir,
        Box::new(GenericSensor::new()),
        SysinfoProcessTable::new(),
        sink,
        Arc::new(DefaultClock),
        &shutdown,
        protected_pid,
    )?;

    info!("Daemon started in {dir:?}");
    run_components(
        &shutdown,
        tracker,
        enforcer,
        checker,
        run_frontend(&core, &shutdown, options),
    )
    .await;
    info!("Daemon stopped");
    Ok(())
}

fn create_components<P: ProcessTable + Send + 'static>(
    dir: &Path,
    sensor: Box<dyn ActivitySensor>,
    processes: P,
    sink: Box<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    shutdown: &CancellationToken,
    protected_pid: Option<u32>,
) -> Result<Components<P>> {
    let config = Arc::new(SharedConfig::load(JsonConfigStore::new(dir.to_path_buf())?));
    let ledger = Arc::new(FileLedger::new(dir.join("sessions"))?);
    let registry = Arc::new(BlockRegistry::new(clock.clone()));
    let alerts = Arc::new(Alerts::new(sink));
    let policy = BlockPolicy::new(ledger, config, registry.clone(), alerts, clock.clone());

    let (tracker, handle) = AutoTracker::new(
        sensor,
        policy.clone(),
        shutdown.clone(),
        DEFAULT_SAMPLE_INTERVAL,
    );
    let enforcer = Enforcer::new(
        registry,
        processes,
        shutdown.clone(),
        DEFAULT_SCAN_INTERVAL,
        clock,
        protected_pid,
    );
    let checker = PeriodicChecker::new(policy.clone(), shutdown.clone(), DEFAULT_CHECK_INTERVAL);

    Ok(Components {
        tracker,
        enforcer,
        checker,
        core: Core::new(policy, handle),
    })
}

/// Drives every loop until shutdown. The frontend finishing also shuts the daemon down.
async fn run_components<L: UsageLedger, P: ProcessTable + Send + 'static>(
    shutdown: &CancellationToken,
    tracker: AutoTracker<L>,
    enforcer: Enforcer<P>,
    checker: PeriodicChecker<L>,
    frontend: impl Future<Output = Result<()>>,
) {
    let (_, tracker_result, enforcer_result, checker_result, frontend_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown.clone()),
        tracker.run(),
        enforcer.run(),
        checker.run(),
        async {
            let result = frontend.await;
            shutdown.cancel();
            result
        },
    );

    if let Err(e) = tracker_result {
        error!("Tracker got an error {e:?}");
    }
    if let Err(e) = enforcer_result {
        error!("Enforcer got an error {e:?}");
    }
    if let Err(e) = checker_result {
        error!("Checker got an error {e:?}");
    }
    if let Err(e) = frontend_result {
        error!("Console got an error {e:?}");
    }
}

async fn run_frontend<L: UsageLedger>(
    core: &Core<L>,
    shutdown: &CancellationToken,
    options: DaemonOptions,
) -> Result<()> {
    if options.track && !core.start_tracking().await {
        warn!("Active window tracking is unavailable, only manual usage is checked");
    }
    if options.interactive {
        run_console(core, shutdown.clone()).await
    } else {
        shutdown.cancelled().await;
        Ok(())
    }
}

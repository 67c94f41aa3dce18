use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

use crate::utils::clock::Clock;

use super::{process_table::ProcessTable, registry::BlockRegistry};

/// Outcome of one scan over the process table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnforcementReport {
    pub matched: usize,
    pub terminated: usize,
    pub failed: usize,
}

/// Terminates every live process whose name contains a blocked key.
///
/// Matching is a plain substring check, so a `chrome` block also closes `chromedriver`. That's
/// intentional: the names of windows, executables and helpers rarely line up.
pub struct Enforcer<P> {
    registry: Arc<BlockRegistry>,
    processes: P,
    shutdown: CancellationToken,
    scan_frequency: Duration,
    time_provider: Arc<dyn Clock>,
    /// Our own process is never terminated, whatever the keys say.
    protected_pid: Option<u32>,
}

impl<P: ProcessTable + Send + 'static> Enforcer<P> {
    pub fn new(
        registry: Arc<BlockRegistry>,
        processes: P,
        shutdown: CancellationToken,
        scan_frequency: Duration,
        time_provider: Arc<dyn Clock>,
        protected_pid: Option<u32>,
    ) -> Self {
        Self {
            registry,
            processes,
            shutdown,
            scan_frequency,
            time_provider,
            protected_pid,
        }
    }

    /// Runs a single scan on the current thread.
    pub fn enforce_once(&mut self) -> EnforcementReport {
        let keys = self.registry.active_keys();
        scan(&mut self.processes, &keys, self.protected_pid)
    }

    /// Executes the enforcement loop until shutdown. Refreshing the process list takes a while, so
    /// every scan runs on the blocking pool with the keys taken beforehand.
    pub async fn run(self) -> Result<()> {
        let Self {
            registry,
            mut processes,
            shutdown,
            scan_frequency,
            time_provider,
            protected_pid,
        } = self;

        let mut scan_point = time_provider.instant();
        loop {
            scan_point += scan_frequency;

            let keys = registry.active_keys();
            if !keys.is_empty() {
                let span = info_span!("Enforcing blocks");
                let (returned, report) = tokio::task::spawn_blocking(move || {
                    let report = span.in_scope(|| scan(&mut processes, &keys, protected_pid));
                    (processes, report)
                })
                .await?;
                processes = returned;
                if report.matched > 0 {
                    debug!("Enforcement finished {:?}", report);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    return Ok(())
                }
                _ = time_provider.sleep_until(scan_point) => ()
            }
        }
    }
}

/// Failing to terminate one process doesn't stop the scan.
fn scan(
    processes: &mut impl ProcessTable,
    keys: &[String],
    protected_pid: Option<u32>,
) -> EnforcementReport {
    let mut report = EnforcementReport::default();
    if keys.is_empty() {
        return report;
    }

    for process in processes.list_processes() {
        if Some(process.pid) == protected_pid {
            continue;
        }
        let name = process.name.to_lowercase();
        let Some(key) = keys.iter().find(|key| name.contains(key.as_str())) else {
            continue;
        };

        report.matched += 1;
        match processes.terminate(process.pid) {
            Ok(()) => {
                info!("Terminated {} ({}) blocked by {key}", process.name, process.pid);
                report.terminated += 1;
            }
            Err(e) => {
                warn!("Couldn't terminate {}: {e}", process.name);
                report.failed += 1;
            }
        }
    }
    report
}

//! Fire-and-forget notifications. Delivery failures never reach the caller.

use std::{
    collections::HashSet,
    io,
    process::{Command, ExitStatus, Stdio},
    sync::Mutex,
    thread::{self, JoinHandle},
};

use chrono::{DateTime, Local, NaiveDate, Utc};
use tracing::{debug, info};

use crate::{config::Goal, rules::threshold::BlockDirective};

#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Only writes notifications into the log.
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!("{title}: {message}");
    }
}

/// Shows desktop notifications through `notify-send`. The notification is also logged, so it
/// isn't lost on systems without a notification daemon.
pub struct DesktopNotifier {
    program: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::with_program("notify-send")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Starts the notifier and reaps it on a detached thread. The returned handle resolves to the
    /// exit status.
    fn deliver(&self, title: &str, message: &str) -> io::Result<JoinHandle<io::Result<ExitStatus>>> {
        let mut child = Command::new(&self.program)
            .args(["--app-name", "timewarden", title, message])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        thread::Builder::new()
            .name("notify-reaper".into())
            .spawn(move || child.wait())
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!("{title}: {message}");
        if let Err(e) = self.deliver(title, message) {
            debug!("Couldn't deliver desktop notification {e}");
        }
    }
}

/// Things the user was already told about today.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifiedSet {
    pub date: Option<NaiveDate>,
    pub apps: HashSet<String>,
    pub goals: HashSet<u32>,
}

impl NotifiedSet {
    /// Forgets everything once the day changes.
    fn roll_over(&mut self, date: NaiveDate) {
        if self.date != Some(date) {
            self.date = Some(date);
            self.apps.clear();
            self.goals.clear();
        }
    }

    fn insert_app(&mut self, date: NaiveDate, app: &str) -> bool {
        self.roll_over(date);
        self.apps.insert(app.to_string())
    }

    fn insert_goal(&mut self, date: NaiveDate, goal_id: u32) -> bool {
        self.roll_over(date);
        self.goals.insert(goal_id)
    }
}

/// Deduplicates notifications so every limit and goal is announced once per day.
pub struct Alerts {
    sink: Box<dyn NotificationSink>,
    notified: Mutex<NotifiedSet>,
}

impl Alerts {
    pub fn new(sink: Box<dyn NotificationSink>) -> Self {
        Self {
            sink,
            notified: Mutex::new(NotifiedSet::default()),
        }
    }

    pub fn roll_over(&self, date: NaiveDate) {
        self.notified().roll_over(date);
    }

    pub fn limit_reached(&self, date: NaiveDate, directive: &BlockDirective, until: DateTime<Utc>) {
        if !self.notified().insert_app(date, &directive.key) {
            return;
        }
        self.sink.notify(
            "Usage limit reached",
            &format!(
                "{} is blocked until {}",
                directive.key,
                until.with_timezone(&Local).format("%H:%M")
            ),
        );
    }

    pub fn goal_reached(&self, date: NaiveDate, goal: &Goal) {
        if !self.notified().insert_goal(date, goal.id) {
            return;
        }
        self.sink.notify(
            "Goal reached",
            &format!(
                "{} ({} minutes of {})",
                goal.description, goal.target_minutes, goal.category
            ),
        );
    }

    pub fn snapshot(&self) -> NotifiedSet {
        self.notified().clone()
    }

    fn notified(&self) -> std::sync::MutexGuard<'_, NotifiedSet> {
        self.notified.lock().unwrap_or_else(|e| e.into_inner())
    }
}

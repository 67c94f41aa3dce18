use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::PersistenceError;

use super::{entities::UsageSession, UsageLedger};

/// Ledger kept in memory, used by tests of the components sitting on top of storage.
#[derive(Default)]
pub struct MemoryLedger {
    sessions: Mutex<Vec<UsageSession>>,
}

impl MemoryLedger {
    pub fn all(&self) -> Vec<UsageSession> {
        self.sessions.lock().unwrap().clone()
    }
}

impl UsageLedger for MemoryLedger {
    async fn append(
        &self,
        app_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<UsageSession>, PersistenceError> {
        let session = UsageSession::new(app_name, start, end);
        if let Some(session) = &session {
            self.sessions.lock().unwrap().push(session.clone());
        }
        Ok(session)
    }

    async fn sessions_for_date(&self, date: NaiveDate) -> Result<Vec<UsageSession>, PersistenceError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.date == date)
            .cloned()
            .collect())
    }
}

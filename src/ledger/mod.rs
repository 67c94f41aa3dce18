//!  Usage ledger is organized through [file_ledger::FileLedger].
//!  The basic idea is:
//!   - There is a directory with all the sessions.
//!   - Sessions are stored in files per local calendar day, one json object per line.
//!   - Sessions are only ever appended, so every operation is a single locked file access.

pub mod entities;
pub mod file_ledger;
#[cfg(test)]
pub mod memory;

use std::{collections::HashMap, future::Future, ops::Deref};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::{stream, StreamExt};

use crate::{
    error::PersistenceError,
    rules::{classify, Category, RuleSet},
};

use entities::UsageSession;

/// Seconds spent in each category during a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub productive: i64,
    pub unproductive: i64,
    pub neutral: i64,
}

impl DailyUsage {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            productive: 0,
            unproductive: 0,
            neutral: 0,
        }
    }

    fn add(&mut self, category: Category, seconds: i64) {
        match category {
            Category::Productive => self.productive += seconds,
            Category::Unproductive => self.unproductive += seconds,
            Category::Neutral => self.neutral += seconds,
        }
    }
}

/// Interface for abstracting storage of usage sessions.
pub trait UsageLedger {
    /// Persists a finished session. Returns [None] if the session was too short to be stored.
    fn append(
        &self,
        app_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<UsageSession>, PersistenceError>>;

    fn sessions_for_date(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<UsageSession>, PersistenceError>>;

    /// Seconds per application name for a single day.
    fn totals_for_date(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<HashMap<String, i64>, PersistenceError>> {
        async move {
            let mut totals = HashMap::new();
            add_sessions(&mut totals, self.sessions_for_date(date).await?);
            Ok(totals)
        }
    }

    /// Seconds per application name between two days, both inclusive.
    fn totals_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<HashMap<String, i64>, PersistenceError>> {
        async move {
            let mut days = stream::iter(start.iter_days().take_while(move |day| *day <= end))
                .map(|day| self.sessions_for_date(day))
                .buffered(4);

            let mut totals = HashMap::new();
            while let Some(sessions) = days.next().await {
                add_sessions(&mut totals, sessions?);
            }
            Ok(totals)
        }
    }

    /// Category breakdown of the `n_days` days ending with `today`, oldest first.
    fn daily_series(
        &self,
        today: NaiveDate,
        n_days: u32,
        rules: &RuleSet,
    ) -> impl Future<Output = Result<Vec<DailyUsage>, PersistenceError>> {
        async move {
            let mut series = Vec::with_capacity(n_days as usize);
            for offset in (0..i64::from(n_days)).rev() {
                let date = today - Duration::days(offset);
                let mut usage = DailyUsage::empty(date);
                for session in self.sessions_for_date(date).await? {
                    usage.add(
                        classify(&session.app_name, rules),
                        session.duration.num_seconds(),
                    );
                }
                series.push(usage);
            }
            Ok(series)
        }
    }
}

fn add_sessions(totals: &mut HashMap<String, i64>, sessions: Vec<UsageSession>) {
    for session in sessions {
        *totals.entry(session.app_name.to_string()).or_default() += session.duration.num_seconds();
    }
}

impl<T: Deref> UsageLedger for T
where
    T::Target: UsageLedger,
{
    fn append(
        &self,
        app_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<UsageSession>, PersistenceError>> {
        self.deref().append(app_name, start, end)
    }

    fn sessions_for_date(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<UsageSession>, PersistenceError>> {
        self.deref().sessions_for_date(date)
    }
}

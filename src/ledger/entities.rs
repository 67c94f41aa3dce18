use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::local_date;

/// One contiguous span of foreground usage of an application. Sessions are never updated once
/// they're written.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct UsageSession {
    pub app_name: Arc<str>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub end: DateTime<Utc>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
    /// Local calendar day of `start`.
    pub date: NaiveDate,
}

impl UsageSession {
    /// Returns [None] for sessions that don't last at least one whole second. Those are never
    /// persisted.
    pub fn new(app_name: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        let start = start.trunc_subsecs(0);
        let end = end.trunc_subsecs(0);
        let duration = end - start;
        if duration <= Duration::zero() {
            return None;
        }
        Some(Self {
            app_name: app_name.into(),
            start,
            end,
            duration,
            date: local_date(start),
        })
    }
}

mod duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = i64::deserialize(deserializer)?;
        let duration = Duration::seconds(s);
        Ok(duration)
    }
}

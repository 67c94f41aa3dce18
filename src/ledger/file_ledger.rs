use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, Utc};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::{error::PersistenceError, utils::time::date_to_record_name};

use super::{entities::UsageSession, UsageLedger};

/// The main realization of [UsageLedger].
pub struct FileLedger {
    session_dir: PathBuf,
}

impl FileLedger {
    pub fn new(session_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&session_dir)?;

        Ok(Self { session_dir })
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.session_dir
            .join(format!("{}.jsonl", date_to_record_name(date)))
    }

    async fn read_day(path: &Path) -> Result<Vec<UsageSession>, std::io::Error> {
        debug!("Extracting {path:?}");
        let file = File::open(path).await?;
        file.lock_shared()?;
        let mut buffer = BufReader::new(file);
        let mut sessions = vec![];
        let mut line = vec![];
        // Lines are read as bytes, a write cut off by a crash may not even be valid utf-8.
        while buffer.read_until(b'\n', &mut line).await? > 0 {
            if !line.trim_ascii().is_empty() {
                match serde_json::from_slice::<UsageSession>(&line) {
                    Ok(v) => sessions.push(v),
                    Err(e) => warn!(
                        "During parsing in path {:?} found illegal json string {}:  {e}",
                        path,
                        String::from_utf8_lossy(&line).trim_end()
                    ),
                }
            }
            line.clear();
        }

        buffer.into_inner().unlock_async().await?;

        Ok(sessions)
    }

    async fn append_line(path: &Path, line: &[u8]) -> Result<(), std::io::Error> {
        let mut file = File::options()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        file.lock_exclusive()?;
        let result = async {
            file.write_all(line).await?;
            file.flush().await
        }
        .await;
        file.unlock_async().await?;
        result
    }
}

impl UsageLedger for FileLedger {
    async fn append(
        &self,
        app_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<UsageSession>, PersistenceError> {
        let Some(session) = UsageSession::new(app_name, start, end) else {
            debug!("Discarding empty session of {app_name}");
            return Ok(None);
        };

        let mut line = serde_json::to_vec(&session)?;
        line.push(b'\n');
        Self::append_line(&self.day_path(session.date), &line).await?;
        Ok(Some(session))
    }

    async fn sessions_for_date(&self, date: NaiveDate) -> Result<Vec<UsageSession>, PersistenceError> {
        match Self::read_day(&self.day_path(date)).await {
            Ok(sessions) => Ok(sessions),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        ledger::UsageLedger,
        rules::RuleSet,
        utils::{clock::test_clock::TEST_START_DATE, time::local_date},
    };

    use super::FileLedger;

    fn midday() -> chrono::DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE) + Duration::hours(12)
    }

    #[tokio::test]
    async fn test_append_and_totals() -> Result<()> {
        let dir = tempdir()?;
        let ledger = FileLedger::new(dir.path().to_path_buf())?;
        let start = midday();

        ledger
            .append("firefox", start, start + Duration::seconds(60))
            .await?;
        ledger
            .append("code", start + Duration::seconds(60), start + Duration::seconds(180))
            .await?;
        ledger
            .append("firefox", start + Duration::seconds(180), start + Duration::seconds(200))
            .await?;

        let totals = ledger.totals_for_date(local_date(start)).await?;
        assert_eq!(totals.len(), 2);
        assert_eq!(totals["firefox"], 80);
        assert_eq!(totals["code"], 120);

        let files = fs::read_dir(dir.path())?.collect::<Vec<_>>();
        assert_eq!(files.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_sessions_are_not_persisted() -> Result<()> {
        let dir = tempdir()?;
        let ledger = FileLedger::new(dir.path().to_path_buf())?;
        let start = midday();

        assert!(ledger.append("firefox", start, start).await?.is_none());
        assert!(ledger
            .append("firefox", start, start - Duration::seconds(3))
            .await?
            .is_none());

        assert!(ledger.sessions_for_date(local_date(start)).await?.is_empty());
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_day_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let ledger = FileLedger::new(dir.path().to_path_buf())?;
        let totals = ledger
            .totals_for_date(NaiveDate::from_ymd_opt(2001, 1, 1).unwrap())
            .await?;
        assert!(totals.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_line_is_skipped() -> Result<()> {
        let dir = tempdir()?;
        let ledger = FileLedger::new(dir.path().to_path_buf())?;
        let start = midday();
        ledger
            .append("firefox", start, start + Duration::seconds(30))
            .await?;

        let path = ledger.day_path(local_date(start));
        let mut contents = fs::read_to_string(&path)?;
        contents.push_str("{\"app_name\": \"brok");
        fs::write(&path, contents)?;

        let sessions = ledger.sessions_for_date(local_date(start)).await?;
        assert_eq!(sessions.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_doesnt_hide_later_sessions() -> Result<()> {
        let dir = tempdir()?;
        let ledger = FileLedger::new(dir.path().to_path_buf())?;
        let start = midday();
        ledger
            .append("youtube", start, start + Duration::seconds(60))
            .await?;

        let path = ledger.day_path(local_date(start));
        let mut contents = fs::read(&path)?;
        // "ü" cut after its first byte.
        contents.extend_from_slice(b"{\"app_name\": \"\xc3\n");
        fs::write(&path, contents)?;

        let later = start + Duration::minutes(5);
        ledger
            .append("youtube", later, later + Duration::seconds(3900))
            .await?;

        let totals = ledger.totals_for_date(local_date(start)).await?;
        assert_eq!(totals.get("youtube"), Some(&3960));
        Ok(())
    }

    #[tokio::test]
    async fn test_totals_between_and_series() -> Result<()> {
        let dir = tempdir()?;
        let ledger = FileLedger::new(dir.path().to_path_buf())?;
        let first = midday();
        let second = first + Duration::days(1);
        let third = first + Duration::days(2);

        ledger.append("youtube", first, first + Duration::seconds(100)).await?;
        ledger.append("code", second, second + Duration::seconds(200)).await?;
        ledger.append("youtube", third, third + Duration::seconds(50)).await?;
        ledger.append("calculator", third, third + Duration::seconds(5)).await?;

        let totals = ledger
            .totals_between(local_date(first), local_date(second))
            .await?;
        assert_eq!(totals["youtube"], 100);
        assert_eq!(totals["code"], 200);

        let rules = RuleSet::new(["code"], ["youtube"]);
        let series = ledger.daily_series(local_date(third), 4, &rules).await?;
        assert_eq!(series.len(), 4);
        assert_eq!(series[0].date, local_date(first) - Duration::days(1));
        assert_eq!(series[1].unproductive, 100);
        assert_eq!(series[2].productive, 200);
        assert_eq!(series[3].unproductive, 50);
        assert_eq!(series[3].neutral, 5);
        Ok(())
    }
}

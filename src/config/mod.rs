//! User configuration: classification rules, limit settings and goals.
//!
//! Each part lives in its own JSON file inside the application directory. A missing or malformed
//! file is never an error for the reader, defaults are used instead. Running components read
//! snapshots through [SharedConfig], which swaps whole values so nobody observes a half-written
//! configuration, and rereads the files as soon as another process changes them.

use std::{
    fs,
    io::ErrorKind,
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
    time::SystemTime,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{ConfigParseError, PersistenceError},
    rules::{Category, RuleSet},
};

const RULES_FILE: &str = "rules.json";
const SETTINGS_FILE: &str = "settings.json";
const GOALS_FILE: &str = "goals.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Names the user considers distracting. They take priority when picking a block key.
    pub unproductive_apps: Vec<String>,
    pub usage_limit_minutes: NonZeroU32,
    pub block_duration_minutes: NonZeroU32,
}

impl Settings {
    pub fn limit_seconds(&self) -> i64 {
        i64::from(self.usage_limit_minutes.get()) * 60
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unproductive_apps: vec![],
            usage_limit_minutes: NonZeroU32::new(60).unwrap_or(NonZeroU32::MIN),
            block_duration_minutes: NonZeroU32::new(30).unwrap_or(NonZeroU32::MIN),
        }
    }
}

/// Daily target for the time spent in a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: u32,
    pub description: String,
    pub category: Category,
    pub target_minutes: NonZeroU32,
}

impl Goal {
    pub fn target_seconds(&self) -> i64 {
        i64::from(self.target_minutes.get()) * 60
    }
}

/// Modification time and length of every stored file. Any difference means the files changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint(Vec<Option<(SystemTime, u64)>>);

/// Key-value provider of the configuration.
pub trait ConfigStore {
    /// [None] when the store can't detect outside edits.
    fn fingerprint(&self) -> Option<Fingerprint> {
        None
    }

    fn load_rules(&self) -> RuleSet;
    fn save_rules(&self, rules: &RuleSet) -> Result<(), PersistenceError>;
    fn load_settings(&self) -> Settings;
    fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError>;
    fn load_goals(&self) -> Vec<Goal>;
    fn save_goals(&self, goals: &[Goal]) -> Result<(), PersistenceError>;
}

pub struct JsonConfigStore {
    dir: PathBuf,
}

impl JsonConfigStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, file_name: &str) -> T {
        let path = self.dir.join(file_name);
        match read_json(&path) {
            Ok(Some(v)) => v,
            Ok(None) => {
                debug!("{path:?} doesn't exist, using defaults");
                T::default()
            }
            Err(e) => {
                warn!("{e}, using defaults");
                T::default()
            }
        }
    }

    fn save(&self, file_name: &str, value: &impl Serialize) -> Result<(), PersistenceError> {
        let serialized = serde_json::to_string_pretty(value)?;
        fs::write(self.dir.join(file_name), serialized)?;
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigParseError> {
    let contents = match fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            // Unreadable files are treated the same way as malformed ones.
            warn!("Failed to read {path:?}: {e}");
            return Ok(None);
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigParseError {
            path: path.to_path_buf(),
            source,
        })
}

impl ConfigStore for JsonConfigStore {
    fn fingerprint(&self) -> Option<Fingerprint> {
        let files = [RULES_FILE, SETTINGS_FILE, GOALS_FILE]
            .iter()
            .map(|file| {
                let metadata = fs::metadata(self.dir.join(file)).ok()?;
                Some((metadata.modified().ok()?, metadata.len()))
            })
            .collect();
        Some(Fingerprint(files))
    }

    fn load_rules(&self) -> RuleSet {
        self.load_or_default::<RuleSet>(RULES_FILE).normalized()
    }

    fn save_rules(&self, rules: &RuleSet) -> Result<(), PersistenceError> {
        self.save(RULES_FILE, rules)
    }

    fn load_settings(&self) -> Settings {
        self.load_or_default(SETTINGS_FILE)
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError> {
        self.save(SETTINGS_FILE, settings)
    }

    fn load_goals(&self) -> Vec<Goal> {
        self.load_or_default(GOALS_FILE)
    }

    fn save_goals(&self, goals: &[Goal]) -> Result<(), PersistenceError> {
        self.save(GOALS_FILE, &goals)
    }
}

/// Process-wide configuration shared by the running components. Readers get an [Arc] snapshot
/// that stays consistent even if the value is replaced right after. Every read first checks the
/// store's [Fingerprint], so edits made by the cli are visible on the next read.
pub struct SharedConfig {
    store: Box<dyn ConfigStore + Send + Sync>,
    seen: Mutex<Option<Fingerprint>>,
    rules: RwLock<Arc<RuleSet>>,
    settings: RwLock<Arc<Settings>>,
    goals: RwLock<Arc<Vec<Goal>>>,
}

impl SharedConfig {
    pub fn load(store: impl ConfigStore + Send + Sync + 'static) -> Self {
        let seen = store.fingerprint();
        let rules = store.load_rules();
        let settings = store.load_settings();
        let goals = store.load_goals();
        Self {
            store: Box::new(store),
            seen: Mutex::new(seen),
            rules: RwLock::new(Arc::new(rules)),
            settings: RwLock::new(Arc::new(settings)),
            goals: RwLock::new(Arc::new(goals)),
        }
    }

    pub fn rules(&self) -> Arc<RuleSet> {
        self.refresh();
        read_snapshot(&self.rules)
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.refresh();
        read_snapshot(&self.settings)
    }

    pub fn goals(&self) -> Arc<Vec<Goal>> {
        self.refresh();
        read_snapshot(&self.goals)
    }

    /// Rereads everything when the stored files changed since the last read.
    pub fn refresh(&self) {
        let Some(current) = self.store.fingerprint() else {
            return;
        };
        {
            let mut seen = lock(&self.seen);
            if seen.as_ref() == Some(&current) {
                return;
            }
            *seen = Some(current);
        }
        debug!("Configuration changed on disk, reloading");
        self.load_all();
    }

    /// Unconditionally rereads everything.
    pub fn reload(&self) {
        *lock(&self.seen) = self.store.fingerprint();
        self.load_all();
    }

    fn load_all(&self) {
        swap(&self.rules, self.store.load_rules());
        swap(&self.settings, self.store.load_settings());
        swap(&self.goals, self.store.load_goals());
    }

    /// Persists and then publishes the rules. If persisting fails the running value still changes.
    pub fn replace_rules(&self, rules: RuleSet) -> Result<(), PersistenceError> {
        let rules = rules.normalized();
        let result = self.store.save_rules(&rules);
        swap(&self.rules, rules);
        self.mark_seen();
        result
    }

    pub fn replace_settings(&self, settings: Settings) -> Result<(), PersistenceError> {
        let result = self.store.save_settings(&settings);
        swap(&self.settings, settings);
        self.mark_seen();
        result
    }

    /// Our own writes shouldn't trigger a reload.
    fn mark_seen(&self) {
        *lock(&self.seen) = self.store.fingerprint();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read_snapshot<T>(lock: &RwLock<Arc<T>>) -> Arc<T> {
    lock.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn swap<T>(lock: &RwLock<Arc<T>>, value: T) {
    *lock.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(value);
}

#[cfg(test)]
mod tests {
    use std::{fs, num::NonZeroU32};

    use anyhow::Result;
    use tempfile::tempdir;

    use crate::rules::{Category, RuleSet};

    use super::{ConfigStore, Goal, JsonConfigStore, Settings, SharedConfig, SETTINGS_FILE};

    #[test]
    fn test_missing_files_use_defaults() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonConfigStore::new(dir.path().to_path_buf())?;
        assert_eq!(store.load_rules(), RuleSet::default());
        assert_eq!(store.load_settings(), Settings::default());
        assert!(store.load_goals().is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed_file_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join(SETTINGS_FILE), "{ not json")?;
        let store = JsonConfigStore::new(dir.path().to_path_buf())?;
        assert_eq!(store.load_settings(), Settings::default());
        Ok(())
    }

    #[test]
    fn test_zero_limit_is_malformed() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"unproductive_apps":["chrome"],"usage_limit_minutes":0,"block_duration_minutes":5}"#,
        )?;
        let store = JsonConfigStore::new(dir.path().to_path_buf())?;
        assert_eq!(store.load_settings(), Settings::default());
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonConfigStore::new(dir.path().to_path_buf())?;
        let settings = Settings {
            unproductive_apps: vec!["chrome".into()],
            usage_limit_minutes: NonZeroU32::new(15).unwrap(),
            block_duration_minutes: NonZeroU32::new(5).unwrap(),
        };
        store.save_settings(&settings)?;
        let goals = vec![Goal {
            id: 1,
            description: "Deep work".into(),
            category: Category::Productive,
            target_minutes: NonZeroU32::new(120).unwrap(),
        }];
        store.save_goals(&goals)?;

        assert_eq!(store.load_settings(), settings);
        assert_eq!(store.load_goals(), goals);
        Ok(())
    }

    #[test]
    fn test_shared_config_replaces_wholesale() -> Result<()> {
        let dir = tempdir()?;
        let config = SharedConfig::load(JsonConfigStore::new(dir.path().to_path_buf())?);
        let before = config.rules();

        config.replace_rules(RuleSet::new(["Docs"], ["Chess"]))?;

        assert_eq!(*before, RuleSet::default());
        assert_eq!(*config.rules(), RuleSet::new(["docs"], ["chess"]));

        // Another process editing the file is picked up on reload.
        let store = JsonConfigStore::new(dir.path().to_path_buf())?;
        store.save_rules(&RuleSet::new(["mail"], Vec::<String>::new()))?;
        config.reload();
        assert_eq!(config.rules().productive, vec!["mail".to_string()]);
        Ok(())
    }

    #[test]
    fn test_outside_edit_visible_on_next_read() -> Result<()> {
        let dir = tempdir()?;
        let config = SharedConfig::load(JsonConfigStore::new(dir.path().to_path_buf())?);
        assert_eq!(config.settings().usage_limit_minutes.get(), 60);

        let store = JsonConfigStore::new(dir.path().to_path_buf())?;
        store.save_rules(&RuleSet::new(["code"], ["solitaire"]))?;
        store.save_settings(&Settings {
            unproductive_apps: vec!["chrome".into()],
            usage_limit_minutes: NonZeroU32::new(15).unwrap(),
            block_duration_minutes: NonZeroU32::new(5).unwrap(),
        })?;

        assert_eq!(config.rules().unproductive, vec!["solitaire".to_string()]);
        assert_eq!(config.settings().usage_limit_minutes.get(), 15);
        Ok(())
    }
}

//! Record store
//!
//! Holds every moderation record in typed tables and snapshots them to a YAML
//! file. Ids are handed out from one counter, so they are unique and
//! monotonic across all record types.

use crate::moderation::record::{
    BadWord, BadWordPost, Join, Kick, Leave, MediaOnlyChannel, PendingUpgrade, Report,
    Restriction, UsernameUpdate, Warn,
};
use crate::moderation::{ModerationError, ModerationResult};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A row type that lives in the store
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name used in errors and logs
    const NAME: &'static str;

    fn id(&self) -> u64;

    fn assign_id(&mut self, id: u64);

    /// The table holding rows of this type
    fn table(tables: &Tables) -> &Table<Self>;
}

macro_rules! impl_record {
    ($ty:ty, $field:ident, $name:literal) => {
        impl Record for $ty {
            const NAME: &'static str = $name;

            fn id(&self) -> u64 {
                self.id
            }

            fn assign_id(&mut self, id: u64) {
                self.id = id;
            }

            fn table(tables: &Tables) -> &Table<Self> {
                &tables.$field
            }
        }
    };
}

impl_record!(Join, joins, "Join");
impl_record!(Leave, leaves, "Leave");
impl_record!(UsernameUpdate, username_updates, "UsernameUpdate");
impl_record!(Report, reports, "Report");
impl_record!(Warn, warns, "Warn");
impl_record!(Kick, kicks, "Kick");
impl_record!(Restriction, restrictions, "Restriction");
impl_record!(MediaOnlyChannel, media_only_channels, "MediaOnlyChannel");
impl_record!(PendingUpgrade, pending_upgrades, "PendingUpgrade");
impl_record!(BadWord, bad_words, "BadWord");
impl_record!(BadWordPost, bad_word_posts, "BadWordPost");

/// Rows of one record type keyed by id
pub struct Table<R> {
    rows: DashMap<u64, R>,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }
}

impl<R: Record> Table<R> {
    /// All rows ordered by id, i.e. by insertion
    fn sorted(&self) -> Vec<R> {
        let mut rows: Vec<R> = self.rows.iter().map(|e| e.value().clone()).collect();
        rows.sort_by_key(|row| row.id());
        rows
    }

    fn load(&self, rows: Vec<R>) {
        for row in rows {
            self.rows.insert(row.id(), row);
        }
    }

    fn max_id(&self) -> u64 {
        self.rows.iter().map(|e| *e.key()).max().unwrap_or(0)
    }
}

/// All tables of the store
#[derive(Default)]
pub struct Tables {
    joins: Table<Join>,
    leaves: Table<Leave>,
    username_updates: Table<UsernameUpdate>,
    reports: Table<Report>,
    warns: Table<Warn>,
    kicks: Table<Kick>,
    restrictions: Table<Restriction>,
    media_only_channels: Table<MediaOnlyChannel>,
    pending_upgrades: Table<PendingUpgrade>,
    bad_words: Table<BadWord>,
    bad_word_posts: Table<BadWordPost>,
}

/// On-disk layout of the store
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    #[serde(default)]
    joins: Vec<Join>,
    #[serde(default)]
    leaves: Vec<Leave>,
    #[serde(default)]
    username_updates: Vec<UsernameUpdate>,
    #[serde(default)]
    reports: Vec<Report>,
    #[serde(default)]
    warns: Vec<Warn>,
    #[serde(default)]
    kicks: Vec<Kick>,
    #[serde(default)]
    restrictions: Vec<Restriction>,
    #[serde(default)]
    media_only_channels: Vec<MediaOnlyChannel>,
    #[serde(default)]
    pending_upgrades: Vec<PendingUpgrade>,
    #[serde(default)]
    bad_words: Vec<BadWord>,
    #[serde(default)]
    bad_word_posts: Vec<BadWordPost>,
}

/// Store for moderation records
#[derive(Clone)]
pub struct RecordStore {
    tables: Arc<Tables>,
    next_id: Arc<AtomicU64>,
    /// Snapshot file, `None` keeps the store in memory only
    path: Option<Arc<PathBuf>>,
    /// Serializes snapshot writes
    flush_lock: Arc<Mutex<()>>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Create an empty in-memory store
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Tables::default()),
            next_id: Arc::new(AtomicU64::new(1)),
            path: None,
            flush_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open a store backed by a YAML snapshot, loading it if it exists
    ///
    /// # Errors
    /// Returns a storage error if the file exists but cannot be read or parsed
    pub async fn open(path: impl AsRef<Path>) -> ModerationResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let snapshot: Snapshot = serde_yaml::from_str(&content)?;
                store.restore(snapshot);
                info!(path = %path.display(), next_id = store.next_id.load(Ordering::SeqCst), "Loaded moderation records");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No record snapshot found, starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        store.path = Some(Arc::new(path));
        Ok(store)
    }

    fn restore(&self, snapshot: Snapshot) {
        let tables = &self.tables;
        tables.joins.load(snapshot.joins);
        tables.leaves.load(snapshot.leaves);
        tables.username_updates.load(snapshot.username_updates);
        tables.reports.load(snapshot.reports);
        tables.warns.load(snapshot.warns);
        tables.kicks.load(snapshot.kicks);
        tables.restrictions.load(snapshot.restrictions);
        tables.media_only_channels.load(snapshot.media_only_channels);
        tables.pending_upgrades.load(snapshot.pending_upgrades);
        tables.bad_words.load(snapshot.bad_words);
        tables.bad_word_posts.load(snapshot.bad_word_posts);

        let max_id = [
            tables.joins.max_id(),
            tables.leaves.max_id(),
            tables.username_updates.max_id(),
            tables.reports.max_id(),
            tables.warns.max_id(),
            tables.kicks.max_id(),
            tables.restrictions.max_id(),
            tables.media_only_channels.max_id(),
            tables.pending_upgrades.max_id(),
            tables.bad_words.max_id(),
            tables.bad_word_posts.max_id(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        self.next_id
            .store(snapshot.next_id.max(max_id + 1), Ordering::SeqCst);
    }

    fn snapshot(&self) -> Snapshot {
        let tables = &self.tables;
        Snapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            joins: tables.joins.sorted(),
            leaves: tables.leaves.sorted(),
            username_updates: tables.username_updates.sorted(),
            reports: tables.reports.sorted(),
            warns: tables.warns.sorted(),
            kicks: tables.kicks.sorted(),
            restrictions: tables.restrictions.sorted(),
            media_only_channels: tables.media_only_channels.sorted(),
            pending_upgrades: tables.pending_upgrades.sorted(),
            bad_words: tables.bad_words.sorted(),
            bad_word_posts: tables.bad_word_posts.sorted(),
        }
    }

    /// Write the snapshot file; a no-op for in-memory stores
    ///
    /// # Errors
    /// Returns a storage error if serialization or the write fails
    pub async fn flush(&self) -> ModerationResult<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let _guard = self.flush_lock.lock().await;
        let yaml = serde_yaml::to_string(&self.snapshot())?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, yaml).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), "Flushed moderation records");
        Ok(())
    }

    /// Add a record, assigning it the next id
    pub fn add<R: Record>(&self, mut record: R) -> R {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        record.assign_id(id);
        R::table(&self.tables).rows.insert(id, record.clone());
        record
    }

    /// Get a record by id
    ///
    /// # Errors
    /// Returns `NotFound` if no record of this type has the id
    pub fn get<R: Record>(&self, id: u64) -> ModerationResult<R> {
        R::table(&self.tables)
            .rows
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ModerationError::record_not_found(R::NAME, id))
    }

    /// Read-modify-write a single record and return the updated copy
    ///
    /// # Errors
    /// Returns `NotFound` if no record of this type has the id
    pub fn update<R: Record>(&self, id: u64, f: impl FnOnce(&mut R)) -> ModerationResult<R> {
        let mut entry = R::table(&self.tables)
            .rows
            .get_mut(&id)
            .ok_or_else(|| ModerationError::record_not_found(R::NAME, id))?;
        f(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Remove a record by id
    pub fn remove<R: Record>(&self, id: u64) -> Option<R> {
        R::table(&self.tables).rows.remove(&id).map(|(_, r)| r)
    }

    /// Check if any record of this type matches the predicate
    pub fn exists<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> bool {
        R::table(&self.tables)
            .rows
            .iter()
            .any(|entry| predicate(entry.value()))
    }

    /// Ids of all records of this type in insertion order
    pub fn stream_all<R: Record>(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = R::table(&self.tables)
            .rows
            .iter()
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Records matching the predicate in insertion order
    pub fn filter<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> Vec<R> {
        let mut rows: Vec<R> = R::table(&self.tables)
            .rows
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.id());
        rows
    }

    /// Number of records of this type
    pub fn count<R: Record>(&self) -> usize {
        R::table(&self.tables).rows.len()
    }
}

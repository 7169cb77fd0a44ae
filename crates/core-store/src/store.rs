//! Append-only keyed record log
//!
//! Every append becomes one JSON line in the active log file. On startup the
//! whole log directory is replayed into memory so that the latest entry for
//! each key can be looked up without touching disk again.

use crate::codec::{nest, Fields, FromFields, Record};
use crate::cursor::{Cursor, StoredRecord};
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the log files
    pub log_dir: PathBuf,

    /// Extension of newly created log files
    pub file_extension: String,

    /// Fields merged into every appended record
    pub default_fields: Fields,
}

impl StoreConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_default_fields(mut self, fields: Fields) -> Self {
        self.default_fields = fields;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            file_extension: "log".to_string(),
            default_fields: Fields::new(),
        }
    }
}

/// `<system temp>/devtel`
pub fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("devtel")
}

/// One line of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: String,
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub processed: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Lenient shape used during replay; empty keys and null data are skipped
#[derive(Deserialize)]
struct ReplayEntry {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    processed: bool,
}

/// Opens the active log file for a single append
pub trait Appender {
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn Write>>;
}

/// Appends to the real file system, creating the file on first use
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAppender;

impl Appender for FsAppender {
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn Write>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(file))
    }
}

/// File-backed append-only log with an in-memory index of the latest entry
/// per key
///
/// The store is single-writer: one process owns a log directory for the
/// duration of its run. No file handle is held between appends.
pub struct LogStore {
    config: StoreConfig,
    appender: Box<dyn Appender>,
    log_path: Option<PathBuf>,
    entries: Vec<LogEntry>,
    index: HashMap<String, usize>,
}

impl LogStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_appender(config, Box::new(FsAppender))
    }

    /// Create a store that opens its log file through `appender`
    pub fn with_appender(config: StoreConfig, appender: Box<dyn Appender>) -> Self {
        Self {
            config,
            appender,
            log_path: None,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Replay every file in the log directory and pick the active log file
    ///
    /// Files are visited recursively in file-name order and lines in file
    /// order, so later files and lines supersede earlier ones for the same
    /// key. The last file visited becomes the append target; an empty
    /// directory gets a fresh `<unix seconds>.<ext>` file.
    pub fn init(&mut self) -> Result<()> {
        let dir = self.config.log_dir.clone();
        fs::create_dir_all(&dir).map_err(|e| Error::log_dir(&dir, e))?;

        self.entries.clear();
        self.index.clear();

        let mut last_file = None;
        for entry in WalkDir::new(&dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::log_dir(&dir, e))?;
            if entry.file_type().is_dir() {
                continue;
            }
            self.restore_file(entry.path())?;
            last_file = Some(entry.into_path());
        }

        let log_path = last_file.unwrap_or_else(|| {
            dir.join(format!(
                "{}.{}",
                Utc::now().timestamp(),
                self.config.file_extension
            ))
        });

        info!(
            "Log store initialized at {} ({} entries, {} keys)",
            log_path.display(),
            self.entries.len(),
            self.index.len()
        );
        self.log_path = Some(log_path);

        Ok(())
    }

    fn restore_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| Error::read_failed(path, e))?;
        let reader = BufReader::new(file);
        let mut restored = 0usize;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::read_failed(path, e))?;
            if line.trim().is_empty() {
                continue;
            }

            let entry: ReplayEntry = serde_json::from_str(&line)
                .map_err(|e| Error::invalid_entry(path, line_num + 1, &e.to_string()))?;

            let (key, data) = match (entry.key, entry.data) {
                (Some(key), Some(data)) if !key.is_empty() => (key, data),
                _ => continue,
            };

            self.index_entry(LogEntry {
                key,
                data,
                processed: entry.processed,
            });
            restored += 1;
        }

        debug!("Restored {} entries from {}", restored, path.display());
        Ok(())
    }

    /// Register a field merged into every subsequent append
    ///
    /// Entries already written are not touched.
    pub fn add_default_field(&mut self, path: impl Into<String>, value: impl Into<Value>) {
        self.config.default_fields.set(path, value);
    }

    pub fn default_fields(&self) -> &Fields {
        &self.config.default_fields
    }

    /// Append a record as unprocessed
    pub fn append<R: Record + ?Sized>(&mut self, record: &R) -> Result<()> {
        self.write(record, false)
    }

    /// Re-append each record with the processed flag set
    ///
    /// Stops at the first failed write; records before it stay marked.
    pub fn mark_processed<R: Record>(&mut self, records: &[R]) -> Result<()> {
        for record in records {
            self.write(record, true)?;
        }
        debug!("Marked {} records processed", records.len());
        Ok(())
    }

    fn write<R: Record + ?Sized>(&mut self, record: &R, processed: bool) -> Result<()> {
        let key = record.key();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let log_path = self.log_path.clone().ok_or(Error::NotInitialized)?;

        let mut fields = self.config.default_fields.clone();
        fields.extend(record.to_fields());

        let entry = LogEntry {
            key,
            data: nest(&fields),
            processed,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self
            .appender
            .open_append(&log_path)
            .map_err(|source| Error::OpenFailed {
                path: log_path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| Error::AppendFailed {
                path: log_path.clone(),
                source,
            })?;
        drop(file);

        debug!(key = %entry.key, processed, "Appended entry");
        self.index_entry(entry);

        Ok(())
    }

    fn index_entry(&mut self, entry: LogEntry) {
        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Decode the latest entry for `key`
    ///
    /// Returns `Ok(None)` when the key was never written; errors only when
    /// the stored data does not decode into `T`.
    pub fn get<T: FromFields>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key) {
            Some(entry) => T::from_fields(&entry.data)
                .map(Some)
                .map_err(|e| Error::decode(key, e)),
            None => Ok(None),
        }
    }

    /// Latest entry for `key`, undecoded
    pub fn get_raw(&self, key: &str) -> Option<&LogEntry> {
        self.index.get(key).map(|&pos| &self.entries[pos])
    }

    /// Latest record of every key, ordered by when each key was last written
    pub fn all(&self) -> Cursor {
        self.snapshot(false)
    }

    /// Same ordering as [`LogStore::all`], limited to unprocessed records
    pub fn unprocessed(&self) -> Cursor {
        self.snapshot(true)
    }

    fn snapshot(&self, only_unprocessed: bool) -> Cursor {
        let mut positions: Vec<usize> = self.index.values().copied().collect();
        positions.sort_unstable();

        let items = positions
            .into_iter()
            .map(|pos| &self.entries[pos])
            .filter(|entry| !only_unprocessed || !entry.processed)
            .map(|entry| StoredRecord {
                key: entry.key.clone(),
                data: entry.data.clone(),
                processed: entry.processed,
            })
            .collect();

        Cursor::new(items)
    }

    /// File receiving appends, once initialized
    pub fn active_log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn log_dir(&self) -> &Path {
        &self.config.log_dir
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of entries replayed or appended, superseded ones included
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("log_dir", &self.config.log_dir)
            .field("log_path", &self.log_path)
            .field("entries", &self.entries.len())
            .field("keys", &self.index.len())
            .finish()
    }
}

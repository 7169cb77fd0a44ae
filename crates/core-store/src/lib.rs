//! Append-only keyed record log for devtel
//!
//! This crate stores arbitrary records as newline-delimited JSON, keeps an
//! in-memory index of the latest entry per key, and tracks whether each
//! record has been delivered downstream.
//!
//! # Key Concepts
//!
//! - **Record**: anything with a key and a flat list of dot-path fields
//! - **Log Entry**: `{key, data, processed}` envelope, one per line
//! - **Index**: key → position of the latest entry for that key
//! - **Cursor**: ordered snapshot of the latest records
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │   Record (key + fields)      │
//! └──────────────┬───────────────┘
//!                │ append / mark_processed
//!                ▼
//! ┌──────────────────────────────┐
//! │          LogStore            │
//! │  - default fields merged     │
//! │  - one line per append       │
//! │  - index updated on success  │
//! └──────────────┬───────────────┘
//!                │ open, write, close
//!                ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │ <log dir>/1651388142.log                                 │
//! │ {"key":"9714_before:deploy","data":{...}}                │
//! │ {"key":"9714_after:deploy","data":{...}}                 │
//! │ {"key":"9714_after:deploy","data":{...},"processed":true}│
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use devtel_core_store::{Fields, LogStore, Record, StoreConfig};
//!
//! struct Ping(u64);
//!
//! impl Record for Ping {
//!     fn key(&self) -> String {
//!         format!("ping_{}", self.0)
//!     }
//!
//!     fn to_fields(&self) -> Fields {
//!         Fields::new().with("seq", self.0)
//!     }
//! }
//!
//! let mut store = LogStore::new(StoreConfig::new("/tmp/devtel"));
//! store.init().unwrap();
//! store.add_default_field("os.name", std::env::consts::OS);
//! store.append(&Ping(1)).unwrap();
//!
//! let backlog: Vec<_> = store.unprocessed().collect();
//! store.mark_processed(&backlog).unwrap();
//! ```

pub mod codec;
pub mod cursor;
pub mod error;
pub mod store;

// Re-export main types
pub use codec::{flatten, insert_path, nest, Fields, FromFields, Record};
pub use cursor::{Cursor, StoredRecord};
pub use error::{Error, Result};
pub use store::{default_log_dir, Appender, FsAppender, LogEntry, LogStore, StoreConfig};

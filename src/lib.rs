/*!
 * devtel - lifecycle hook telemetry
 *
 * Pairs "before" and "after" hooks of a command runner, records the elapsed
 * time on the closing hook, keeps every event in an append-only log, and
 * forwards undelivered events to a telemetry endpoint.
 *
 * - `hooks`: which hook opens which
 * - `event`: the hook event record and its environment scraping
 * - `tracker`: pairing, appending, delivery
 * - `sink`: where delivered batches go
 *
 * The log itself lives in the `devtel-core-store` crate.
 */

pub mod cli_style;
pub mod config;
pub mod defaults;
pub mod error;
pub mod event;
pub mod hooks;
pub mod logging;
pub mod sink;
pub mod tracker;

// Re-export commonly used types
pub use config::{DevtelConfig, LogLevel};
pub use defaults::{collect_default_fields, IdentityPolicy};
pub use error::{DevtelError, Result};
pub use event::{CommandInfo, DevenvInfo, HookEvent};
pub use hooks::{opening_hook, HookMatcher, HOOK_GROUPS};
pub use sink::{HttpSink, MemorySink, Sink};
pub use tracker::{EventTracker, FlushReport, TrackOutcome};

pub use devtel_core_store::{LogStore, StoreConfig, StoredRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Open and replay the configured log directory
pub fn open_store(config: &DevtelConfig) -> Result<LogStore> {
    let mut store = LogStore::new(config.store_config());
    store.init()?;
    Ok(store)
}

/// Open the log with this host's default fields attached to new records
pub fn open_tracking_store(config: &DevtelConfig) -> Result<LogStore> {
    let policy = IdentityPolicy::new(config.identity_domain.clone());
    let store_config = config
        .store_config()
        .with_default_fields(collect_default_fields(&policy));

    let mut store = LogStore::new(store_config);
    store.init()?;
    Ok(store)
}

/// HTTP sink for the configured endpoint, `None` when delivery is disabled
pub fn http_sink(config: &DevtelConfig) -> Result<Option<HttpSink>> {
    if !config.delivery_enabled() {
        return Ok(None);
    }
    let endpoint = config.endpoint.as_deref().unwrap_or_default();
    let sink = HttpSink::new(
        endpoint.trim(),
        config.app_name.clone(),
        config.api_key.clone().unwrap_or_default(),
        config.timeout(),
    )?;
    Ok(Some(sink))
}

/*!
 * Event tracking
 *
 * `track` pairs a closing hook with its stored opener, sets the elapsed
 * duration and appends the event. `flush` hands the unprocessed backlog to a
 * sink and marks it processed only once the sink has accepted all of it.
 */

use crate::error::Result;
use crate::event::HookEvent;
use crate::hooks::HookMatcher;
use crate::sink::Sink;
use devtel_core_store::{LogStore, Record, StoredRecord};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Result of tracking one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackOutcome {
    /// Key the event was stored under
    pub key: String,

    /// Key of the opener it was paired with
    pub opener_key: Option<String>,

    pub duration_ms: Option<i64>,
}

impl TrackOutcome {
    pub fn is_paired(&self) -> bool {
        self.opener_key.is_some()
    }
}

/// Result of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records accepted by the sink and marked processed
    pub delivered: usize,

    /// Records left unprocessed because delivery is disabled
    pub pending: usize,
}

/// Correlates hook events and delivers them
#[derive(Debug)]
pub struct EventTracker<S: Sink> {
    store: LogStore,
    sink: S,
    matcher: HookMatcher,
}

impl<S: Sink> EventTracker<S> {
    /// Tracker over an initialized store
    pub fn new(store: LogStore, sink: S) -> Self {
        Self {
            store,
            sink,
            matcher: HookMatcher::default(),
        }
    }

    /// Replace the built-in hook table
    pub fn with_matcher(mut self, matcher: HookMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Pair, enrich and append `event`
    ///
    /// A missing or undecodable opener leaves the event without a duration.
    /// Only the append can fail.
    pub fn track(&mut self, mut event: HookEvent) -> Result<TrackOutcome> {
        let mut opener_key = None;

        if let Some(opening) = self.matcher.opening_hook(&event.hook) {
            let key = event.key_for(&opening);
            match self.store.get::<HookEvent>(&key) {
                Ok(Some(opener)) => match elapsed(&opener, &event) {
                    Some(duration) => {
                        event.duration_ms = Some(duration);
                        opener_key = Some(key);
                    }
                    None => {
                        warn!(
                            "Timestamps of {} and {} are too far apart, leaving unpaired",
                            key,
                            event.key()
                        );
                    }
                },
                Ok(None) => {
                    debug!(hook = %event.hook, opener = %key, "No opening event stored");
                }
                Err(e) => {
                    warn!("Ignoring unreadable opening event {}: {}", key, e);
                }
            }
        }

        let key = event.key();
        self.store.append(&event)?;

        debug!(
            key = %key,
            duration_ms = ?event.duration_ms,
            "Tracked event"
        );

        Ok(TrackOutcome {
            key,
            opener_key,
            duration_ms: event.duration_ms,
        })
    }

    /// Deliver the unprocessed backlog as one batch
    ///
    /// On a sink failure nothing is marked and the same backlog is offered
    /// again by the next flush.
    pub fn flush(&mut self) -> Result<FlushReport> {
        let backlog = self.backlog();
        if backlog.is_empty() {
            debug!("Nothing to flush");
            return Ok(FlushReport::default());
        }

        if !self.sink.is_enabled() {
            debug!("Delivery disabled, keeping {} records", backlog.len());
            return Ok(FlushReport {
                delivered: 0,
                pending: backlog.len(),
            });
        }

        let batch: Vec<Map<String, Value>> =
            backlog.iter().map(|record| record.data.clone()).collect();

        if let Err(e) = self.sink.process_records(&batch) {
            warn!("Delivery of {} records failed: {}", batch.len(), e);
            return Err(e);
        }

        self.store.mark_processed(&backlog)?;
        info!("Delivered {} records", backlog.len());

        Ok(FlushReport {
            delivered: backlog.len(),
            pending: 0,
        })
    }

    /// Track `event`, then flush whatever the track did
    ///
    /// A failed append does not stop the flush, so records left over from
    /// earlier runs still go out.
    pub fn track_and_flush(
        &mut self,
        event: HookEvent,
    ) -> (Result<TrackOutcome>, Result<FlushReport>) {
        let tracked = self.track(event);
        if let Err(ref e) = tracked {
            warn!("Failed to record event: {}", e);
        }
        (tracked, self.flush())
    }

    /// Latest unprocessed record of every key
    pub fn backlog(&self) -> Vec<StoredRecord> {
        self.store.unprocessed().collect()
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LogStore {
        &mut self.store
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Give back the store and sink
    pub fn into_parts(self) -> (LogStore, S) {
        (self.store, self.sink)
    }
}

/// Closing minus opening timestamp, never negative
///
/// `None` when the difference does not fit in an `i64`.
fn elapsed(opener: &HookEvent, closer: &HookEvent) -> Option<i64> {
    let duration = closer.timestamp.checked_sub(opener.timestamp)?;
    if duration < 0 {
        warn!(
            "Event {} is {}ms older than its opener {}, recording 0",
            closer.key(),
            duration.unsigned_abs(),
            opener.key()
        );
        return Some(0);
    }
    Some(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use crate::sink::MemorySink;
    use devtel_core_store::StoreConfig;
    use serde_json::json;
    use tempfile::TempDir;

    const EXECUTION_ID: &str = "9714f00a-b998-49e7-97a9-a8e2051905f7";

    fn tracker(dir: &TempDir) -> EventTracker<MemorySink> {
        init_test_logging();
        let mut store = LogStore::new(StoreConfig::new(dir.path()));
        store.init().unwrap();
        EventTracker::new(store, MemorySink::new())
    }

    fn deploy(hook: &str, timestamp: i64) -> HookEvent {
        HookEvent::new(hook, timestamp).with_execution_id(EXECUTION_ID)
    }

    #[test]
    fn test_pairing_sets_duration() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        let before = tracker.track(deploy("before:deploy", 1651388142703)).unwrap();
        assert!(!before.is_paired());
        assert_eq!(before.duration_ms, None);

        let after = tracker.track(deploy("after:deploy", 1651388151749)).unwrap();
        assert_eq!(after.duration_ms, Some(9046));
        assert_eq!(
            after.opener_key.as_deref(),
            Some("9714f00a-b998-49e7-97a9-a8e2051905f7_before:deploy")
        );

        let stored: HookEvent = tracker.store().get(&after.key).unwrap().unwrap();
        assert_eq!(stored.duration_ms, Some(9046));

        let opener: HookEvent = tracker.store().get(&before.key).unwrap().unwrap();
        assert_eq!(opener.duration_ms, None);
    }

    #[test]
    fn test_unmatched_closing_hook_is_stored_without_duration() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        let outcome = tracker.track(deploy("after:deploy", 1651388151749)).unwrap();
        assert!(!outcome.is_paired());
        assert_eq!(outcome.duration_ms, None);
        assert_eq!(tracker.store().len(), 1);
    }

    #[test]
    fn test_execution_ids_do_not_cross() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker
            .track(HookEvent::new("before:build", 100).with_execution_id("run-1"))
            .unwrap();
        let outcome = tracker
            .track(HookEvent::new("after:build", 500).with_execution_id("run-2"))
            .unwrap();
        assert_eq!(outcome.duration_ms, None);
    }

    #[test]
    fn test_pairing_without_execution_id() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker.track(HookEvent::new("start:sync", 1_000)).unwrap();
        let outcome = tracker.track(HookEvent::new("restart:sync", 1_250)).unwrap();
        assert_eq!(outcome.opener_key.as_deref(), Some("start:sync"));
        assert_eq!(outcome.duration_ms, Some(250));
    }

    #[test]
    fn test_sub_scoped_hooks_pair() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker.track(deploy("before:deploy:app", 10)).unwrap();
        let outcome = tracker.track(deploy("error:deploy:app", 40)).unwrap();
        assert_eq!(outcome.duration_ms, Some(30));
    }

    #[test]
    fn test_negative_duration_is_clamped() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker.track(deploy("before:deploy", 2_000)).unwrap();
        let outcome = tracker.track(deploy("after:deploy", 1_500)).unwrap();
        assert_eq!(outcome.duration_ms, Some(0));
    }

    #[test]
    fn test_overflowing_duration_is_left_unpaired() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker.track(deploy("before:deploy", i64::MIN)).unwrap();
        let outcome = tracker.track(deploy("after:deploy", 1)).unwrap();
        assert!(!outcome.is_paired());
        assert_eq!(outcome.duration_ms, None);

        let stored: HookEvent = tracker.store().get(&outcome.key).unwrap().unwrap();
        assert_eq!(stored.duration_ms, None);
    }

    #[test]
    fn test_extreme_negative_duration_is_clamped() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker.track(deploy("before:deploy", i64::MAX)).unwrap();
        let outcome = tracker.track(deploy("after:deploy", -1)).unwrap();
        assert_eq!(outcome.duration_ms, Some(0));
    }

    #[test]
    fn test_flush_runs_after_failed_track() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.track(deploy("before:deploy", 1_000)).unwrap();

        let (tracked, flushed) = tracker.track_and_flush(HookEvent::new("", 2_000));
        assert!(tracked.is_err());
        assert_eq!(flushed.unwrap().delivered, 1);
        assert!(tracker.backlog().is_empty());
    }

    #[test]
    fn test_undecodable_opener_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker
            .store_mut()
            .append(&devtel_core_store::StoredRecord {
                key: format!("{}_before:deploy", EXECUTION_ID),
                data: json!({"timestamp": "not a number"})
                    .as_object()
                    .cloned()
                    .unwrap(),
                processed: false,
            })
            .unwrap();

        let outcome = tracker.track(deploy("after:deploy", 10)).unwrap();
        assert!(!outcome.is_paired());
        assert_eq!(outcome.duration_ms, None);
    }

    #[test]
    fn test_flush_delivers_and_marks() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker.track(deploy("before:deploy", 1651388142703)).unwrap();
        tracker.track(deploy("after:deploy", 1651388151749)).unwrap();

        let report = tracker.flush().unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(tracker.sink().batches().len(), 1);

        let batch = &tracker.sink().batches()[0];
        assert_eq!(batch[0]["hook"], json!("before:deploy"));
        assert_eq!(batch[1]["duration_ms"], json!(9046));

        // Nothing new: the second flush is empty and never reaches the sink
        let report = tracker.flush().unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(tracker.sink().attempts(), 1);
        assert!(tracker.backlog().is_empty());
    }

    #[test]
    fn test_failed_flush_keeps_backlog() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker.track(deploy("before:deploy", 1)).unwrap();
        tracker.track(deploy("after:deploy", 2)).unwrap();
        let before: Vec<StoredRecord> = tracker.backlog();

        tracker.sink_mut().set_failing(true);
        assert!(tracker.flush().is_err());
        assert_eq!(tracker.backlog(), before);

        tracker.sink_mut().set_failing(false);
        let report = tracker.flush().unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(tracker.sink().attempts(), 2);

        let delivered: Vec<&Map<String, Value>> = tracker.sink().records().collect();
        let expected: Vec<&Map<String, Value>> = before.iter().map(|r| &r.data).collect();
        assert_eq!(delivered, expected);
    }

    #[test]
    fn test_disabled_sink_keeps_backlog() {
        let dir = TempDir::new().unwrap();
        init_test_logging();
        let mut store = LogStore::new(StoreConfig::new(dir.path()));
        store.init().unwrap();
        let mut tracker = EventTracker::new(store, None::<MemorySink>);

        tracker.track(deploy("before:deploy", 1)).unwrap();
        let report = tracker.flush().unwrap();
        assert_eq!(report, FlushReport { delivered: 0, pending: 1 });
        assert_eq!(tracker.backlog().len(), 1);
    }

    #[test]
    fn test_new_events_after_flush_are_delivered_next() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        tracker.track(deploy("before:deploy", 1)).unwrap();
        tracker.flush().unwrap();
        tracker.track(deploy("after:deploy", 5)).unwrap();

        let report = tracker.flush().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(tracker.sink().batches()[1][0]["hook"], json!("after:deploy"));
    }

    #[test]
    fn test_default_fields_reach_the_sink() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.store_mut().add_default_field("os.name", "linux");

        tracker.track(deploy("before:deploy", 1)).unwrap();
        tracker.flush().unwrap();

        let record = tracker.sink().records().next().unwrap();
        assert_eq!(record["os"], json!({"name": "linux"}));
    }
}

/*!
 * Delivery sinks
 *
 * A sink takes one batch of records and either accepts all of it or none of
 * it. Nothing is marked delivered unless the sink returns `Ok`.
 */

use crate::error::{DevtelError, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-OUTREACH-CLIENT-LOGGING";

/// Header carrying the application name
pub const APP_ID_HEADER: &str = "X-OUTREACH-CLIENT-APP-ID";

/// Longest response body kept in a delivery error
const MAX_ERROR_BODY: usize = 512;

/// Destination for batches of records
pub trait Sink {
    /// Deliver one batch; any error means nothing in it was accepted
    fn process_records(&mut self, records: &[Map<String, Value>]) -> Result<()>;

    /// False when delivery is switched off and backlogs should be kept
    fn is_enabled(&self) -> bool {
        true
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn process_records(&mut self, records: &[Map<String, Value>]) -> Result<()> {
        (**self).process_records(records)
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }
}

/// `None` is a disabled sink
impl<S: Sink> Sink for Option<S> {
    fn process_records(&mut self, records: &[Map<String, Value>]) -> Result<()> {
        match self {
            Some(sink) => sink.process_records(records),
            None => Err(DevtelError::Other("Delivery is disabled".to_string())),
        }
    }

    fn is_enabled(&self) -> bool {
        self.as_ref().is_some_and(Sink::is_enabled)
    }
}

/// POSTs batches as a JSON array to a telemetry endpoint
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    url: String,
    app_name: String,
    api_key: String,
}

impl HttpSink {
    /// Build a sink for `endpoint`; batches go to `<endpoint>/`
    pub fn new(
        endpoint: &str,
        app_name: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/", endpoint.trim_end_matches('/')),
            app_name: app_name.into(),
            api_key: api_key.into(),
        })
    }

    /// URL batches are posted to
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Sink for HttpSink {
    fn process_records(&mut self, records: &[Map<String, Value>]) -> Result<()> {
        let body = serde_json::to_vec(records)?;
        debug!(url = %self.url, records = records.len(), "Sending batch");

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .header(APP_ID_HEADER, &self.app_name)
            .body(body)
            .send()?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let mut message = response.text().unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !message.is_char_boundary(end) {
                    end -= 1;
                }
                message.truncate(end);
            }
            if message.is_empty() {
                message = status.canonical_reason().unwrap_or("unexpected status").to_string();
            }
            return Err(DevtelError::Delivery {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// Keeps every batch in memory
///
/// Used by tests and dry runs. In failing mode every batch is rejected and
/// not kept.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Vec<Vec<Map<String, Value>>>,
    failing: bool,
    attempts: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject batches while `failing` is set
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Accepted batches, oldest first
    pub fn batches(&self) -> &[Vec<Map<String, Value>>] {
        &self.batches
    }

    /// Every accepted record, in delivery order
    pub fn records(&self) -> impl Iterator<Item = &Map<String, Value>> {
        self.batches.iter().flatten()
    }

    /// Number of calls, accepted or not
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl Sink for MemorySink {
    fn process_records(&mut self, records: &[Map<String, Value>]) -> Result<()> {
        self.attempts += 1;
        if self.failing {
            return Err(DevtelError::Delivery {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        self.batches.push(records.to_vec());
        Ok(())
    }
}

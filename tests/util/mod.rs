//! Shared helpers for integration tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ga_report::prelude::*;
use ga_report::throttle::ManualClock;
use ga_report::transport::TransportError;
use parking_lot::Mutex;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }

    pub fn lines(&self) -> Vec<String> {
        self.output()
            .lines()
            .map(std::string::ToString::to_string)
            .collect()
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[allow(dead_code)]
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[allow(dead_code)]
pub fn metadata() -> StaticMetadata {
    StaticMetadata::from_path(&fixture("metadata.json")).expect("metadata fixture")
}

/// The three recorded pages of the daily pageviews-by-medium report.
#[allow(dead_code)]
pub fn daily_pages() -> Vec<RawPage> {
    let raw = std::fs::read_to_string(fixture("pages/daily_by_medium.json")).expect("pages fixture");
    serde_json::from_str(&raw).expect("pages fixture parses")
}

/// An API over the metadata fixture with a manual clock.
#[allow(dead_code)]
pub fn api(transport: Arc<dyn Transport>, clock: Arc<ManualClock>) -> ReportingApi {
    ReportingApi::from_metadata("67890", &metadata(), transport, ClientConfig::default())
        .expect("api from fixture")
        .with_clock(clock)
}

// ---------------------------------------------------------------------------
// Transport double
// ---------------------------------------------------------------------------

/// One call seen by [`RecordingTransport`].
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: Endpoint,
    pub params: BTreeMap<String, String>,
    /// Manual clock reading when the call arrived.
    pub at: Duration,
}

/// Serves pages in order and records when each call arrived.
#[allow(dead_code)]
pub struct RecordingTransport {
    pages: Mutex<std::collections::VecDeque<Result<RawPage, TransportError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    clock: Arc<ManualClock>,
    /// Simulated latency of each call.
    latency: Duration,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new(pages: impl IntoIterator<Item = RawPage>, clock: Arc<ManualClock>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
            clock,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_error(&self, error: TransportError) {
        self.pages.lock().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn start_indices(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .map(|call| call.params.get("start_index").cloned())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn fetch(
        &self,
        endpoint: Endpoint,
        params: &BTreeMap<String, String>,
    ) -> Result<RawPage, TransportError> {
        self.calls.lock().push(RecordedCall {
            endpoint,
            params: params.clone(),
            at: self.clock.elapsed(),
        });
        self.clock.advance(self.latency);
        self.pages.lock().pop_front().unwrap_or_else(|| {
            Err(TransportError::from_status(500, "no page left"))
        })
    }
}

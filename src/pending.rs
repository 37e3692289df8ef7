use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::{Clock, iso_timestamp};
use crate::config::RequestConfig;
use crate::error::RequestError;
use crate::history_counter::HistoryCounter;
use crate::id::CorrelationId;
use crate::ipc::agent::ReportMessageRequest;
use crate::logger::ErrorSink;
use crate::protocol::RequestType;

pub type AlternateReject = Box<dyn FnOnce(Value) + Send + Sync>;

pub(crate) type Outcome = Result<Value, RequestError>;

/// Rounds `count` down to a power of ten, never below `threshold`.
///
/// Counts under the threshold are returned unchanged. Above it, every count in
/// `[10^k, 10^(k+1))` maps to the same value, so repeated alerts read the same
/// and duplicate suppression downstream can fold them.
pub fn round_down_exponentially(count: u64, threshold: u64) -> u64 {
    if count < threshold || count == 0 {
        return count;
    }
    let mut power = 1u64;
    while power <= count / 10 {
        power *= 10;
    }
    power.max(threshold)
}

/// An outbound request waiting for its response.
pub struct PendingRequest {
    pub method: String,
    pub provider_id: Option<String>,
    created_at_ms: Option<u64>,
    tx: oneshot::Sender<Outcome>,
    alternate_reject: Option<AlternateReject>,
}

impl PendingRequest {
    pub(crate) fn new(
        method: impl Into<String>,
        provider_id: Option<String>,
    ) -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let request = PendingRequest {
            method: method.into(),
            provider_id,
            created_at_ms: None,
            tx,
            alternate_reject: None,
        };
        (request, rx)
    }

    /// Routes a host error to `reject` instead of the caller's future.
    pub fn with_alternate_reject(mut self, reject: Option<AlternateReject>) -> Self {
        self.alternate_reject = reject;
        self
    }

    /// Volume-tracking key: `method` or `method:providerId`.
    pub fn identifier(&self) -> String {
        match &self.provider_id {
            Some(provider_id) => format!("{}:{}", self.method, provider_id),
            None => self.method.clone(),
        }
    }

    pub fn created_at_ms(&self) -> Option<u64> {
        self.created_at_ms
    }

    pub fn resolve(self, value: Value) {
        // A caller that stopped waiting has dropped the receiver.
        let _ = self.tx.send(Ok(value));
    }

    pub fn reject(self, error: Value) {
        match self.alternate_reject {
            Some(reject) => reject(error),
            None => {
                let _ = self.tx.send(Err(RequestError::Host(error)));
            }
        }
    }

    fn info(&self) -> RequestInfo {
        RequestInfo {
            method: self.method.clone(),
            provider_id: self.provider_id.clone(),
            created_at_ms: self.created_at_ms,
        }
    }
}

/// Snapshot of a pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub provider_id: Option<String>,
    pub created_at_ms: Option<u64>,
}

/// Stale requests of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRequestGroup {
    pub method: String,
    pub ids: Vec<String>,
    pub oldest_ms: u64,
}

impl fmt::Display for StaleRequestGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Found {} stale requests for {} with oldest at {}",
            self.ids.len(),
            self.method,
            iso_timestamp(self.oldest_ms)
        )
    }
}

/// In-flight requests keyed by correlation id, with call-volume alerts and
/// staleness reports.
pub struct PendingRequests {
    requests: DashMap<String, PendingRequest>,
    history: HistoryCounter,
    config: RequestConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ErrorSink>,
}

impl PendingRequests {
    pub fn new(config: RequestConfig, clock: Arc<dyn Clock>, sink: Arc<dyn ErrorSink>) -> Self {
        let history = HistoryCounter::new(
            "webview",
            config.history_bucket_secs,
            config.history_max_len,
            config.history_debug,
            clock.clone(),
        );
        PendingRequests {
            requests: DashMap::new(),
            history,
            config,
            clock,
            sink,
        }
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// The error reporter's own method is always exempt: its requests carry
    /// the alerts, so alerting on them would recurse.
    fn is_exempt(&self, identifier: &str) -> bool {
        identifier == ReportMessageRequest::METHOD
            || self.config.exempt_identifiers.iter().any(|e| e == identifier)
    }

    pub fn set(&self, id: CorrelationId, mut request: PendingRequest) {
        let identifier = request.identifier();
        let count = self.history.count_and_get(&identifier);
        let rounded = round_down_exponentially(count, self.config.alert_threshold);
        if count > self.config.alert_threshold && !self.is_exempt(&identifier) {
            self.sink.log_error(
                anyhow::anyhow!("More than {rounded} calls pending for {identifier}").into(),
            );
        }

        request.created_at_ms = id.created_at_ms();
        self.requests.insert(id.into_string(), request);
    }

    pub fn get(&self, id: &str) -> Option<RequestInfo> {
        self.requests.get(id).map(|entry| entry.value().info())
    }

    pub fn delete(&self, id: &str) -> bool {
        self.requests.remove(id).is_some()
    }

    /// Removes and returns the entry, so exactly one caller can settle it.
    pub fn take(&self, id: &str) -> Option<PendingRequest> {
        self.requests.remove(id).map(|(_, request)| request)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn is_stale(&self, created_at_ms: u64, now_ms: u64) -> bool {
        let elapsed_secs = (now_ms as f64 - created_at_ms as f64) / 1000.0;
        elapsed_secs > self.config.stale_threshold_secs as f64
    }

    /// One description per request pending longer than the stale threshold.
    /// Entries without a recoverable creation time are skipped.
    pub fn collect_stale_requests(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        self.requests
            .iter()
            .filter_map(|entry| {
                let request = entry.value();
                let created = request.created_at_ms?;
                self.is_stale(created, now).then(|| {
                    format!(
                        "Found stale request {} at {}",
                        request.method,
                        iso_timestamp(created)
                    )
                })
            })
            .collect()
    }

    /// Stale requests grouped by method, ordered by method name.
    pub fn summarize_stale_requests(&self) -> Vec<StaleRequestGroup> {
        let now = self.clock.now_ms();
        let mut groups: BTreeMap<String, StaleRequestGroup> = BTreeMap::new();
        for entry in self.requests.iter() {
            let request = entry.value();
            let Some(created) = request.created_at_ms else {
                continue;
            };
            if !self.is_stale(created, now) {
                continue;
            }
            let group = groups
                .entry(request.method.clone())
                .or_insert_with(|| StaleRequestGroup {
                    method: request.method.clone(),
                    ids: Vec::new(),
                    oldest_ms: created,
                });
            group.ids.push(entry.key().clone());
            group.oldest_ms = group.oldest_ms.min(created);
        }
        groups.into_values().collect()
    }

    /// Logs every stale request to the sink and trims the call history.
    pub fn report_stale_requests(&self) {
        for item in self.collect_stale_requests() {
            self.sink.log_error(item.into());
        }
        self.history.trim();
    }
}

/// Background task running [`PendingRequests::report_stale_requests`] on a
/// fixed period. Stops on [`stop`](Self::stop) or drop.
pub struct StaleReporter {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl StaleReporter {
    /// Spawns the reporter; must be called from within a tokio runtime. The
    /// first report happens one full `period` after start.
    pub fn start(requests: &Arc<PendingRequests>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let requests: Weak<PendingRequests> = Arc::downgrade(requests);
        let cancel = token.clone();
        let period = period.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(requests) = requests.upgrade() else { break };
                        debug!(pending = requests.len(), "checking for stale requests");
                        requests.report_stale_requests();
                    }
                }
            }
            info!("stale request reporter stopped");
        });

        StaleReporter {
            token,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        self.token.cancel();
        self.handle.take();
    }
}

impl Drop for StaleReporter {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RequestConfig;
use crate::emitter::{Disposable, EventEmitter};
use crate::error::{HostApiError, RequestError, host_error_to_string};
use crate::id::next_id_with;
use crate::ipc::agent::{TelemetryRequest, TelemetryRequestParams};
use crate::logger::{ErrorSink, HostReportingSink};
use crate::pending::{AlternateReject, PendingRequest, PendingRequests, StaleReporter};
use crate::protocol::{
    Envelope, NotificationMessage, NotificationType, RequestMessage, RequestType, ResponseMessage,
};
use crate::server::Server;
use crate::transport::{IpcHost, find_host};

/// Settles with the host's response. Never completes when the host's error
/// was swallowed or routed to an alternate reject.
pub type ResponseFuture<T> = BoxFuture<'static, Result<T, RequestError>>;

#[derive(Default)]
pub struct SendOptions {
    /// Receives the host's error instead of the returned future.
    pub alternate_reject: Option<AlternateReject>,
}

impl SendOptions {
    pub fn alternate_reject<F>(reject: F) -> Self
    where
        F: FnOnce(Value) + Send + Sync + 'static,
    {
        SendOptions {
            alternate_reject: Some(Box::new(reject)),
        }
    }
}

pub(crate) struct Inner {
    port: Arc<dyn IpcHost>,
    emitter: EventEmitter,
    requests: Arc<PendingRequests>,
    clock: Arc<dyn Clock>,
    reporter: Mutex<Option<StaleReporter>>,
}

/// Client side of the host connection: typed requests, notifications and
/// the inbound message handler, over one [`IpcHost`].
#[derive(Clone)]
pub struct HostApi {
    inner: Arc<Inner>,
}

static INSTANCE: OnceLock<HostApi> = OnceLock::new();

impl HostApi {
    /// Errors are logged and forwarded to the host as reporting requests.
    pub fn new(port: Arc<dyn IpcHost>, config: RequestConfig) -> Self {
        Self::build(port, config, Arc::new(SystemClock), None)
    }

    pub fn with_sink(
        port: Arc<dyn IpcHost>,
        config: RequestConfig,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self::build(port, config, Arc::new(SystemClock), Some(sink))
    }

    pub fn with_clock_and_sink(
        port: Arc<dyn IpcHost>,
        config: RequestConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self::build(port, config, clock, Some(sink))
    }

    fn build(
        port: Arc<dyn IpcHost>,
        config: RequestConfig,
        clock: Arc<dyn Clock>,
        sink: Option<Arc<dyn ErrorSink>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| {
            let sink = sink.unwrap_or_else(|| Arc::new(HostReportingSink::new(weak.clone())));
            Inner {
                port,
                emitter: EventEmitter::new(),
                requests: Arc::new(PendingRequests::new(config, clock.clone(), sink)),
                clock,
                reporter: Mutex::new(None),
            }
        });

        let weak = Arc::downgrade(&inner);
        inner.port.set_onmessage(Arc::new(move |message: Value| {
            if let Some(inner) = weak.upgrade() {
                HostApi::from_inner(inner).handle_message(message);
            }
        }));

        let api = HostApi { inner };
        if api.inner.requests.config().enable_stale_report {
            api.start_stale_reporter();
        }
        api
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        HostApi { inner }
    }

    /// Installs the process-wide instance on `port`. Later calls return the
    /// existing instance and ignore their arguments.
    pub fn init(port: Arc<dyn IpcHost>, config: RequestConfig) -> &'static HostApi {
        INSTANCE.get_or_init(|| HostApi::new(port, config))
    }

    /// The process-wide instance, built with default settings on the host
    /// from [`find_host`] if [`init`](Self::init) was never called.
    pub fn instance() -> Result<&'static HostApi, HostApiError> {
        if let Some(api) = INSTANCE.get() {
            return Ok(api);
        }
        let port = find_host()?;
        Ok(INSTANCE.get_or_init(|| HostApi::new(port, RequestConfig::default())))
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.inner.emitter
    }

    pub fn requests(&self) -> &PendingRequests {
        &self.inner.requests
    }

    pub fn server(&self) -> Server {
        Server::new(self.clone())
    }

    /// Starts the periodic stale-request report if it is not running.
    /// Needs a tokio runtime; without one the report stays off.
    pub fn start_stale_reporter(&self) {
        let mut reporter = self
            .inner
            .reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if reporter.as_ref().is_some_and(StaleReporter::is_running) {
            return;
        }
        if Handle::try_current().is_err() {
            warn!("no async runtime; stale request reporting disabled");
            return;
        }
        let period = Duration::from_secs(self.inner.requests.config().stale_report_interval_secs);
        *reporter = Some(StaleReporter::start(&self.inner.requests, period));
    }

    pub fn stale_reporter_running(&self) -> bool {
        self.inner
            .reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(StaleReporter::is_running)
    }

    /// Stops background work. Pending requests stay registered.
    pub fn shutdown(&self) {
        let reporter = self
            .inner
            .reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut reporter) = reporter {
            reporter.stop();
        }
    }

    /// Sends a typed request. The request is registered and posted before
    /// this returns; awaiting the future only waits for the answer.
    pub fn send<R: RequestType>(
        &self,
        params: &R::Params,
        options: SendOptions,
    ) -> ResponseFuture<R::Response> {
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(source) => {
                return Box::pin(future::ready(Err(RequestError::Encode {
                    method: R::METHOD.to_string(),
                    source,
                })));
            }
        };
        let response = self.request(R::METHOD, params, options);
        Box::pin(async move {
            let value = response.await?;
            serde_json::from_value(value).map_err(|source| RequestError::Decode {
                method: R::METHOD.to_string(),
                source,
            })
        })
    }

    /// Untyped [`send`](Self::send). A `null` `params` is left off the wire.
    pub fn request(
        &self,
        method: &str,
        params: Value,
        options: SendOptions,
    ) -> ResponseFuture<Value> {
        let id = next_id_with(self.inner.clock.as_ref());
        let provider_id = params
            .get("providerId")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let (pending, rx) = PendingRequest::new(method, provider_id);
        let key = id.as_str().to_string();
        self.inner
            .requests
            .set(id, pending.with_alternate_reject(options.alternate_reject));

        let envelope = Envelope::Request(RequestMessage {
            id: key.clone(),
            method: method.to_string(),
            params: (!params.is_null()).then_some(params),
        });
        if let Err(source) = self.inner.port.post_message(&envelope) {
            self.inner.requests.delete(&key);
            return Box::pin(future::ready(Err(RequestError::Transport {
                method: method.to_string(),
                source,
            })));
        }
        debug!(id = %key, method, "request sent to host");

        Box::pin(async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => future::pending().await,
            }
        })
    }

    /// Posts a notification; nothing is tracked.
    pub fn notify<N: NotificationType>(&self, params: &N::Params) -> Result<(), RequestError> {
        let params = serde_json::to_value(params).map_err(|source| RequestError::Encode {
            method: N::METHOD.to_string(),
            source,
        })?;
        let envelope = Envelope::Notification(NotificationMessage {
            method: N::METHOD.to_string(),
            params: (!params.is_null()).then_some(params),
        });
        self.inner
            .port
            .post_message(&envelope)
            .map_err(|source| RequestError::Transport {
                method: N::METHOD.to_string(),
                source,
            })?;
        debug!(method = N::METHOD, "notification sent to host");
        Ok(())
    }

    /// Sends a telemetry event without waiting for the reply.
    pub fn track(&self, event_name: &str, properties: Option<Map<String, Value>>) {
        let params = TelemetryRequestParams {
            event_name: event_name.to_string(),
            properties,
        };
        drop(self.send::<TelemetryRequest>(&params, SendOptions::default()));
    }

    pub fn on<N, F>(&self, listener: F) -> Disposable
    where
        N: NotificationType,
        F: Fn(N::Params) + Send + Sync + 'static,
    {
        self.inner.emitter.on::<N, F>(listener)
    }

    /// Entry point for every message arriving from the host.
    pub fn handle_message(&self, message: Value) {
        let envelope = match Envelope::parse(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("ignoring message from host: {e}");
                return;
            }
        };
        match envelope {
            Envelope::Response(response) => self.settle(response),
            Envelope::Request(request) => {
                debug!(id = %request.id, method = %request.method, "host-initiated requests are not handled");
            }
            Envelope::Notification(notification) => {
                debug!(method = %notification.method, "received notification from host");
                self.inner.emitter.emit(
                    &notification.method,
                    notification.params.unwrap_or(Value::Null),
                );
            }
        }
    }

    fn settle(&self, response: ResponseMessage) {
        let Some(pending) = self.inner.requests.take(&response.id) else {
            debug!(id = %response.id, "received response from host; unable to find a pending request");
            return;
        };
        debug!(id = %response.id, method = %pending.method, "received response from host");

        match response.error {
            Some(error) if host_error_to_string(&error).contains("maintenance mode") => {
                debug!(id = %response.id, "host is in maintenance mode; response dropped");
            }
            Some(error) => pending.reject(error),
            None => pending.resolve(response.params.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ipc::host::{BootstrapInHostRequest, EditorHighlightRangeRequest};
    use crate::ipc::webview::{
        ShowCodemarkNotification, ShowProgressIndicatorNotification, ShowProgressIndicatorParams,
    };
    use crate::logger::testing::RecordingSink;
    use crate::transport::ChannelHost;
    use serde_json::json;
    use tokio::sync::{mpsc, oneshot};

    struct Fixture {
        host: Arc<ChannelHost>,
        outbound: mpsc::UnboundedReceiver<Envelope>,
        sink: Arc<RecordingSink>,
        api: HostApi,
    }

    fn fixture() -> Fixture {
        let (host, outbound) = ChannelHost::new();
        let sink = Arc::new(RecordingSink::default());
        let api = HostApi::with_clock_and_sink(
            host.clone(),
            RequestConfig::without_stale_report(),
            Arc::new(ManualClock::new(1_675_238_400_000)),
            sink.clone(),
        );
        Fixture {
            host,
            outbound,
            sink,
            api,
        }
    }

    fn next_request(outbound: &mut mpsc::UnboundedReceiver<Envelope>) -> RequestMessage {
        match outbound.try_recv() {
            Ok(Envelope::Request(request)) => request,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    async fn still_pending<T>(future: ResponseFuture<T>) -> bool {
        tokio::time::timeout(Duration::from_millis(50), future)
            .await
            .is_err()
    }

    #[tokio::test]
    async fn responses_are_matched_by_id_not_order() {
        let mut f = fixture();
        let a = f.api.request("host/a", Value::Null, SendOptions::default());
        let b = f.api.request("host/b", Value::Null, SendOptions::default());
        let id_a = next_request(&mut f.outbound).id;
        let id_b = next_request(&mut f.outbound).id;

        f.host.deliver(json!({ "id": id_b, "params": "B" }));
        assert_eq!(b.await.unwrap(), json!("B"));
        assert_eq!(f.api.requests().get(&id_a).unwrap().method, "host/a");

        f.host.deliver(json!({ "id": id_a, "params": "A" }));
        assert_eq!(a.await.unwrap(), json!("A"));
        assert!(f.api.requests().is_empty());
    }

    #[tokio::test]
    async fn request_envelope_omits_null_params() {
        let mut f = fixture();
        let _pending = f.api.send::<BootstrapInHostRequest>(&(), SendOptions::default());
        let request = next_request(&mut f.outbound);
        assert_eq!(request.method, "host/bootstrap");
        assert!(request.id.starts_with("wv:"));
        assert_eq!(request.params, None);
    }

    #[tokio::test]
    async fn typed_responses_are_decoded() {
        let mut f = fixture();
        let pending = f.api.send::<BootstrapInHostRequest>(&(), SendOptions::default());
        let id = next_request(&mut f.outbound).id;
        f.host.deliver(json!({ "id": id, "params": { "version": "15.2.0" } }));
        assert_eq!(pending.await.unwrap().version, "15.2.0");
    }

    #[tokio::test]
    async fn undecodable_responses_fail_the_request() {
        let mut f = fixture();
        let params = crate::ipc::host::EditorHighlightRangeParams {
            uri: "file:///a.ts".into(),
            reference: None,
            range: Default::default(),
            highlight: true,
        };
        let typed = f.api.send::<EditorHighlightRangeRequest>(&params, SendOptions::default());
        let id = next_request(&mut f.outbound).id;
        f.host.deliver(json!({ "id": id, "params": "garbage" }));
        assert!(matches!(typed.await, Err(RequestError::Decode { .. })));
    }

    #[tokio::test]
    async fn host_errors_reject_the_request() {
        let mut f = fixture();
        let pending = f.api.request("host/a", Value::Null, SendOptions::default());
        let id = next_request(&mut f.outbound).id;
        f.host.deliver(json!({ "id": id, "error": { "message": "nope" } }));
        match pending.await {
            Err(RequestError::Host(error)) => assert_eq!(error, json!({ "message": "nope" })),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(f.api.requests().is_empty());
    }

    #[tokio::test]
    async fn maintenance_mode_errors_leave_the_request_unsettled() {
        let mut f = fixture();
        let pending = f.api.request("host/a", Value::Null, SendOptions::default());
        let id = next_request(&mut f.outbound).id;
        f.host.deliver(json!({ "id": id, "error": "The server is in maintenance mode" }));
        assert!(still_pending(pending).await);
        assert!(f.api.requests().is_empty());
    }

    #[tokio::test]
    async fn maintenance_mode_inside_an_error_object_still_rejects() {
        let mut f = fixture();
        let pending = f.api.request("host/a", Value::Null, SendOptions::default());
        let id = next_request(&mut f.outbound).id;
        f.host.deliver(json!({ "id": id, "error": { "message": "in maintenance mode" } }));
        assert!(matches!(pending.await, Err(RequestError::Host(_))));
    }

    #[tokio::test]
    async fn alternate_reject_receives_host_errors() {
        let mut f = fixture();
        let (tx, rx) = oneshot::channel();
        let pending = f.api.request(
            "host/a",
            Value::Null,
            SendOptions::alternate_reject(move |error| {
                let _ = tx.send(error);
            }),
        );
        let id = next_request(&mut f.outbound).id;
        f.host.deliver(json!({ "id": id, "error": "denied" }));

        assert_eq!(rx.await.unwrap(), json!("denied"));
        assert!(still_pending(pending).await);
    }

    #[tokio::test]
    async fn orphan_responses_are_ignored() {
        let f = fixture();
        f.host.deliver(json!({ "id": "wv:999:abc:1", "params": 1 }));
        f.host.deliver(json!({ "id": "wv:999:abc:1", "error": "late" }));
        assert!(f.sink.messages().is_empty());
    }

    #[tokio::test]
    async fn host_requests_are_a_no_op() {
        let mut f = fixture();
        f.host.deliver(json!({ "id": "h1", "method": "webview/ask" }));
        f.host.deliver(json!({ "params": 1 }));
        assert!(f.outbound.try_recv().is_err());
        assert!(f.api.requests().is_empty());
    }

    #[tokio::test]
    async fn notifications_reach_listeners() {
        let f = fixture();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = f.api.on::<ShowCodemarkNotification, _>(move |params| {
            let _ = tx.send(params.codemark_id);
        });
        f.host.deliver(json!({ "method": "webview/codemark/show", "params": { "codemarkId": "c1" } }));
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn notifications_delivered_from_a_plain_thread_reach_listeners() {
        let f = fixture();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = f.api.on::<ShowCodemarkNotification, _>(move |params| {
            let _ = tx.send(params.codemark_id);
        });
        let host = f.host.clone();
        std::thread::spawn(move || {
            host.deliver(json!({ "method": "webview/codemark/show", "params": { "codemarkId": "c2" } }));
        })
        .join()
        .unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn notify_posts_without_tracking() {
        let mut f = fixture();
        f.api
            .notify::<ShowProgressIndicatorNotification>(&ShowProgressIndicatorParams {
                progress_status: true,
            })
            .unwrap();
        assert_eq!(
            f.outbound.try_recv().unwrap(),
            Envelope::Notification(NotificationMessage {
                method: "webview/system/progressIndicator".into(),
                params: Some(json!({ "progressStatus": true })),
            })
        );
        assert!(f.api.requests().is_empty());
    }

    #[tokio::test]
    async fn track_sends_a_telemetry_request() {
        let mut f = fixture();
        let mut properties = Map::new();
        properties.insert("Source".into(), json!("sidebar"));
        f.api.track("Page Viewed", Some(properties));

        let request = next_request(&mut f.outbound);
        assert_eq!(request.method, "codestream/telemetry");
        assert_eq!(
            request.params,
            Some(json!({ "eventName": "Page Viewed", "properties": { "Source": "sidebar" } }))
        );
        assert_eq!(f.api.requests().len(), 1);
    }

    #[tokio::test]
    async fn provider_id_qualifies_volume_alerts() {
        let f = fixture();
        let mut pending = Vec::new();
        for _ in 0..21 {
            pending.push(f.api.request(
                "codestream/provider/query",
                json!({ "providerId": "github*com" }),
                SendOptions::default(),
            ));
        }
        assert_eq!(
            f.sink.messages(),
            vec!["More than 20 calls pending for codestream/provider/query:github*com".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_post_removes_the_entry() {
        let f = fixture();
        let Fixture { api, outbound, .. } = f;
        drop(outbound);
        let outcome = api.request("host/a", Value::Null, SendOptions::default()).await;
        assert!(matches!(outcome, Err(RequestError::Transport { .. })));
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn default_sink_reports_alerts_to_the_host() {
        let (host, mut outbound) = ChannelHost::new();
        let api = HostApi::build(
            host,
            RequestConfig::without_stale_report(),
            Arc::new(ManualClock::new(1_675_238_400_000)),
            None,
        );
        let mut pending = Vec::new();
        for _ in 0..21 {
            pending.push(api.request("/whatever", Value::Null, SendOptions::default()));
        }

        let mut reports = Vec::new();
        while let Ok(envelope) = outbound.try_recv() {
            if let Envelope::Request(request) = envelope {
                if request.method == "codestream/reporting/message" {
                    reports.push(request.params);
                }
            }
        }
        assert_eq!(
            reports,
            vec![Some(json!({
                "type": "error",
                "error": "More than 20 calls pending for /whatever",
                "source": "webview"
            }))]
        );
    }

    #[tokio::test]
    async fn reports_never_alert_even_without_configured_exemptions() {
        let (host, mut outbound) = ChannelHost::new();
        let config = RequestConfig {
            exempt_identifiers: Vec::new(),
            ..RequestConfig::without_stale_report()
        };
        let api = HostApi::build(
            host,
            config,
            Arc::new(ManualClock::new(1_675_238_400_000)),
            None,
        );
        let mut pending = Vec::new();
        for _ in 0..41 {
            pending.push(api.request("/whatever", Value::Null, SendOptions::default()));
        }

        let mut reports = 0;
        while let Ok(envelope) = outbound.try_recv() {
            if matches!(envelope, Envelope::Request(ref r) if r.method == "codestream/reporting/message") {
                reports += 1;
            }
        }
        assert_eq!(reports, 21);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reporter_follows_the_config() {
        let (host, _outbound) = ChannelHost::new();
        let sink = Arc::new(RecordingSink::default());
        let api = HostApi::with_sink(host.clone(), RequestConfig::default(), sink.clone());
        assert!(api.stale_reporter_running());
        api.shutdown();
        assert!(!api.stale_reporter_running());

        let quiet = HostApi::with_sink(host, RequestConfig::without_stale_report(), sink);
        assert!(!quiet.stale_reporter_running());
        quiet.start_stale_reporter();
        assert!(quiet.stale_reporter_running());
    }

    #[test]
    fn instance_without_a_host_factory_fails() {
        assert!(matches!(HostApi::instance(), Err(HostApiError::MissingHost)));
    }
}

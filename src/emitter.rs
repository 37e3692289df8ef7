use std::any::TypeId;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::ipc::webview::{
    HostDidChangeActiveEditorNotification, HostDidChangeEditorSelectionNotification,
    HostDidChangeEditorVisibleRangesNotification, NewCodemarkNotification,
    NewReviewNotification,
};
use crate::normalize::{normalize_nested_uri_field, normalize_uri_field};
use crate::protocol::NotificationType;

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wraps a listener so the payload is rewritten before it sees it.
pub type Normalizer = Arc<dyn Fn(Listener) -> Listener + Send + Sync>;

type Registry = DashMap<String, Vec<Listener>>;

/// Listeners keyed by notification method, dispatched on a later task.
pub struct EventEmitter {
    listeners: Arc<Registry>,
    // Keyed by notification type, not method, so unrelated types sharing a
    // method name never pick up each other's rewrites.
    normalizers: DashMap<TypeId, Normalizer>,
    // Runtime current at construction, used when `emit` runs outside one.
    runtime: Option<Handle>,
}

impl EventEmitter {
    /// Emitter with the URI normalizers for host editor notifications.
    pub fn new() -> Self {
        let emitter = Self::without_normalizers();
        emitter.register_normalizer::<HostDidChangeActiveEditorNotification>(Arc::new(
            |listener: Listener| rewrite(listener, normalize_active_editor),
        ));
        emitter.register_normalizer::<HostDidChangeEditorSelectionNotification>(Arc::new(
            |listener: Listener| rewrite(listener, normalize_uri),
        ));
        emitter.register_normalizer::<HostDidChangeEditorVisibleRangesNotification>(Arc::new(
            |listener: Listener| rewrite(listener, normalize_uri),
        ));
        emitter.register_normalizer::<NewCodemarkNotification>(Arc::new(|listener: Listener| {
            rewrite(listener, normalize_uri)
        }));
        emitter.register_normalizer::<NewReviewNotification>(Arc::new(|listener: Listener| {
            rewrite(listener, normalize_uri)
        }));
        emitter
    }

    pub fn without_normalizers() -> Self {
        EventEmitter {
            listeners: Arc::new(DashMap::new()),
            normalizers: DashMap::new(),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Applies to listeners registered after this call.
    pub fn register_normalizer<N: NotificationType>(&self, normalizer: Normalizer) {
        self.normalizers.insert(TypeId::of::<N>(), normalizer);
    }

    /// Registers a typed listener for `N`. Payloads that do not decode as
    /// `N::Params` are skipped.
    pub fn on<N, F>(&self, listener: F) -> Disposable
    where
        N: NotificationType,
        F: Fn(N::Params) + Send + Sync + 'static,
    {
        let typed: Listener = Arc::new(move |body: &Value| {
            match serde_json::from_value::<N::Params>(body.clone()) {
                Ok(params) => listener(params),
                Err(e) => debug!(method = N::METHOD, "skipping undecodable notification: {e}"),
            }
        });
        let normalizer = self
            .normalizers
            .get(&TypeId::of::<N>())
            .map(|entry| entry.value().clone());
        let listener = match normalizer {
            Some(normalize) => normalize(typed),
            None => typed,
        };
        self.add(N::METHOD, listener)
    }

    /// Registers an untyped listener under a method name.
    pub fn on_method(&self, method: &str, listener: Listener) -> Disposable {
        self.add(method, listener)
    }

    fn add(&self, method: &str, listener: Listener) -> Disposable {
        self.listeners
            .entry(method.to_string())
            .or_default()
            .push(listener.clone());
        Disposable {
            registry: Arc::downgrade(&self.listeners),
            method: method.to_string(),
            listener,
        }
    }

    pub fn listener_count(&self, method: &str) -> usize {
        self.listeners.get(method).map_or(0, |l| l.len())
    }

    /// Schedules delivery of `body` to the listeners registered right now.
    ///
    /// Delivery runs on a spawned task, never inside this call: on the
    /// caller's runtime, or the one the emitter was built on. A panicking
    /// listener does not keep the others from running.
    pub fn emit(&self, event_name: &str, body: Value) {
        let snapshot = match self.listeners.get(event_name) {
            Some(listeners) if !listeners.is_empty() => listeners.value().clone(),
            _ => return,
        };
        let Some(runtime) = Handle::try_current().ok().or_else(|| self.runtime.clone()) else {
            warn!(method = event_name, "no async runtime; notification dropped");
            return;
        };
        runtime.spawn(async move {
            for listener in snapshot {
                let _ = catch_unwind(AssertUnwindSafe(|| listener(&body)));
            }
        });
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_uri(body: &mut Value) {
    normalize_uri_field(body, "uri");
}

fn normalize_active_editor(body: &mut Value) {
    normalize_nested_uri_field(body, "editor", "uri");
}

fn rewrite(listener: Listener, edit: fn(&mut Value)) -> Listener {
    Arc::new(move |body: &Value| {
        let mut body = body.clone();
        edit(&mut body);
        listener(&body)
    })
}

/// Handle returned by registration; removes exactly that listener.
pub struct Disposable {
    registry: Weak<Registry>,
    method: String,
    listener: Listener,
}

impl Disposable {
    pub fn dispose(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if let Some(mut listeners) = registry.get_mut(&self.method) {
            listeners.retain(|l| !Arc::ptr_eq(l, &self.listener));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::webview::{HostDidChangeEditorSelectionParams, ShowCodemarkNotification};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn show_codemark(id: &str) -> Value {
        json!({ "codemarkId": id })
    }

    #[tokio::test]
    async fn dispatch_is_deferred() {
        let emitter = EventEmitter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let _sub = emitter.on::<ShowCodemarkNotification, _>(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(ShowCodemarkNotification::METHOD, show_codemark("c1"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn emit_without_listeners_is_a_no_op() {
        let emitter = EventEmitter::new();
        emitter.emit("webview/nobody/listens", json!({}));
        assert_eq!(emitter.listener_count("webview/nobody/listens"), 0);
    }

    #[tokio::test]
    async fn emit_from_a_plain_thread_uses_the_construction_runtime() {
        let emitter = Arc::new(EventEmitter::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = emitter.on::<ShowCodemarkNotification, _>(move |params| {
            let _ = tx.send(params.codemark_id);
        });

        let from_thread = emitter.clone();
        std::thread::spawn(move || {
            from_thread.emit(ShowCodemarkNotification::METHOD, show_codemark("c1"));
        })
        .join()
        .unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("c1"));
    }

    #[test]
    fn emit_without_any_runtime_is_dropped() {
        let emitter = EventEmitter::new();
        let _sub = emitter.on::<ShowCodemarkNotification, _>(|_| panic!("must not run"));
        emitter.emit(ShowCodemarkNotification::METHOD, show_codemark("c1"));
    }

    #[tokio::test]
    async fn panicking_listener_does_not_stop_siblings() {
        let emitter = EventEmitter::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _first = emitter.on::<ShowCodemarkNotification, _>(|_| panic!("listener fault"));
        let _second = emitter.on::<ShowCodemarkNotification, _>(move |params| {
            let _ = tx.send(params.codemark_id);
        });

        emitter.emit(ShowCodemarkNotification::METHOD, show_codemark("c1"));
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn listeners_run_in_registration_order() {
        let emitter = EventEmitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for i in 0..3 {
            let order = order.clone();
            subs.push(emitter.on::<ShowCodemarkNotification, _>(move |_| {
                order.lock().unwrap().push(i);
            }));
        }
        emitter.emit(ShowCodemarkNotification::METHOD, show_codemark("c1"));
        settle().await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dispose_removes_only_that_listener() {
        let emitter = EventEmitter::new();
        let removed = Arc::new(AtomicUsize::new(0));
        let kept = Arc::new(AtomicUsize::new(0));

        let r = removed.clone();
        let sub = emitter.on::<ShowCodemarkNotification, _>(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let k = kept.clone();
        let _other = emitter.on::<ShowCodemarkNotification, _>(move |_| {
            k.fetch_add(1, Ordering::SeqCst);
        });

        sub.dispose();
        assert_eq!(emitter.listener_count(ShowCodemarkNotification::METHOD), 1);

        emitter.emit(ShowCodemarkNotification::METHOD, show_codemark("c1"));
        settle().await;
        assert_eq!(removed.load(Ordering::SeqCst), 0);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listeners_see_the_snapshot_taken_at_emit() {
        let emitter = EventEmitter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let sub = emitter.on::<ShowCodemarkNotification, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(ShowCodemarkNotification::METHOD, show_codemark("c1"));
        sub.dispose();
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn editor_selection_uris_are_normalized() {
        let emitter = EventEmitter::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = emitter.on::<HostDidChangeEditorSelectionNotification, _>(
            move |params: HostDidChangeEditorSelectionParams| {
                let _ = tx.send(params.uri);
            },
        );

        emitter.emit(
            HostDidChangeEditorSelectionNotification::METHOD,
            json!({ "uri": "file:///C%3A/src/app.ts", "selections": [], "visibleRanges": [] }),
        );
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("file:///c:/src/app.ts"));
    }

    #[tokio::test]
    async fn normalizers_are_keyed_by_type_not_method() {
        #[derive(Serialize, Deserialize)]
        struct Payload {
            uri: String,
        }
        enum Lookalike {}
        impl NotificationType for Lookalike {
            const METHOD: &'static str = HostDidChangeEditorSelectionNotification::METHOD;
            type Params = Payload;
        }

        let emitter = EventEmitter::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = emitter.on::<Lookalike, _>(move |params| {
            let _ = tx.send(params.uri);
        });

        emitter.emit(Lookalike::METHOD, json!({ "uri": "file:///C%3A/x" }));
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("file:///C%3A/x"));
    }

    #[tokio::test]
    async fn custom_normalizers_can_be_registered() {
        let emitter = EventEmitter::without_normalizers();
        emitter.register_normalizer::<ShowCodemarkNotification>(Arc::new(|listener: Listener| {
            Arc::new(move |body: &Value| {
                let mut body = body.clone();
                body["codemarkId"] = json!("rewritten");
                listener(&body)
            }) as Listener
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = emitter.on::<ShowCodemarkNotification, _>(move |params| {
            let _ = tx.send(params.codemark_id);
        });

        emitter.emit(ShowCodemarkNotification::METHOD, show_codemark("c1"));
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("rewritten"));
    }

    #[tokio::test]
    async fn undecodable_payloads_are_skipped() {
        let emitter = EventEmitter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let _sub = emitter.on::<ShowCodemarkNotification, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        emitter.emit(ShowCodemarkNotification::METHOD, json!({ "unexpected": true }));
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

//! Per-event dispatch behaviour, driven through the in-memory host.
//!
//! Run with: `cargo test -p swplug-plugins --test dispatch`

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use proptest::prelude::*;
use serde_json::json;

use swplug_core::event::{
    BackgroundFetchRegistration, ErrorEvent, EventKind, FetchEvent, NotificationPayload,
    WorkerEvent,
};
use swplug_core::request::{Request, Response};
use swplug_core::scope::{ListenerResult, Network};
use swplug_host::{MemoryNetwork, MemoryScope};
use swplug_plugins::{ErrorKind, InitGuard, Plugin, PushOutcome, WorkerOptions, initialize_with};

use common::{ORIGIN, entries, error_kinds, record, start, start_on, trace};

fn installer(name: &'static str, order: Option<i32>, log: &common::Trace) -> Plugin {
    let log = log.clone();
    let plugin = Plugin::new(name).on_install(move |_ev, _ctx| {
        record(&log, name);
        async { Ok(()) }
    });
    match order {
        Some(o) => plugin.with_order(o),
        None => plugin,
    }
}

// --- lifecycle -------------------------------------------------------------

#[tokio::test]
async fn test_install_runs_in_merge_order() {
    let log = trace();
    let h = start(vec![
        installer("third", Some(2), &log),
        installer("first", None, &log),
        installer("second", Some(1), &log),
        installer("fourth", None, &log),
    ]);

    h.scope.install().await;

    assert_eq!(entries(&log), vec!["first", "fourth", "second", "third"]);
    assert!(h.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_install_failures_do_not_stop_siblings() {
    let ran = Arc::new(AtomicUsize::new(0));
    let counted = |name: &'static str, outcome: &'static str| {
        let ran = ran.clone();
        Plugin::new(name).on_install(move |_ev, _ctx| {
            let ran = ran.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                match outcome {
                    "error" => Err(anyhow::anyhow!("{name} broke")),
                    "panic" => panic!("{name} panicked"),
                    _ => Ok(()),
                }
            }
        })
    };
    let h = start(vec![
        counted("ok-1", "ok"),
        counted("bad", "error"),
        counted("ok-2", "ok"),
        counted("worse", "panic"),
    ]);

    h.scope.install().await;

    assert_eq!(ran.load(Ordering::SeqCst), 4);
    let errors = h.errors.lock().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|(k, _, _)| *k == ErrorKind::InstallError));
    let mut plugins: Vec<_> = errors.iter().filter_map(|(_, p, _)| p.clone()).collect();
    plugins.sort();
    assert_eq!(plugins, vec!["bad", "worse"]);
}

#[tokio::test]
async fn test_activate_handlers_run_concurrently() {
    let barrier = Arc::new(tokio::sync::Barrier::new(3));
    let plugins = (0..3)
        .map(|i| {
            let barrier = barrier.clone();
            Plugin::new(format!("waiter-{i}")).on_activate(move |_ev, _ctx| {
                let barrier = barrier.clone();
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            })
        })
        .collect();
    let h = start(plugins);

    let finished = tokio::time::timeout(Duration::from_secs(5), h.scope.activate()).await;
    assert!(finished.is_ok(), "activate handlers must not run one at a time");
}

#[tokio::test]
async fn test_lifecycle_error_classification() {
    let h = start(vec![
        Plugin::new("s").on_sync(|ev, _ctx| async move { anyhow::bail!("sync {}", ev.tag) }),
        Plugin::new("p").on_periodic_sync(|_ev, _ctx| async { anyhow::bail!("periodic") }),
        Plugin::new("a").on_activate(|_ev, _ctx| async { anyhow::bail!("activate") }),
        Plugin::new("bg").on_background_fetch(EventKind::BackgroundFetchClick, |_ev, _ctx| async {
            anyhow::bail!("click")
        }),
    ]);

    h.scope.sync("outbox").await;
    h.scope.periodic_sync("refresh").await;
    h.scope.activate().await;
    h.scope
        .background_fetch(EventKind::BackgroundFetchClick, BackgroundFetchRegistration::default())
        .await;

    assert_eq!(
        error_kinds(&h.errors),
        vec![
            ErrorKind::SyncError,
            ErrorKind::PeriodicSyncError,
            ErrorKind::ActivateError,
            ErrorKind::BackgroundFetchClickError,
        ]
    );
    assert!(h.errors.lock().unwrap()[0].2.contains("sync outbox"));
}

#[tokio::test]
async fn test_background_fetch_routes_by_kind() {
    let log = trace();
    let on = |kind: EventKind, name: &'static str| {
        let log = log.clone();
        Plugin::new(name).on_background_fetch(kind, move |ev, _ctx| {
            record(&log, format!("{name}:{}", ev.registration.id));
            async { Ok(()) }
        })
    };
    let h = start(vec![
        on(EventKind::BackgroundFetchSuccess, "success"),
        on(EventKind::BackgroundFetchFail, "fail"),
    ]);

    let registration = BackgroundFetchRegistration {
        id: "movie".into(),
        ..Default::default()
    };
    h.scope
        .background_fetch(EventKind::BackgroundFetchFail, registration)
        .await;

    assert_eq!(entries(&log), vec!["fail:movie"]);
}

// --- fetch -----------------------------------------------------------------

#[tokio::test]
async fn test_fetch_first_response_wins() {
    let log = trace();
    let responder = |name: &'static str, body: Option<&'static str>| {
        let log = log.clone();
        Plugin::new(name).on_fetch(move |_ev, _ctx| {
            record(&log, name);
            async move { Ok(body.map(Response::ok)) }
        })
    };
    let h = start(vec![
        responder("a", None),
        responder("b", Some("ok")),
        responder("c", Some("never")),
    ]);

    let resp = h.scope.fetch(Request::get(format!("{ORIGIN}/page"))).await.unwrap();

    assert_eq!(resp.text(), "ok");
    assert_eq!(entries(&log), vec!["a", "b"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_fetch_stops_at_first_response(answers in prop::collection::vec(any::<bool>(), 0..12)) {
        let log = trace();
        let plugins: Vec<Plugin> = answers
            .iter()
            .enumerate()
            .map(|(i, &responds)| {
                let log = log.clone();
                Plugin::new(format!("p{i}")).on_fetch(move |_ev, _ctx| {
                    record(&log, i.to_string());
                    async move { Ok(responds.then(|| Response::ok(i.to_string()))) }
                })
            })
            .collect();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let resp = runtime.block_on(async {
            let h = start(plugins);
            h.scope.fetch(Request::get(format!("{ORIGIN}/page"))).await.unwrap()
        });

        let called: Vec<usize> = entries(&log).iter().map(|e| e.parse().unwrap()).collect();
        match answers.iter().position(|a| *a) {
            Some(first) => {
                prop_assert_eq!(called, (0..=first).collect::<Vec<_>>());
                prop_assert_eq!(resp.text(), first.to_string());
            }
            None => {
                prop_assert_eq!(called, (0..answers.len()).collect::<Vec<_>>());
                prop_assert_eq!(resp.status, StatusCode::NOT_FOUND);
            }
        }
    }
}

#[tokio::test]
async fn test_fetch_falls_back_to_network() {
    let network = Arc::new(
        MemoryNetwork::new().with_route(format!("{ORIGIN}/data.json"), Response::ok("{}")),
    );
    let scope = Arc::new(MemoryScope::with_network(ORIGIN, network.clone()));
    let h = start_on(
        scope,
        vec![Plugin::new("pass").on_fetch(|_ev, _ctx| async { Ok(None) })],
        WorkerOptions::new(),
    );

    let resp = h.scope.fetch(Request::get(format!("{ORIGIN}/data.json"))).await.unwrap();

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(network.call_count(&format!("{ORIGIN}/data.json")), 1);
}

#[tokio::test]
async fn test_fetch_errors_are_skipped_then_offline_yields_503() {
    let network = Arc::new(MemoryNetwork::new());
    network.set_offline(true);
    let scope = Arc::new(MemoryScope::with_network(ORIGIN, network.clone()));
    let h = start_on(
        scope,
        vec![
            Plugin::new("throws").on_fetch(|_ev, _ctx| async { anyhow::bail!("cache corrupted") }),
            Plugin::new("panics").on_fetch(|_ev, _ctx| -> futures::future::Ready<anyhow::Result<Option<Response>>> {
                panic!("synchronous panic")
            }),
            Plugin::new("empty").on_fetch(|_ev, _ctx| async { Ok(None) }),
        ],
        WorkerOptions::new(),
    );

    let resp = h.scope.fetch(Request::get(format!("{ORIGIN}/x"))).await.unwrap();

    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.text(), "Service Unavailable");
    let errors = h.errors.lock().unwrap();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|(k, _, _)| *k == ErrorKind::FetchError));
    assert_eq!(errors[0].1.as_deref(), Some("throws"));
    assert_eq!(errors[1].1.as_deref(), Some("panics"));
    assert_eq!(errors[2].1, None);
}

/// Network that feeds every request back into the scope's fetch listeners,
/// the way a browser would if the worker's own fetch were intercepted.
#[derive(Default)]
struct LoopbackNetwork {
    scope: OnceLock<Weak<MemoryScope>>,
    passthrough: Mutex<Vec<bool>>,
}

#[async_trait]
impl Network for LoopbackNetwork {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Response> {
        if let Some(scope) = self.scope.get().and_then(Weak::upgrade) {
            let event = WorkerEvent::Fetch(Arc::new(FetchEvent::new(request.clone())));
            let results = scope.emit(event);
            let passed = results
                .iter()
                .all(|r| matches!(r, ListenerResult::Passthrough));
            self.passthrough.lock().unwrap().push(passed);
        }
        Ok(Response::ok("from network"))
    }
}

#[tokio::test]
async fn test_fallback_fetch_is_not_intercepted_again() {
    let network = Arc::new(LoopbackNetwork::default());
    let scope = Arc::new(MemoryScope::with_network(ORIGIN, network.clone()));
    network.scope.set(Arc::downgrade(&scope)).ok();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let h = start_on(
        scope,
        vec![Plugin::new("miss").on_fetch(move |_ev, _ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })],
        WorkerOptions::new(),
    );

    let resp = h.scope.fetch(Request::get(format!("{ORIGIN}/a"))).await.unwrap();
    assert_eq!(resp.text(), "from network");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*network.passthrough.lock().unwrap(), vec![true]);

    // The guard is released afterwards: the next fetch is intercepted again.
    h.scope.fetch(Request::get(format!("{ORIGIN}/b"))).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fetch_passthrough_helper_bypasses_listeners() {
    let network = Arc::new(LoopbackNetwork::default());
    let scope = Arc::new(MemoryScope::with_network(ORIGIN, network.clone()));
    network.scope.set(Arc::downgrade(&scope)).ok();

    let h = start_on(
        scope,
        vec![Plugin::new("proxy").on_fetch(|ev, ctx| async move {
            ctx.fetch_passthrough(&ev.request).await.map(Some)
        })],
        WorkerOptions::new(),
    );

    let resp = h.scope.fetch(Request::get(format!("{ORIGIN}/video"))).await.unwrap();
    assert_eq!(resp.text(), "from network");
    assert_eq!(*network.passthrough.lock().unwrap(), vec![true]);
    assert_eq!(h.dispatcher.context().origin(), ORIGIN);
}

/// Network that holds `/slow` open until released and is offline for
/// every other URL.
#[derive(Default)]
struct StallingNetwork {
    started: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

#[async_trait]
impl Network for StallingNetwork {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Response> {
        if request.url.ends_with("/slow") {
            self.started.notify_one();
            self.release.notified().await;
            return Ok(Response::ok("slow"));
        }
        anyhow::bail!("offline: {}", request.url)
    }
}

fn answers_cached() -> Plugin {
    Plugin::new("cached").on_fetch(|ev, _ctx| async move {
        Ok(ev
            .request
            .url
            .ends_with("/cached")
            .then(|| Response::ok("from plugin")))
    })
}

#[tokio::test]
async fn test_pending_fallback_does_not_bypass_other_tasks() {
    let network = Arc::new(StallingNetwork::default());
    let scope = Arc::new(MemoryScope::with_network(ORIGIN, network.clone()));
    let h = start_on(scope, vec![answers_cached()], WorkerOptions::new());

    let slow_scope = h.scope.clone();
    let slow = tokio::spawn(async move { slow_scope.fetch(Request::get(format!("{ORIGIN}/slow"))).await });
    network.started.notified().await;

    let cached = h.scope.fetch(Request::get(format!("{ORIGIN}/cached"))).await.unwrap();
    assert_eq!(cached.text(), "from plugin");

    let missing = h.scope.fetch(Request::get(format!("{ORIGIN}/other"))).await.unwrap();
    assert_eq!(missing.status, StatusCode::SERVICE_UNAVAILABLE);

    network.release.notify_one();
    assert_eq!(slow.await.unwrap().unwrap().text(), "slow");
    assert_eq!(error_kinds(&h.errors), vec![ErrorKind::FetchError]);
}

#[tokio::test]
async fn test_pending_fallback_does_not_bypass_sibling_fetches() {
    let network = Arc::new(StallingNetwork::default());
    let scope = Arc::new(MemoryScope::with_network(ORIGIN, network.clone()));
    let h = start_on(scope, vec![answers_cached()], WorkerOptions::new());

    let slow = h.scope.fetch(Request::get(format!("{ORIGIN}/slow")));
    let cached = async {
        network.started.notified().await;
        let response = h.scope.fetch(Request::get(format!("{ORIGIN}/cached"))).await;
        network.release.notify_one();
        response
    };

    let (slow, cached) = tokio::join!(slow, cached);
    assert_eq!(slow.unwrap().text(), "slow");
    assert_eq!(cached.unwrap().text(), "from plugin");
}

// --- message ---------------------------------------------------------------

#[tokio::test]
async fn test_message_handler_error_is_isolated() {
    let log = trace();
    let second = log.clone();
    let h = start(vec![
        Plugin::new("thrower").on_message(|_ev, _ctx| anyhow::bail!("bad message")),
        Plugin::new("listener").on_message(move |ev, _ctx| {
            record(&second, ev.message_type().unwrap_or("?"));
            Ok(())
        }),
    ]);

    h.scope.message(json!({"type": "HELLO"}), None);

    let errors = h.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, ErrorKind::MessageErrorHandler);
    assert_eq!(errors[0].1.as_deref(), Some("thrower"));
    assert_eq!(entries(&log), vec!["HELLO"]);
}

#[tokio::test]
async fn test_message_handler_panic_is_isolated() {
    let log = trace();
    let after = log.clone();
    let h = start(vec![
        Plugin::new("panicker").on_message(|_ev, _ctx| panic!("oops")),
        Plugin::new("after").on_message(move |_ev, _ctx| {
            record(&after, "after");
            Ok(())
        }),
    ]);

    h.scope.message(json!({"type": "X"}), None);

    assert_eq!(error_kinds(&h.errors), vec![ErrorKind::MessageErrorHandler]);
    assert!(h.errors.lock().unwrap()[0].2.contains("oops"));
    assert_eq!(entries(&log), vec!["after"]);
}

// --- push ------------------------------------------------------------------

#[tokio::test]
async fn test_push_payload_wins_over_default_parsing() {
    let h = start(vec![
        Plugin::new("h1").on_push(|_ev, _ctx| async { Ok(PushOutcome::Show(NotificationPayload::new("X"))) }),
        Plugin::new("h2").on_push(|_ev, _ctx| async { Ok(PushOutcome::Nothing) }),
    ]);

    h.scope.push(Some(Bytes::from_static(br#"{"title":"from payload"}"#))).await;

    let shown = h.scope.notification_log().shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "X");
}

#[tokio::test]
async fn test_push_every_payload_is_shown() {
    let h = start(vec![
        Plugin::new("a").on_push(|_ev, _ctx| async { Ok(PushOutcome::Show(NotificationPayload::new("A"))) }),
        Plugin::new("b").on_push(|_ev, _ctx| async { Ok(PushOutcome::Suppress) }),
        Plugin::new("c").on_push(|_ev, _ctx| async {
            Ok(PushOutcome::Show(NotificationPayload::new("C").with_body("more")))
        }),
    ]);

    h.scope.push(None).await;

    let titles: Vec<_> = h.scope.notification_log().shown().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["A", "C"]);
}

#[tokio::test]
async fn test_push_all_suppressed_shows_nothing() {
    let h = start(vec![
        Plugin::new("quiet-1").on_push(|_ev, _ctx| async { Ok(PushOutcome::Suppress) }),
        Plugin::new("quiet-2").on_push(|_ev, _ctx| async { Ok(PushOutcome::Suppress) }),
    ]);

    h.scope.push(Some(Bytes::from_static(br#"{"title":"ignored"}"#))).await;

    assert!(h.scope.notification_log().shown().is_empty());
}

#[tokio::test]
async fn test_push_falls_back_to_payload_parsing() {
    let h = start(vec![
        Plugin::new("quiet").on_push(|_ev, _ctx| async { Ok(PushOutcome::Suppress) }),
        Plugin::new("idle").on_push(|_ev, _ctx| async { Ok(PushOutcome::Nothing) }),
        Plugin::new("broken").on_push(|_ev, _ctx| async { anyhow::bail!("decode failed") }),
    ]);

    h.scope.push(Some(Bytes::from_static(br#"{"title":"Deploy","body":"done"}"#))).await;

    let shown = h.scope.notification_log().shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Deploy");
    assert_eq!(shown[0].options.body.as_deref(), Some("done"));
    assert_eq!(error_kinds(&h.errors), vec![ErrorKind::PushError]);
}

#[tokio::test]
async fn test_push_without_handlers_parses_plain_text() {
    let h = start(vec![]);
    assert!(h.scope.has_listener(EventKind::Push));

    h.scope.push(Some(Bytes::from_static(b"Plain title"))).await;

    let shown = h.scope.notification_log().shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Plain title");
}

#[tokio::test]
async fn test_push_display_failure_is_reported() {
    let h = start(vec![
        Plugin::new("show").on_push(|_ev, _ctx| async { Ok(PushOutcome::Show(NotificationPayload::new("X"))) }),
    ]);
    h.scope.notification_log().deny();

    h.scope.push(None).await;

    assert_eq!(error_kinds(&h.errors), vec![ErrorKind::PushError]);
    assert!(h.errors.lock().unwrap()[0].2.contains("permission denied"));
}

// --- global channels -------------------------------------------------------

#[tokio::test]
async fn test_global_channels_report_once_each() {
    let h = start(vec![]);

    h.scope.raise_error(ErrorEvent {
        message: "ReferenceError: x is not defined".into(),
        error: json!("ReferenceError"),
        ..Default::default()
    });
    h.scope.message_error(json!("garbled"));
    h.scope.reject(json!("timeout"), false);
    h.scope.reject(json!({"code": 7}), true);

    assert_eq!(
        error_kinds(&h.errors),
        vec![
            ErrorKind::Error,
            ErrorKind::MessageError,
            ErrorKind::UnhandledRejection,
            ErrorKind::RejectionHandled,
        ]
    );
    let errors = h.errors.lock().unwrap();
    assert!(errors[0].2.contains("ReferenceError"));
    assert_eq!(errors[2].2, "timeout");
    assert!(errors.iter().all(|(_, plugin, _)| plugin.is_none()));
}

#[tokio::test]
async fn test_failing_error_callback_is_only_logged() {
    let scope = Arc::new(MemoryScope::new(ORIGIN));
    let logger = Arc::new(common::RecordingLogger::default());
    let options = WorkerOptions::new()
        .with_logger(logger.clone())
        .with_on_error(|_e, _ev, _k| anyhow::bail!("callback exploded"));
    initialize_with(&InitGuard::new(), scope.clone(), vec![], options).unwrap();

    scope.reject(json!("boom"), false);
    scope.raise_error(ErrorEvent::default());

    let lines = logger.lines("error");
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("callback exploded"));
}

#[tokio::test]
async fn test_missing_callback_logs_warning() {
    let scope = Arc::new(MemoryScope::new(ORIGIN));
    let logger = Arc::new(common::RecordingLogger::default());
    let options = WorkerOptions::new().with_logger(logger.clone());
    initialize_with(
        &InitGuard::new(),
        scope.clone(),
        vec![Plugin::new("bad").on_install(|_ev, _ctx| async { anyhow::bail!("disk full") })],
        options,
    )
    .unwrap();

    scope.install().await;

    let warnings = logger.lines("warn");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("install_error"));
    assert!(warnings[0].contains("disk full"));
}

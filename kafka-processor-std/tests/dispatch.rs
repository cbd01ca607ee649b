use chrono::{DateTime, Utc};
use kafka_processor_core::{
    DecodeError, DispatchError, Envelope, EventKey, ListenerHandle, Phase, listener_fn,
};
use kafka_processor_std::{
    dispatch::{DispatchOptions, Dispatcher, MissingEventPolicy},
    registry::ListenerRegistry,
    testing::{CallLog, CountingListener, FailingListener, RecordingListener},
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

fn message(topic: &str, partition: i32, json: &str) -> Envelope {
    Envelope::new(topic, partition, json.as_bytes().to_vec())
}

fn ping() -> EventKey {
    EventKey::user("ping").unwrap()
}

#[tokio::test]
async fn test_phases_run_in_order_with_context() {
    let registry = ListenerRegistry::new();
    let log = CallLog::new();
    let h1 = RecordingListener::new("H1").with_log(log.clone());
    let h2 = RecordingListener::new("H2").with_log(log.clone());
    let h3 = RecordingListener::new("H3").with_log(log.clone());
    registry.register(EventKey::Start, h1.clone());
    registry.register(ping(), h2.clone());
    registry.register(EventKey::End, h3.clone());

    let dispatcher = Dispatcher::new(registry);
    dispatcher
        .dispatch(message("t", 0, r#"{"event":"ping","payload":{"n":1}}"#))
        .await
        .unwrap();

    assert_eq!(log.entries(), vec!["H1", "H2", "H3"]);

    let seen_by_h2 = &h2.contexts()[0];
    assert_eq!(seen_by_h2.kafka().topic, "t");
    assert_eq!(seen_by_h2.kafka().partition, 0);
    assert_eq!(seen_by_h2.get("payload").unwrap()["n"], 1);
    assert!(seen_by_h2.metadata().is_none());

    let seen_by_h3 = &h3.contexts()[0];
    assert_eq!(seen_by_h3.kafka().topic, "t");
    assert_eq!(seen_by_h3.kafka().partition, 0);
    let metadata = seen_by_h3.metadata().unwrap();
    assert!(metadata.start_processing_on <= metadata.end_processing_on);
}

#[tokio::test]
async fn test_start_phase_is_awaited_and_not_timed() {
    let registry = ListenerRegistry::new();
    let log = CallLog::new();
    let start_finished: Arc<Mutex<Option<DateTime<Utc>>>> = Arc::new(Mutex::new(None));

    let slow_log = log.clone();
    let finished = start_finished.clone();
    registry.register(
        EventKey::Start,
        listener_fn(move |_ctx| {
            let log = slow_log.clone();
            let finished = finished.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                log.push("slow-start");
                *finished.lock() = Some(Utc::now());
                Ok(())
            }
        }),
    );
    let recorder = RecordingListener::new("event").with_log(log.clone());
    registry.register(ping(), recorder);

    let metadata = Dispatcher::new(registry)
        .dispatch(message("t", 0, r#"{"event":"ping"}"#))
        .await
        .unwrap();

    assert_eq!(log.entries(), vec!["slow-start", "event"]);
    let finished = start_finished.lock().unwrap();
    assert!(metadata.start_processing_on >= finished);
}

#[tokio::test]
async fn test_decode_error_invokes_nothing() {
    let registry = ListenerRegistry::new();
    let counter = CountingListener::new();
    registry.register(EventKey::Start, counter.clone());
    registry.register(ping(), counter.clone());
    registry.register(EventKey::End, counter.clone());
    let dispatcher = Dispatcher::new(registry);

    for payload in ["not json", "[1,2,3]", r#"{"event":5}"#, r#"{"event":"processor:x"}"#] {
        let err = dispatcher
            .dispatch(message("t", 0, payload))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Decode(_)), "{payload}: {err}");
    }

    let mut tombstone = message("t", 0, "");
    tombstone.payload = None;
    let err = dispatcher.dispatch(tombstone).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Decode(DecodeError::EmptyPayload)
    ));

    assert_eq!(counter.count(), 0);
}

#[tokio::test]
async fn test_missing_event_policies() {
    let registry = ListenerRegistry::new();
    let start = CountingListener::new();
    let end = CountingListener::new();
    registry.register(EventKey::Start, start.clone());
    registry.register(EventKey::End, end.clone());

    let skipping = Dispatcher::new(registry.clone());
    skipping
        .dispatch(message("t", 0, r#"{"kind":"ping"}"#))
        .await
        .unwrap();
    assert_eq!((start.count(), end.count()), (1, 1));

    let rejecting = Dispatcher::with_options(
        registry,
        DispatchOptions {
            on_missing_event: MissingEventPolicy::Reject,
            ..DispatchOptions::default()
        },
    );
    let err = rejecting
        .dispatch(message("t", 0, r#"{"kind":"ping"}"#))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::MissingEvent { .. }));
    assert_eq!((start.count(), end.count()), (1, 1));
}

#[tokio::test]
async fn test_custom_event_field() {
    let registry = ListenerRegistry::new();
    let counter = CountingListener::new();
    registry.register(ping(), counter.clone());

    let dispatcher = Dispatcher::with_options(
        registry,
        DispatchOptions {
            event_field: "type".to_string(),
            ..DispatchOptions::default()
        },
    );
    dispatcher
        .dispatch(message("t", 0, r#"{"type":"ping","event":"other"}"#))
        .await
        .unwrap();
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_failing_listener_fails_dispatch_but_siblings_run() {
    let registry = ListenerRegistry::new();
    let sibling = CountingListener::new();
    let failing = FailingListener::new("handler exploded");
    let end = CountingListener::new();
    registry.register(ping(), failing.clone());
    registry.register(ping(), sibling.clone());
    registry.register(EventKey::End, end.clone());

    let err = Dispatcher::new(registry)
        .dispatch(message("t", 0, r#"{"event":"ping"}"#))
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Event));
    let DispatchError::Handler(handler_err) = err else {
        panic!("expected handler error");
    };
    assert_eq!(handler_err.event, ping());
    assert_eq!(handler_err.failed, 1);
    assert_eq!(sibling.count(), 1);
    assert_eq!(failing.attempts(), 1);
    // Later phases are not entered.
    assert_eq!(end.count(), 0);
}

#[tokio::test]
async fn test_start_failure_skips_event_phase() {
    let registry = ListenerRegistry::new();
    let event = CountingListener::new();
    registry.register(EventKey::Start, FailingListener::new("no"));
    registry.register(ping(), event.clone());

    let err = Dispatcher::new(registry)
        .dispatch(message("t", 0, r#"{"event":"ping"}"#))
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Start));
    assert_eq!(event.count(), 0);
}

#[tokio::test]
async fn test_once_runs_exactly_once() {
    let registry = ListenerRegistry::new();
    let counter = CountingListener::new();
    let wrapper = registry.register_once(ping(), counter.clone());
    let dispatcher = Dispatcher::new(registry.clone());

    for _ in 0..3 {
        dispatcher
            .dispatch(message("t", 0, r#"{"event":"ping"}"#))
            .await
            .unwrap();
    }

    assert_eq!(counter.count(), 1);
    assert!(!registry.contains(&ping(), &wrapper));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_once_under_concurrent_dispatch() {
    let registry = ListenerRegistry::new();
    let counter = CountingListener::new();
    registry.register_once(ping(), counter.clone());
    let dispatcher = Arc::new(Dispatcher::new(registry.clone()));

    let tasks: Vec<_> = (0..16)
        .map(|partition| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .dispatch(message("t", partition, r#"{"event":"ping"}"#))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(counter.count(), 1);
    assert_eq!(registry.listener_count(&ping()), 0);
}

#[tokio::test]
async fn test_listener_can_register_during_dispatch() {
    let registry = ListenerRegistry::new();
    let late = CountingListener::new();

    let writer = registry.clone();
    let late_handle = ListenerHandle::new(late.clone());
    registry.register(
        ping(),
        listener_fn(move |_ctx| {
            writer.register(EventKey::user("ping").unwrap(), late_handle.clone());
            async { Ok(()) }
        }),
    );

    let dispatcher = Dispatcher::new(registry.clone());
    dispatcher
        .dispatch(message("t", 0, r#"{"event":"ping"}"#))
        .await
        .unwrap();
    // The snapshot for the first message did not include the late listener.
    assert_eq!(late.count(), 0);
    assert_eq!(registry.listener_count(&ping()), 2);

    dispatcher
        .dispatch(message("t", 0, r#"{"event":"ping"}"#))
        .await
        .unwrap();
    assert_eq!(late.count(), 1);
}

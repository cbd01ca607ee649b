use kafka_processor::{
    BrokerError, EventKey, LifecycleState, Processor, ProcessorError, TopicSpec,
    testing::{BrokerCall, CountingListener, MemoryBroker},
};
use std::time::Duration;

mod common;
use common::{event, key, processor};

#[tokio::test]
async fn test_connection_error_surfaces_unchanged() {
    let (processor, broker) = processor();
    broker.fail_connect(true);

    let err = processor.start().await.unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::Broker(BrokerError::Connection(_))
    ));
    assert_eq!(processor.state().await, LifecycleState::Idle);

    broker.fail_connect(false);
    processor.start().await.unwrap();
    assert_eq!(processor.state().await, LifecycleState::Running);
}

#[tokio::test]
async fn test_subscription_error_keeps_connection() {
    let (processor, broker) = processor();
    broker.fail_subscribe(true);

    let err = processor.start().await.unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::Broker(BrokerError::Subscription(_))
    ));
    assert_eq!(processor.state().await, LifecycleState::Connected);

    // Retrying does not reconnect.
    broker.fail_subscribe(false);
    processor.start().await.unwrap();
    let connects = broker
        .calls()
        .iter()
        .filter(|call| **call == BrokerCall::Connect)
        .count();
    assert_eq!(connects, 1);
}

#[tokio::test]
async fn test_stop_clears_listeners() {
    let (processor, broker) = processor();
    let counter = CountingListener::new();
    let registry = processor.registry().clone();
    processor
        .on(EventKey::Start, counter.clone())
        .on(key("ping"), counter.clone());
    processor.start().await.unwrap();

    processor.stop().await.unwrap();
    assert_eq!(processor.state().await, LifecycleState::Stopped);
    assert!(!broker.is_running());
    assert!(registry.is_empty());
    assert!(processor.registry().handlers_for(&key("ping")).is_empty());

    // Nothing is delivered while stopped.
    assert!(broker.deliver(event("ping")).await.is_none());
    assert_eq!(counter.count(), 0);
}

#[tokio::test]
async fn test_restart_after_stop_starts_empty() {
    let (processor, broker) = processor();
    let before = CountingListener::new();
    processor.on(key("ping"), before.clone());
    processor.start().await.unwrap();
    processor.stop().await.unwrap();

    let after = CountingListener::new();
    processor.on(key("ping"), after.clone());
    processor.start().await.unwrap();
    broker.deliver(event("ping")).await.unwrap().unwrap();

    assert_eq!(before.count(), 0);
    assert_eq!(after.count(), 1);
    let subscribes = broker
        .calls()
        .iter()
        .filter(|call| matches!(call, BrokerCall::Subscribe(_)))
        .count();
    assert_eq!(subscribes, 2);
}

#[tokio::test]
async fn test_pause_blocks_delivery_without_touching_listeners() {
    let (processor, broker) = processor();
    let counter = CountingListener::new();
    processor.on(key("ping"), counter.clone());
    processor.start().await.unwrap();

    processor.pause().await.unwrap();
    assert!(broker.deliver(event("ping")).await.is_none());
    assert_eq!(processor.registry().len(), 1);

    processor.unpause().await.unwrap();
    broker.deliver(event("ping")).await.unwrap().unwrap();
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_disconnect_stops_first() {
    let (processor, broker) = processor();
    processor.on(EventKey::End, CountingListener::new());
    processor.start().await.unwrap();

    processor.disconnect().await.unwrap();
    assert_eq!(processor.state().await, LifecycleState::Disconnected);
    assert!(processor.registry().is_empty());
    assert_eq!(broker.calls().last(), Some(&BrokerCall::Disconnect));
    assert!(matches!(
        processor.pause().await,
        Err(ProcessorError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_builder_options_reach_broker() {
    let broker = MemoryBroker::new();
    let topic = TopicSpec::new("orders").from_beginning(true);
    let processor = Processor::builder(broker.clone(), topic.clone())
        .commit_interval(Duration::from_millis(250))
        .build();
    processor.start().await.unwrap();

    assert_eq!(
        broker.calls()[1..],
        [
            BrokerCall::Subscribe(topic),
            BrokerCall::Run {
                commit_interval: Duration::from_millis(250)
            },
        ]
    );
}

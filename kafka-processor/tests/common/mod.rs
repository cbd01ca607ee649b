#![allow(dead_code)]

use kafka_processor::{Envelope, EventKey, Processor, TopicSpec, testing::MemoryBroker};
use serde_json::{Value, json};

pub const TOPIC: &str = "t";

pub fn processor() -> (Processor<MemoryBroker>, MemoryBroker) {
    let broker = MemoryBroker::new();
    (Processor::new(broker.clone(), TopicSpec::new(TOPIC)), broker)
}

pub fn message(partition: i32, value: Value) -> Envelope {
    Envelope::new(TOPIC, partition, serde_json::to_vec(&value).unwrap())
}

pub fn event(name: &str) -> Envelope {
    message(0, json!({ "event": name, "payload": { "id": 1 } }))
}

pub fn key(name: &str) -> EventKey {
    EventKey::user(name).unwrap()
}

use common::EntityId;
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{EventEnvelope, EventStore, GlobalSequence, InMemoryEventStore, Version};
use futures_util::StreamExt;

fn make_event(entity_id: EntityId, version: u64) -> EventEnvelope {
    EventEnvelope::builder()
        .entity_id(entity_id)
        .entity_type("Account")
        .event_type("AccountRegistered")
        .version(Version::new(version))
        .payload_raw(serde_json::json!({
            "type": "Registered",
            "data": {
                "email": "bench@example.com",
                "display_name": "Bench"
            }
        }))
        .build()
}

fn bench_append_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let entity_id = EntityId::new();
                store
                    .append(vec![make_event(entity_id, 1)], Version::initial())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_append_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let entity_id = EntityId::new();
                let events: Vec<EventEnvelope> =
                    (1..=10).map(|v| make_event(entity_id, v)).collect();
                store.append(events, Version::initial()).await.unwrap();
            });
        });
    });
}

fn bench_read_from_version_50(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let entity_id = EntityId::new();

    // Pre-populate with 100 events
    rt.block_on(async {
        let events: Vec<EventEnvelope> = (1..=100).map(|v| make_event(entity_id, v)).collect();
        store.append(events, Version::initial()).await.unwrap();
    });

    c.bench_function("event_store/read_from_version_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.read_from(entity_id, Version::new(50)).await.unwrap();
            });
        });
    });
}

fn bench_subscribe_backlog_1000(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    // Pre-populate with 1000 events across 10 entities
    rt.block_on(async {
        for _ in 0..10 {
            let entity_id = EntityId::new();
            let events: Vec<EventEnvelope> = (1..=100).map(|v| make_event(entity_id, v)).collect();
            store.append(events, Version::initial()).await.unwrap();
        }
    });

    c.bench_function("event_store/subscribe_backlog_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let stream = store.subscribe_all(GlobalSequence::first()).await.unwrap();
                let events: Vec<_> = stream.take(1000).collect().await;
                assert_eq!(events.len(), 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_event,
    bench_append_batch_10,
    bench_read_from_version_50,
    bench_subscribe_backlog_1000,
);
criterion_main!(benches);

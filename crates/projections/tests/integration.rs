//! End-to-end flow: commands through the aggregate repository into the
//! event log, consumed by the projection processor into the accounts
//! view.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::EntityId;
use domain::{Account, AccountCommands, AggregateRepository};
use event_store::{EventStore, InMemoryEventStore, InMemorySnapshotStore};
use projections::{
    AccountsProjection, CheckpointStore, InMemoryCheckpointStore, ProcessorStatus,
    ProjectionProcessor,
};

type Repository = AggregateRepository<domain::AccountReducer, InMemoryEventStore, InMemorySnapshotStore>;
type Processor = ProjectionProcessor<AccountsProjection, InMemoryEventStore, InMemoryCheckpointStore>;

struct Harness {
    store: Arc<InMemoryEventStore>,
    checkpoints: Arc<InMemoryCheckpointStore>,
    repo: Repository,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let repo = AggregateRepository::new(
            Arc::clone(&store),
            Arc::new(InMemorySnapshotStore::new()),
        );
        Self {
            store,
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            repo,
        }
    }

    fn processor(&self) -> Processor {
        ProjectionProcessor::new(
            AccountsProjection,
            Arc::clone(&self.store),
            Arc::clone(&self.checkpoints),
        )
    }

    async fn register(&self, email: &str, name: &str) -> EntityId {
        let id = EntityId::new();
        let account = Account::register(id, email, name, Utc::now()).unwrap();
        self.repo.save(account).await.unwrap();
        id
    }
}

async fn wait_for_position(processor: &Processor, position: u64) {
    for _ in 0..200 {
        if processor.last_processed().await.as_u64() >= position {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("projection never reached position {position}");
}

#[tokio::test]
async fn commands_flow_into_the_accounts_view() {
    let harness = Harness::new();

    let alice = harness.register("alice@example.com", "Alice").await;
    let bob = harness.register("bob@example.com", "Bob").await;

    let mut processor = harness.processor();
    processor.start().await.unwrap();
    wait_for_position(&processor, 2).await;

    let view = processor.state().await;
    assert_eq!(view.stats().total, 2);
    assert_eq!(view.stats().active, 2);
    assert_eq!(view.get(alice).unwrap().display_name, "Alice");
    assert_eq!(
        view.find_by_email("bob@example.com").unwrap().entity_id,
        bob
    );

    processor.stop().await.unwrap();
}

#[tokio::test]
async fn live_updates_are_reflected_while_streaming() {
    let harness = Harness::new();
    let alice = harness.register("alice@example.com", "Alice").await;

    let mut processor = harness.processor();
    processor.start().await.unwrap();
    wait_for_position(&processor, 1).await;

    // Mutate through the repository while the processor is live.
    let mut account = harness.repo.load(alice).await.unwrap();
    account
        .change_email("alice@new.example.com", Utc::now())
        .unwrap();
    account.update_profile("Alice Updated", Utc::now()).unwrap();
    harness.repo.save(account).await.unwrap();

    wait_for_position(&processor, 3).await;

    let view = processor.state().await;
    let dto = view.get(alice).unwrap();
    assert_eq!(dto.email, "alice@new.example.com");
    assert_eq!(dto.display_name, "Alice Updated");
    assert!(view.find_by_email("alice@example.com").is_none());
    assert_eq!(
        view.find_by_email("alice@new.example.com").unwrap().entity_id,
        alice
    );

    processor.stop().await.unwrap();
}

#[tokio::test]
async fn closure_updates_stats_and_frees_the_email() {
    let harness = Harness::new();
    let alice = harness.register("alice@example.com", "Alice").await;
    harness.register("bob@example.com", "Bob").await;

    let mut account = harness.repo.load(alice).await.unwrap();
    account
        .close(Some("user request".to_string()), Utc::now())
        .unwrap();
    harness.repo.save(account).await.unwrap();

    let mut processor = harness.processor();
    processor.start().await.unwrap();
    wait_for_position(&processor, 3).await;

    let view = processor.state().await;
    assert_eq!(view.stats().total, 2);
    assert_eq!(view.stats().active, 1);
    assert_eq!(view.stats().closed, 1);
    assert!(view.find_by_email("alice@example.com").is_none());

    let dto = view.get(alice).unwrap();
    assert!(dto.closed);
    assert_eq!(dto.closed_reason.as_deref(), Some("user request"));

    processor.stop().await.unwrap();
}

#[tokio::test]
async fn restart_resumes_and_catches_up_missed_events() {
    let harness = Harness::new();
    let alice = harness.register("alice@example.com", "Alice").await;

    let mut processor = harness.processor();
    processor.start().await.unwrap();
    wait_for_position(&processor, 1).await;
    processor.stop().await.unwrap();

    let checkpoint = harness.checkpoints.load("accounts").await.unwrap().unwrap();
    assert_eq!(checkpoint.last_processed.as_u64(), 1);

    // Events arrive while the processor is down.
    let bob = harness.register("bob@example.com", "Bob").await;
    let mut account = harness.repo.load(alice).await.unwrap();
    account.update_profile("Alice II", Utc::now()).unwrap();
    harness.repo.save(account).await.unwrap();

    let mut processor = harness.processor();
    processor.start().await.unwrap();
    wait_for_position(&processor, 3).await;

    let view = processor.state().await;
    assert_eq!(view.stats().total, 2);
    assert_eq!(view.get(alice).unwrap().display_name, "Alice II");
    assert!(view.get(bob).is_some());

    processor.stop().await.unwrap();
}

#[tokio::test]
async fn events_from_other_entity_types_do_not_disturb_the_view() {
    let harness = Harness::new();
    harness.register("alice@example.com", "Alice").await;

    // A foreign entity kind shares the same log.
    let foreign = event_store::EventEnvelope::builder()
        .entity_id(EntityId::new())
        .entity_type("Order")
        .event_type("OrderPlaced")
        .version(event_store::Version::first())
        .payload_raw(serde_json::json!({"total_cents": 1250}))
        .build();
    harness
        .store
        .append(vec![foreign], event_store::Version::initial())
        .await
        .unwrap();

    let mut processor = harness.processor();
    processor.start().await.unwrap();
    wait_for_position(&processor, 2).await;

    let view = processor.state().await;
    assert_eq!(view.len(), 1);
    assert_eq!(view.stats().total, 1);
    assert_eq!(processor.status().await, ProcessorStatus::Streaming);

    processor.stop().await.unwrap();
}

#[tokio::test]
async fn concurrency_conflict_loser_state_never_reaches_the_view() {
    let harness = Harness::new();
    let alice = harness.register("alice@example.com", "Alice").await;

    let mut first = harness.repo.load(alice).await.unwrap();
    let mut second = harness.repo.load(alice).await.unwrap();
    first
        .change_email("winner@example.com", Utc::now())
        .unwrap();
    second
        .change_email("loser@example.com", Utc::now())
        .unwrap();

    harness.repo.save(first).await.unwrap();
    let conflict = harness.repo.save(second).await;
    assert!(conflict.is_err());

    let mut processor = harness.processor();
    processor.start().await.unwrap();
    wait_for_position(&processor, 2).await;

    let view = processor.state().await;
    assert_eq!(view.get(alice).unwrap().email, "winner@example.com");
    assert!(view.find_by_email("loser@example.com").is_none());

    processor.stop().await.unwrap();
}

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use registra_core::{AppError, AppResult, EventId, PersonId};
use registra_domain::{
    Actor, Event, EventPayload, LocalRecord, Process, ProcessEvent, ProcessType, SyncedEntityKind,
};

use crate::event_ports::{DispatchMode, EventHandler, SyncStore, SyncTransaction};

use super::{BroadcastDispatcher, EventLog, ProcessContext};

#[derive(Default)]
struct StoreState {
    events: Vec<(Event, DispatchMode)>,
    processes: Vec<Process>,
    process_events: Vec<ProcessEvent>,
    fail_after_event_inserts: Option<usize>,
}

#[derive(Default)]
struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

struct FakeTransaction {
    state: Arc<Mutex<StoreState>>,
    buffered_events: Vec<(Event, DispatchMode)>,
    buffered_processes: Vec<Process>,
    buffered_process_events: Vec<ProcessEvent>,
}

#[async_trait]
impl SyncStore for FakeStore {
    async fn begin(&self) -> AppResult<Box<dyn SyncTransaction>> {
        Ok(Box::new(FakeTransaction {
            state: self.state.clone(),
            buffered_events: Vec::new(),
            buffered_processes: Vec::new(),
            buffered_process_events: Vec::new(),
        }))
    }

    async fn load_watermark(&self, _changes_key: &str) -> AppResult<Option<String>> {
        Ok(None)
    }

    async fn save_watermark(&self, _changes_key: &str, _position: &str) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SyncTransaction for FakeTransaction {
    async fn find_record(
        &mut self,
        _kind: SyncedEntityKind,
        _id: Uuid,
    ) -> AppResult<Option<LocalRecord>> {
        Ok(None)
    }

    async fn upsert_record(&mut self, _record: &LocalRecord) -> AppResult<()> {
        Ok(())
    }

    async fn insert_event(&mut self, event: &Event, mode: DispatchMode) -> AppResult<()> {
        let state = self.state.lock().await;

        if let Some(limit) = state.fail_after_event_inserts {
            if self.buffered_events.len() >= limit {
                return Err(AppError::Internal("simulated insert failure".to_owned()));
            }
        }

        let duplicate = state
            .events
            .iter()
            .any(|(existing, _)| existing.event_id == event.event_id)
            || self
                .buffered_events
                .iter()
                .any(|(buffered, _)| buffered.event_id == event.event_id);
        if duplicate {
            return Err(AppError::DuplicateEvent(format!(
                "event {} already exists",
                event.event_id
            )));
        }

        self.buffered_events.push((event.clone(), mode));
        Ok(())
    }

    async fn insert_process(&mut self, process: &Process) -> AppResult<()> {
        self.buffered_processes.push(process.clone());
        Ok(())
    }

    async fn insert_process_event(&mut self, process_event: &ProcessEvent) -> AppResult<()> {
        self.buffered_process_events.push(process_event.clone());
        Ok(())
    }

    async fn event_exists(&mut self, event_id: EventId) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .any(|(event, _)| event.event_id == event_id))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        let mut state = this.state.lock().await;
        state.events.extend(this.buffered_events);
        state.processes.extend(this.buffered_processes);
        state.process_events.extend(this.buffered_process_events);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

struct RecordingHandler {
    name: &'static str,
    fail: bool,
    seen: Mutex<Vec<EventId>>,
}

impl RecordingHandler {
    fn new(name: &'static str, fail: bool) -> Self {
        Self {
            name,
            fail,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, event: &Event, _process: &Process) -> AppResult<()> {
        self.seen.lock().await.push(event.event_id);
        if self.fail {
            return Err(AppError::Internal("simulated handler failure".to_owned()));
        }
        Ok(())
    }
}

fn person_event(person_id: PersonId) -> Event {
    Event::new(
        EventId::new(),
        Actor::SyncProcess,
        EventPayload::PersonUpdated {
            person_id,
            changed_columns: vec!["firstname".to_owned()],
        },
    )
}

#[tokio::test]
async fn zero_event_contexts_are_refused() {
    let store = FakeStore::default();
    let event_log = EventLog::new(Arc::new(BroadcastDispatcher::new()));
    let context = ProcessContext::begin(ProcessType::ChangeSync, Actor::SyncProcess);

    let transaction = match store.begin().await {
        Ok(transaction) => transaction,
        Err(error) => panic!("begin should succeed: {error}"),
    };
    let result = event_log.commit_process(transaction, context).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    let state = store.state.lock().await;
    assert!(state.processes.is_empty());
    assert!(state.events.is_empty());
}

#[tokio::test]
async fn commit_persists_process_events_and_links_together() {
    let store = FakeStore::default();
    let event_log = EventLog::new(Arc::new(BroadcastDispatcher::new()));

    let person_id = PersonId::new();
    let mut context = ProcessContext::begin(ProcessType::ChangeSync, Actor::SyncProcess);
    context.record_event(person_event(person_id));
    context.record_event_suppressed(person_event(person_id));
    let process_id = context.process_id();

    let transaction = match store.begin().await {
        Ok(transaction) => transaction,
        Err(error) => panic!("begin should succeed: {error}"),
    };
    let process = match event_log.commit_process(transaction, context).await {
        Ok(process) => process,
        Err(error) => panic!("commit should succeed: {error}"),
    };
    assert_eq!(process.process_id, process_id);

    let state = store.state.lock().await;
    assert_eq!(state.processes.len(), 1);
    assert_eq!(state.events.len(), 2);
    assert_eq!(state.process_events.len(), 2);
    for (link, (event, _)) in state.process_events.iter().zip(state.events.iter()) {
        assert_eq!(link.process_event_id, event.event_id);
        assert_eq!(link.process_id, process_id);
    }
}

#[tokio::test]
async fn aborted_persistence_leaves_nothing_behind() {
    let store = FakeStore::default();
    store.state.lock().await.fail_after_event_inserts = Some(1);
    let event_log = EventLog::new(Arc::new(BroadcastDispatcher::new()));

    let person_id = PersonId::new();
    let mut context = ProcessContext::begin(ProcessType::ChangeSync, Actor::SyncProcess);
    context.record_event(person_event(person_id));
    context.record_event(person_event(person_id));

    let transaction = match store.begin().await {
        Ok(transaction) => transaction,
        Err(error) => panic!("begin should succeed: {error}"),
    };
    let result = event_log.commit_process(transaction, context).await;

    assert!(result.is_err());
    let state = store.state.lock().await;
    assert!(state.processes.is_empty());
    assert!(state.events.is_empty());
    assert!(state.process_events.is_empty());
}

#[tokio::test]
async fn duplicate_event_ids_surface_and_persist_nothing() {
    let store = FakeStore::default();
    let event_log = EventLog::new(Arc::new(BroadcastDispatcher::new()));

    let person_id = PersonId::new();
    let event = person_event(person_id);
    let mut context = ProcessContext::begin(ProcessType::ChangeSync, Actor::SyncProcess);
    context.record_event(event.clone());
    context.record_event(event);

    let transaction = match store.begin().await {
        Ok(transaction) => transaction,
        Err(error) => panic!("begin should succeed: {error}"),
    };
    let result = event_log.commit_process(transaction, context).await;

    assert!(matches!(result, Err(AppError::DuplicateEvent(_))));
    let state = store.state.lock().await;
    assert!(state.events.is_empty());
}

#[tokio::test]
async fn broadcast_events_reach_every_handler_in_commit_order() {
    let store = FakeStore::default();
    let failing = Arc::new(RecordingHandler::new("failing", true));
    let healthy = Arc::new(RecordingHandler::new("healthy", false));

    let mut dispatcher = BroadcastDispatcher::new();
    dispatcher.register(failing.clone());
    dispatcher.register(healthy.clone());
    let event_log = EventLog::new(Arc::new(dispatcher));

    let person_id = PersonId::new();
    let first = person_event(person_id);
    let second = person_event(person_id);
    let suppressed = person_event(person_id);

    let mut context = ProcessContext::begin(ProcessType::ChangeSync, Actor::SyncProcess);
    context.record_event(first.clone());
    context.record_event_suppressed(suppressed.clone());
    context.record_event(second.clone());

    let transaction = match store.begin().await {
        Ok(transaction) => transaction,
        Err(error) => panic!("begin should succeed: {error}"),
    };
    if let Err(error) = event_log.commit_process(transaction, context).await {
        panic!("commit should succeed: {error}");
    }

    // One failing handler never blocks the other, and suppressed events
    // are persisted without reaching either handler.
    let expected = vec![first.event_id, second.event_id];
    assert_eq!(*failing.seen.lock().await, expected);
    assert_eq!(*healthy.seen.lock().await, expected);

    let state = store.state.lock().await;
    assert_eq!(state.events.len(), 3);
    assert!(
        state
            .events
            .iter()
            .any(|(event, mode)| event.event_id == suppressed.event_id
                && *mode == DispatchMode::Suppressed)
    );
}

#[tokio::test]
async fn event_exists_reflects_committed_events() {
    let store = FakeStore::default();
    let event = person_event(PersonId::new());

    let mut transaction = match store.begin().await {
        Ok(transaction) => transaction,
        Err(error) => panic!("begin should succeed: {error}"),
    };
    match transaction.event_exists(event.event_id).await {
        Ok(exists) => assert!(!exists),
        Err(error) => panic!("existence probe should succeed: {error}"),
    }
    if let Err(error) = transaction
        .insert_event(&event, DispatchMode::Broadcast)
        .await
    {
        panic!("insert should succeed: {error}");
    }
    if let Err(error) = transaction.commit().await {
        panic!("commit should succeed: {error}");
    }

    let mut transaction = match store.begin().await {
        Ok(transaction) => transaction,
        Err(error) => panic!("begin should succeed: {error}"),
    };
    match transaction.event_exists(event.event_id).await {
        Ok(exists) => assert!(exists),
        Err(error) => panic!("existence probe should succeed: {error}"),
    }
    if let Err(error) = transaction.rollback().await {
        panic!("rollback should succeed: {error}");
    }
}

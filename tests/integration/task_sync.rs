//! Integration tests for the board sync controller.
//!
//! Drives `TaskSyncController` through identity switches and board intents
//! against the in-process backends, checking what reaches the local record,
//! what reaches the remote store, and what the board ends up showing.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::similar_names)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use taskflow::identity::Identity;
use taskflow::remote::memory::{Fault, MemoryRemoteStore};
use taskflow::remote::{RemoteError, RemoteStore, Subscription, SubscriptionHandle, WriteKind};
use taskflow::store::LocalStore;
use taskflow::store::memory::MemoryLocalStore;
use taskflow::sync::{SyncState, SyncUpdate, TaskSyncController};
use taskflow::tasks::TaskError;
use taskflow_proto::document::TaskDocument;
use taskflow_proto::task::{NewTask, Priority, Task, TaskId, TaskPatch, TaskStatus, seed_tasks};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ALICE: &str = "alice-uid";
const BOB: &str = "bob-uid";

type Counter = Arc<AtomicUsize>;
type Controller<R> = TaskSyncController<MemoryLocalStore, R, Box<dyn Fn() + Send>>;

/// Controller over fresh memory backends, with a celebrate counter.
fn controller() -> (Controller<MemoryRemoteStore>, MemoryLocalStore, MemoryRemoteStore, Counter) {
    let local = MemoryLocalStore::new();
    let remote = MemoryRemoteStore::new();
    let (c, celebrations) = controller_over(local.clone(), remote.clone());
    (c, local, remote, celebrations)
}

fn controller_over<R: RemoteStore>(local: MemoryLocalStore, remote: R) -> (Controller<R>, Counter) {
    let celebrations = Counter::default();
    let counter = Arc::clone(&celebrations);
    let celebrate: Box<dyn Fn() + Send> = Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let c = TaskSyncController::new(local, Arc::new(remote), celebrate)
        .with_write_timeout(Duration::from_millis(200));
    (c, celebrations)
}

/// Next controller update, failing the test after two seconds.
async fn next<R: RemoteStore>(c: &mut Controller<R>) -> SyncUpdate {
    tokio::time::timeout(Duration::from_secs(2), c.next_update())
        .await
        .expect("controller update within 2s")
        .expect("event channel open")
}

/// Process updates until the board satisfies `done`.
async fn settle<R: RemoteStore>(c: &mut Controller<R>, done: impl Fn(&[Task]) -> bool) {
    while !done(c.tasks()) {
        next(c).await;
    }
}

/// Give spawned writes a moment, then drain whatever arrived.
async fn drain<R: RemoteStore>(c: &mut Controller<R>) -> Vec<SyncUpdate> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    c.process_pending()
}

fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.title.as_str()).collect()
}

fn existing_doc(id: &str, title: &str, status: TaskStatus) -> TaskDocument {
    TaskDocument::from_task(&Task::new(id, title, "", status), 0)
}

/// Remote store that records subscribe and cancel order.
#[derive(Clone)]
struct Recording {
    inner: MemoryRemoteStore,
    log: Arc<Mutex<Vec<String>>>,
}

impl RemoteStore for Recording {
    async fn subscribe(&self, user: &str) -> Subscription {
        self.log.lock().push(format!("subscribe {user}"));
        let Subscription { feed, handle } = self.inner.subscribe(user).await;
        let log = Arc::clone(&self.log);
        let owner = user.to_string();
        let handle = SubscriptionHandle::new(move || {
            log.lock().push(format!("cancel {owner}"));
            handle.cancel();
        });
        Subscription { feed, handle }
    }

    async fn create(&self, user: &str, task: &Task) -> Result<(), RemoteError> {
        self.inner.create(user, task).await
    }

    async fn update(&self, user: &str, task_id: &TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        self.inner.update(user, task_id, patch).await
    }

    async fn delete(&self, user: &str, task_id: &TaskId) -> Result<(), RemoteError> {
        self.inner.delete(user, task_id).await
    }
}

// ===========================================================================
// Identity switches
// ===========================================================================

#[tokio::test]
async fn guest_board_starts_from_seed_set_without_network() {
    let (mut c, _local, remote, _) = controller();
    c.set_identity(Identity::Guest).await;

    assert_eq!(c.state(), SyncState::Live);
    assert_eq!(c.tasks(), seed_tasks().as_slice());
    assert_eq!(remote.subscribe_count(), 0);
}

#[tokio::test]
async fn guest_board_loads_saved_record() {
    let saved = vec![Task::new("task-a", "Saved", "", TaskStatus::InProgress)];
    let local = MemoryLocalStore::with_record(&serde_json::to_string(&saved).unwrap());
    let (mut c, _) = controller_over(local, MemoryRemoteStore::new());

    c.set_identity(Identity::Guest).await;
    assert_eq!(c.tasks(), saved.as_slice());
}

#[tokio::test]
async fn signing_out_empties_the_board() {
    let (mut c, _local, remote, _) = controller();
    c.set_identity(Identity::Guest).await;
    c.set_identity(Identity::Unauthenticated).await;

    assert!(c.tasks().is_empty());
    assert_eq!(c.state(), SyncState::Idle);
    assert_eq!(remote.subscribe_count(), 0);
}

#[tokio::test]
async fn old_feed_is_cancelled_before_new_subscribe() {
    let recording = Recording {
        inner: MemoryRemoteStore::new(),
        log: Arc::default(),
    };
    let (mut c, _) = controller_over(MemoryLocalStore::new(), recording.clone());

    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    c.set_identity(Identity::Authenticated(BOB.into())).await;
    c.set_identity(Identity::Guest).await;

    assert_eq!(
        *recording.log.lock(),
        ["subscribe alice-uid", "cancel alice-uid", "subscribe bob-uid", "cancel bob-uid"]
    );
    assert_eq!(recording.inner.active_feeds(ALICE), 0);
    assert_eq!(recording.inner.active_feeds(BOB), 0);
}

#[tokio::test]
async fn old_feed_deliveries_never_reach_new_board() {
    let (mut c, _local, remote, _) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Alice's", TaskStatus::Todo));

    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    settle(&mut c, |tasks| !tasks.is_empty()).await;

    c.set_identity(Identity::Guest).await;
    remote.insert_document(ALICE, existing_doc("task-b", "Late", TaskStatus::Todo));
    remote.republish(ALICE);

    let updates = drain(&mut c).await;
    assert!(updates.iter().all(|u| *u == SyncUpdate::Stale));
    assert_eq!(c.tasks(), seed_tasks().as_slice());
}

#[tokio::test]
async fn existing_remote_board_loads_verbatim() {
    let (mut c, _local, remote, _) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "First", TaskStatus::Todo));
    remote.insert_document(ALICE, existing_doc("task-b", "Second", TaskStatus::Done));

    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    assert_eq!(c.state(), SyncState::LoadingRemote);
    assert!(c.tasks().is_empty());

    assert_eq!(next(&mut c).await, SyncUpdate::Loaded { count: 2 });
    assert_eq!(c.state(), SyncState::Live);
    assert_eq!(titles(c.tasks()), ["Second", "First"]);
    assert_eq!(remote.write_count(WriteKind::Create), 0);
}

// ===========================================================================
// Seeding
// ===========================================================================

#[tokio::test]
async fn empty_remote_board_is_seeded_exactly_once() {
    let (mut c, _local, remote, _) = controller();
    c.set_identity(Identity::Authenticated(ALICE.into())).await;

    assert_eq!(next(&mut c).await, SyncUpdate::Seeded { count: 5 });
    assert_eq!(c.tasks(), seed_tasks().as_slice());
    settle(&mut c, |_| remote.tasks(ALICE).len() == 5).await;
    drain(&mut c).await;
    assert_eq!(remote.write_count(WriteKind::Create), 5);

    // Empty the board again; the session must not reseed.
    for task in seed_tasks() {
        assert!(c.delete_task(&task.id));
    }
    settle(&mut c, <[Task]>::is_empty).await;
    drain(&mut c).await;

    assert!(c.tasks().is_empty());
    assert_eq!(remote.write_count(WriteKind::Create), 5);
}

#[tokio::test]
async fn seed_write_failures_are_not_surfaced() {
    let (mut c, _local, remote, _) = controller();
    remote.set_fault(WriteKind::Create, Fault::Reject);
    c.set_identity(Identity::Authenticated(ALICE.into())).await;

    assert_eq!(next(&mut c).await, SyncUpdate::Seeded { count: 5 });
    assert!(drain(&mut c).await.is_empty());
    assert_eq!(c.tasks(), seed_tasks().as_slice());
    assert_eq!(remote.write_count(WriteKind::Create), 5);
}

// ===========================================================================
// Board intents
// ===========================================================================

#[tokio::test]
async fn guest_add_lands_in_todo_and_is_saved() {
    let (mut c, local, _remote, _) = controller();
    c.set_identity(Identity::Guest).await;

    let id = c.add_task(NewTask::new("Write report", "Q3 numbers")).unwrap().unwrap();
    let task = c.task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Todo);
    assert_eq!(task.description, "Q3 numbers");

    assert_eq!(local.load(), c.tasks());
    assert_eq!(local.write_count(), 1);
}

#[tokio::test]
async fn blank_title_is_rejected_before_any_write() {
    let (mut c, local, _remote, _) = controller();
    c.set_identity(Identity::Guest).await;

    assert_eq!(c.add_task(NewTask::new("   ", "")), Err(TaskError::TitleEmpty));
    assert_eq!(c.tasks().len(), 5);
    assert_eq!(local.write_count(), 0);
}

#[tokio::test]
async fn intents_are_ignored_while_signed_out() {
    let (mut c, local, remote, celebrations) = controller();

    assert_eq!(c.add_task(NewTask::new("Nobody", "")), Ok(None));
    assert!(!c.move_task(&TaskId::new("task-1"), TaskStatus::Done));
    assert!(c.tasks().is_empty());
    assert_eq!(local.write_count(), 0);
    assert_eq!(remote.write_count(WriteKind::Create), 0);
    assert_eq!(celebrations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn moving_done_task_to_done_is_a_no_op() {
    let (mut c, local, _remote, celebrations) = controller();
    c.set_identity(Identity::Guest).await;
    let done = c.tasks().iter().find(|t| t.status == TaskStatus::Done).unwrap().id.clone();

    assert!(!c.move_task(&done, TaskStatus::Done));
    assert_eq!(celebrations.load(Ordering::SeqCst), 0);
    assert_eq!(local.write_count(), 0);
}

#[tokio::test]
async fn moving_done_task_to_done_issues_no_remote_write() {
    let (mut c, _local, remote, celebrations) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Shipped", TaskStatus::Done));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;

    assert!(!c.move_task(&TaskId::new("task-a"), TaskStatus::Done));
    drain(&mut c).await;
    assert_eq!(remote.write_count(WriteKind::Update), 0);
    assert_eq!(celebrations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn celebrate_fires_once_per_move_into_done() {
    let (mut c, _local, _remote, celebrations) = controller();
    c.set_identity(Identity::Guest).await;
    let id = TaskId::new("task-1");

    assert!(c.move_task(&id, TaskStatus::Done));
    assert_eq!(celebrations.load(Ordering::SeqCst), 1);

    assert!(c.move_task(&id, TaskStatus::InProgress));
    assert_eq!(celebrations.load(Ordering::SeqCst), 1);
    assert_eq!(c.task(&id).unwrap().status, TaskStatus::InProgress);
}

#[tokio::test]
async fn signed_in_move_waits_for_the_feed() {
    let (mut c, _local, remote, celebrations) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Review", TaskStatus::InProgress));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;

    let id = TaskId::new("task-a");
    assert!(c.move_task(&id, TaskStatus::Done));
    assert_eq!(celebrations.load(Ordering::SeqCst), 1);
    // The board only changes when the remote echo arrives.
    assert_eq!(c.task(&id).unwrap().status, TaskStatus::InProgress);

    assert_eq!(next(&mut c).await, SyncUpdate::Replaced { count: 1 });
    assert_eq!(c.task(&id).unwrap().status, TaskStatus::Done);
}

#[tokio::test]
async fn details_edit_keeps_status() {
    let (mut c, local, _remote, _) = controller();
    c.set_identity(Identity::Guest).await;
    let id = TaskId::new("task-5");
    let mut edited = c.task(&id).unwrap().clone();
    let status = edited.status;
    edited.title = "Renamed".into();
    edited.status = TaskStatus::Todo;
    edited.due_date = Some("2025-06-01T09:00".into());

    assert_eq!(c.update_task_details(edited), Ok(true));
    let task = c.task(&id).unwrap();
    assert_eq!(task.title, "Renamed");
    assert_eq!(task.status, status);
    assert_eq!(task.due_date.as_deref(), Some("2025-06-01T09:00"));
    assert_eq!(local.load(), c.tasks());
}

#[tokio::test]
async fn clearing_guest_details_is_saved() {
    let (mut c, local, _remote, _) = controller();
    c.set_identity(Identity::Guest).await;
    let id = TaskId::new("task-2");
    let mut edited = c.task(&id).unwrap().clone();
    edited.due_date = Some("2025-01-01T09:00".into());
    edited.priority = Some(Priority::High);
    edited.reminder = Some("2025-01-01T08:00".into());
    assert_eq!(c.update_task_details(edited.clone()), Ok(true));

    edited.due_date = None;
    edited.priority = None;
    edited.reminder = None;
    assert_eq!(c.update_task_details(edited.clone()), Ok(true));
    assert_eq!(c.task(&id), Some(&edited));
    assert_eq!(local.load(), c.tasks());

    // Saving the same details again changes nothing.
    let writes = local.write_count();
    assert_eq!(c.update_task_details(edited), Ok(false));
    assert_eq!(local.write_count(), writes);
}

#[tokio::test]
async fn signed_in_details_edit_waits_for_the_feed() {
    let (mut c, local, remote, _) = controller();
    let mut dated = Task::new("task-a", "Draft", "", TaskStatus::InProgress);
    dated.due_date = Some("2025-03-01T10:00".into());
    remote.insert_document(ALICE, TaskDocument::from_task(&dated, 0));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;

    let id = TaskId::new("task-a");
    let mut edited = c.task(&id).unwrap().clone();
    edited.title = "Final".into();
    edited.due_date = None;
    edited.status = TaskStatus::Todo;
    assert_eq!(c.update_task_details(edited), Ok(true));
    assert_eq!(c.task(&id).unwrap().title, "Draft");

    assert_eq!(next(&mut c).await, SyncUpdate::Replaced { count: 1 });
    let task = c.task(&id).unwrap();
    assert_eq!(task.title, "Final");
    assert_eq!(task.due_date, None);
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(remote.write_count(WriteKind::Update), 1);
    assert_eq!(local.write_count(), 0);
}

#[tokio::test]
async fn rejected_details_edit_falls_back_locally() {
    let (mut c, _local, remote, _) = controller();
    let mut original = Task::new("task-a", "Draft", "", TaskStatus::Done);
    original.priority = Some(Priority::Low);
    remote.insert_document(ALICE, TaskDocument::from_task(&original, 0));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;
    remote.set_fault(WriteKind::Update, Fault::Reject);

    let id = TaskId::new("task-a");
    let mut edited = c.task(&id).unwrap().clone();
    edited.description = "Offline notes".into();
    edited.priority = None;
    assert_eq!(c.update_task_details(edited), Ok(true));

    match next(&mut c).await {
        SyncUpdate::FellBack {
            kind,
            task_id,
            error,
        } => {
            assert_eq!(kind, WriteKind::Update);
            assert_eq!(task_id, id);
            assert!(matches!(error, RemoteError::Rejected(_)));
        }
        other => panic!("expected fallback, got {other:?}"),
    }
    let task = c.task(&id).unwrap();
    assert_eq!(task.description, "Offline notes");
    assert_eq!(task.priority, None);
    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(remote.tasks(ALICE)[0].priority, Some(Priority::Low));
}

#[tokio::test]
async fn deleting_unknown_task_changes_nothing() {
    let (mut c, local, _remote, _) = controller();
    c.set_identity(Identity::Guest).await;

    c.delete_task(&TaskId::new("task-missing"));
    assert_eq!(c.tasks(), seed_tasks().as_slice());
    assert_eq!(local.write_count(), 0);
}

#[tokio::test]
async fn deleting_unknown_remote_task_raises_nothing() {
    let (mut c, _local, remote, _) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Keep", TaskStatus::Todo));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;

    c.delete_task(&TaskId::new("task-missing"));
    assert!(drain(&mut c).await.is_empty());
    assert_eq!(titles(c.tasks()), ["Keep"]);
    assert_eq!(remote.write_count(WriteKind::Delete), 1);
}

// ===========================================================================
// Feed failures
// ===========================================================================

#[tokio::test]
async fn unreachable_feed_on_sign_in_seeds_the_board() {
    let (mut c, _local, remote, _) = controller();
    remote.set_unavailable(true);
    c.set_identity(Identity::Authenticated(ALICE.into())).await;

    assert_eq!(next(&mut c).await, SyncUpdate::Seeded { count: 5 });
    assert_eq!(c.state(), SyncState::Live);
    assert_eq!(c.tasks(), seed_tasks().as_slice());

    drain(&mut c).await;
    assert_eq!(remote.write_count(WriteKind::Create), 5);
    assert_eq!(remote.tasks(ALICE).len(), 5);
}

#[tokio::test]
async fn broken_live_feed_empties_the_board() {
    let (mut c, _local, remote, _) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Visible", TaskStatus::Todo));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    assert_eq!(next(&mut c).await, SyncUpdate::Loaded { count: 1 });

    remote.break_feeds(ALICE);
    assert_eq!(next(&mut c).await, SyncUpdate::Replaced { count: 0 });
    assert!(c.tasks().is_empty());
    assert_eq!(c.state(), SyncState::Live);
    assert_eq!(remote.tasks(ALICE).len(), 1);

    // No further deliveries arrive on the broken feed.
    remote.insert_document(ALICE, existing_doc("task-b", "Unseen", TaskStatus::Todo));
    assert!(drain(&mut c).await.is_empty());
    assert!(c.tasks().is_empty());
}

// ===========================================================================
// Remote write failures
// ===========================================================================

#[tokio::test]
async fn rejected_add_still_shows_the_task() {
    let (mut c, _local, remote, _) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Existing", TaskStatus::Todo));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;
    remote.set_fault(WriteKind::Create, Fault::Reject);

    let id = c.add_task(NewTask::new("X", "")).unwrap().unwrap();
    match next(&mut c).await {
        SyncUpdate::FellBack {
            kind,
            task_id,
            error,
        } => {
            assert_eq!(kind, WriteKind::Create);
            assert_eq!(task_id, id);
            assert!(matches!(error, RemoteError::Rejected(_)));
        }
        other => panic!("expected fallback, got {other:?}"),
    }

    let added: Vec<_> = c.tasks().iter().filter(|t| t.title == "X").collect();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].status, TaskStatus::Todo);
    assert!(remote.tasks(ALICE).iter().all(|t| t.title != "X"));
}

#[tokio::test]
async fn stalled_write_times_out_into_fallback() {
    let (mut c, _local, remote, _) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Slow", TaskStatus::Todo));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;
    remote.set_fault(WriteKind::Update, Fault::Hang);

    let id = TaskId::new("task-a");
    c.move_task(&id, TaskStatus::InProgress);
    assert_eq!(
        next(&mut c).await,
        SyncUpdate::FellBack {
            kind: WriteKind::Update,
            task_id: id.clone(),
            error: RemoteError::Timeout,
        }
    );
    assert_eq!(c.task(&id).unwrap().status, TaskStatus::InProgress);
}

#[tokio::test]
async fn next_delivery_supersedes_a_fallback() {
    let (mut c, _local, remote, _) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Existing", TaskStatus::Todo));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;
    remote.set_fault(WriteKind::Delete, Fault::Reject);

    c.delete_task(&TaskId::new("task-a"));
    assert!(matches!(next(&mut c).await, SyncUpdate::FellBack { .. }));
    assert!(c.tasks().is_empty());

    remote.republish(ALICE);
    assert_eq!(next(&mut c).await, SyncUpdate::Replaced { count: 1 });
    assert_eq!(titles(c.tasks()), ["Existing"]);
}

#[tokio::test]
async fn fallback_from_previous_session_is_dropped() {
    let (mut c, _local, remote, _) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Existing", TaskStatus::Todo));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;
    remote.set_fault(WriteKind::Create, Fault::Reject);

    c.add_task(NewTask::new("Orphan", "")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    c.set_identity(Identity::Guest).await;

    let updates = c.process_pending();
    assert!(updates.contains(&SyncUpdate::Stale));
    assert!(c.tasks().iter().all(|t| t.title != "Orphan"));
}

#[tokio::test]
async fn other_clients_writes_replace_the_board() {
    let (mut c, _local, remote, _) = controller();
    remote.insert_document(ALICE, existing_doc("task-a", "Mine", TaskStatus::Todo));
    c.set_identity(Identity::Authenticated(ALICE.into())).await;
    next(&mut c).await;

    remote.insert_document(ALICE, existing_doc("task-z", "From phone", TaskStatus::InProgress));
    assert_eq!(next(&mut c).await, SyncUpdate::Replaced { count: 2 });
    assert_eq!(titles(c.tasks()), ["From phone", "Mine"]);
}

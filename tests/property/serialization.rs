//! Property-based tests for the task model and relay frames.
//!
//! Uses proptest to verify:
//! 1. Random bytes never cause a panic in `decode` (returns `Err` gracefully).
//! 2. A snapshot of arbitrary documents reaches the client as tasks with
//!    safe defaults, newest first.
//! 3. Patching a document and patching the task it describes agree.
//! 4. Any task list survives the local JSON record.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use taskflow_proto::codec::{self, MAX_FRAME_SIZE};
use taskflow_proto::document::{TaskDocument, into_tasks, sort_by_recency};
use taskflow_proto::task::{Priority, Task, TaskId, TaskPatch, TaskStatus};
use taskflow_proto::wire::{ClientFrame, ServerFrame};

// --- Strategies ---

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Done),
    ]
}

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Urgent),
    ]
}

fn arb_date() -> impl Strategy<Value = String> {
    (2000u32..2100, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60)
        .prop_map(|(y, mo, d, h, mi)| format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}"))
}

fn arb_task_id() -> impl Strategy<Value = TaskId> {
    "task-[a-z0-9]{1,12}".prop_map(TaskId::new)
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        arb_task_id(),
        ".{0,64}",
        ".{0,128}",
        arb_status(),
        proptest::option::of(arb_date()),
        proptest::option::of(arb_priority()),
        proptest::option::of(arb_date()),
        proptest::option::of(any::<u64>()),
    )
        .prop_map(
            |(id, title, description, status, due_date, priority, reminder, created_at)| Task {
                id,
                title,
                description,
                status,
                due_date,
                priority,
                reminder,
                created_at,
                updated_at: None,
            },
        )
}

/// Documents as other clients may have left them: any field may be missing.
fn arb_document() -> impl Strategy<Value = TaskDocument> {
    (
        arb_task_id(),
        proptest::option::of(".{0,32}"),
        proptest::option::of(".{0,32}"),
        proptest::option::of(arb_status()),
        proptest::option::of(arb_priority()),
        any::<u64>(),
    )
        .prop_map(|(id, title, description, status, priority, updated_at)| TaskDocument {
            id,
            title,
            description,
            status,
            due_date: None,
            priority,
            reminder: None,
            created_at: None,
            updated_at,
        })
}

fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    (
        proptest::option::of(".{0,32}"),
        proptest::option::of(".{0,32}"),
        proptest::option::of(arb_status()),
        proptest::option::of(proptest::option::of(arb_date())),
        proptest::option::of(proptest::option::of(arb_priority())),
        proptest::option::of(proptest::option::of(arb_date())),
    )
        .prop_map(|(title, description, status, due_date, priority, reminder)| TaskPatch {
            title,
            description,
            status,
            due_date,
            priority,
            reminder,
        })
}

proptest! {
    #[test]
    fn random_bytes_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode::<ClientFrame>(&bytes);
        let _ = codec::decode::<ServerFrame>(&bytes);
    }

    #[test]
    fn snapshot_delivers_defaulted_tasks_newest_first(
        documents in prop::collection::vec(arb_document(), 0..16),
        subscription_id in any::<u64>(),
    ) {
        let frame = ServerFrame::Snapshot { subscription_id, documents: documents.clone() };
        let decoded: ServerFrame = codec::decode(&codec::encode(&frame).unwrap()).unwrap();
        let ServerFrame::Snapshot { documents: mut received, .. } = decoded else {
            return Err(TestCaseError::fail("snapshot decoded as another frame"));
        };
        prop_assert_eq!(&received, &documents);

        sort_by_recency(&mut received);
        prop_assert!(received.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));

        let tasks = into_tasks(received.clone());
        prop_assert_eq!(tasks.len(), received.len());
        for (task, document) in tasks.iter().zip(&received) {
            prop_assert_eq!(&task.id, &document.id);
            prop_assert_eq!(task.title.as_str(), document.title.as_deref().unwrap_or(""));
            prop_assert_eq!(task.description.as_str(), document.description.as_deref().unwrap_or(""));
            prop_assert_eq!(task.status, document.status.unwrap_or(TaskStatus::Todo));
            prop_assert_eq!(task.updated_at, Some(document.updated_at));
        }
    }

    #[test]
    fn document_and_task_patches_agree(task in arb_task(), patch in arb_patch(), stamp in any::<u64>()) {
        let mut document = TaskDocument::from_task(&task, 0);
        document.apply_patch(&patch, stamp);

        let mut expected = task;
        patch.apply_to(&mut expected);
        expected.updated_at = Some(stamp);

        prop_assert_eq!(document.into_task(), expected);
    }

    #[test]
    fn local_record_round_trip(tasks in prop::collection::vec(arb_task(), 0..16)) {
        let record = serde_json::to_string(&tasks).unwrap();
        let loaded: Vec<Task> = serde_json::from_str(&record).unwrap();
        prop_assert_eq!(loaded, tasks);
    }
}

#[test]
fn oversized_frames_are_refused_before_decoding() {
    let bytes = vec![0u8; MAX_FRAME_SIZE + 1];
    assert!(codec::decode::<ServerFrame>(&bytes).is_err());
}

#[test]
fn local_record_uses_camel_case_fields() {
    let mut task = Task::new("task-1", "Title", "", TaskStatus::InProgress);
    task.due_date = Some("2025-01-02T03:04".into());
    let json = serde_json::to_value(&task).unwrap();
    assert_eq!(json["dueDate"], "2025-01-02T03:04");
    assert_eq!(json["status"], "inprogress");
}

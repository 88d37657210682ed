//! Integration tests for sign-in flows.
//!
//! Runs `Session` against both the in-process backends and a live relay,
//! checking which board each identity ends up on and that failed attempts
//! leave the board alone.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use taskflow::identity::memory::MemoryIdentityProvider;
use taskflow::identity::{AuthError, Identity, IdentityProvider};
use taskflow::remote::RemoteStore;
use taskflow::remote::memory::MemoryRemoteStore;
use taskflow::remote::relay::RelayClient;
use taskflow::session::Session;
use taskflow::store::LocalStore;
use taskflow::store::memory::MemoryLocalStore;
use taskflow::sync::{NoCelebration, SyncState, SyncUpdate, TaskSyncController};
use taskflow_proto::account::Principal;
use taskflow_proto::task::{NewTask, seed_tasks};
use taskflow_relay::relay::start_server;

async fn next<P, R>(s: &mut Session<P, MemoryLocalStore, R, NoCelebration>) -> SyncUpdate
where
    P: IdentityProvider,
    R: RemoteStore,
{
    tokio::time::timeout(Duration::from_secs(5), s.controller_mut().next_update())
        .await
        .expect("controller update within 5s")
        .expect("event channel open")
}

fn memory_session(
    local: MemoryLocalStore,
    remote: MemoryRemoteStore,
) -> Session<MemoryIdentityProvider, MemoryLocalStore, MemoryRemoteStore, NoCelebration> {
    let controller = TaskSyncController::new(local, Arc::new(remote), NoCelebration);
    Session::new(MemoryIdentityProvider::new(), controller)
}

async fn relay_session(
    url: &str,
) -> Session<Arc<RelayClient>, MemoryLocalStore, RelayClient, NoCelebration> {
    let client = Arc::new(RelayClient::connect(url).await.expect("should connect"));
    let controller = TaskSyncController::new(MemoryLocalStore::new(), Arc::clone(&client), NoCelebration);
    Session::new(client, controller)
}

// ===========================================================================
// In-process backends
// ===========================================================================

#[tokio::test]
async fn guest_edits_survive_a_sign_in_round_trip() {
    let local = MemoryLocalStore::new();
    let remote = MemoryRemoteStore::new();
    let mut s = memory_session(local.clone(), remote.clone());

    s.continue_as_guest().await;
    s.controller_mut().add_task(NewTask::new("Guest task", "")).unwrap();
    assert_eq!(s.controller().tasks().len(), 6);

    s.sign_up("ada@example.com", "secret1").await.unwrap();
    assert_eq!(next(&mut s).await, SyncUpdate::Seeded { count: 5 });
    assert!(s.controller().tasks().iter().all(|t| t.title != "Guest task"));

    s.sign_out().await;
    assert!(s.controller().tasks().is_empty());

    s.continue_as_guest().await;
    assert_eq!(s.controller().tasks(), local.load().as_slice());
    assert!(s.controller().tasks().iter().any(|t| t.title == "Guest task"));
}

#[tokio::test]
async fn sign_in_after_sign_up_reaches_the_same_board() {
    let remote = MemoryRemoteStore::new();
    let mut s = memory_session(MemoryLocalStore::new(), remote.clone());

    s.sign_up("Ada@Example.com", "secret1").await.unwrap();
    let Identity::Authenticated(first) = s.identity().clone() else {
        panic!("expected an authenticated identity");
    };
    next(&mut s).await;

    s.sign_out().await;
    s.sign_in("ada@example.com", "secret1").await.unwrap();
    assert_eq!(s.identity(), &Identity::Authenticated(first.clone()));
    assert_eq!(s.controller().state(), SyncState::LoadingRemote);
    assert!(matches!(next(&mut s).await, SyncUpdate::Loaded { .. } | SyncUpdate::Seeded { .. }));
    assert_eq!(remote.active_feeds(&first), 1);
}

#[tokio::test]
async fn duplicate_sign_up_is_reported_inline() {
    let mut s = memory_session(MemoryLocalStore::new(), MemoryRemoteStore::new());
    s.sign_up("ada@example.com", "secret1").await.unwrap();
    s.sign_out().await;

    let err = s.sign_up("ada@example.com", "another1").await.unwrap_err();
    assert_eq!(err, AuthError::EmailInUse);
    assert!(!err.to_string().is_empty());
    assert_eq!(s.identity(), &Identity::Unauthenticated);
}

#[tokio::test]
async fn provider_principal_without_uid_is_refused() {
    let provider = MemoryIdentityProvider::new().with_provider_principal(Principal {
        uid: String::new(),
        email: None,
    });
    let controller = TaskSyncController::new(
        MemoryLocalStore::new(),
        Arc::new(MemoryRemoteStore::new()),
        NoCelebration,
    );
    let mut s = Session::new(provider, controller);

    assert_eq!(s.sign_in_with_provider().await, Err(AuthError::MissingUserKey));
    assert_eq!(s.identity(), &Identity::Unauthenticated);
}

// ===========================================================================
// Relay backends
// ===========================================================================

#[tokio::test]
async fn relay_sign_up_loads_seeded_board() {
    let (addr, _server) = start_server("127.0.0.1:0").await.unwrap();
    let mut s = relay_session(&format!("ws://{addr}/ws")).await;

    s.sign_up("ada@example.com", "secret1").await.unwrap();
    assert_eq!(next(&mut s).await, SyncUpdate::Seeded { count: 5 });
    assert_eq!(s.controller().tasks(), seed_tasks().as_slice());
}

#[tokio::test]
async fn relay_auth_failures_keep_the_guest_board() {
    let (addr, _server) = start_server("127.0.0.1:0").await.unwrap();
    let mut s = relay_session(&format!("ws://{addr}/ws")).await;
    s.continue_as_guest().await;

    assert_eq!(
        s.sign_in("nobody@example.com", "secret1").await,
        Err(AuthError::InvalidCredentials)
    );
    assert_eq!(s.sign_up("ada@example.com", "123").await, Err(AuthError::WeakPassword));
    assert_eq!(s.identity(), &Identity::Guest);
    assert_eq!(s.controller().tasks(), seed_tasks().as_slice());
}

#[tokio::test]
async fn relay_sign_out_then_back_in_reloads_remote_board() {
    let (addr, _server) = start_server("127.0.0.1:0").await.unwrap();
    let mut s = relay_session(&format!("ws://{addr}/ws")).await;

    s.sign_up("ada@example.com", "secret1").await.unwrap();
    next(&mut s).await;
    let id = s.controller_mut().add_task(NewTask::new("Keep me", "")).unwrap().unwrap();
    while s.controller().task(&id).is_none() {
        next(&mut s).await;
    }

    s.sign_out().await;
    assert!(s.controller().tasks().is_empty());

    s.sign_in("ada@example.com", "secret1").await.unwrap();
    assert!(matches!(next(&mut s).await, SyncUpdate::Loaded { .. }));
    assert!(s.controller().task(&id).is_some());
}

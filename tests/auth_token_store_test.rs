//! Token store and profile synchronizer tests
//!
//! Tests the observable behaviour of `src/auth/token_store.rs` and
//! `src/auth/profile.rs`:
//!
//! - `set_profile(p)` then `profile()` returns `p`; `clear()` returns `None`.
//! - Every listener registered before a `set_profile` call runs exactly once
//!   per call, even when a listener unsubscribes itself or another one.
//! - The `{"name":"Kim"}` token yields `Kim`; tokens without a payload
//!   segment yield the fallback or nothing, never a panic.
//! - Tokens respect the storage scope contract.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use erp_auth::auth::profile::{sync_from_token, ProfileFallback, UserProfile};
use erp_auth::auth::storage::{MemoryStorage, Storage};
use erp_auth::auth::token_store::{
    Subscription, TokenPair, TokenStore, ACCESS_TOKEN_KEY, OAUTH_STATE_KEY, PKCE_VERIFIER_KEY,
    REFRESH_TOKEN_KEY,
};

use common::fake_jwt;

// ---------------------------------------------------------------------------
// Profile and listeners
// ---------------------------------------------------------------------------

#[test]
fn test_profile_set_get_clear() {
    let store = TokenStore::in_memory();
    let profile = UserProfile {
        name: "Kim".to_string(),
        email: Some("kim@example.com".to_string()),
    };

    store.set_profile(Some(profile.clone()));
    assert_eq!(store.profile(), Some(profile));

    store.clear();
    assert_eq!(store.profile(), None);
}

#[test]
fn test_every_listener_runs_once_per_call() {
    let store = TokenStore::in_memory();
    let counters: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    for counter in &counters {
        let counter = counter.clone();
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    store.set_profile(Some(UserProfile::new("Kim")));
    store.set_profile(None);

    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}

#[test]
fn test_listener_sees_new_value() {
    let store = TokenStore::in_memory();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    store.subscribe(move |p| s.lock().unwrap().push(p.map(|p| p.name.clone())));

    store.set_profile(Some(UserProfile::new("Kim")));
    store.clear();

    assert_eq!(*seen.lock().unwrap(), vec![Some("Kim".to_string()), None]);
}

#[test]
fn test_unsubscribing_inside_listener_skips_nobody() {
    let store = TokenStore::in_memory();
    let first_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));

    // The first listener removes itself and the second one on its first run.
    let handles: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
    let h = handles.clone();
    let f = first_calls.clone();
    let first = store.subscribe(move |_| {
        f.fetch_add(1, Ordering::SeqCst);
        for sub in h.lock().unwrap().iter() {
            sub.unsubscribe();
        }
    });
    let s = second_calls.clone();
    let second = store.subscribe(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });
    handles.lock().unwrap().extend([first, second]);

    store.set_profile(Some(UserProfile::new("A")));
    store.set_profile(Some(UserProfile::new("B")));

    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Profile synchronizer
// ---------------------------------------------------------------------------

#[test]
fn test_kim_token_yields_kim() {
    let store = TokenStore::in_memory();
    let profile = sync_from_token(&store, Some("a.eyJuYW1lIjoiS2ltIn0.b"), None);
    assert_eq!(profile, Some(UserProfile::new("Kim")));
    assert_eq!(store.profile(), Some(UserProfile::new("Kim")));
}

#[test]
fn test_tokens_without_payload_fall_back() {
    let store = TokenStore::in_memory();
    let fallback = ProfileFallback::named("Guest");

    for token in ["", "opaque", "a.!!!.b", "a.bm90LWpzb24.b"] {
        assert_eq!(
            sync_from_token(&store, Some(token), Some(&fallback)),
            Some(UserProfile::new("Guest")),
            "token {token:?}"
        );
        assert_eq!(sync_from_token(&store, Some(token), None), None);
    }
}

#[test]
fn test_subject_only_token() {
    let store = TokenStore::in_memory();
    let token = fake_jwt(serde_json::json!({ "sub": "42" }));
    assert_eq!(
        sync_from_token(&store, Some(&token), None).unwrap().name,
        "User 42"
    );
}

#[test]
fn test_mistyped_unrelated_claims_do_not_hide_name() {
    let store = TokenStore::in_memory();
    let token = fake_jwt(serde_json::json!({ "name": "Kim", "sub": 12345, "exp": 1700000000.5 }));
    assert_eq!(
        sync_from_token(&store, Some(&token), None),
        Some(UserProfile::new("Kim"))
    );
}

#[test]
fn test_sync_notifies_listeners() {
    let store = TokenStore::in_memory();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    store.subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    sync_from_token(&store, Some("a.eyJuYW1lIjoiS2ltIn0.b"), None);
    sync_from_token(&store, None, None);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Storage scopes
// ---------------------------------------------------------------------------

#[test]
fn test_storage_scope_contract() {
    let session = Arc::new(MemoryStorage::new());
    let durable = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(session.clone(), durable.clone());

    store.store_pair(&TokenPair {
        access_token: "a1".to_string(),
        refresh_token: Some("r1".to_string()),
    });
    store.save_pending_authorization("v", "s");

    assert_eq!(
        session.keys(),
        vec![ACCESS_TOKEN_KEY, OAUTH_STATE_KEY, PKCE_VERIFIER_KEY]
    );
    assert_eq!(durable.keys(), vec![REFRESH_TOKEN_KEY]);
    assert_eq!(durable.get(ACCESS_TOKEN_KEY).unwrap(), None);
}

#[test]
fn test_durable_refresh_token_survives_new_store() {
    let durable = Arc::new(MemoryStorage::new());
    TokenStore::new(Arc::new(MemoryStorage::new()), durable.clone()).set_refresh_token("r1");

    // A new tab: fresh session storage, same durable storage.
    let store = TokenStore::new(Arc::new(MemoryStorage::new()), durable);
    assert!(store.access_token().is_none());
    assert_eq!(store.refresh_token().as_deref(), Some("r1"));
}

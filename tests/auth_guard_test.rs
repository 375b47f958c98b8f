//! Route guard integration tests using wiremock
//!
//! Verifies `src/auth/guard.rs`:
//!
//! - Required `HQ` and server `HQ` is authorized; server `BRANCH` is
//!   forbidden; a non-2xx answer is an error carrying the status.
//! - An application-level failure is an error carrying the server message.
//! - A success envelope without an organization type logs the session out.
//! - A superseded or cancelled check never overwrites newer state.

mod common;

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use erp_auth::auth::guard::{AuthGuardState, GuardDecision};
use erp_auth::auth::navigation::{Destination, LoginReason};
use erp_auth::auth::token_store::SessionStatus;

use common::{auth_config, memory_session};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn envelope(success: bool, message: &str, data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "status": 200,
        "success": success,
        "message": message,
        "data": data
    })
}

async fn mount_whoami(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(response)
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Session guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_session_guard_admits_present_token_without_checking_expiry() {
    let (session, navigator) = memory_session(auth_config("http://127.0.0.1:9"));

    assert_eq!(session.guard("/orders"), GuardDecision::Redirect);
    assert_eq!(
        navigator.last(),
        Some(Destination::Login {
            return_to: Some("/orders".to_string()),
            reason: LoginReason::Unauthenticated,
        })
    );

    session.store().set_access_token("expired-but-present");
    assert_eq!(session.guard("/orders"), GuardDecision::Admit);
}

// ---------------------------------------------------------------------------
// Organization-type guard verdicts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_matching_org_type_is_authorized() {
    let server = MockServer::start().await;
    mount_whoami(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope(true, "ok", "HQ".into())),
    )
    .await;

    let (session, _nav) = memory_session(auth_config(&server.uri()));
    session.store().set_access_token("a1");
    let guard = session.org_guard();

    assert_eq!(
        guard.check(Some("HQ")).await,
        Some(AuthGuardState::Authorized(Some("HQ".to_string())))
    );
    assert_eq!(guard.state(), AuthGuardState::Authorized(Some("HQ".to_string())));
}

#[tokio::test]
async fn test_other_org_type_is_forbidden() {
    let server = MockServer::start().await;
    mount_whoami(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope(true, "ok", "BRANCH".into())),
    )
    .await;

    let (session, navigator) = memory_session(auth_config(&server.uri()));
    session.store().set_access_token("a1");

    let state = session.org_guard().check(Some("HQ")).await.unwrap();

    assert_eq!(
        state,
        AuthGuardState::Forbidden {
            required: "HQ".to_string(),
            actual: "BRANCH".to_string(),
        }
    );
    // Forbidden is a verdict, not a session problem.
    assert_eq!(session.status(), SessionStatus::Active);
    assert!(navigator.history().is_empty());
}

#[tokio::test]
async fn test_object_payload_is_accepted() {
    let server = MockServer::start().await;
    mount_whoami(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope(
            true,
            "ok",
            serde_json::json!({ "orgType": "WAREHOUSE", "name": "North" }),
        )),
    )
    .await;

    let (session, _nav) = memory_session(auth_config(&server.uri()));
    session.store().set_access_token("a1");

    assert_eq!(
        session.org_guard().check(Some("WAREHOUSE")).await,
        Some(AuthGuardState::Authorized(Some("WAREHOUSE".to_string())))
    );
}

#[tokio::test]
async fn test_non_success_status_is_error() {
    let server = MockServer::start().await;
    mount_whoami(&server, ResponseTemplate::new(503)).await;

    let (session, _nav) = memory_session(auth_config(&server.uri()));
    session.store().set_access_token("a1");

    let state = session.org_guard().check(Some("HQ")).await.unwrap();
    assert!(matches!(
        state,
        AuthGuardState::Error {
            status: Some(503),
            ..
        }
    ));
}

#[tokio::test]
async fn test_application_failure_is_error_with_message() {
    let server = MockServer::start().await;
    mount_whoami(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope(
            false,
            "account suspended",
            serde_json::Value::Null,
        )),
    )
    .await;

    let (session, _nav) = memory_session(auth_config(&server.uri()));
    session.store().set_access_token("a1");

    match session.org_guard().check(Some("HQ")).await {
        Some(AuthGuardState::Error { message, .. }) => assert_eq!(message, "account suspended"),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_org_type_forces_logout() {
    let server = MockServer::start().await;
    mount_whoami(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope(true, "ok", serde_json::json!({}))),
    )
    .await;

    let (session, navigator) = memory_session(auth_config(&server.uri()));
    session.store().set_access_token("a1");
    session.store().set_refresh_token("r1");

    let state = session.org_guard().check(Some("HQ")).await;

    assert_eq!(state, Some(AuthGuardState::Idle));
    assert_eq!(session.status(), SessionStatus::Dead);
    assert_eq!(
        navigator.last(),
        Some(Destination::Login {
            return_to: None,
            reason: LoginReason::Corrupted,
        })
    );
}

#[tokio::test]
async fn test_no_requirement_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (session, _nav) = memory_session(auth_config(&server.uri()));
    assert_eq!(
        session.org_guard().check(None).await,
        Some(AuthGuardState::Authorized(None))
    );
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// A slow answer for an old requirement must not overwrite the verdict for
/// the new one.
#[tokio::test]
async fn test_superseded_check_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(true, "ok", "HQ".into()))
                .set_delay(Duration::from_millis(400)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_whoami(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope(true, "ok", "HQ".into())),
    )
    .await;

    let (session, _nav) = memory_session(auth_config(&server.uri()));
    session.store().set_access_token("a1");
    let guard = Arc::new(session.org_guard());

    let slow = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.check(Some("HQ")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let fresh = guard.check(Some("BRANCH")).await;
    assert!(matches!(fresh, Some(AuthGuardState::Forbidden { .. })));

    assert_eq!(slow.await.unwrap(), None);
    assert!(matches!(guard.state(), AuthGuardState::Forbidden { .. }));
}

#[tokio::test]
async fn test_cancelled_check_is_discarded() {
    let server = MockServer::start().await;
    mount_whoami(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(envelope(true, "ok", "HQ".into()))
            .set_delay(Duration::from_millis(300)),
    )
    .await;

    let (session, _nav) = memory_session(auth_config(&server.uri()));
    session.store().set_access_token("a1");
    let guard = Arc::new(session.org_guard());

    let pending = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.check(Some("HQ")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(guard.state(), AuthGuardState::Checking);

    guard.cancel();

    assert_eq!(pending.await.unwrap(), None);
    assert_eq!(guard.state(), AuthGuardState::Idle);
}

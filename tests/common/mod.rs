use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;

use erp_auth::auth::navigation::RecordingNavigator;
use erp_auth::auth::refresh::Refresh;
use erp_auth::auth::session::AuthSession;
use erp_auth::auth::storage::MemoryStorage;
use erp_auth::config::AuthConfig;

/// Client id used by every test configuration.
#[allow(dead_code)]
pub const CLIENT_ID: &str = "erp-console";

/// `Authorization` header the token endpoint sees for [`CLIENT_ID`] with an
/// empty secret.
#[allow(dead_code)]
pub const BASIC_AUTH: &str = "Basic ZXJwLWNvbnNvbGU6";

/// Builds an unsigned JWT-shaped token around `payload`.
#[allow(dead_code)]
pub fn fake_jwt(payload: serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.signature",
        engine.encode(br#"{"alg":"none"}"#),
        engine.encode(payload.to_string())
    )
}

/// Configuration pointing every endpoint at `server_uri`.
#[allow(dead_code)]
pub fn auth_config(server_uri: &str) -> AuthConfig {
    AuthConfig {
        authorize_endpoint: format!("{}/oauth2/authorize", server_uri),
        token_endpoint: format!("{}/oauth2/token", server_uri),
        client_id: Some(CLIENT_ID.to_string()),
        app_origin: Some("http://127.0.0.1:5173".to_string()),
        whoami_url: format!("{}/api/auth/me", server_uri),
        callback_delay_ms: 0,
        ..AuthConfig::default()
    }
}

/// Session over in-memory storage with a recording navigator.
#[allow(dead_code)]
pub fn memory_session(config: AuthConfig) -> (AuthSession, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::new());
    let session = AuthSession::new(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryStorage::new()),
        navigator.clone(),
    );
    (session, navigator)
}

/// Refresher returning a fixed answer and counting its invocations.
#[allow(dead_code)]
pub struct CountingRefresher {
    answer: Option<String>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl CountingRefresher {
    pub fn returning(answer: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.map(str::to_string),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Refresh for CountingRefresher {
    async fn refresh(&self) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

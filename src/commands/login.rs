//! Browser sign-in command
//!
//! When the resolved redirect URI points at this machine, a one-shot HTTP
//! listener is bound on its port before the browser is opened, and the
//! redirect is read straight off the socket.  Otherwise the user pastes the
//! address the browser ended on.

use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use colored::Colorize;
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;
use url::Url;

use super::open_session;
use crate::auth::callback::CallbackState;
use crate::auth::login::resolve_redirect_uri;
use crate::config::Config;
use crate::error::{AuthError, Result};

/// Hosts for which the redirect can be received locally.
const LOOPBACK_HOSTS: [&str; 3] = ["127.0.0.1", "localhost", "[::1]"];

/// How long one connection may take to send its request head.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Signs in through the system browser.
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `return_to` - Console location to resume after signing in
///
/// # Errors
///
/// Returns the configuration, security, or exchange error that ended the
/// login attempt.
pub async fn run_login(config: Config, return_to: Option<String>) -> Result<()> {
    let redirect_uri = resolve_redirect_uri(&config.auth)?;
    let redirect = Url::parse(&redirect_uri)
        .map_err(|e| AuthError::Configuration(format!("invalid redirect URI {redirect_uri}: {e}")))?;

    let listener = bind_loopback(&redirect).await?;
    let session = open_session(config);
    session.start_login(return_to.as_deref())?;

    let target = match listener {
        Some(listener) => {
            eprintln!("Waiting for the browser to return to {} ...", redirect_uri);
            accept_callback(listener, redirect.path()).await?
        }
        None => read_pasted_redirect().await?,
    };

    match session.complete_login(&target).await {
        CallbackState::Success => {
            let who = session
                .profile()
                .map(|p| p.name)
                .unwrap_or_else(|| "unknown user".to_string());
            println!("{} {}", "Signed in as".green(), who.bold());
            Ok(())
        }
        CallbackState::Failed(e) => {
            eprintln!("{}", format!("Login failed: {}", e).red());
            Err(e.into())
        }
        other => Err(AuthError::InvalidCallback(format!(
            "login stopped in state {}",
            other.name()
        ))
        .into()),
    }
}

/// Binds a listener on the redirect URI's port when it is a loopback URI.
async fn bind_loopback(redirect: &Url) -> Result<Option<TcpListener>> {
    let host = redirect.host_str().unwrap_or("");
    if redirect.scheme() != "http" || !LOOPBACK_HOSTS.contains(&host) {
        return Ok(None);
    }

    let port = redirect.port_or_known_default().unwrap_or(80);
    let bind_host = if host == "[::1]" { "::1" } else { "127.0.0.1" };
    let listener = TcpListener::bind((bind_host, port)).await.map_err(|e| {
        AuthError::Configuration(format!(
            "cannot listen for the login redirect on port {port}: {e}"
        ))
    })?;
    tracing::debug!("Listening for login redirect on {}:{}", bind_host, port);
    Ok(Some(listener))
}

/// Accepts connections until one requests `callback_path`, answers it, and
/// returns its request target (`/callback?code=...&state=...`).
///
/// Other requests (favicon) get a 404.  Connections that stay silent past
/// the read timeout, such as browser preconnects, are dropped.
pub async fn accept_callback(listener: TcpListener, callback_path: &str) -> Result<String> {
    loop {
        let (stream, _peer) = listener.accept().await.map_err(|e| {
            AuthError::InvalidCallback(format!("failed to accept callback connection: {e}"))
        })?;

        // Move to a blocking task so we can use std I/O for simple HTTP
        // request parsing without pulling in a full HTTP server.
        let expected_path = callback_path.to_string();
        let target = tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let std_stream = stream
                .into_std()
                .map_err(|e| AuthError::InvalidCallback(format!("stream conversion failed: {e}")))?;
            std_stream.set_nonblocking(false)?;
            std_stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;

            let mut write_stream = std_stream
                .try_clone()
                .map_err(|e| AuthError::InvalidCallback(format!("stream clone failed: {e}")))?;

            let reader = BufReader::new(std_stream);
            let mut request_line = String::new();
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    // Timeouts surface as WouldBlock or TimedOut depending on the platform.
                    Err(e) => {
                        tracing::debug!("Dropping connection ({:?}): {}", e.kind(), e);
                        return Ok(None);
                    }
                };
                // HTTP headers end at the first empty line.
                if line.is_empty() {
                    break;
                }
                if request_line.is_empty() {
                    request_line = line;
                }
            }

            // Request line: "GET /callback?code=...&state=... HTTP/1.1"
            let target = request_line.split_whitespace().nth(1).unwrap_or("");
            let path = target.split('?').next().unwrap_or("");

            if path != expected_path {
                let _ = write_stream.write_all(
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                );
                return Ok(None);
            }

            let response = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nSign-in received. You may close this tab.";
            let _ = write_stream.write_all(response.as_bytes());
            Ok(Some(target.to_string()))
        })
        .await
        .map_err(|e| AuthError::InvalidCallback(format!("callback task panicked: {e}")))??;

        if let Some(target) = target {
            return Ok(target);
        }
        tracing::debug!("Ignoring request that is not the login redirect");
    }
}

/// Reads the redirect address from stdin.
async fn read_pasted_redirect() -> Result<String> {
    eprintln!("After signing in, paste the full address your browser was sent to:");
    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    let line = line.trim();
    if line.is_empty() {
        return Err(AuthError::InvalidCallback("no redirect address was entered".to_string()).into());
    }
    Ok(line.to_string())
}

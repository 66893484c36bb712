//! Administrative HTTP surface
//!
//! Out-of-band control plane: an authenticated kick command (honored by the
//! core exactly like a liveness timeout) and a stats endpoint exposing
//! uptime, the current roster, and the capped log rings. Runs as its own
//! tokio task; the only way it touches presence state is the admin command
//! channel into the single-threaded server loop.

use crate::network::AdminCommand;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use shared::Participant;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Capped in-memory log, oldest entries dropped first.
pub const LOG_CAPACITY: usize = 100;

#[derive(Debug, Default)]
pub struct LogRing {
    entries: VecDeque<String>,
}

impl LogRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: String) {
        self.entries.push_back(line);
        if self.entries.len() > LOG_CAPACITY {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read model for `/stats`, refreshed by the server as it runs.
pub struct ServerStats {
    started: Instant,
    roster: RwLock<Vec<Participant>>,
    login_log: RwLock<LogRing>,
    chat_log: RwLock<LogRing>,
    server_log: RwLock<LogRing>,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            roster: RwLock::new(Vec::new()),
            login_log: RwLock::new(LogRing::new()),
            chat_log: RwLock::new(LogRing::new()),
            server_log: RwLock::new(LogRing::new()),
        }
    }

    pub async fn set_roster(&self, roster: Vec<Participant>) {
        *self.roster.write().await = roster;
    }

    pub async fn push_login(&self, line: String) {
        self.login_log.write().await.push(line);
    }

    pub async fn push_chat(&self, line: String) {
        self.chat_log.write().await.push(line);
    }

    pub async fn push_server(&self, line: String) {
        self.server_log.write().await.push(line);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub async fn roster(&self) -> Vec<Participant> {
        self.roster.read().await.clone()
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AdminState {
    password: String,
    commands: mpsc::UnboundedSender<AdminCommand>,
    stats: Arc<ServerStats>,
}

impl AdminState {
    pub fn new(
        password: String,
        commands: mpsc::UnboundedSender<AdminCommand>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            password,
            commands,
            stats,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct KickRequest {
    pub player_id: u32,
}

/// Checks an HTTP Basic `Authorization` header against the admin password.
/// The user part is ignored; only the password counts.
pub fn authorized(headers: &HeaderMap, password: &str) -> bool {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return false;
    };
    let Ok(value) = value.to_str() else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    match decoded.split_once(':') {
        Some((_user, pass)) => pass == password,
        None => false,
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"Stats\"")],
        "Authentication required",
    )
        .into_response()
}

async fn kick_handler(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Json(request): Json<KickRequest>,
) -> Response {
    if !authorized(&headers, &state.password) {
        return unauthorized();
    }

    let (reply_tx, reply_rx) = oneshot::channel();
    if state
        .commands
        .send(AdminCommand::Kick {
            player_id: request.player_id,
            reply: reply_tx,
        })
        .is_err()
    {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "server loop is not running" })),
        )
            .into_response();
    }

    match reply_rx.await {
        Ok(true) => {
            info!("Admin kick issued for participant {}", request.player_id);
            Json(json!({ "ok": true })).into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "player not found" })),
        )
            .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "server loop is not running" })),
        )
            .into_response(),
    }
}

async fn stats_handler(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state.password) {
        return unauthorized();
    }

    let stats = &state.stats;
    let participants: Vec<serde_json::Value> = stats
        .roster()
        .await
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "display_name": p.display_name,
                "mic_muted": p.mic_muted,
                "speaker_muted": p.speaker_muted,
            })
        })
        .collect();

    Json(json!({
        "uptime_secs": stats.uptime_secs(),
        "participants": participants,
        "login_logs": stats.login_log.read().await.entries(),
        "chat_logs": stats.chat_log.read().await.entries(),
        "server_logs": stats.server_log.read().await.entries(),
    }))
    .into_response()
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/kick", post(kick_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Binds the admin listener and serves until the process exits.
pub async fn serve(addr: &str, state: AdminState) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Admin surface listening on {}", listener.local_addr()?);
    if state.password.is_empty() {
        warn!("Admin password is empty; kick/stats are effectively open");
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic_header(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = STANDARD.encode(format!("{}:{}", user, pass));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_log_ring_caps_at_capacity() {
        let mut ring = LogRing::new();
        for i in 0..(LOG_CAPACITY + 25) {
            ring.push(format!("line {}", i));
        }

        assert_eq!(ring.len(), LOG_CAPACITY);
        let entries = ring.entries();
        assert_eq!(entries[0], "line 25");
        assert_eq!(entries[LOG_CAPACITY - 1], format!("line {}", LOG_CAPACITY + 24));
    }

    #[test]
    fn test_authorized_accepts_correct_password() {
        let headers = basic_header("admin", "hunter2");
        assert!(authorized(&headers, "hunter2"));
        // The user part is ignored.
        let headers = basic_header("anything", "hunter2");
        assert!(authorized(&headers, "hunter2"));
    }

    #[test]
    fn test_authorized_rejects_bad_credentials() {
        assert!(!authorized(&HeaderMap::new(), "hunter2"));

        let headers = basic_header("admin", "wrong");
        assert!(!authorized(&headers, "hunter2"));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer sometoken"),
        );
        assert!(!authorized(&headers, "hunter2"));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic not-base64!!"),
        );
        assert!(!authorized(&headers, "hunter2"));
    }

    #[test]
    fn test_kick_request_deserializes() {
        let request: KickRequest = serde_json::from_str(r#"{"player_id": 42}"#).unwrap();
        assert_eq!(request.player_id, 42);

        assert!(serde_json::from_str::<KickRequest>(r#"{}"#).is_err());
    }

    #[tokio::test]
    async fn test_stats_roster_mirror() {
        let stats = ServerStats::new();
        assert!(stats.roster().await.is_empty());

        stats
            .set_roster(vec![Participant::new(1, "alice".to_string())])
            .await;
        let roster = stats.roster().await;
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].display_name, "alice");
    }
}

//! Pairing HTTP server.
//!
//! Serves `POST /pair`, `POST /pair/confirm` and `GET /pair/status` until the
//! stop token fires. A successful confirmation schedules the stop shortly
//! after the response so the caller still receives it.
//!
//! `GET /pair/blacklist` and `DELETE /pair/blacklist` inspect and reset the
//! IP reputation tracker. They answer only to loopback peers; forwarding
//! headers are not consulted for them.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use screenlink_core::{InterfaceInfo, LifecycleEvent};
use screenlink_security::{BlacklistEntry, ConfirmRequest, PairingCoordinator, PairingStatus};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client_ip::ClientIp;
use crate::error::ApiError;

/// Delay between a successful confirmation and listener shutdown.
pub const DEFAULT_SHUTDOWN_DELAY: Duration = Duration::from_millis(100);

/// Application state shared across routes.
#[derive(Clone)]
pub struct PairingState {
    pub coordinator: Arc<PairingCoordinator>,
    pub stop: CancellationToken,
    pub shutdown_delay: Duration,
}

impl PairingState {
    pub fn new(coordinator: Arc<PairingCoordinator>, stop: CancellationToken) -> Self {
        Self {
            coordinator,
            stop,
            shutdown_delay: DEFAULT_SHUTDOWN_DELAY,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub message: String,
    /// RFC 3339.
    pub expiry: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ecdh_public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBody {
    pub code: String,
    #[serde(default)]
    pub server_ws: String,
    #[serde(default)]
    pub server_public_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub message: &'static str,
    pub client_id: String,
    pub interfaces: Vec<InterfaceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecdh_public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key_derived: Option<bool>,
}

pub fn router(state: PairingState) -> Router {
    Router::new()
        .route("/pair", post(pair))
        .route("/pair/confirm", post(confirm))
        .route("/pair/status", get(status))
        .route("/pair/blacklist", get(blacklist).delete(clear_blacklist))
        .with_state(state)
}

async fn pair(
    State(state): State<PairingState>,
    ClientIp(requester): ClientIp,
) -> Result<Json<PairResponse>, ApiError> {
    let issued = state.coordinator.issue_code(requester).await?;
    let message = if issued.already_active {
        "Pairing code already active; check the device display"
    } else {
        "Pairing code displayed on the device"
    };
    Ok(Json(PairResponse {
        message: message.to_string(),
        expiry: issued.expires_at.to_rfc3339(),
        ecdh_public_key: issued.public_key,
    }))
}

async fn confirm(
    State(state): State<PairingState>,
    ClientIp(requester): ClientIp,
    body: Result<Json<ConfirmBody>, JsonRejection>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => {
            state.coordinator.record_invalid_request().await;
            return Err(ApiError::BadRequest(e.body_text()));
        }
    };

    let outcome = state
        .coordinator
        .confirm_code(
            requester,
            ConfirmRequest {
                code: body.code,
                server_ws: body.server_ws,
                peer_public_key: body.server_public_key,
            },
        )
        .await?;

    // Never stop the listener inline; the response has to go out first.
    let stop = state.stop.clone();
    let delay = state.shutdown_delay;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        debug!("Stopping pairing listener after successful confirmation");
        stop.cancel();
    });

    Ok(Json(ConfirmResponse {
        message: "paired",
        client_id: outcome.client_id,
        interfaces: outcome.interfaces,
        ecdh_public_key: outcome.ecdh_public_key,
        session_key_derived: outcome.session_key_derived.then_some(true),
    }))
}

async fn status(State(state): State<PairingState>) -> Json<PairingStatus> {
    Json(state.coordinator.status().await)
}

fn require_loopback(peer: SocketAddr) -> Result<(), ApiError> {
    if peer.ip().is_loopback() {
        Ok(())
    } else {
        warn!(%peer, "Blacklist administration refused for remote peer");
        Err(ApiError::Forbidden("blacklist administration is local only".into()))
    }
}

async fn blacklist(
    State(state): State<PairingState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Result<Json<Vec<BlacklistEntry>>, ApiError> {
    require_loopback(peer)?;
    Ok(Json(state.coordinator.tracker().blacklisted()))
}

async fn clear_blacklist(
    State(state): State<PairingState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Result<StatusCode, ApiError> {
    require_loopback(peer)?;
    state.coordinator.tracker().clear();
    Ok(StatusCode::NO_CONTENT)
}

/// Serve the pairing API on `listener` until `state.stop` fires.
#[instrument(skip_all)]
pub async fn serve(listener: TcpListener, state: PairingState) -> Result<()> {
    let addr = listener.local_addr().context("Pairing listener has no local address")?;
    let observers = state.coordinator.observers().clone();
    let stop = state.stop.clone();

    info!(%addr, "Pairing HTTP server listening");
    observers.emit(LifecycleEvent::ServerStarted {
        addr: addr.to_string(),
    });

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await
        .context("Pairing HTTP server failed");

    info!(%addr, "Pairing HTTP server stopped");
    observers.emit(LifecycleEvent::ServerStopped);
    result
}

/// Bind `addr`, run the sweeper and serve until paired or `stop` fires.
pub async fn run_pairing_server(
    coordinator: Arc<PairingCoordinator>,
    addr: SocketAddr,
    stop: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind pairing listener on {addr}"))?;

    coordinator.start_sweeper();
    let result = serve(listener, PairingState::new(coordinator.clone(), stop)).await;
    coordinator.stop_sweeper();
    result
}

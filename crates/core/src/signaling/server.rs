//! Inbound signaling endpoints
//!
//! Exposes the two endpoints a peer POSTs to during negotiation. Each
//! handler dispatches into the connection controller and only then answers,
//! so the peer's blocking send doubles as a processing acknowledgement.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::controller::{ConnectionController, DescriptionOutcome};
use crate::error::{Error, Result};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Build the signaling router for one controller.
pub fn signaling_router(controller: Arc<ConnectionController>) -> Router {
    Router::new()
        .route("/sdp", post(handle_description))
        .route("/candidate", post(handle_candidate))
        .with_state(controller)
}

/// Serve signaling on an already bound listener until the process exits.
pub async fn serve(listener: TcpListener, controller: Arc<ConnectionController>) -> Result<()> {
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "signaling server listening");
    axum::serve(listener, signaling_router(controller)).await?;
    Ok(())
}

/// Receive the peer's session description
///
/// POST /sdp
async fn handle_description(
    State(controller): State<Arc<ConnectionController>>,
    body: Bytes,
) -> Response {
    let description: RTCSessionDescription = match serde_json::from_slice(&body) {
        Ok(description) => description,
        Err(e) => {
            let err = Error::MalformedMessage(format!("Undecodable description: {}", e));
            warn!(error = %err, "rejecting description");
            controller.report_failure(&err);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "malformed_description".to_string(),
                    message: err.to_string(),
                }),
            )
                .into_response();
        }
    };

    match controller.apply_remote_description(description).await {
        Ok(DescriptionOutcome::Applied) | Ok(DescriptionOutcome::Duplicate) => {
            StatusCode::OK.into_response()
        }
        Err(err) => {
            warn!(error = %err, "failed to apply remote description");
            controller.report_failure(&err);
            let status = match &err {
                Error::SignalingDelivery(_) => StatusCode::BAD_GATEWAY,
                Error::MalformedMessage(_) => StatusCode::BAD_REQUEST,
                Error::Negotiation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ErrorResponse {
                    error: "description_rejected".to_string(),
                    message: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Receive one trickled candidate from the peer
///
/// POST /candidate
async fn handle_candidate(
    State(controller): State<Arc<ConnectionController>>,
    body: String,
) -> Response {
    match controller.apply_remote_candidate(&body).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            warn!(error = %err, "failed to apply remote candidate");
            controller.report_failure(&err);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: "candidate_rejected".to_string(),
                    message: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

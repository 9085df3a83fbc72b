use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use courier_protocol::{
    ContactsResponse, DisconnectResponse, ErrorCode, GroupsResponse, InitSessionRequest,
    InitSessionResponse, SendFileRequest, SendFileResponse, SendMessageRequest,
    SendMessageResponse, SessionListResponse, SessionStatus,
};
use libcourier::CourierError;

use crate::server::AppState;

type ApiError = (StatusCode, Json<Value>);

fn error_response(err: &CourierError) -> ApiError {
    let (code, message) = err.to_error_code();
    let status = match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
        ErrorCode::ClientUnavailable => StatusCode::CONFLICT,
        ErrorCode::ServerError => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": message, "code": code })))
}

/// POST /session/init - Register a session and start connecting.
///
/// Returns immediately; pairing codes and the ready transition arrive over
/// the event relay, or via status polling.
pub async fn init_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InitSessionRequest>,
) -> Result<Json<InitSessionResponse>, ApiError> {
    state
        .supervisor
        .initialize(&request.tenant_id)
        .await
        .map_err(|err| error_response(&err))?;

    Ok(Json(InitSessionResponse {
        status: "initializing".to_string(),
        tenant_id: request.tenant_id,
    }))
}

/// GET /session/status/{tenant_id} - Connection status and pairing code.
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Json<SessionStatus> {
    Json(state.status.get_status(&tenant_id).await)
}

/// GET /session/groups/{tenant_id} - All group chats for the tenant.
pub async fn session_groups(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<GroupsResponse>, ApiError> {
    let groups = state
        .discovery
        .list_groups(&tenant_id)
        .await
        .map_err(|err| error_response(&err))?;
    Ok(Json(GroupsResponse { groups }))
}

#[derive(Debug, Deserialize)]
pub struct ContactsQuery {
    #[serde(default)]
    pub refresh: Option<bool>,
}

/// GET /session/contacts/{tenant_id}?refresh=bool - Deduplicated contacts.
pub async fn session_contacts(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ContactsQuery>,
) -> Result<Json<ContactsResponse>, ApiError> {
    let contacts = state
        .discovery
        .group_contacts(&tenant_id, query.refresh.unwrap_or(false))
        .await
        .map_err(|err| error_response(&err))?;
    Ok(Json(ContactsResponse {
        total: contacts.len(),
        contacts,
    }))
}

/// POST /session/send/{tenant_id} - Dispatch a text and/or image message.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let outcome = state
        .dispatch
        .send_message(
            &tenant_id,
            &request.destination,
            request.text.as_deref(),
            request.image.as_deref(),
        )
        .await
        .map_err(|err| error_response(&err))?;

    Ok(Json(SendMessageResponse {
        success: true,
        text_result: outcome.text,
        image_result: outcome.image,
    }))
}

/// POST /session/send-file/{tenant_id} - Dispatch a generic file by URL.
pub async fn send_file(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Json(request): Json<SendFileRequest>,
) -> Result<Json<SendFileResponse>, ApiError> {
    let result = state
        .dispatch
        .send_file(
            &tenant_id,
            &request.destination,
            &request.file_url,
            &request.options,
        )
        .await
        .map_err(|err| error_response(&err))?;

    Ok(Json(SendFileResponse {
        success: true,
        result,
    }))
}

/// POST /session/disconnect/{tenant_id} - Tear the session down.
pub async fn disconnect_session(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Json<DisconnectResponse> {
    state.supervisor.disconnect(&tenant_id).await;
    Json(DisconnectResponse { success: true })
}

/// GET /session/list - Every registered tenant and its state.
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    let sessions = state.registry.list().await;
    Json(SessionListResponse {
        total: sessions.len(),
        sessions,
    })
}

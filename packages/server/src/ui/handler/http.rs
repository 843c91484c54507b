//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use hiroba_shared::{
    ParticipantInfo, PresenceStatus,
    time::{now_millis, timestamp_to_jst_rfc3339},
};

use crate::{
    actor::RoomSnapshot,
    domain::{DisplayName, Identity, RoomKey, UserId},
    infrastructure::{
        directory::PUBLIC_ROOMS,
        dto::http::{
            ErrorDto, HealthDto, LoginRequest, LoginResponse, LogoutRequest, NotifyRequest,
            ParticipantDetailDto, RoomDetailDto, RoomSummaryDto, UserDto,
        },
    },
    ui::state::AppState,
};

type ApiError = (StatusCode, Json<ErrorDto>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorDto {
            error: message.into(),
        }),
    )
}

fn participant_dto(info: ParticipantInfo) -> ParticipantDetailDto {
    ParticipantDetailDto {
        user_id: info.id,
        display_name: info.display_name,
        status: info.status.to_string(),
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
    })
}

/// Public rooms and whether each one has a running actor
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    let active = state.rooms.active_rooms().await;
    let rooms = PUBLIC_ROOMS
        .iter()
        .map(|(id, name)| RoomSummaryDto {
            id: (*id).to_string(),
            name: (*name).to_string(),
            active: active.iter().any(|key| key.as_str() == *id),
        })
        .collect();
    Json(rooms)
}

/// Live detail of a room; public rooms without an actor report empty
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetailDto>, ApiError> {
    let not_found = || api_error(StatusCode::NOT_FOUND, format!("room '{room_id}' not found"));
    let key = RoomKey::new(room_id.clone()).map_err(|_| not_found())?;
    let is_public = PUBLIC_ROOMS.iter().any(|(id, _)| *id == key.as_str());

    let snapshot = match state.rooms.snapshot(&key).await {
        Some(snapshot) => snapshot,
        None if is_public => RoomSnapshot {
            key,
            participants: Vec::new(),
            message_count: 0,
            connection_count: 0,
        },
        None => return Err(not_found()),
    };

    Ok(Json(RoomDetailDto {
        id: snapshot.key.to_string(),
        participants: snapshot
            .participants
            .into_iter()
            .map(participant_dto)
            .collect(),
        message_count: snapshot.message_count,
        connection_count: snapshot.connection_count,
    }))
}

/// Users currently connected to the presence channel
pub async fn get_presence(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ParticipantDetailDto>>, ApiError> {
    let online = state.presence.online_users().await.map_err(|e| {
        tracing::error!(error = %e, "presence snapshot failed");
        api_error(StatusCode::SERVICE_UNAVAILABLE, "presence unavailable")
    })?;
    Ok(Json(online.into_iter().map(participant_dto).collect()))
}

/// Directory users merged with live presence
pub async fn get_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let online = state.presence.online_users().await.map_err(|e| {
        tracing::error!(error = %e, "presence snapshot failed");
        api_error(StatusCode::SERVICE_UNAVAILABLE, "presence unavailable")
    })?;
    let users = state
        .directory
        .all()
        .iter()
        .map(|user| {
            let status = if user.is_bot {
                PresenceStatus::Online
            } else {
                online
                    .iter()
                    .find(|p| p.id == user.id.as_str())
                    .map_or(PresenceStatus::Offline, |p| p.status)
            };
            UserDto {
                id: user.id.to_string(),
                display_name: user.display_name.clone(),
                is_bot: user.is_bot,
                status: status.to_string(),
            }
        })
        .collect();
    Ok(Json(users))
}

/// Push a message into every presence session of a user
pub async fn post_notify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotifyRequest>,
) -> Result<StatusCode, ApiError> {
    let user = UserId::new(request.user_id)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    state.presence.notify(&user, request.message);
    Ok(StatusCode::ACCEPTED)
}

/// Issue a development session
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user_id = UserId::new(request.user_id)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    let display_name = match request.display_name {
        Some(name) => DisplayName::new(name)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
            .into_string(),
        None => state
            .directory
            .get(&user_id)
            .map_or_else(|| user_id.to_string(), |u| u.display_name.clone()),
    };

    let session = state
        .sessions
        .issue(Identity {
            user_id,
            display_name,
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to issue session");
            api_error(StatusCode::SERVICE_UNAVAILABLE, "session store unavailable")
        })?;
    tracing::info!(user = %session.identity.user_id, "session issued");

    let ttl = i64::try_from(state.sessions.ttl().as_millis()).unwrap_or(i64::MAX);
    Ok(Json(LoginResponse {
        session_id: session.session_id,
        user_id: session.identity.user_id.to_string(),
        display_name: session.identity.display_name,
        expires_at: timestamp_to_jst_rfc3339(now_millis().saturating_add(ttl)),
    }))
}

/// Revoke a session
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LogoutRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .revoke(&request.session_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to revoke session");
            api_error(StatusCode::SERVICE_UNAVAILABLE, "session store unavailable")
        })?;
    Ok(StatusCode::NO_CONTENT)
}

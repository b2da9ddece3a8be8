use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use warbler_db::models::MessageRow;
use warbler_types::api::{FlashResponse, MessageResponse, NewMessageRequest, TimelineResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;
use crate::session::Session;

const TIMELINE_LIMIT: u32 = 100;

pub(crate) fn message_response(row: MessageRow) -> MessageResponse {
    let created_at = parse_timestamp(&row.created_at).unwrap_or_else(|e| {
        warn!("Corrupt created_at '{}' on message {}: {}", row.created_at, row.id, e);
        chrono::DateTime::default()
    });

    MessageResponse {
        id: row.id,
        text: row.text,
        user_id: row.user_id,
        author_username: row.author_username,
        created_at,
    }
}

fn parse_timestamp(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, chrono::ParseError> {
    raw.parse::<chrono::DateTime<chrono::Utc>>().or_else(|_| {
        // SQLite's datetime('now') has no timezone; treat it as UTC.
        chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
    })
}

/// Home timeline: the actor's own messages plus those of everyone they follow.
/// Anonymous visitors get an empty timeline.
pub async fn home(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<TimelineResponse>, ApiError> {
    let Some(claims) = session.0 else {
        return Ok(Json(TimelineResponse { messages: vec![] }));
    };

    let rows = run_blocking(&state, move |db| Ok(db.timeline(claims.sub, TIMELINE_LIMIT)?)).await?;
    Ok(Json(TimelineResponse {
        messages: rows.into_iter().map(message_response).collect(),
    }))
}

pub async fn create_message(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<NewMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor_id = session.actor()?.sub;

    let row = run_blocking(&state, move |db| Ok(db.create_message(actor_id, &req.text)?)).await?;
    info!("User {} posted message {}", actor_id, row.id);

    Ok((StatusCode::CREATED, Json(message_response(row))))
}

pub async fn show_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let row = run_blocking(&state, move |db| Ok(db.get_message(message_id)?))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Message {} not found", message_id)))?;
    Ok(Json(message_response(row)))
}

/// Only the author may delete a message.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    session: Session,
) -> Result<Json<FlashResponse>, ApiError> {
    let actor_id = session.actor()?.sub;

    run_blocking(&state, move |db| {
        let message = db
            .get_message(message_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Message {} not found", message_id)))?;
        if message.user_id != actor_id {
            return Err(ApiError::Unauthorized);
        }
        db.delete_message(message_id)?;
        Ok(())
    })
    .await?;

    info!("User {} deleted message {}", actor_id, message_id);
    Ok(Json(FlashResponse::new("success", "Message deleted.")))
}

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

use warbler_types::api::ToggleLikeResponse;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;
use crate::session::Session;

/// Like the message if the actor hasn't yet, otherwise take the like back.
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    session: Session,
) -> Result<Json<ToggleLikeResponse>, ApiError> {
    let actor_id = session.actor()?.sub;

    let liked = run_blocking(&state, move |db| {
        db.get_message(message_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Message {} not found", message_id)))?;
        Ok(db.toggle_like(actor_id, message_id)?)
    })
    .await?;

    info!(
        "User {} {} message {}",
        actor_id,
        if liked { "liked" } else { "unliked" },
        message_id
    );

    Ok(Json(ToggleLikeResponse { message_id, liked }))
}

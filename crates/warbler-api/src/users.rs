use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::{debug, info};

use warbler_db::models::{UserQuery, UserRow};
use warbler_types::api::{
    FlashResponse, FollowResponse, MessageResponse, UserProfile, UserStats, UserSummary,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::messages::message_response;
use crate::run_blocking;
use crate::session::{Session, clear_session};

/// Messages shown on a profile page.
const PROFILE_MESSAGE_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct UserSearch {
    pub q: Option<String>,
}

pub(crate) fn user_summary(user: &UserRow) -> UserSummary {
    UserSummary {
        id: user.id,
        username: user.username.clone(),
        image_url: user.image_url.clone(),
    }
}

fn summaries(users: Vec<UserRow>) -> Vec<UserSummary> {
    users.iter().map(user_summary).collect()
}

fn user_not_found(user_id: i64) -> ApiError {
    ApiError::NotFound(format!("User {} not found", user_id))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(search): Query<UserSearch>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let query = UserQuery { search: search.q };
    let users = run_blocking(&state, move |db| Ok(db.list_users(&query)?)).await?;
    Ok(Json(summaries(users)))
}

pub async fn show_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserProfile>, ApiError> {
    let (user, stats, messages) = run_blocking(&state, move |db| {
        let user = db.get_user_by_id(user_id)?.ok_or_else(|| user_not_found(user_id))?;
        let stats = db.user_stats(user_id)?;
        let messages = db.messages_for_user(user_id, PROFILE_MESSAGE_LIMIT)?;
        Ok((user, stats, messages))
    })
    .await?;

    Ok(Json(UserProfile {
        id: user.id,
        username: user.username,
        image_url: user.image_url,
        header_image_url: user.header_image_url,
        bio: user.bio,
        location: user.location,
        stats: UserStats {
            messages: stats.messages,
            following: stats.following,
            followers: stats.followers,
            likes: stats.likes,
        },
        messages: messages.into_iter().map(message_response).collect(),
    }))
}

pub async fn show_following(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    session: Session,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    session.actor()?;

    let users = run_blocking(&state, move |db| {
        db.get_user_by_id(user_id)?.ok_or_else(|| user_not_found(user_id))?;
        Ok(db.following(user_id)?)
    })
    .await?;
    Ok(Json(summaries(users)))
}

pub async fn show_followers(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    session: Session,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    session.actor()?;

    let users = run_blocking(&state, move |db| {
        db.get_user_by_id(user_id)?.ok_or_else(|| user_not_found(user_id))?;
        Ok(db.followers(user_id)?)
    })
    .await?;
    Ok(Json(summaries(users)))
}

pub async fn show_likes(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    session: Session,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    session.actor()?;

    let messages = run_blocking(&state, move |db| {
        db.get_user_by_id(user_id)?.ok_or_else(|| user_not_found(user_id))?;
        Ok(db.liked_messages(user_id)?)
    })
    .await?;
    Ok(Json(messages.into_iter().map(message_response).collect()))
}

pub async fn follow(
    State(state): State<AppState>,
    Path(target_id): Path<i64>,
    session: Session,
) -> Result<Json<FollowResponse>, ApiError> {
    let actor_id = session.actor()?.sub;

    let created = run_blocking(&state, move |db| {
        db.get_user_by_id(target_id)?.ok_or_else(|| user_not_found(target_id))?;
        Ok(db.follow(actor_id, target_id)?)
    })
    .await?;

    if created {
        info!("User {} followed {}", actor_id, target_id);
    } else {
        debug!("User {} already follows {}", actor_id, target_id);
    }
    Ok(Json(FollowResponse {
        user_id: target_id,
        following: true,
    }))
}

pub async fn stop_following(
    State(state): State<AppState>,
    Path(target_id): Path<i64>,
    session: Session,
) -> Result<Json<FollowResponse>, ApiError> {
    let actor_id = session.actor()?.sub;

    let removed = run_blocking(&state, move |db| {
        db.get_user_by_id(target_id)?.ok_or_else(|| user_not_found(target_id))?;
        Ok(db.unfollow(actor_id, target_id)?)
    })
    .await?;

    if removed {
        info!("User {} stopped following {}", actor_id, target_id);
    } else {
        debug!("User {} was not following {}", actor_id, target_id);
    }
    Ok(Json(FollowResponse {
        user_id: target_id,
        following: false,
    }))
}

/// Delete the acting user's account and end the session.
pub async fn delete_user(
    State(state): State<AppState>,
    session: Session,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let actor_id = session.actor()?.sub;

    let removed = run_blocking(&state, move |db| Ok(db.delete_user(actor_id)?)).await?;
    if !removed {
        return Err(user_not_found(actor_id));
    }

    Ok((
        clear_session(jar),
        Json(FlashResponse::new("success", "Your account has been deleted.")),
    ))
}

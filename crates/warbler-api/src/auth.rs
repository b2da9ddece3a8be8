use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use tracing::info;

use warbler_db::models::NewUser;
use warbler_db::{Database, DbError};
use warbler_types::api::{FlashResponse, LoginRequest, SessionResponse, SignupRequest};

use crate::error::ApiError;
use crate::run_blocking;
use crate::session::{clear_session, create_token, session_cookie};
use crate::users::user_summary;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub session_ttl: chrono::Duration,
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewUser {
        username: req.username,
        email: req.email,
        password: req.password,
        image_url: req.image_url,
    };

    // Argon2 hashing runs inside the blocking task too
    let user = run_blocking(&state, move |db| {
        db.signup(&new).map_err(|e| match e {
            DbError::Integrity(_) => ApiError::Conflict("Username or email already taken".into()),
            other => other.into(),
        })
    })
    .await?;

    let token = create_token(&state.jwt_secret, user.id, &user.username, state.session_ttl)?;

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(token.clone())),
        Json(SessionResponse {
            user: user_summary(&user),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(&state, move |db| Ok(db.authenticate(&req.username, &req.password)?))
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let token = create_token(&state.jwt_secret, user.id, &user.username, state.session_ttl)?;
    info!("User {} logged in", user.username);

    Ok((
        jar.add(session_cookie(token.clone())),
        Json(SessionResponse {
            user: user_summary(&user),
            token,
        }),
    ))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        clear_session(jar),
        Json(FlashResponse::new("success", "You have successfully logged out.")),
    )
}

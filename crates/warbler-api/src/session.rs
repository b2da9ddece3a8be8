use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use warbler_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// Session key holding the signed token of the logged-in user.
pub const CURR_USER_KEY: &str = "curr_user";

/// The acting user resolved from the request's session, if any.
///
/// A missing, expired or forged token, or one whose user no longer exists,
/// yields an anonymous session and handlers decide whether that is acceptable.
/// Extraction only fails when the user lookup itself errors.
#[derive(Debug, Clone, Default)]
pub struct Session(pub Option<Claims>);

impl Session {
    pub fn actor(&self) -> Result<&Claims, ApiError> {
        self.0.as_ref().ok_or(ApiError::Unauthorized)
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers) else {
            return Ok(Session(None));
        };

        let claims = match decode_token(&state.jwt_secret, &token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Ignoring invalid session token: {}", e);
                return Ok(Session(None));
            }
        };

        // The token outlives the account; resolve the actor against the users table.
        let user_id = claims.sub;
        let user = run_blocking(state, move |db| Ok(db.get_user_by_id(user_id)?)).await?;
        match user {
            Some(user) => Ok(Session(Some(Claims {
                username: user.username,
                ..claims
            }))),
            None => {
                debug!("Ignoring session for missing user {}", user_id);
                Ok(Session(None))
            }
        }
    }
}

/// Session cookie first, then `Authorization: Bearer`.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(CURR_USER_KEY) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub fn create_token(
    secret: &str,
    user_id: i64,
    username: &str,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((CURR_USER_KEY, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(CURR_USER_KEY).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_roundtrip() {
        let token = create_token("secret", 22, "test", chrono::Duration::days(1)).unwrap();
        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, 22);
        assert_eq!(claims.username, "test");
    }

    #[test]
    fn token_with_wrong_secret_rejected() {
        let token = create_token("secret", 22, "test", chrono::Duration::days(1)).unwrap();
        assert!(decode_token("other", &token).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let token = create_token("secret", 22, "test", chrono::Duration::days(-1)).unwrap();
        assert!(decode_token("secret", &token).is_err());
    }

    #[test]
    fn cookie_preferred_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("curr_user=from-cookie"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));

        headers.remove(header::COOKIE);
        assert_eq!(session_token(&headers).as_deref(), Some("from-header"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn anonymous_session_is_unauthorized() {
        let session = Session::default();
        assert!(session.is_anonymous());
        assert!(matches!(session.actor(), Err(ApiError::Unauthorized)));
    }
}

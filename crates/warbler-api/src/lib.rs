pub mod auth;
pub mod error;
pub mod likes;
pub mod messages;
pub mod routes;
pub mod session;
pub mod users;

use tracing::error;
use warbler_db::Database;

use crate::auth::AppState;
use crate::error::ApiError;

/// Run blocking DB work off the async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Session --

/// Session token claims. `sub` is the acting user's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: UserSummary,
    pub token: String,
}

// -- Flash --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlashResponse {
    pub flash: Flash,
}

impl FlashResponse {
    pub fn new(category: &str, message: &str) -> Self {
        Self {
            flash: Flash {
                category: category.to_string(),
                message: message.to_string(),
            },
        }
    }
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStats {
    pub messages: u64,
    pub following: u64,
    pub followers: u64,
    pub likes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub stats: UserStats,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowResponse {
    pub user_id: i64,
    pub following: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewMessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub text: String,
    pub user_id: i64,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineResponse {
    pub messages: Vec<MessageResponse>,
}

// -- Likes --

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleLikeResponse {
    pub message_id: i64,
    pub liked: bool,
}

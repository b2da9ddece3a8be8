//! Database row types and query parameters. These map directly to SQLite
//! rows and stay independent of the warbler-types API models.

pub const DEFAULT_IMAGE_URL: &str = "/static/images/default-pic.png";
pub const DEFAULT_HEADER_IMAGE_URL: &str = "/static/images/warbler-hero.jpg";
pub const MAX_MESSAGE_LEN: usize = 140;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub text: String,
    pub user_id: i64,
    pub author_username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowRow {
    pub followed_id: i64,
    pub follower_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeRow {
    pub user_id: i64,
    pub message_id: i64,
}

/// Input to `Database::signup`. A missing password is rejected the same
/// way as an empty one.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub messages: u64,
    pub following: u64,
    pub followers: u64,
    pub likes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    /// Substring match on username.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LikeFilter {
    pub user_id: Option<i64>,
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FollowFilter {
    pub follower_id: Option<i64>,
    pub followed_id: Option<i64>,
}

impl LikeFilter {
    pub fn by_user(user_id: i64) -> Self {
        Self { user_id: Some(user_id), message_id: None }
    }

    pub fn by_message(message_id: i64) -> Self {
        Self { user_id: None, message_id: Some(message_id) }
    }
}

impl FollowFilter {
    pub fn by_follower(follower_id: i64) -> Self {
        Self { follower_id: Some(follower_id), followed_id: None }
    }

    pub fn by_followed(followed_id: i64) -> Self {
        Self { follower_id: None, followed_id: Some(followed_id) }
    }
}

use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::{debug, info};

use crate::models::{
    FollowFilter, FollowRow, LikeFilter, LikeRow, MAX_MESSAGE_LEN, MessageRow, UserQuery, UserRow,
    UserStats,
};
use crate::{Database, DbError, Result};

const USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.password, u.image_url, u.header_image_url, u.bio, u.location, u.created_at";

const MESSAGE_SELECT: &str = "SELECT m.id, m.text, m.user_id, u.username, m.created_at
     FROM messages m
     JOIN users u ON m.user_id = u.id";

impl Database {
    // -- Users --

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1");
            conn.query_row(&sql, [username], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn list_users(&self, query: &UserQuery) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| match query.search.as_deref().filter(|s| !s.is_empty()) {
            Some(search) => {
                let sql = format!(
                    "SELECT {USER_COLUMNS} FROM users u
                     WHERE u.username LIKE ?1 ESCAPE '\\'
                     ORDER BY u.username"
                );
                collect_users(conn, &sql, [like_pattern(search)])
            }
            None => {
                let sql = format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.username");
                collect_users(conn, &sql, params![])
            }
        })
    }

    /// Counts shown on a profile page.
    pub fn user_stats(&self, user_id: i64) -> Result<UserStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM messages WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE follower_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE followed_id = ?1),
                    (SELECT COUNT(*) FROM likes WHERE user_id = ?1)",
                [user_id],
                |row| {
                    Ok(UserStats {
                        messages: row.get::<_, i64>(0)? as u64,
                        following: row.get::<_, i64>(1)? as u64,
                        followers: row.get::<_, i64>(2)? as u64,
                        likes: row.get::<_, i64>(3)? as u64,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    /// Removes the user; messages, follow edges and likes go with it.
    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let removed = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM users WHERE id = ?1", [user_id])? > 0)
        })?;
        if removed {
            info!("Deleted user {}", user_id);
        }
        Ok(removed)
    }

    // -- Messages --

    pub fn create_message(&self, user_id: i64, text: &str) -> Result<MessageRow> {
        if text.trim().is_empty() {
            return Err(DbError::validation("message text is required"));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(DbError::Validation(format!(
                "message text exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }

        let created_at = crate::timestamp_now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (text, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![text, user_id, created_at],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?
                .ok_or_else(|| DbError::Integrity(format!("message {id} vanished after insert")))
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Messages authored by `user_id`, newest first.
    pub fn messages_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.user_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?2"
            );
            collect_messages(conn, &sql, params![user_id, limit])
        })
    }

    /// Messages by the user and by everyone they follow, newest first.
    pub fn timeline(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.user_id = ?1
                    OR m.user_id IN (SELECT followed_id FROM follows WHERE follower_id = ?1)
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?2"
            );
            collect_messages(conn, &sql, params![user_id, limit])
        })
    }

    pub fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0))
    }

    // -- Follows --

    /// Returns true when a new edge was created, false if it already existed.
    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        if follower_id == followed_id {
            return Err(DbError::validation("users cannot follow themselves"));
        }

        let created = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if follow_exists(&tx, follower_id, followed_id)? {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO follows (followed_id, follower_id) VALUES (?1, ?2)",
                params![followed_id, follower_id],
            )?;
            tx.commit()?;
            Ok(true)
        })?;

        if created {
            debug!("User {} now follows {}", follower_id, followed_id);
        }
        Ok(created)
    }

    /// Returns true when an edge was removed.
    pub fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM follows WHERE followed_id = ?1 AND follower_id = ?2",
                params![followed_id, follower_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Does `user_id` follow `other_id`?
    pub fn is_following(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| follow_exists(conn, user_id, other_id))
    }

    /// Is `user_id` followed by `other_id`?
    pub fn is_followed_by(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| follow_exists(conn, other_id, user_id))
    }

    /// Users that `user_id` follows.
    pub fn following(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 JOIN follows f ON f.followed_id = u.id
                 WHERE f.follower_id = ?1
                 ORDER BY u.username"
            );
            collect_users(conn, &sql, [user_id])
        })
    }

    /// Users following `user_id`.
    pub fn followers(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 JOIN follows f ON f.follower_id = u.id
                 WHERE f.followed_id = ?1
                 ORDER BY u.username"
            );
            collect_users(conn, &sql, [user_id])
        })
    }

    pub fn list_follows(&self, filter: &FollowFilter) -> Result<Vec<FollowRow>> {
        let (where_sql, values) = where_clause(&[
            ("follower_id", filter.follower_id),
            ("followed_id", filter.followed_id),
        ]);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT followed_id, follower_id FROM follows{where_sql}
                 ORDER BY followed_id, follower_id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok(FollowRow {
                        followed_id: row.get(0)?,
                        follower_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_follows(&self, filter: &FollowFilter) -> Result<u64> {
        let (where_sql, values) = where_clause(&[
            ("follower_id", filter.follower_id),
            ("followed_id", filter.followed_id),
        ]);
        self.with_conn(|conn| count(conn, &format!("SELECT COUNT(*) FROM follows{where_sql}"), values))
    }

    // -- Likes --

    /// Toggle a like: removes it if present, inserts it if not.
    /// Returns true when the like exists afterwards.
    pub fn toggle_like(&self, user_id: i64, message_id: i64) -> Result<bool> {
        let liked = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let liked = if like_exists(&tx, user_id, message_id)? {
                tx.execute(
                    "DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2",
                    params![user_id, message_id],
                )?;
                false
            } else {
                tx.execute(
                    "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)",
                    params![user_id, message_id],
                )?;
                true
            };
            tx.commit()?;
            Ok(liked)
        })?;

        debug!(
            "User {} {} message {}",
            user_id,
            if liked { "liked" } else { "unliked" },
            message_id
        );
        Ok(liked)
    }

    pub fn has_liked(&self, user_id: i64, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| like_exists(conn, user_id, message_id))
    }

    /// Messages `user_id` has liked, newest first.
    pub fn liked_messages(&self, user_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 JOIN likes l ON l.message_id = m.id
                 WHERE l.user_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC"
            );
            collect_messages(conn, &sql, [user_id])
        })
    }

    pub fn list_likes(&self, filter: &LikeFilter) -> Result<Vec<LikeRow>> {
        let (where_sql, values) = where_clause(&[
            ("user_id", filter.user_id),
            ("message_id", filter.message_id),
        ]);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT user_id, message_id FROM likes{where_sql}
                 ORDER BY user_id, message_id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok(LikeRow {
                        user_id: row.get(0)?,
                        message_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_likes(&self, filter: &LikeFilter) -> Result<u64> {
        let (where_sql, values) = where_clause(&[
            ("user_id", filter.user_id),
            ("message_id", filter.message_id),
        ]);
        self.with_conn(|conn| count(conn, &format!("SELECT COUNT(*) FROM likes{where_sql}"), values))
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        image_url: row.get(4)?,
        header_image_url: row.get(5)?,
        bio: row.get(6)?,
        location: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        user_id: row.get(2)?,
        author_username: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
    conn.query_row(&sql, [id], user_from_row).optional()
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
    conn.query_row(&sql, [id], message_from_row).optional()
}

fn collect_users<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn collect_messages<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn follow_exists(conn: &Connection, follower_id: i64, followed_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM follows WHERE followed_id = ?1 AND follower_id = ?2",
            params![followed_id, follower_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn like_exists(conn: &Connection, user_id: i64, message_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM likes WHERE user_id = ?1 AND message_id = ?2",
            params![user_id, message_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn count(conn: &Connection, sql: &str, values: Vec<i64>) -> Result<u64> {
    let n: i64 = conn.query_row(sql, params_from_iter(values), |row| row.get(0))?;
    Ok(n as u64)
}

/// Build ` WHERE a = ?1 AND b = ?2` from the columns that carry a value.
fn where_clause(columns: &[(&str, Option<i64>)]) -> (String, Vec<i64>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    for (column, value) in columns {
        if let Some(v) = value {
            values.push(*v);
            clauses.push(format!("{} = ?{}", column, values.len()));
        }
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

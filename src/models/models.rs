use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Read a `COUNT(*)` column.
pub fn count_column(row: &Row<'_>, name: &str) -> rusqlite::Result<usize> {
    let n: i64 = row.get(name)?;
    Ok(n.max(0) as usize)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub external_id: String,
    pub email: Option<String>,
    pub username: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get("id")?,
            external_id: row.get("external_id")?,
            email: row.get("email")?,
            username: row.get("username")?,
            name: row.get("name")?,
            bio: row.get("bio")?,
            image: row.get("image")?,
            location: row.get("location")?,
            website: row.get("website")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// The public slice of a user shown next to content they produced.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserSummary {
    pub id: String,
    pub name: Option<String>,
    pub username: String,
    pub image: Option<String>,
}

impl UserSummary {
    /// Reads `<prefix>id`, `<prefix>name`, `<prefix>username`, `<prefix>image`.
    pub fn from_prefixed_row(row: &Row<'_>, prefix: &str) -> rusqlite::Result<Self> {
        Ok(UserSummary {
            id: row.get(format!("{}id", prefix).as_str())?,
            name: row.get(format!("{}name", prefix).as_str())?,
            username: row.get(format!("{}username", prefix).as_str())?,
            image: row.get(format!("{}image", prefix).as_str())?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: String,
}

impl Post {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Post {
            id: row.get("id")?,
            author_id: row.get("author_id")?,
            content: row.get("content")?,
            image: row.get("image")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub author_id: String,
    pub post_id: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Like {
    pub user_id: String,
    pub post_id: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Follow {
    pub follower_id: String,
    pub following_id: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationKind {
    Follow,
    Like,
    Comment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Follow => "FOLLOW",
            NotificationKind::Like => "LIKE",
            NotificationKind::Comment => "COMMENT",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FOLLOW" => Ok(NotificationKind::Follow),
            "LIKE" => Ok(NotificationKind::Like),
            "COMMENT" => Ok(NotificationKind::Comment),
            other => Err(format!("unknown notification kind: {}", other)),
        }
    }
}

impl ToSql for NotificationKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for NotificationKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub actor_id: String,
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PostSummary {
    pub id: String,
    pub content: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommentSummary {
    pub id: String,
    pub content: String,
    pub created_at: String,
}

/// A notification joined with who caused it and what it points at.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationView {
    pub id: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: String,
    pub actor: UserSummary,
    pub post: Option<PostSummary>,
    pub comment: Option<CommentSummary>,
}

/// Body of a mark-as-read request.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct NotificationAck {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommentView {
    pub id: String,
    pub content: String,
    pub created_at: String,
    pub author: UserSummary,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostCounts {
    pub likes: usize,
    pub comments: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PostView {
    pub id: String,
    pub content: String,
    pub content_html: String,
    pub image: Option<String>,
    pub created_at: String,
    pub author: UserSummary,
    pub comments: Vec<CommentView>,
    /// Ids of the users who liked the post.
    pub likes: Vec<String>,
    pub counts: PostCounts,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileCounts {
    pub followers: usize,
    pub following: usize,
    pub posts: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub created_at: String,
    pub counts: ProfileCounts,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserSuggestion {
    #[serde(flatten)]
    pub user: UserSummary,
    pub followers: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct FollowState {
    pub following: bool,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub message: String,
}

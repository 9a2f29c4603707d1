use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};
use spin_sdk::http::{Request, Response};
use tracing::{debug, info, warn};

use crate::auth::RequestContext;
use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::{SocialError, SocialResult};
use crate::core::helpers::{action_response, json_body, json_response, linkify, new_id, now_iso, sanitize_text};
use crate::core::query_params::{get_page, parse_query_params};
use crate::models::models::{CommentView, Post, PostCounts, PostView, UserSummary};
use crate::users::{acting_user_id, get_profile_by_username, sync_identity};

pub fn get_post(conn: &Connection, post_id: &str) -> SocialResult<Option<Post>> {
    Ok(conn
        .query_row(
            "SELECT id, author_id, content, image, created_at FROM posts WHERE id = ?1",
            params![post_id],
            Post::from_row,
        )
        .optional()?)
}

pub fn create_post(ctx: &RequestContext, content: &str, image: Option<&str>) -> SocialResult<Post> {
    let user_id = acting_user_id(ctx)?;

    if content.chars().count() > MAX_POST_LENGTH {
        return Err(SocialError::Validation(format!(
            "Post is too long (max {} chars)",
            MAX_POST_LENGTH
        )));
    }
    let content = sanitize_text(content).trim().to_string();
    let image = image
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .map(str::to_string);
    if content.is_empty() && image.is_none() {
        return Err(SocialError::Validation(
            "Post needs text or an image".to_string(),
        ));
    }

    let post = Post {
        id: new_id(),
        author_id: user_id,
        content,
        image,
        created_at: now_iso(),
    };
    ctx.db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO posts (id, author_id, content, image, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![post.id, post.author_id, post.content, post.image, post.created_at],
        )?;
        Ok(())
    })?;

    info!(post_id = %post.id, author_id = %post.author_id, "post created");
    Ok(post)
}

/// Delete a post the caller wrote, together with everything hanging off it.
/// Notifications go first so none is left pointing at a deleted row.
pub fn delete_post(ctx: &RequestContext, post_id: &str) -> SocialResult<()> {
    let user_id = acting_user_id(ctx)?;

    ctx.db.transaction(|tx| {
        let post = get_post(tx, post_id)?
            .ok_or_else(|| SocialError::NotFound("Post not found".to_string()))?;
        if post.author_id != user_id {
            return Err(SocialError::Unauthorized(
                "Unauthorized - no delete permission".to_string(),
            ));
        }

        tx.execute(
            "DELETE FROM notifications
             WHERE post_id = ?1 OR comment_id IN (SELECT id FROM comments WHERE post_id = ?1)",
            params![post_id],
        )?;
        tx.execute("DELETE FROM likes WHERE post_id = ?1", params![post_id])?;
        tx.execute("DELETE FROM comments WHERE post_id = ?1", params![post_id])?;
        tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
        Ok(())
    })?;

    info!(post_id, user_id = %user_id, "post deleted");
    Ok(())
}

fn hydrate(conn: &Connection, post: Post, author: UserSummary) -> SocialResult<PostView> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.content, c.created_at,
                u.id AS author_id, u.name AS author_name, u.username AS author_username, u.image AS author_image
         FROM comments c JOIN users u ON u.id = c.author_id
         WHERE c.post_id = ?1
         ORDER BY c.created_at ASC, c.rowid ASC",
    )?;
    let comments = stmt
        .query_map(params![post.id], |row| {
            Ok(CommentView {
                id: row.get("id")?,
                content: row.get("content")?,
                created_at: row.get("created_at")?,
                author: UserSummary::from_prefixed_row(row, "author_")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare("SELECT user_id FROM likes WHERE post_id = ?1 ORDER BY created_at")?;
    let likes = stmt
        .query_map(params![post.id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PostView {
        content_html: linkify(&post.content),
        counts: PostCounts {
            likes: likes.len(),
            comments: comments.len(),
        },
        id: post.id,
        content: post.content,
        image: post.image,
        created_at: post.created_at,
        author,
        comments,
        likes,
    })
}

/// `filter` is everything after the join: WHERE, ORDER BY and LIMIT clauses.
fn query_post_views(db: &Db, filter: &str, args: &[&dyn ToSql]) -> SocialResult<Vec<PostView>> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT p.id, p.author_id, p.content, p.image, p.created_at,
                    u.name AS author_name, u.username AS author_username, u.image AS author_image
             FROM posts p JOIN users u ON u.id = p.author_id
             {}",
            filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let heads = stmt
            .query_map(args, |row| {
                Ok((Post::from_row(row)?, UserSummary::from_prefixed_row(row, "author_")?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        heads
            .into_iter()
            .map(|(post, author)| hydrate(conn, post, author))
            .collect()
    })
}

fn degrade(result: SocialResult<Vec<PostView>>, what: &str) -> Vec<PostView> {
    result.unwrap_or_else(|e| {
        warn!(error = %e, "error fetching {}", what);
        Vec::new()
    })
}

/// Global timeline, newest first; `page` is 1-based.
pub fn list_posts(db: &Db, page: usize) -> Vec<PostView> {
    let limit = POSTS_PER_PAGE as i64;
    let Some(offset) = i64::try_from(page.max(1) - 1)
        .ok()
        .and_then(|skipped| skipped.checked_mul(limit))
    else {
        debug!(page, "page out of range");
        return Vec::new();
    };
    degrade(
        query_post_views(
            db,
            "ORDER BY p.created_at DESC, p.rowid DESC LIMIT ?1 OFFSET ?2",
            &[&limit, &offset],
        ),
        "posts",
    )
}

pub fn user_posts(db: &Db, user_id: &str) -> Vec<PostView> {
    degrade(
        query_post_views(
            db,
            "WHERE p.author_id = ?1 ORDER BY p.created_at DESC, p.rowid DESC",
            &[&user_id],
        ),
        "user posts",
    )
}

pub fn liked_posts(db: &Db, user_id: &str) -> Vec<PostView> {
    degrade(
        query_post_views(
            db,
            "WHERE EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?1)
             ORDER BY p.created_at DESC, p.rowid DESC",
            &[&user_id],
        ),
        "liked posts",
    )
}

/// Posts written by the users `user_id` follows.
pub fn following_feed(db: &Db, user_id: &str) -> Vec<PostView> {
    degrade(
        query_post_views(
            db,
            "WHERE p.author_id IN (SELECT following_id FROM follows WHERE follower_id = ?1)
             ORDER BY p.created_at DESC, p.rowid DESC",
            &[&user_id],
        ),
        "feed",
    )
}

// === HTTP Handlers ===

pub fn handle_create_post(db: &Db, req: &Request) -> Response {
    let ctx = RequestContext::from_request(db, req);
    let result = json_body::<serde_json::Value>(req)
        .and_then(|value| {
            let content = value["content"].as_str().unwrap_or_default();
            let image = value["image"].as_str();
            create_post(&ctx, content, image)
        })
        .map(|post| serde_json::json!({ "post": post }));
    action_response(result, 201)
}

pub fn handle_list_posts(db: &Db, req: &Request) -> Response {
    let params = parse_query_params(&req.uri());
    let page = get_page(&params, "page", 1);
    json_response(200, &list_posts(db, page))
}

pub fn handle_delete_post(db: &Db, req: &Request, post_id: &str) -> Response {
    let ctx = RequestContext::from_request(db, req);
    action_response(delete_post(&ctx, post_id).map(|_| serde_json::json!({})), 200)
}

pub fn handle_feed(db: &Db, req: &Request) -> Response {
    let ctx = RequestContext::from_request(db, req);
    let posts = match sync_identity(&ctx) {
        Ok(Some(user_id)) => following_feed(db, &user_id),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "could not resolve caller for feed");
            Vec::new()
        }
    };
    json_response(200, &posts)
}

fn with_profile_user(db: &Db, username: &str, f: impl FnOnce(&str) -> Vec<PostView>) -> Response {
    match get_profile_by_username(db, username) {
        Ok(Some(profile)) => json_response(200, &f(&profile.id)),
        Ok(None) => SocialError::NotFound("User not found".to_string()).into(),
        Err(e) => {
            warn!(error = %e, username, "error resolving profile");
            json_response(200, &Vec::<PostView>::new())
        }
    }
}

pub fn handle_user_posts(db: &Db, username: &str) -> Response {
    with_profile_user(db, username, |user_id| user_posts(db, user_id))
}

pub fn handle_liked_posts(db: &Db, username: &str) -> Response {
    with_profile_user(db, username, |user_id| liked_posts(db, user_id))
}

use rusqlite::params;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::RequestContext;
use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::{SocialError, SocialResult};
use crate::core::helpers::{action_response, json_body, new_id, now_iso, sanitize_text};
use crate::models::models::{Comment, NotificationKind};
use crate::notifications::fanout;
use crate::posts::get_post;
use crate::users::acting_user_id;

fn validate_comment(content: &str) -> SocialResult<String> {
    if content.trim().is_empty() {
        return Err(SocialError::Validation("Comment cannot be empty".to_string()));
    }
    if content.chars().count() > MAX_COMMENT_LENGTH {
        return Err(SocialError::Validation(format!(
            "Comment is too long (max {} chars)",
            MAX_COMMENT_LENGTH
        )));
    }
    let cleaned = sanitize_text(content).trim().to_string();
    if cleaned.is_empty() {
        return Err(SocialError::Validation("Comment cannot be empty".to_string()));
    }
    Ok(cleaned)
}

/// Add a comment to `post_id` and tell the post's author about it.
pub fn create_comment(ctx: &RequestContext, post_id: &str, content: &str) -> SocialResult<Comment> {
    let user_id = acting_user_id(ctx)?;
    let content = validate_comment(content)?;

    let comment = ctx.db.transaction(|tx| {
        let post = get_post(tx, post_id)?
            .ok_or_else(|| SocialError::NotFound("Post not found".to_string()))?;

        let comment = Comment {
            id: new_id(),
            author_id: user_id.clone(),
            post_id: post.id.clone(),
            content,
            created_at: now_iso(),
        };
        tx.execute(
            "INSERT INTO comments (id, author_id, post_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![comment.id, comment.author_id, comment.post_id, comment.content, comment.created_at],
        )?;
        fanout(
            tx,
            &post.author_id,
            &user_id,
            NotificationKind::Comment,
            Some(post.id.as_str()),
            Some(comment.id.as_str()),
        )?;
        Ok(comment)
    })?;

    info!(comment_id = %comment.id, post_id, author_id = %comment.author_id, "comment created");
    Ok(comment)
}

pub fn handle_create_comment(db: &Db, req: &Request, post_id: &str) -> Response {
    let ctx = RequestContext::from_request(db, req);
    let result = json_body::<serde_json::Value>(req)
        .and_then(|value| {
            let content = value["content"].as_str().unwrap_or_default().to_string();
            create_comment(&ctx, post_id, &content)
        })
        .map(|comment| serde_json::json!({ "comment": comment }));
    action_response(result, 201)
}

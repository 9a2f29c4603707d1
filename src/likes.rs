use rusqlite::{params, Connection, OptionalExtension};
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::RequestContext;
use crate::core::db::Db;
use crate::core::errors::{SocialError, SocialResult};
use crate::core::helpers::{action_response, now_iso};
use crate::models::models::{Like, LikeState, NotificationKind};
use crate::notifications::fanout;
use crate::posts::get_post;
use crate::users::acting_user_id;

pub fn find_like(conn: &Connection, user_id: &str, post_id: &str) -> SocialResult<Option<Like>> {
    Ok(conn
        .query_row(
            "SELECT user_id, post_id, created_at FROM likes WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
            |row| {
                Ok(Like {
                    user_id: row.get(0)?,
                    post_id: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?)
}

/// Like the post, or take the like back. Liking notifies the author unless
/// the author is the one liking.
pub fn toggle_like(ctx: &RequestContext, post_id: &str) -> SocialResult<LikeState> {
    let user_id = acting_user_id(ctx)?;

    let liked = ctx.db.transaction(|tx| {
        let post = get_post(tx, post_id)?
            .ok_or_else(|| SocialError::NotFound("Post not found".to_string()))?;

        if find_like(tx, &user_id, post_id)?.is_some() {
            tx.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
            )?;
            Ok(false)
        } else {
            tx.execute(
                "INSERT INTO likes (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
                params![user_id, post_id, now_iso()],
            )?;
            fanout(tx, &post.author_id, &user_id, NotificationKind::Like, Some(post_id), None)?;
            Ok(true)
        }
    })?;

    info!(user_id = %user_id, post_id, liked, "like toggled");
    Ok(LikeState {
        liked,
        message: if liked { "Liked post" } else { "Unliked post" }.to_string(),
    })
}

pub fn handle_toggle_like(db: &Db, req: &Request, post_id: &str) -> Response {
    let ctx = RequestContext::from_request(db, req);
    let result = toggle_like(&ctx, post_id)
        .map(|state| serde_json::json!({ "liked": state.liked, "message": state.message }));
    action_response(result, 200)
}

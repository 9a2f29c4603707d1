use rusqlite::{params, Connection, OptionalExtension};
use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::auth::RequestContext;
use crate::core::db::Db;
use crate::core::errors::{SocialError, SocialResult};
use crate::core::helpers::{action_response, json_body, json_response, now_iso, validate_uuid};
use crate::models::models::{Follow, FollowState, NotificationKind, UserSummary};
use crate::notifications::fanout;
use crate::users::{acting_user_id, sync_identity, user_exists};

pub fn find_follow(
    conn: &Connection,
    follower_id: &str,
    following_id: &str,
) -> SocialResult<Option<Follow>> {
    Ok(conn
        .query_row(
            "SELECT follower_id, following_id, created_at FROM follows
             WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
            |row| {
                Ok(Follow {
                    follower_id: row.get(0)?,
                    following_id: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?)
}

/// Follow `target_user_id` if the caller does not already, otherwise
/// unfollow. A new edge and its FOLLOW notification commit together; an
/// unfollow never notifies and leaves earlier notifications in place.
pub fn toggle_follow(ctx: &RequestContext, target_user_id: &str) -> SocialResult<FollowState> {
    let user_id = acting_user_id(ctx)?;

    if target_user_id.is_empty() || !validate_uuid(target_user_id) {
        return Err(SocialError::Validation("Invalid target user".to_string()));
    }
    if user_id == target_user_id {
        return Err(SocialError::InvalidOperation(
            "You cannot follow yourself".to_string(),
        ));
    }

    let following = ctx.db.transaction(|tx| {
        if !user_exists(tx, target_user_id)? {
            return Err(SocialError::NotFound("Target user not found".to_string()));
        }

        if find_follow(tx, &user_id, target_user_id)?.is_some() {
            tx.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                params![user_id, target_user_id],
            )?;
            Ok(false)
        } else {
            tx.execute(
                "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
                params![user_id, target_user_id, now_iso()],
            )?;
            fanout(tx, target_user_id, &user_id, NotificationKind::Follow, None, None)?;
            Ok(true)
        }
    })?;

    info!(follower = %user_id, following = %target_user_id, now_following = following, "follow toggled");
    Ok(FollowState { following })
}

/// Whether the caller follows `target_user_id`. Anonymous callers and store
/// failures read as "not following".
pub fn is_following(ctx: &RequestContext, target_user_id: &str) -> bool {
    let result = sync_identity(ctx).and_then(|user_id| match user_id {
        Some(user_id) => ctx
            .db
            .with_conn(|conn| find_follow(conn, &user_id, target_user_id))
            .map(|edge| edge.is_some()),
        None => Ok(false),
    });

    result.unwrap_or_else(|e| {
        warn!(error = %e, "error checking follow status");
        false
    })
}

fn list_edge_users(db: &Db, sql: &str, user_id: &str) -> SocialResult<Vec<UserSummary>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![user_id], |row| UserSummary::from_prefixed_row(row, ""))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

pub fn get_followings(db: &Db, user_id: &str) -> SocialResult<Vec<UserSummary>> {
    list_edge_users(
        db,
        "SELECT u.id, u.name, u.username, u.image
         FROM follows f JOIN users u ON u.id = f.following_id
         WHERE f.follower_id = ?1
         ORDER BY f.created_at DESC",
        user_id,
    )
}

pub fn get_followers(db: &Db, user_id: &str) -> SocialResult<Vec<UserSummary>> {
    list_edge_users(
        db,
        "SELECT u.id, u.name, u.username, u.image
         FROM follows f JOIN users u ON u.id = f.follower_id
         WHERE f.following_id = ?1
         ORDER BY f.created_at DESC",
        user_id,
    )
}

// === HTTP Handlers ===

pub fn handle_toggle_follow(db: &Db, req: &Request) -> Response {
    let ctx = RequestContext::from_request(db, req);
    let result = json_body::<serde_json::Value>(req)
        .and_then(|value| {
            let target = value["target_user_id"].as_str().unwrap_or_default().to_string();
            toggle_follow(&ctx, &target)
        })
        .map(|state| serde_json::json!({ "following": state.following }));
    action_response(result, 200)
}

pub fn handle_is_following(db: &Db, req: &Request, target_user_id: &str) -> Response {
    let ctx = RequestContext::from_request(db, req);
    json_response(
        200,
        &serde_json::json!({ "following": is_following(&ctx, target_user_id) }),
    )
}

pub fn get_followings_list(db: &Db, user_id: &str) -> Response {
    if !validate_uuid(user_id) {
        return SocialError::Validation("User ID required".to_string()).into();
    }
    let followings = get_followings(db, user_id).unwrap_or_else(|e| {
        warn!(error = %e, user_id, "error retrieving followings");
        Vec::new()
    });
    json_response(200, &followings)
}

pub fn get_followers_list(db: &Db, user_id: &str) -> Response {
    if !validate_uuid(user_id) {
        return SocialError::Validation("User ID required".to_string()).into();
    }
    let followers = get_followers(db, user_id).unwrap_or_else(|e| {
        warn!(error = %e, user_id, "error retrieving followers");
        Vec::new()
    });
    json_response(200, &followers)
}

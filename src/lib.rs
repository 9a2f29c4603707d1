use spin_sdk::http::{Method, Request, Response};

pub mod auth;
pub mod comments;
pub mod config;
pub mod core;
pub mod follow;
pub mod likes;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod users;

#[cfg(test)]
mod testing;

use crate::core::db::Db;
use crate::core::helpers::json_response;

/// Route one request to its handler. Every response is JSON.
pub fn handle_request(db: &Db, req: Request) -> Response {
    let path = req.path().to_string();
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    tracing::debug!(method = ?req.method(), path = %path, "routing request");

    match (req.method(), segments.as_slice()) {
        (Method::Post, ["identity", "sync"]) => users::handle_sync_identity(db, &req),

        (Method::Get, ["posts"]) => posts::handle_list_posts(db, &req),
        (Method::Post, ["posts"]) => posts::handle_create_post(db, &req),
        (Method::Delete, ["posts", id]) => posts::handle_delete_post(db, &req, id),
        (Method::Post, ["posts", id, "like"]) => likes::handle_toggle_like(db, &req, id),
        (Method::Post, ["posts", id, "comments"]) => comments::handle_create_comment(db, &req, id),
        (Method::Get, ["feed"]) => posts::handle_feed(db, &req),

        (Method::Post, ["follow"]) => follow::handle_toggle_follow(db, &req),
        (Method::Get, ["users", "suggestions"]) => users::handle_suggestions(db, &req),
        (Method::Get, ["users", id, "followers"]) => follow::get_followers_list(db, id),
        (Method::Get, ["users", id, "following"]) => follow::get_followings_list(db, id),
        (Method::Get, ["users", id, "is-following"]) => follow::handle_is_following(db, &req, id),

        (Method::Get, ["profile", username]) => users::handle_get_profile(db, username),
        (Method::Get, ["profile", username, "posts"]) => posts::handle_user_posts(db, username),
        (Method::Get, ["profile", username, "likes"]) => posts::handle_liked_posts(db, username),
        (Method::Put, ["profile"]) => users::handle_update_profile(db, &req),

        (Method::Get, ["notifications"]) => notifications::handle_list_notifications(db, &req),
        (Method::Get, ["notifications", "unread-count"]) => notifications::handle_unread_count(db, &req),
        (Method::Post, ["notifications", "read"]) => notifications::handle_mark_read(db, &req),

        _ => json_response(
            404,
            &serde_json::json!({ "success": false, "error": "No route found" }),
        ),
    }
}

use std::collections::BTreeSet;

use rusqlite::{params, params_from_iter, Connection};
use spin_sdk::http::{Request, Response};
use tracing::{debug, info, warn};

use crate::auth::RequestContext;
use crate::core::db::Db;
use crate::core::errors::SocialResult;
use crate::core::helpers::{action_response, json_body, json_response, new_id, now_iso};
use crate::models::models::{
    CommentSummary, Notification, NotificationAck, NotificationKind, NotificationView, PostSummary,
    UserSummary,
};
use crate::users::{acting_user_id, sync_identity};

// Stay well below SQLite's bound-parameter limit.
const ACK_CHUNK_SIZE: usize = 500;

/// Record that `actor_id` did something `recipient_id` should hear about.
/// Must run on the same transaction as the mutation that caused it. Acting
/// on your own content or profile produces nothing.
pub fn fanout(
    conn: &Connection,
    recipient_id: &str,
    actor_id: &str,
    kind: NotificationKind,
    post_id: Option<&str>,
    comment_id: Option<&str>,
) -> SocialResult<Option<Notification>> {
    if recipient_id == actor_id {
        debug!(%kind, actor_id, "self action, no notification");
        return Ok(None);
    }

    let notification = Notification {
        id: new_id(),
        recipient_id: recipient_id.to_string(),
        actor_id: actor_id.to_string(),
        kind,
        post_id: post_id.map(str::to_string),
        comment_id: comment_id.map(str::to_string),
        read: false,
        created_at: now_iso(),
    };
    conn.execute(
        "INSERT INTO notifications (id, recipient_id, actor_id, kind, post_id, comment_id, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        params![
            notification.id,
            notification.recipient_id,
            notification.actor_id,
            notification.kind,
            notification.post_id,
            notification.comment_id,
            notification.created_at
        ],
    )?;
    Ok(Some(notification))
}

pub fn fetch_notifications(db: &Db, recipient_id: &str) -> SocialResult<Vec<NotificationView>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT n.id, n.kind, n.is_read, n.created_at,
                    a.id AS actor_id, a.name AS actor_name, a.username AS actor_username, a.image AS actor_image,
                    p.id AS post_id, p.content AS post_content, p.image AS post_image,
                    c.id AS comment_id, c.content AS comment_content, c.created_at AS comment_created_at
             FROM notifications n
             JOIN users a ON a.id = n.actor_id
             LEFT JOIN posts p ON p.id = n.post_id
             LEFT JOIN comments c ON c.id = n.comment_id
             WHERE n.recipient_id = ?1
             ORDER BY n.created_at DESC, n.rowid DESC",
        )?;
        let rows = stmt.query_map(params![recipient_id], |row| {
            let post_id: Option<String> = row.get("post_id")?;
            let post = match post_id {
                Some(id) => Some(PostSummary {
                    id,
                    content: row.get("post_content")?,
                    image: row.get("post_image")?,
                }),
                None => None,
            };
            let comment_id: Option<String> = row.get("comment_id")?;
            let comment = match comment_id {
                Some(id) => Some(CommentSummary {
                    id,
                    content: row.get("comment_content")?,
                    created_at: row.get("comment_created_at")?,
                }),
                None => None,
            };
            Ok(NotificationView {
                id: row.get("id")?,
                kind: row.get("kind")?,
                read: row.get("is_read")?,
                created_at: row.get("created_at")?,
                actor: UserSummary::from_prefixed_row(row, "actor_")?,
                post,
                comment,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Newest-first notifications for `recipient_id`; empty if the store fails.
pub fn list_notifications(db: &Db, recipient_id: &str) -> Vec<NotificationView> {
    fetch_notifications(db, recipient_id).unwrap_or_else(|e| {
        warn!(error = %e, recipient_id, "error fetching notifications");
        Vec::new()
    })
}

pub fn unread_count(db: &Db, recipient_id: &str) -> usize {
    let result = db.with_conn(|conn| {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
            params![recipient_id],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as usize)
    });
    result.unwrap_or_else(|e| {
        warn!(error = %e, recipient_id, "error counting unread notifications");
        0
    })
}

/// Mark the caller's notifications in `ids` as read. Ids that are unknown,
/// already read or addressed to someone else are left alone.
pub fn acknowledge_notifications(ctx: &RequestContext, ids: &[String]) -> SocialResult<()> {
    let user_id = acting_user_id(ctx)?;
    let ids: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    if ids.is_empty() {
        return Ok(());
    }
    let ids: Vec<&str> = ids.into_iter().collect();

    let updated = ctx.db.transaction(|tx| {
        let mut updated = 0;
        for chunk in ids.chunks(ACK_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE notifications SET is_read = 1
                 WHERE is_read = 0 AND recipient_id = ? AND id IN ({})",
                placeholders
            );
            let args = std::iter::once(user_id.as_str()).chain(chunk.iter().copied());
            updated += tx.execute(&sql, params_from_iter(args))?;
        }
        Ok(updated)
    })?;

    info!(user_id = %user_id, requested = ids.len(), updated, "notifications marked read");
    Ok(())
}

// === HTTP Handlers ===

pub fn handle_list_notifications(db: &Db, req: &Request) -> Response {
    let ctx = RequestContext::from_request(db, req);
    let notifications = match sync_identity(&ctx) {
        Ok(Some(user_id)) => list_notifications(db, &user_id),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "could not resolve caller for notifications");
            Vec::new()
        }
    };
    json_response(200, &notifications)
}

pub fn handle_unread_count(db: &Db, req: &Request) -> Response {
    let ctx = RequestContext::from_request(db, req);
    let count = match sync_identity(&ctx) {
        Ok(Some(user_id)) => unread_count(db, &user_id),
        Ok(None) => 0,
        Err(e) => {
            warn!(error = %e, "could not resolve caller for unread count");
            0
        }
    };
    json_response(200, &serde_json::json!({ "unread": count }))
}

pub fn handle_mark_read(db: &Db, req: &Request) -> Response {
    let ctx = RequestContext::from_request(db, req);
    let result = json_body::<NotificationAck>(req)
        .and_then(|ack| acknowledge_notifications(&ctx, &ack.ids))
        .map(|_| serde_json::json!({}));
    action_response(result, 200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::create_comment;
    use crate::follow::toggle_follow;
    use crate::likes::toggle_like;
    use crate::posts::create_post;
    use crate::testing::signed_in;

    #[test]
    fn self_fanout_is_skipped() {
        let db = Db::in_memory().unwrap();
        let (_, alice_id) = signed_in(&db, "alice");
        let created = db
            .with_conn(|c| fanout(c, &alice_id, &alice_id, NotificationKind::Follow, None, None))
            .unwrap();
        assert!(created.is_none());
        assert!(list_notifications(&db, &alice_id).is_empty());
    }

    #[test]
    fn acknowledge_marks_only_requested_entries() {
        let db = Db::in_memory().unwrap();
        let (alice, _) = signed_in(&db, "alice");
        let (carol, _) = signed_in(&db, "carol");
        let (bob, bob_id) = signed_in(&db, "bob");

        toggle_follow(&alice, &bob_id).unwrap();
        toggle_follow(&carol, &bob_id).unwrap();

        let before = list_notifications(&db, &bob_id);
        assert_eq!(before.len(), 2);
        assert_eq!(unread_count(&db, &bob_id), 2);
        let alice_note = before
            .iter()
            .find(|n| n.actor.username == "alice")
            .unwrap()
            .id
            .clone();

        acknowledge_notifications(&bob, &[alice_note.clone()]).unwrap();
        // Repeating is a no-op.
        acknowledge_notifications(&bob, &[alice_note.clone()]).unwrap();

        let after = list_notifications(&db, &bob_id);
        for n in &after {
            assert_eq!(n.read, n.id == alice_note, "unexpected read flag on {}", n.id);
        }
        assert_eq!(unread_count(&db, &bob_id), 1);
    }

    #[test]
    fn cannot_acknowledge_someone_elses_notifications() {
        let db = Db::in_memory().unwrap();
        let (alice, _) = signed_in(&db, "alice");
        let (_, bob_id) = signed_in(&db, "bob");

        toggle_follow(&alice, &bob_id).unwrap();
        let ids: Vec<String> = list_notifications(&db, &bob_id)
            .into_iter()
            .map(|n| n.id)
            .collect();

        acknowledge_notifications(&alice, &ids).unwrap();
        assert!(list_notifications(&db, &bob_id).iter().all(|n| !n.read));
    }

    #[test]
    fn unread_count_degrades_when_caller_cannot_be_resolved() {
        let db = Db::in_memory().unwrap();
        db.with_conn(|c| Ok(c.execute_batch("ALTER TABLE users RENAME TO users_gone;")?))
            .unwrap();

        let req = Request::builder()
            .method(spin_sdk::http::Method::Get)
            .uri("/notifications/unread-count")
            .header(crate::config::AUTH_SUBJECT_HEADER, "idp|alice")
            .build();
        let resp = handle_unread_count(&db, &req);
        assert_eq!(*resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["unread"], 0);
    }

    #[test]
    fn empty_acknowledgement_is_a_no_op() {
        let db = Db::in_memory().unwrap();
        let (alice, _) = signed_in(&db, "alice");
        acknowledge_notifications(&alice, &[]).unwrap();
    }

    #[test]
    fn listing_is_newest_first_with_joined_summaries() {
        let db = Db::in_memory().unwrap();
        let (alice, alice_id) = signed_in(&db, "alice");
        let (bob, bob_id) = signed_in(&db, "bob");

        let post = create_post(&alice, "hello world", None).unwrap();
        toggle_follow(&bob, &alice_id).unwrap();
        toggle_like(&bob, &post.id).unwrap();
        let comment = create_comment(&bob, &post.id, "nice!").unwrap();

        let notes = list_notifications(&db, &alice_id);
        let kinds: Vec<_> = notes.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![NotificationKind::Comment, NotificationKind::Like, NotificationKind::Follow]
        );

        let newest = &notes[0];
        assert_eq!(newest.actor.id, bob_id);
        assert_eq!(newest.actor.username, "bob");
        assert_eq!(newest.post.as_ref().unwrap().content, "hello world");
        assert_eq!(newest.comment.as_ref().unwrap().id, comment.id);
        assert_eq!(newest.comment.as_ref().unwrap().content, "nice!");

        assert!(notes[1].comment.is_none());
        assert_eq!(notes[1].post.as_ref().unwrap().id, post.id);
        assert!(notes[2].post.is_none());
    }
}

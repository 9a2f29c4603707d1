use std::sync::OnceLock;

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::auth::{ExternalPrincipal, RequestContext};
use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::{SocialError, SocialResult};
use crate::core::helpers::{action_response, json_body, json_response, new_id, now_iso, sanitize_text};
use crate::models::models::{
    count_column, Profile, ProfileCounts, ProfileUpdate, User, UserSuggestion, UserSummary,
};

const USER_COLUMNS: &str =
    "id, external_id, email, username, name, bio, image, location, website, created_at, updated_at";

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("Regex should compile"))
}

/// Username for a first-sight principal: the provider's username, else the
/// local part of the primary email, else a stub derived from the subject.
pub fn derive_username(principal: &ExternalPrincipal) -> String {
    let raw = principal
        .username
        .clone()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| {
            principal
                .email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("user_{}", principal.subject.chars().take(8).collect::<String>()));
    username_regex().replace_all(raw.trim(), "_").into_owned()
}

fn display_name(principal: &ExternalPrincipal) -> Option<String> {
    let name = format!(
        "{} {}",
        principal.first_name.as_deref().unwrap_or_default(),
        principal.last_name.as_deref().unwrap_or_default()
    );
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

pub fn get_user_by_external_id(conn: &Connection, external_id: &str) -> SocialResult<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM users WHERE external_id = ?1", USER_COLUMNS),
            params![external_id],
            User::from_row,
        )
        .optional()?)
}

pub fn get_user_by_id(conn: &Connection, user_id: &str) -> SocialResult<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![user_id],
            User::from_row,
        )
        .optional()?)
}

pub fn user_exists(conn: &Connection, user_id: &str) -> SocialResult<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", params![user_id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn insert_user(db: &Db, principal: &ExternalPrincipal, username: &str) -> SocialResult<String> {
    let id = new_id();
    let now = now_iso();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (id, external_id, email, username, name, image, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                principal.subject,
                principal.email,
                username,
                display_name(principal),
                principal.image_url,
                now
            ],
        )?;
        Ok(())
    })?;
    Ok(id)
}

/// Map the current principal to an internal user id, creating the user on
/// first sight. Anonymous callers get `Ok(None)`.
pub fn sync_identity(ctx: &RequestContext) -> SocialResult<Option<String>> {
    let Some(principal) = ctx.principal.as_ref() else {
        return Ok(None);
    };

    let existing = ctx
        .db
        .with_conn(|conn| get_user_by_external_id(conn, &principal.subject))?;
    if let Some(user) = existing {
        return Ok(Some(user.id));
    }

    let base = derive_username(principal);
    let mut username = base.clone();
    for attempt in 0..2 {
        match insert_user(ctx.db, principal, &username) {
            Ok(id) => {
                info!(user_id = %id, username = %username, "created user on first sight");
                return Ok(Some(id));
            }
            Err(SocialError::Conflict(_)) => {
                // Either a concurrent first sight of the same principal won
                // the insert, or the username belongs to someone else.
                let raced = ctx
                    .db
                    .with_conn(|conn| get_user_by_external_id(conn, &principal.subject))?;
                if let Some(user) = raced {
                    return Ok(Some(user.id));
                }
                if attempt == 0 {
                    warn!(username = %base, "username taken, retrying with suffix");
                    username = format!("{}_{}", base, &new_id()[..6]);
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(SocialError::Conflict(format!("Username {} is not available", base)))
}

/// Internal id of the caller for write paths.
pub fn acting_user_id(ctx: &RequestContext) -> SocialResult<String> {
    sync_identity(ctx)?.ok_or(SocialError::Unauthenticated)
}

pub fn get_profile_by_username(db: &Db, username: &str) -> SocialResult<Option<Profile>> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT u.id, u.name, u.username, u.bio, u.image, u.location, u.website, u.created_at,
                        (SELECT COUNT(*) FROM follows f WHERE f.following_id = u.id) AS followers,
                        (SELECT COUNT(*) FROM follows f WHERE f.follower_id = u.id) AS following,
                        (SELECT COUNT(*) FROM posts p WHERE p.author_id = u.id) AS posts
                 FROM users u WHERE u.username = ?1",
                params![username],
                |row| {
                    Ok(Profile {
                        id: row.get("id")?,
                        name: row.get("name")?,
                        username: row.get("username")?,
                        bio: row.get("bio")?,
                        image: row.get("image")?,
                        location: row.get("location")?,
                        website: row.get("website")?,
                        created_at: row.get("created_at")?,
                        counts: ProfileCounts {
                            followers: count_column(row, "followers")?,
                            following: count_column(row, "following")?,
                            posts: count_column(row, "posts")?,
                        },
                    })
                },
            )
            .optional()?)
    })
}

fn clean_field(value: &str, max_len: usize, label: &str) -> SocialResult<Option<String>> {
    if value.chars().count() > max_len {
        return Err(SocialError::Validation(format!(
            "{} too long (max {} chars)",
            label, max_len
        )));
    }
    let cleaned = sanitize_text(value).trim().to_string();
    Ok((!cleaned.is_empty()).then_some(cleaned))
}

/// Apply the provided fields; omitted fields keep their value, blank ones clear it.
pub fn update_profile(ctx: &RequestContext, update: ProfileUpdate) -> SocialResult<User> {
    let user_id = acting_user_id(ctx)?;

    let name = update
        .name
        .as_deref()
        .map(|v| clean_field(v, MAX_PROFILE_FIELD_LENGTH, "Name"))
        .transpose()?;
    let bio = update
        .bio
        .as_deref()
        .map(|v| clean_field(v, MAX_BIO_LENGTH, "Bio"))
        .transpose()?;
    let location = update
        .location
        .as_deref()
        .map(|v| clean_field(v, MAX_PROFILE_FIELD_LENGTH, "Location"))
        .transpose()?;
    let website = update
        .website
        .as_deref()
        .map(|v| clean_field(v, MAX_PROFILE_FIELD_LENGTH, "Website"))
        .transpose()?;

    let user = ctx.db.transaction(|tx| {
        let mut user = get_user_by_id(tx, &user_id)?
            .ok_or_else(|| SocialError::NotFound("User not found".to_string()))?;
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(bio) = bio {
            user.bio = bio;
        }
        if let Some(location) = location {
            user.location = location;
        }
        if let Some(website) = website {
            user.website = website;
        }
        user.updated_at = now_iso();
        tx.execute(
            "UPDATE users SET name = ?1, bio = ?2, location = ?3, website = ?4, updated_at = ?5 WHERE id = ?6",
            params![user.name, user.bio, user.location, user.website, user.updated_at, user.id],
        )?;
        Ok(user)
    })?;

    info!(user_id = %user.id, "profile updated");
    Ok(user)
}

/// A few users the caller does not follow yet.
pub fn suggested_users(ctx: &RequestContext) -> Vec<UserSuggestion> {
    let user_id = match sync_identity(ctx) {
        Ok(Some(id)) => id,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "could not resolve caller for suggestions");
            return Vec::new();
        }
    };

    let result = ctx.db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT u.id, u.name, u.username, u.image,
                    (SELECT COUNT(*) FROM follows f WHERE f.following_id = u.id) AS followers
             FROM users u
             WHERE u.id <> ?1
               AND NOT EXISTS (SELECT 1 FROM follows f WHERE f.follower_id = ?1 AND f.following_id = u.id)
             ORDER BY random()
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, SUGGESTED_USERS_LIMIT as i64], |row| {
            Ok(UserSuggestion {
                user: UserSummary::from_prefixed_row(row, "")?,
                followers: count_column(row, "followers")?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    });

    result.unwrap_or_else(|e| {
        warn!(error = %e, "failed to fetch suggested users");
        Vec::new()
    })
}

// === HTTP Handlers ===

pub fn handle_sync_identity(db: &Db, req: &Request) -> Response {
    let ctx = RequestContext::from_request(db, req);
    action_response(
        sync_identity(&ctx).map(|id| serde_json::json!({ "user_id": id })),
        200,
    )
}

pub fn handle_get_profile(db: &Db, username: &str) -> Response {
    match get_profile_by_username(db, username) {
        Ok(Some(profile)) => json_response(200, &profile),
        Ok(None) => SocialError::NotFound("User not found".to_string()).into(),
        Err(e) => e.into(),
    }
}

pub fn handle_update_profile(db: &Db, req: &Request) -> Response {
    let ctx = RequestContext::from_request(db, req);
    let result = json_body::<ProfileUpdate>(req)
        .and_then(|update| update_profile(&ctx, update))
        .map(|user| serde_json::json!({ "user": user }));
    action_response(result, 200)
}

pub fn handle_suggestions(db: &Db, req: &Request) -> Response {
    let ctx = RequestContext::from_request(db, req);
    json_response(200, &suggested_users(&ctx))
}

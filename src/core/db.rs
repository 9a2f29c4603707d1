use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::core::errors::SocialResult;
use crate::core::helpers::{new_id, now_iso};
use crate::models::models::NotificationKind;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
  id TEXT PRIMARY KEY,
  external_id TEXT NOT NULL UNIQUE,
  email TEXT NULL,
  username TEXT NOT NULL UNIQUE,
  name TEXT NULL,
  bio TEXT NULL,
  image TEXT NULL,
  location TEXT NULL,
  website TEXT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS follows (
  follower_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  following_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  created_at TEXT NOT NULL,
  PRIMARY KEY (follower_id, following_id),
  CHECK (follower_id <> following_id)
);
CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id);

CREATE TABLE IF NOT EXISTS posts (
  id TEXT PRIMARY KEY,
  author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  content TEXT NOT NULL,
  image TEXT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id, created_at DESC);

CREATE TABLE IF NOT EXISTS comments (
  id TEXT PRIMARY KEY,
  author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
  content TEXT NOT NULL CHECK (length(trim(content)) > 0),
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at);

CREATE TABLE IF NOT EXISTS likes (
  user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
  created_at TEXT NOT NULL,
  PRIMARY KEY (user_id, post_id)
);
CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id);

CREATE TABLE IF NOT EXISTS notifications (
  id TEXT PRIMARY KEY,
  recipient_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  actor_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  kind TEXT NOT NULL CHECK (kind IN ('FOLLOW', 'LIKE', 'COMMENT')),
  post_id TEXT NULL REFERENCES posts(id) ON DELETE CASCADE,
  comment_id TEXT NULL REFERENCES comments(id) ON DELETE CASCADE,
  is_read INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  CHECK (recipient_id <> actor_id)
);
CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id, created_at DESC);
"#;

/// Shared handle to the relational store. Cloning shares the connection.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> SocialResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_schema(conn)
    }

    /// Fresh private database, used by tests and throwaway runs.
    pub fn in_memory() -> SocialResult<Self> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> SocialResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A panic mid-operation leaves any open transaction to roll back on
    /// drop, so a poisoned lock still guards a usable connection.
    fn lock(&self) -> SocialResult<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("database connection lock was poisoned, recovering");
            poisoned.into_inner()
        }))
    }

    /// Run read-only or single-statement work on the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> SocialResult<T>) -> SocialResult<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside `BEGIN IMMEDIATE`; commits on `Ok`, rolls back on `Err`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> SocialResult<T>,
    ) -> SocialResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

struct SeedUser {
    username: &'static str,
    name: &'static str,
    email: &'static str,
    bio: &'static str,
    image: &'static str,
    location: Option<&'static str>,
    website: Option<&'static str>,
}

const SEED_USERS: [SeedUser; 3] = [
    SeedUser {
        username: "alice",
        name: "Alice Johnson",
        email: "alice@example.com",
        bio: "Software developer and tech enthusiast",
        image: "https://randomuser.me/api/portraits/women/1.jpg",
        location: Some("San Francisco, CA"),
        website: Some("https://alice.dev"),
    },
    SeedUser {
        username: "bob",
        name: "Bob Smith",
        email: "bob@example.com",
        bio: "Digital artist and designer",
        image: "https://randomuser.me/api/portraits/men/1.jpg",
        location: Some("New York, NY"),
        website: None,
    },
    SeedUser {
        username: "charlie",
        name: "Charlie Brown",
        email: "charlie@example.com",
        bio: "Travel blogger and photographer",
        image: "https://randomuser.me/api/portraits/men/2.jpg",
        location: None,
        website: Some("https://charlie-travels.com"),
    },
];

/// Populate a demo graph (three users with follows, posts, comments, likes
/// and their notifications). Does nothing if the demo users already exist.
pub fn seed_demo_data(db: &Db) -> anyhow::Result<()> {
    db.transaction(|tx| {
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![SEED_USERS[0].username],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(());
        }

        let mut ids = Vec::with_capacity(SEED_USERS.len());
        for seed in &SEED_USERS {
            let id = new_id();
            let now = now_iso();
            tx.execute(
                "INSERT INTO users (id, external_id, email, username, name, bio, image, location, website, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    id,
                    format!("seed|{}", seed.username),
                    seed.email,
                    seed.username,
                    seed.name,
                    seed.bio,
                    seed.image,
                    seed.location,
                    seed.website,
                    now
                ],
            )?;
            ids.push(id);
        }
        let (alice, bob, charlie) = (ids[0].as_str(), ids[1].as_str(), ids[2].as_str());

        for (follower, following) in [(alice, bob), (alice, charlie), (bob, alice)] {
            tx.execute(
                "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
                params![follower, following, now_iso()],
            )?;
        }

        let insert_post = |author: &str, content: &str, image: Option<&str>| -> SocialResult<String> {
            let id = new_id();
            tx.execute(
                "INSERT INTO posts (id, author_id, content, image, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, author, content, image, now_iso()],
            )?;
            Ok(id)
        };
        let launch = insert_post(
            alice,
            "Just launched my new website! Check it out and let me know what you think. #webdev #launch",
            None,
        )?;
        let hike = insert_post(
            bob,
            "Beautiful day for a hike! #outdoors #nature",
            Some("https://images.unsplash.com/photo-1506744038136-46273834b3fb"),
        )?;
        insert_post(
            charlie,
            "Working on some new designs. Here's a preview!",
            Some("https://images.unsplash.com/photo-1547658719-da2b51169166"),
        )?;

        let insert_comment = |author: &str, post: &str, content: &str| -> SocialResult<String> {
            let id = new_id();
            tx.execute(
                "INSERT INTO comments (id, author_id, post_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, author, post, content, now_iso()],
            )?;
            Ok(id)
        };
        let praise = insert_comment(bob, launch.as_str(), "Great job on the website! The design looks amazing.")?;
        insert_comment(alice, launch.as_str(), "Thanks! I really appreciate it!")?;

        for liker in [alice, charlie] {
            tx.execute(
                "INSERT INTO likes (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
                params![liker, hike, now_iso()],
            )?;
        }

        let notifications = [
            (alice, bob, NotificationKind::Comment, Some(launch.as_str()), Some(praise.as_str())),
            (bob, alice, NotificationKind::Like, Some(hike.as_str()), None),
            (alice, bob, NotificationKind::Follow, None, None),
        ];
        for (recipient, actor, kind, post, comment) in notifications {
            tx.execute(
                "INSERT INTO notifications (id, recipient_id, actor_id, kind, post_id, comment_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![new_id(), recipient, actor, kind, post, comment, now_iso()],
            )?;
        }

        tracing::info!(users = ids.len(), "seeded demo data");
        Ok(())
    })?;
    Ok(())
}

pub fn reset_db_data(db: &Db) -> anyhow::Result<()> {
    db.transaction(|tx| {
        tx.execute_batch(
            "DELETE FROM notifications;
             DELETE FROM likes;
             DELETE FROM comments;
             DELETE FROM follows;
             DELETE FROM posts;
             DELETE FROM users;",
        )?;
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::SocialError;
    use crate::testing::count_rows as count;

    #[test]
    fn seeding_is_idempotent() {
        let db = Db::in_memory().unwrap();
        seed_demo_data(&db).unwrap();
        seed_demo_data(&db).unwrap();

        assert_eq!(count(&db, "users"), 3);
        assert_eq!(count(&db, "follows"), 3);
        assert_eq!(count(&db, "posts"), 3);
        assert_eq!(count(&db, "comments"), 2);
        assert_eq!(count(&db, "likes"), 2);
        assert_eq!(count(&db, "notifications"), 3);
    }

    #[test]
    fn reset_clears_every_table() {
        let db = Db::in_memory().unwrap();
        seed_demo_data(&db).unwrap();
        reset_db_data(&db).unwrap();

        for table in ["users", "follows", "posts", "comments", "likes", "notifications"] {
            assert_eq!(count(&db, table), 0, "{} not empty", table);
        }
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Db::in_memory().unwrap();
        let result: SocialResult<()> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO users (id, external_id, username, created_at, updated_at) VALUES ('u1', 'ext', 'name', 'now', 'now')",
                [],
            )?;
            Err(SocialError::Validation("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(count(&db, "users"), 0);
    }

    #[test]
    fn poisoned_lock_recovers() {
        let db = Db::in_memory().unwrap();
        let shared = db.clone();
        let crashed = std::thread::spawn(move || {
            let _guard = shared.conn.lock().unwrap();
            panic!("worker died holding the connection");
        })
        .join();
        assert!(crashed.is_err());
        assert!(db.conn.is_poisoned());

        seed_demo_data(&db).unwrap();
        assert_eq!(count(&db, "users"), 3);
    }

    #[test]
    fn self_follow_is_rejected_by_schema() {
        let db = Db::in_memory().unwrap();
        let result = db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, external_id, username, created_at, updated_at) VALUES ('u1', 'ext', 'name', 'now', 'now')",
                [],
            )?;
            conn.execute(
                "INSERT INTO follows (follower_id, following_id, created_at) VALUES ('u1', 'u1', 'now')",
                [],
            )?;
            Ok(())
        });
        assert!(matches!(result, Err(SocialError::Store(_))));
    }
}

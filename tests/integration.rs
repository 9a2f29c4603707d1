use flock::core::db::Db;
use serde_json::{json, Value};
use spin_sdk::http::{Method, Request, Response};

fn call(db: &Db, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (u16, Value) {
    let mut builder = Request::builder();
    builder.method(method).uri(uri);
    if let Some(user) = user {
        builder
            .header("x-auth-subject", format!("idp|{}", user))
            .header("x-auth-email", format!("{}@example.com", user));
    }
    if let Some(body) = body {
        builder
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&body).unwrap());
    }
    let resp: Response = flock::handle_request(db, builder.build());
    let status = *resp.status();
    let value = serde_json::from_slice(resp.body()).unwrap_or(Value::Null);
    (status, value)
}

fn user_id(db: &Db, user: &str) -> String {
    let (status, body) = call(db, Method::Post, "/identity/sync", Some(user), None);
    assert_eq!(status, 200, "sync failed: {:?}", body);
    body["user_id"].as_str().unwrap().to_string()
}

#[test]
fn test_follow_and_acknowledge_flow() {
    let db = Db::in_memory().unwrap();

    // 1. Both users sign in
    let alice_id = user_id(&db, "alice");
    let bob_id = user_id(&db, "bob");
    assert_ne!(alice_id, bob_id);

    // 2. Alice follows Bob
    let (status, body) = call(&db, Method::Post, "/follow", Some("alice"), Some(json!({ "target_user_id": bob_id })));
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["following"], true);

    let (_, body) = call(&db, Method::Get, &format!("/users/{}/is-following", bob_id), Some("alice"), None);
    assert_eq!(body["following"], true);

    // 3. Bob sees one unread FOLLOW notification from Alice
    let (_, count) = call(&db, Method::Get, "/notifications/unread-count", Some("bob"), None);
    assert_eq!(count["unread"], 1);
    let (status, notes) = call(&db, Method::Get, "/notifications", Some("bob"), None);
    assert_eq!(status, 200);
    let notes = notes.as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["kind"], "FOLLOW");
    assert_eq!(notes[0]["actor"]["id"], alice_id);
    assert_eq!(notes[0]["read"], false);

    // 4. Alice cannot acknowledge Bob's notification
    let ids = json!({ "ids": [notes[0]["id"].clone()] });
    let (status, _) = call(&db, Method::Post, "/notifications/read", Some("alice"), Some(ids.clone()));
    assert_eq!(status, 200);
    let (_, count) = call(&db, Method::Get, "/notifications/unread-count", Some("bob"), None);
    assert_eq!(count["unread"], 1);

    // 5. Bob acknowledges it
    let (status, body) = call(&db, Method::Post, "/notifications/read", Some("bob"), Some(ids));
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    let (_, count) = call(&db, Method::Get, "/notifications/unread-count", Some("bob"), None);
    assert_eq!(count["unread"], 0);

    // 6. Follower lists reflect the edge
    let (_, followers) = call(&db, Method::Get, &format!("/users/{}/followers", bob_id), None, None);
    assert_eq!(followers[0]["username"], "alice");
    let (_, following) = call(&db, Method::Get, &format!("/users/{}/following", alice_id), None, None);
    assert_eq!(following[0]["id"], bob_id);
}

#[test]
fn test_post_comment_like_and_delete_flow() {
    let db = Db::in_memory().unwrap();
    let alice_id = user_id(&db, "alice");
    let bob_id = user_id(&db, "bob");

    // 1. Alice posts
    let (status, body) = call(&db, Method::Post, "/posts", Some("alice"), Some(json!({ "content": "hello https://flock.example" })));
    assert_eq!(status, 201);
    let post_id = body["post"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["post"]["author_id"], alice_id);

    // 2. Bob comments and likes
    let (status, body) = call(&db, Method::Post, &format!("/posts/{}/comments", post_id), Some("bob"), Some(json!({ "content": "nice!" })));
    assert_eq!(status, 201);
    assert_eq!(body["comment"]["content"], "nice!");
    let comment_id = body["comment"]["id"].clone();

    let (status, body) = call(&db, Method::Post, &format!("/posts/{}/like", post_id), Some("bob"), None);
    assert_eq!(status, 200);
    assert_eq!(body["liked"], true);

    // 3. Alice is told about both
    let (_, notes) = call(&db, Method::Get, "/notifications", Some("alice"), None);
    let notes = notes.as_array().unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0]["kind"], "LIKE");
    assert_eq!(notes[1]["kind"], "COMMENT");
    assert_eq!(notes[1]["comment"]["id"], comment_id);
    assert_eq!(notes[1]["post"]["id"], post_id);

    // 4. The timeline shows the hydrated post
    let (_, posts) = call(&db, Method::Get, "/posts?page=1", None, None);
    assert_eq!(posts[0]["id"], post_id);
    assert_eq!(posts[0]["counts"]["likes"], 1);
    assert_eq!(posts[0]["counts"]["comments"], 1);
    assert_eq!(posts[0]["likes"][0], bob_id);
    assert!(posts[0]["content_html"].as_str().unwrap().contains("<a href=\"https://flock.example\""));

    let (_, liked) = call(&db, Method::Get, "/profile/bob/likes", None, None);
    assert_eq!(liked[0]["id"], post_id);

    // 5. Bob may not delete it
    let (status, body) = call(&db, Method::Delete, &format!("/posts/{}", post_id), Some("bob"), None);
    assert_eq!(status, 403);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    // 6. Alice deletes it and the notifications go with it
    let (status, body) = call(&db, Method::Delete, &format!("/posts/{}", post_id), Some("alice"), None);
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    let (_, notes) = call(&db, Method::Get, "/notifications", Some("alice"), None);
    assert_eq!(notes.as_array().unwrap().len(), 0);
    let (_, posts) = call(&db, Method::Get, "/posts", None, None);
    assert_eq!(posts.as_array().unwrap().len(), 0);
}

#[test]
fn test_feed_profile_and_suggestions() {
    let db = Db::in_memory().unwrap();
    user_id(&db, "alice");
    let bob_id = user_id(&db, "bob");
    user_id(&db, "carol");

    call(&db, Method::Post, "/posts", Some("bob"), Some(json!({ "content": "bob here" })));
    call(&db, Method::Post, "/posts", Some("carol"), Some(json!({ "content": "carol here" })));
    call(&db, Method::Post, "/follow", Some("alice"), Some(json!({ "target_user_id": bob_id })));

    let (status, feed) = call(&db, Method::Get, "/feed", Some("alice"), None);
    assert_eq!(status, 200);
    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["author"]["username"], "bob");

    let (_, suggestions) = call(&db, Method::Get, "/users/suggestions", Some("alice"), None);
    let suggestions = suggestions.as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["username"], "carol");

    let (status, body) = call(&db, Method::Put, "/profile", Some("bob"), Some(json!({ "bio": "<i>builder</i>" })));
    assert_eq!(status, 200);
    assert_eq!(body["user"]["bio"], "builder");

    let (status, profile) = call(&db, Method::Get, "/profile/bob", None, None);
    assert_eq!(status, 200);
    assert_eq!(profile["bio"], "builder");
    assert_eq!(profile["counts"]["followers"], 1);
    assert_eq!(profile["counts"]["posts"], 1);

    let (_, posts) = call(&db, Method::Get, "/profile/bob/posts", None, None);
    assert_eq!(posts.as_array().unwrap().len(), 1);
}

#[test]
fn test_failures_report_success_false() {
    let db = Db::in_memory().unwrap();
    let alice_id = user_id(&db, "alice");

    // Anonymous writes
    let (status, body) = call(&db, Method::Post, "/posts", None, Some(json!({ "content": "hi" })));
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);

    // Self follow
    let (status, body) = call(&db, Method::Post, "/follow", Some("alice"), Some(json!({ "target_user_id": alice_id })));
    assert_eq!(status, 422);
    assert_eq!(body["success"], false);

    // Blank comment on a missing post is rejected before the lookup
    let (status, _) = call(&db, Method::Post, "/posts/missing/comments", Some("alice"), Some(json!({ "content": "  " })));
    assert_eq!(status, 400);
    let (status, _) = call(&db, Method::Post, "/posts/missing/comments", Some("alice"), Some(json!({ "content": "hi" })));
    assert_eq!(status, 404);

    // Missing body
    let (status, _) = call(&db, Method::Post, "/follow", Some("alice"), None);
    assert_eq!(status, 400);

    // Malformed acknowledgement bodies
    for body in [json!({ "ids": "abc" }), json!({ "ids": [1, 2] }), json!({})] {
        let (status, resp) = call(&db, Method::Post, "/notifications/read", Some("alice"), Some(body));
        assert_eq!(status, 400);
        assert_eq!(resp["success"], false);
    }
    let (status, _) = call(&db, Method::Post, "/notifications/read", Some("alice"), Some(json!({ "ids": [] })));
    assert_eq!(status, 200);

    // Absurd page numbers read as an empty page
    let (status, posts) = call(&db, Method::Get, "/posts?page=4611686018427387904", None, None);
    assert_eq!(status, 200);
    assert_eq!(posts, json!([]));

    let (status, _) = call(&db, Method::Get, "/profile/nobody", None, None);
    assert_eq!(status, 404);
    let (status, body) = call(&db, Method::Get, "/nowhere", None, None);
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);

    // Anonymous reads degrade to empty
    let (status, notes) = call(&db, Method::Get, "/notifications", None, None);
    assert_eq!(status, 200);
    assert_eq!(notes, json!([]));
    let (_, count) = call(&db, Method::Get, "/notifications/unread-count", None, None);
    assert_eq!(count["unread"], 0);
}

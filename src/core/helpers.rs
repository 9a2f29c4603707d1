use std::collections::HashSet;
use std::sync::OnceLock;

use ammonia::Builder;
use chrono::SecondsFormat;
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::core::errors::{SocialError, SocialResult};

/// Fixed microsecond precision keeps lexical order equal to time order.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

const MAX_SANITIZE_PASSES: usize = 8;

/// Strip every tag, leaving plain text. Decoding entities can expose new
/// markup, so clean and decode repeat until the text stops changing.
pub fn sanitize_text(text: &str) -> String {
    let builder = {
        let mut builder = Builder::default();
        builder.tags(HashSet::new());
        builder
    };
    let mut current = text.to_string();
    for _ in 0..MAX_SANITIZE_PASSES {
        let cleaned = builder.clean(&current).to_string();
        let decoded = html_escape::decode_html_entities(&cleaned).into_owned();
        if decoded == current {
            return decoded;
        }
        current = decoded;
    }
    // Still unstable: keep the escaped form rather than decoded markup.
    builder.clean(&current).to_string()
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("Regex should compile"))
}

/// Render stored plain-text content as HTML with clickable links.
pub fn linkify(content: &str) -> String {
    let mut html = String::with_capacity(content.len());
    let mut last = 0;
    for m in url_regex().find_iter(content) {
        html.push_str(&encode_text(&content[last..m.start()]));
        let url = m.as_str();
        html.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            encode_double_quoted_attribute(url),
            encode_text(url)
        ));
        last = m.end();
    }
    html.push_str(&encode_text(&content[last..]));
    html
}

/// Decode a JSON request body; a missing or malformed body is a validation failure.
pub fn json_body<T: DeserializeOwned>(req: &Request) -> SocialResult<T> {
    let body = req.body();
    if body.is_empty() {
        return Err(SocialError::Validation("Request body is required".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

pub fn json_response<T: Serialize>(status: u16, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(body)
            .build(),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response");
            Response::builder()
                .status(500)
                .header("Content-Type", "application/json")
                .body(br#"{"success":false,"error":"Internal error"}"#.to_vec())
                .build()
        }
    }
}

/// Wrap an operation outcome in the `{"success": ..}` envelope.
pub fn action_response(result: SocialResult<serde_json::Value>, status: u16) -> Response {
    match result {
        Ok(mut data) => {
            if let Some(map) = data.as_object_mut() {
                map.insert("success".to_string(), serde_json::Value::Bool(true));
                json_response(status, &data)
            } else {
                json_response(status, &serde_json::json!({ "success": true, "data": data }))
            }
        }
        Err(err) => err.into(),
    }
}

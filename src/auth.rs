use spin_sdk::http::Request;

use crate::config::*;
use crate::core::db::Db;

/// The account as asserted by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternalPrincipal {
    pub subject: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
}

impl ExternalPrincipal {
    pub fn new(subject: impl Into<String>) -> Self {
        ExternalPrincipal {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }
}

/// Per-request state handed to every operation.
pub struct RequestContext<'a> {
    pub db: &'a Db,
    pub principal: Option<ExternalPrincipal>,
}

impl<'a> RequestContext<'a> {
    pub fn new(db: &'a Db, principal: Option<ExternalPrincipal>) -> Self {
        RequestContext { db, principal }
    }

    pub fn anonymous(db: &'a Db) -> Self {
        RequestContext { db, principal: None }
    }

    pub fn from_request(db: &'a Db, req: &Request) -> Self {
        RequestContext {
            db,
            principal: resolve_current_principal(req),
        }
    }
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.header(name)
        .and_then(|h| h.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read the principal asserted by the identity gateway. Anonymous callers
/// get `None`, never an error.
pub fn resolve_current_principal(req: &Request) -> Option<ExternalPrincipal> {
    let subject = header_value(req, AUTH_SUBJECT_HEADER)?;
    Some(ExternalPrincipal {
        subject,
        username: header_value(req, AUTH_USERNAME_HEADER),
        email: header_value(req, AUTH_EMAIL_HEADER),
        first_name: header_value(req, AUTH_FIRST_NAME_HEADER),
        last_name: header_value(req, AUTH_LAST_NAME_HEADER),
        image_url: header_value(req, AUTH_IMAGE_HEADER),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spin_sdk::http::Method;

    #[test]
    fn missing_subject_is_anonymous() {
        let req = Request::builder()
            .method(Method::Get)
            .uri("/notifications")
            .header(AUTH_EMAIL_HEADER, "someone@example.com")
            .build();
        assert_eq!(resolve_current_principal(&req), None);

        let blank = Request::builder()
            .method(Method::Get)
            .uri("/notifications")
            .header(AUTH_SUBJECT_HEADER, "   ")
            .build();
        assert_eq!(resolve_current_principal(&blank), None);
    }

    #[test]
    fn principal_fields_come_from_headers() {
        let req = Request::builder()
            .method(Method::Get)
            .uri("/")
            .header(AUTH_SUBJECT_HEADER, "idp|42")
            .header(AUTH_EMAIL_HEADER, "alice@example.com")
            .header(AUTH_FIRST_NAME_HEADER, "Alice")
            .build();

        let principal = resolve_current_principal(&req).unwrap();
        assert_eq!(principal.subject, "idp|42");
        assert_eq!(principal.email.as_deref(), Some("alice@example.com"));
        assert_eq!(principal.first_name.as_deref(), Some("Alice"));
        assert_eq!(principal.username, None);
    }
}

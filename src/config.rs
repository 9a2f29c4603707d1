pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 2000;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_PROFILE_FIELD_LENGTH: usize = 100;
pub const POSTS_PER_PAGE: usize = 20;
pub const SUGGESTED_USERS_LIMIT: usize = 3;

// Headers set by the identity-provider gateway in front of the service.
pub const AUTH_SUBJECT_HEADER: &str = "x-auth-subject";
pub const AUTH_USERNAME_HEADER: &str = "x-auth-username";
pub const AUTH_EMAIL_HEADER: &str = "x-auth-email";
pub const AUTH_FIRST_NAME_HEADER: &str = "x-auth-first-name";
pub const AUTH_LAST_NAME_HEADER: &str = "x-auth-last-name";
pub const AUTH_IMAGE_HEADER: &str = "x-auth-image";

pub const DEFAULT_LOG_FILTER: &str = "flock=info";

pub fn database_path() -> String {
    std::env::var("FLOCK_DATABASE_PATH").unwrap_or_else(|_| "flock.db".to_string())
}

pub fn bind_address() -> String {
    std::env::var("FLOCK_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
}

pub fn seed_demo_data() -> bool {
    std::env::var("FLOCK_SEED_DEMO")
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

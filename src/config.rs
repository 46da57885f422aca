use std::str::FromStr;

// === Store keys ===
pub const USERS_LIST_KEY: &str = "users_list";
pub const FEED_KEY: &str = "feed";
pub const DEMO_SEEDED_KEY: &str = "demo_seeded";

pub const SESSION_COOKIE: &str = "murmur_session";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn followings_key(id: &str) -> String {
    format!("followings:{}", id)
}

pub fn followers_key(id: &str) -> String {
    format!("followers:{}", id)
}

pub fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

// === Runtime configuration ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub posts_per_page: usize,
    pub session_expiration_hours: i64,
    pub remember_me_days: i64,
    pub secure_cookies: bool,
    pub seed_demo_data: bool,
    pub bind_address: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            posts_per_page: 10,
            session_expiration_hours: 24,
            remember_me_days: 365,
            secure_cookies: false,
            seed_demo_data: false,
            bind_address: "0.0.0.0:3000".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            posts_per_page: env_or("MURMUR_POSTS_PER_PAGE", defaults.posts_per_page).max(1),
            session_expiration_hours: env_or(
                "MURMUR_SESSION_EXPIRATION_HOURS",
                defaults.session_expiration_hours,
            ),
            remember_me_days: env_or("MURMUR_REMEMBER_ME_DAYS", defaults.remember_me_days),
            secure_cookies: env_or("MURMUR_SECURE_COOKIES", defaults.secure_cookies),
            seed_demo_data: env_or("MURMUR_SEED_DEMO_DATA", defaults.seed_demo_data),
            bind_address: std::env::var("MURMUR_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            log_format: log_format_from_env(),
        }
    }
}

pub fn log_format_from_env() -> LogFormat {
    match std::env::var("MURMUR_LOG_FORMAT") {
        Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_index_is_case_insensitive() {
        assert_eq!(email_key("Alice@Example.COM"), email_key("alice@example.com"));
    }

    #[test]
    fn unparsable_values_fall_back_to_default() {
        assert_eq!(env_or("MURMUR_TEST_UNSET_VARIABLE", 7usize), 7);
    }
}

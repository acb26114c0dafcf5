//! Server configuration read from the environment.

use std::str::FromStr;

use plinth_core::defaults;

/// Outbound email settings. Without `api_url` mail is only logged.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub allowed_origins: Vec<String>,
    pub max_body_size_bytes: usize,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u64,
    pub rate_limit_period_secs: u64,
    pub file_storage_path: String,
    pub max_upload_size_bytes: usize,
    pub public_base_url: String,
    pub session_ttl_hours: i64,
    pub email: EmailConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Read every setting from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Unparseable
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str, default: bool| {
            get(key)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(default)
        };

        let allowed_origins = get("ALLOWED_ORIGINS")
            .unwrap_or_else(|| defaults::ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: get("HOST").unwrap_or_else(|| defaults::SERVER_HOST.to_string()),
            port: parse_or(get("PORT"), defaults::SERVER_PORT),
            database_url: get("DATABASE_URL").unwrap_or_else(|| defaults::DATABASE_URL.to_string()),
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), defaults::DB_MAX_CONNECTIONS),
            allowed_origins,
            max_body_size_bytes: parse_or(get("MAX_BODY_SIZE_BYTES"), defaults::MAX_BODY_SIZE_BYTES),
            rate_limit_enabled: flag("RATE_LIMIT_ENABLED", true),
            rate_limit_requests: parse_or(get("RATE_LIMIT_REQUESTS"), defaults::RATE_LIMIT_REQUESTS),
            rate_limit_period_secs: parse_or(get("RATE_LIMIT_PERIOD_SECS"), defaults::RATE_LIMIT_PERIOD_SECS),
            file_storage_path: get("FILE_STORAGE_PATH")
                .unwrap_or_else(|| defaults::FILE_STORAGE_PATH.to_string()),
            max_upload_size_bytes: parse_or(get("MAX_UPLOAD_SIZE_BYTES"), defaults::MAX_UPLOAD_SIZE_BYTES),
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| defaults::PUBLIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            session_ttl_hours: parse_or(get("SESSION_TTL_HOURS"), defaults::SESSION_TTL_HOURS),
            email: EmailConfig {
                api_url: get("EMAIL_API_URL"),
                api_key: get("EMAIL_API_KEY"),
                from: get("EMAIL_FROM").unwrap_or_else(|| defaults::EMAIL_FROM.to_string()),
                timeout_secs: parse_or(get("EMAIL_TIMEOUT_SECS"), defaults::EMAIL_TIMEOUT_SECS),
            },
        }
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let c = AppConfig::default();
        assert_eq!(c.port, defaults::SERVER_PORT);
        assert_eq!(c.allowed_origins, vec!["http://localhost:3000".to_string()]);
        assert!(c.rate_limit_enabled);
        assert!(c.email.api_url.is_none());
        assert_eq!(c.session_ttl_hours, defaults::SESSION_TTL_HOURS);
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let c = config(&[("ALLOWED_ORIGINS", "https://a.example, ,https://b.example ")]);
        assert_eq!(
            c.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn bad_numbers_fall_back() {
        let c = config(&[("PORT", "eighty"), ("RATE_LIMIT_REQUESTS", "5")]);
        assert_eq!(c.port, defaults::SERVER_PORT);
        assert_eq!(c.rate_limit_requests, 5);
    }

    #[test]
    fn rate_limit_flag_and_base_url() {
        let c = config(&[
            ("RATE_LIMIT_ENABLED", "false"),
            ("PUBLIC_BASE_URL", "https://plinth.example/"),
        ]);
        assert!(!c.rate_limit_enabled);
        assert_eq!(c.public_base_url, "https://plinth.example");
        assert_eq!(c.bind_address(), "0.0.0.0:3000");
    }
}

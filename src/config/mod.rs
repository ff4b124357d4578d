use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub pagination: PaginationConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub external_url: Option<String>,
    pub api_rate_limit: u64,
    pub max_request_body_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub questions_per_page: usize,
    pub answers_per_page: usize,
    pub max_pages: usize, // Listings stop after this many pages
    pub trending_size: usize,
    pub api_page_size: usize,
    pub api_max_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub from: String,
    pub outbox_dir: Option<PathBuf>,
}

/// Read an environment variable, falling back to a default, and parse it
fn env_or<T: FromStr>(name: &str, default: &str) -> Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| Error::Config(format!("Invalid {name} value")))
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./data/qanda.db?mode=rwc".to_string());

        Ok(Settings {
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", "25")?,
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", "5")?,
                connection_timeout_seconds: env_or("DATABASE_CONNECTION_TIMEOUT", "30")?,
                idle_timeout_seconds: env_or("DATABASE_IDLE_TIMEOUT", "600")?,
            },
            server: ServerConfig {
                host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("PORT", "3000")?,
                external_url: std::env::var("EXTERNAL_URL").ok(),
                api_rate_limit: env_or("API_RATE_LIMIT", "20")?,
                max_request_body_size: env_or("MAX_REQUEST_BODY_SIZE", "1048576")?,
            },
            pagination: PaginationConfig {
                questions_per_page: env_or("QUESTIONS_PER_PAGE", "20")?,
                answers_per_page: env_or("ANSWERS_PER_PAGE", "30")?,
                max_pages: env_or("MAX_PAGES", "5")?,
                trending_size: env_or("TRENDING_SIZE", "20")?,
                api_page_size: env_or("API_PAGE_SIZE", "10")?,
                api_max_limit: env_or("API_MAX_LIMIT", "100")?,
            },
            auth: AuthConfig {
                session_ttl_hours: env_or("SESSION_TTL_HOURS", "336")?,
                secure_cookies: env_or("SECURE_COOKIES", "false")?,
            },
            mail: MailConfig {
                from: std::env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "noreply@localhost".to_string()),
                outbox_dir: std::env::var("MAIL_OUTBOX_DIR").ok().map(PathBuf::from),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("Port must be non-zero".to_string()));
        }

        if self.server.api_rate_limit == 0 {
            return Err(Error::Config("API rate limit must be non-zero".to_string()));
        }

        let p = &self.pagination;
        if p.questions_per_page == 0 || p.answers_per_page == 0 || p.api_page_size == 0 {
            return Err(Error::Config("Page sizes must be non-zero".to_string()));
        }

        if p.max_pages == 0 {
            return Err(Error::Config("MAX_PAGES must be at least 1".to_string()));
        }

        if p.api_max_limit < p.api_page_size {
            return Err(Error::Config(
                "API_MAX_LIMIT must not be smaller than API_PAGE_SIZE".to_string(),
            ));
        }

        if self.auth.session_ttl_hours <= 0 {
            return Err(Error::Config("Session TTL must be positive".to_string()));
        }

        Ok(())
    }

    /// Settings suitable for tests: in-memory database, default limits
    pub fn for_tests() -> Self {
        Settings {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 5,
                min_connections: 1,
                connection_timeout_seconds: 30,
                idle_timeout_seconds: 600,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                external_url: None,
                api_rate_limit: 100,
                max_request_body_size: 1048576,
            },
            pagination: PaginationConfig {
                questions_per_page: 20,
                answers_per_page: 30,
                max_pages: 5,
                trending_size: 20,
                api_page_size: 10,
                api_max_limit: 100,
            },
            auth: AuthConfig {
                session_ttl_hours: 336,
                secure_cookies: false,
            },
            mail: MailConfig {
                from: "noreply@localhost".to_string(),
                outbox_dir: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::for_tests();
        assert!(settings.validate().is_ok());

        settings.server.port = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::for_tests();
        settings.pagination.max_pages = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::for_tests();
        settings.pagination.api_max_limit = 5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::for_tests();
        settings.auth.session_ttl_hours = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_env_or_reports_variable_name() {
        std::env::set_var("QANDA_TEST_BAD_NUMBER", "twelve");
        let result: Result<u16> = env_or("QANDA_TEST_BAD_NUMBER", "1");
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("QANDA_TEST_BAD_NUMBER")),
            other => panic!("expected config error, got {other:?}"),
        }

        let value: u16 = env_or("QANDA_TEST_UNSET_NUMBER", "42").unwrap();
        assert_eq!(value, 42);
    }
}

use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    /// Page size for GET /pull when the client sends no limit
    pub pull_default_limit: i64,
    /// Hard cap on client-requested pull limits
    pub pull_max_limit: i64,
    /// Page size for GET /sync cursor pages
    pub sync_page_limit: i64,
    /// Widest server_seq span a single repair read may cover
    pub repair_max_span: i64,
    /// Default inbox row lifetime when the sender names no TTL
    pub inbox_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8086);

        let pull_default_limit = env::var("PULL_DEFAULT_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);
        let pull_max_limit = env::var("PULL_MAX_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let sync_page_limit = env::var("SYNC_PAGE_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);
        let repair_max_span = env::var("REPAIR_MAX_RANGE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(crate::delivery::watermark::DEFAULT_MAX_REPAIR_SPAN);
        let inbox_ttl_days = env::var("INBOX_TTL_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        if pull_default_limit <= 0 || pull_default_limit > pull_max_limit {
            return Err(crate::error::AppError::Config(format!(
                "PULL_DEFAULT_LIMIT {pull_default_limit} must be positive and <= PULL_MAX_LIMIT {pull_max_limit}"
            )));
        }
        if repair_max_span <= 0 {
            return Err(crate::error::AppError::Config(
                "REPAIR_MAX_RANGE must be positive".into(),
            ));
        }
        if inbox_ttl_days <= 0 {
            return Err(crate::error::AppError::Config(
                "INBOX_TTL_DAYS must be positive".into(),
            ));
        }

        Ok(Self {
            database_url,
            jwt_secret,
            host,
            port,
            pull_default_limit,
            pull_max_limit,
            sync_page_limit,
            repair_max_span,
            inbox_ttl_days,
        })
    }

    /// Clamp a client-requested pull limit into the configured window.
    pub fn clamp_pull_limit(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(limit) if limit > 0 => limit.min(self.pull_max_limit),
            _ => self.pull_default_limit,
        }
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            jwt_secret: "test-secret".into(),
            host: "127.0.0.1".into(),
            port: 8086,
            pull_default_limit: 100,
            pull_max_limit: 1000,
            sync_page_limit: 100,
            repair_max_span: 500,
            inbox_ttl_days: 30,
        }
    }
}

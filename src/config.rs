use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub app_base_url: String,
    pub import_max_bytes: usize,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "expense-api".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "expense-api-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60),
        };
        let mail = MailConfig {
            from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@expense-api.local".into()),
            max_attempts: env_or("MAIL_MAX_ATTEMPTS", 3u32).max(1),
            retry_backoff_ms: env_or("MAIL_RETRY_BACKOFF_MS", 500),
        };
        Ok(Self {
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into())
                .trim_end_matches('/')
                .to_string(),
            import_max_bytes: env_or("IMPORT_MAX_BYTES", 5 * 1024 * 1024),
            jwt,
            mail,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "memory://".into(),
            db_max_connections: 1,
            app_base_url: "http://localhost:8080".into(),
            import_max_bytes: 1024 * 1024,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            mail: MailConfig {
                from: "no-reply@test.local".into(),
                max_attempts: 3,
                retry_backoff_ms: 0,
            },
        }
    }
}

use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Poll interval of the order-event outbox dispatcher, in milliseconds.
    pub outbox_poll_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let outbox_poll_ms = env::var("OUTBOX_POLL_MS")
            .ok()
            .and_then(|p| p.parse::<u64>().ok())
            .unwrap_or(500);
        Ok(Self {
            port,
            database_url,
            host,
            outbox_poll_ms,
        })
    }
}

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub auth_token: String,
    pub boxoffice_url: String,
    pub boxoffice_api_key: String,
    pub boxoffice_timeout: Duration,
    pub boxoffice_rps: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://cinema.db?mode=rwc".to_string());

        let auth_token = std::env::var("AUTH_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .context("AUTH_TOKEN must be provided for write operations")?;

        let boxoffice_url = std::env::var("BOXOFFICE_URL").unwrap_or_default();
        let boxoffice_api_key = std::env::var("BOXOFFICE_API_KEY").unwrap_or_default();

        let boxoffice_timeout_ms: u64 =
            std::env::var("BOXOFFICE_TIMEOUT_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(3000);

        let boxoffice_rps: u32 =
            std::env::var("BOXOFFICE_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(10);

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            auth_token,
            boxoffice_url,
            boxoffice_api_key,
            boxoffice_timeout: Duration::from_millis(boxoffice_timeout_ms),
            boxoffice_rps,
        })
    }
}

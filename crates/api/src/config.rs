//! Process configuration, read from the environment (optionally seeded from `.env`).

use std::net::SocketAddr;

use anyhow::Context;

use clientbook_auth::TokenSettings;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_JWT_ISSUER: &str = "clientbook";
pub const DEFAULT_JWT_AUDIENCE: &str = "clientbook-api";
const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub token: TokenSettings,
    /// Postgres connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address such as 0.0.0.0:8080")?;

        let secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });
        let issuer = var("JWT_ISSUER").unwrap_or_else(|| DEFAULT_JWT_ISSUER.to_string());
        let audience = var("JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_JWT_AUDIENCE.to_string());

        Ok(Self {
            bind_addr,
            token: TokenSettings::new(secret, issuer, audience),
            database_url: var("DATABASE_URL"),
        })
    }

    /// In-memory configuration for tests and local tooling.
    pub fn in_memory(secret: &str) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            token: TokenSettings::new(secret, DEFAULT_JWT_ISSUER, DEFAULT_JWT_AUDIENCE),
            database_url: None,
        }
    }
}

use std::sync::Arc;

use anyhow::Context;

use clientbook_auth::Hs256TokenService;
use clientbook_infra::{ClientService, InMemoryRecordStore, PostgresRecordStore, RecordStore};

use crate::config::AppConfig;

pub type SharedStore = Arc<dyn RecordStore>;

/// Everything request handlers need, shared behind one `Arc`.
#[derive(Debug)]
pub struct AppServices {
    pub clients: ClientService<SharedStore>,
    pub tokens: Arc<Hs256TokenService>,
}

impl AppServices {
    pub fn new(store: SharedStore, tokens: Hs256TokenService) -> Self {
        Self {
            clients: ClientService::new(store),
            tokens: Arc::new(tokens),
        }
    }
}

/// Pick the record store from config: Postgres when `DATABASE_URL` is set,
/// otherwise an in-memory store that lives as long as the process.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let pg = PostgresRecordStore::connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            pg.ensure_schema()
                .await
                .context("failed to prepare database schema")?;
            tracing::info!("using postgres record store");
            Arc::new(pg)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory record store");
            Arc::new(InMemoryRecordStore::new())
        }
    };

    Ok(AppServices::new(
        store,
        Hs256TokenService::new(config.token.clone()),
    ))
}

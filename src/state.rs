use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::jwt::JwtKeys;
use crate::config::AppConfig;
use crate::db::{MemoryStore, PgStore, Store};
use crate::mail::{LogMailer, Mailer, Notifier};

/// Shared per-process handles. Keys and the notifier are built once here and
/// handed to extractors and services by `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub keys: Arc<JwtKeys>,
    pub notifier: Arc<Notifier>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn Store> = if config.database_url.starts_with("memory:") {
            info!("using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        } else {
            let pg = PgStore::connect(&config).await?;
            if let Err(e) = pg.migrate().await {
                warn!(error = %e, "migrations failed; continuing");
            }
            Arc::new(pg)
        };

        Ok(Self::from_parts(store, config, Arc::new(LogMailer)))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let keys = Arc::new(JwtKeys::from_config(&config.jwt));
        let notifier = Arc::new(Notifier::new(mailer, &config.mail, &config.app_base_url));
        Self {
            store,
            config,
            keys,
            notifier,
        }
    }

    #[cfg(test)]
    pub fn fake() -> (Self, MemoryStore) {
        Self::fake_with(AppConfig::for_tests())
    }

    #[cfg(test)]
    pub fn fake_with(config: AppConfig) -> (Self, MemoryStore) {
        let store = MemoryStore::new();
        let state = Self::from_parts(
            Arc::new(store.clone()),
            Arc::new(config),
            Arc::new(LogMailer),
        );
        (state, store)
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use despacho_core::{
    AccountService, AuthConfig, AuthContext, DatabaseBackend, DefaultContentSeeder, JwtManager,
    LifecycleManager, MemoryStore, PgStore, Settings, SharedStore,
};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub lifecycle: Arc<LifecycleManager>,
    pub seeder: Arc<DefaultContentSeeder>,
    pub accounts: Arc<AccountService>,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    /// Opens the configured backend and wires the services on top of it.
    pub async fn new(settings: Settings) -> Result<Self> {
        let store = open_store(&settings).await?;
        Self::with_store(settings, store)
    }

    pub fn with_store(settings: Settings, store: SharedStore) -> Result<Self> {
        let auth = AuthConfig::from_settings(&settings).context("invalid JWT configuration")?;
        let jwt = Arc::new(JwtManager::new(auth));
        let seeder = Arc::new(DefaultContentSeeder::new(store.clone()));
        let accounts = Arc::new(AccountService::new(
            store.clone(),
            jwt.clone(),
            seeder.clone(),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            lifecycle: Arc::new(LifecycleManager::new(store)),
            seeder,
            accounts,
            jwt,
        })
    }

    pub fn is_admin(&self, auth: &AuthContext) -> bool {
        self.settings.security.is_admin(&auth.email)
    }
}

pub async fn open_store(settings: &Settings) -> Result<SharedStore> {
    match settings.database.backend {
        DatabaseBackend::Memory => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        DatabaseBackend::Postgres => {
            let url = settings
                .database
                .url()
                .context("database.url is required for the postgres backend")?;
            let store = PgStore::connect(url, settings.database.max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            if settings.database.run_migrations {
                store.migrate().await.context("failed to run migrations")?;
            }
            Ok(Arc::new(store))
        }
    }
}

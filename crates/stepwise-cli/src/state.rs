//! Application state shared by the CLI commands.

use stepwise_infra::config::{load_global_config, resolve_data_dir, resolve_database_url};
use stepwise_infra::sqlite::{DatabasePool, SqliteCheckpointStore};
use stepwise_types::config::GlobalConfig;

/// Loaded configuration and the open database.
pub struct AppState {
    pub config: GlobalConfig,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Resolve the data directory, load `config.toml` and open the store.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_global_config(&data_dir).await;
        let db_url = resolve_database_url(&config, &data_dir);
        let db_pool = DatabasePool::new(&db_url).await?;

        tracing::debug!(data_dir = %data_dir.display(), "state initialized");

        Ok(Self {
            config,
            db_pool,
        })
    }

    /// A checkpoint store over the shared pool.
    pub fn checkpoint_store(&self) -> SqliteCheckpointStore {
        SqliteCheckpointStore::new(self.db_pool.clone())
    }
}

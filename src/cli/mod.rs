mod admin;
mod commands;
mod run;

pub use admin::{run_info, run_init, run_project_add, run_user_add};
pub use commands::{AdminCommands, ProjectArgs, ProjectCommands, UserCommands};
pub use run::{run_discover, run_enrich, run_quota, run_sync};

use crate::cache::SqliteCache;
use crate::config::{ServerConfig, SyncSettings};
use crate::store::SqliteStore;

fn config_for(data_dir: &str) -> ServerConfig {
    ServerConfig {
        data_dir: data_dir.into(),
        ..ServerConfig::default()
    }
}

/// Initialize store from data directory, checking it exists
pub fn init_store(data_dir: &str) -> anyhow::Result<SqliteStore> {
    let db_path = config_for(data_dir).db_path();

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'commitsync admin init' first.",
            db_path.display()
        );
    }

    SqliteStore::new(&db_path).map_err(Into::into)
}

/// Opens the shared cache file and drops entries that expired while nothing ran.
pub fn open_cache(data_dir: &str) -> anyhow::Result<SqliteCache> {
    let cache = SqliteCache::new(config_for(data_dir).cache_path())?;
    let purged = cache.purge_expired()?;
    if purged > 0 {
        tracing::debug!("Purged {} expired cache entries", purged);
    }
    Ok(cache)
}

/// Settings from `<data_dir>/commitsync.toml`, defaults when the file is absent.
pub fn load_settings(data_dir: &str) -> anyhow::Result<SyncSettings> {
    SyncSettings::load_or_default(config_for(data_dir).settings_path()).map_err(Into::into)
}

//! Store creation and engine setup shared by the commands.

use std::path::PathBuf;
use std::time::Duration;

use vusermgr::{
    DirTree, Engine, EngineConfig,
    store::{InMemory, SqlxStore, UserStore},
};

use crate::cli::{Backend, EngineArgs, StoreArgs};

const SQLITE_FILE: &str = "vusermgr.db";

/// Redact credentials from a PostgreSQL connection URL for safe logging
pub fn redact_postgres_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut redacted = parsed.clone();
        if !parsed.username().is_empty() {
            let _ = redacted.set_username("***");
        }
        if parsed.password().is_some() {
            let _ = redacted.set_password(Some("***"));
        }
        redacted.to_string()
    } else {
        "postgres://***@<unparsable-url>".to_string()
    }
}

/// Create the record store selected on the command line
pub async fn create_store(
    args: &StoreArgs,
) -> Result<Box<dyn UserStore>, Box<dyn std::error::Error>> {
    match args.backend {
        Backend::Sqlite => {
            if let Some(url) = &args.database_url {
                tracing::info!("Using SQLite store at {url}");
                return Ok(Box::new(SqlxStore::connect_sqlite(url).await?));
            }
            let data_dir = args.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
            tokio::fs::create_dir_all(&data_dir).await?;
            let db_path = data_dir.join(SQLITE_FILE);
            tracing::info!("Using SQLite store at {}", db_path.display());
            Ok(Box::new(SqlxStore::open_sqlite(&db_path).await?))
        }
        Backend::Postgres => {
            let url = args
                .database_url
                .as_ref()
                .ok_or("PostgreSQL store requires --database-url or DATABASE_URL")?;

            let display_url = redact_postgres_url(url);
            tracing::info!("Connecting to PostgreSQL store at {}", display_url);

            match SqlxStore::connect_postgres(url).await {
                Ok(store) => {
                    tracing::info!("Connected to PostgreSQL successfully");
                    Ok(Box::new(store))
                }
                Err(e) => {
                    Err(format!("Failed to connect to PostgreSQL at {}: {}", display_url, e).into())
                }
            }
        }
        Backend::Inmemory => {
            tracing::warn!("Using in-memory store; users will not survive a restart");
            Ok(Box::new(InMemory::new()))
        }
    }
}

/// Build the engine configuration from command line arguments
pub fn engine_config(args: &EngineArgs) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = EngineConfig::new(&args.root, &args.pwdfile).with_header(args.header.clone());

    if let Some(path) = &args.default_tree {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read default tree {}: {e}", path.display()))?;
        let tree: DirTree = serde_json::from_str(&raw)
            .map_err(|e| format!("Invalid default tree {}: {e}", path.display()))?;
        config = config.with_default_tree(tree);
    }

    if let Some(secs) = args.store_timeout {
        config = config.with_store_timeout(Duration::from_secs(secs));
    }

    Ok(config)
}

/// Open an engine as described by the command line
pub async fn open_engine(args: &EngineArgs) -> Result<Engine, Box<dyn std::error::Error>> {
    let config = engine_config(args)?;
    let store = create_store(&args.store).await?;
    Ok(Engine::open(config, store).await?)
}

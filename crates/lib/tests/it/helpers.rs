use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vusermgr::{Engine, EngineConfig, store::InMemory, store::UserStore};

// ==========================
// CORE TEST FACTORIES
// ==========================
// Single point of change for store matrix testing via the TEST_BACKEND env var.

/// Creates a test store based on TEST_BACKEND env var.
///
/// Supported values:
/// - "inmemory" or unset: InMemory store (default)
/// - "sqlite": SQLite in-memory database (requires `sqlite` feature)
/// - "postgres": PostgreSQL in an isolated schema (requires `postgres` feature and TEST_POSTGRES_URL)
///
/// # Example
/// ```bash
/// TEST_BACKEND=sqlite cargo test
/// TEST_BACKEND=postgres TEST_POSTGRES_URL="postgres://localhost/vusermgr_test" cargo test
/// ```
pub async fn test_store() -> Box<dyn UserStore> {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("sqlite") => {
            #[cfg(feature = "sqlite")]
            {
                use vusermgr::store::SqlxStore;
                Box::new(
                    SqlxStore::sqlite_in_memory()
                        .await
                        .expect("Failed to create SQLite store"),
                )
            }
            #[cfg(not(feature = "sqlite"))]
            {
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        Ok("postgres") => {
            #[cfg(feature = "postgres")]
            {
                use vusermgr::store::SqlxStore;
                let url = std::env::var("TEST_POSTGRES_URL")
                    .unwrap_or_else(|_| "postgres://localhost/vusermgr_test".to_string());
                Box::new(
                    SqlxStore::connect_postgres_isolated(&url)
                        .await
                        .expect("Failed to connect to PostgreSQL"),
                )
            }
            #[cfg(not(feature = "postgres"))]
            {
                panic!("TEST_BACKEND=postgres requires the 'postgres' feature to be enabled")
            }
        }
        Ok("inmemory") | Ok("") | Err(_) => Box::new(InMemory::new()),
        Ok(other) => {
            panic!("Unknown TEST_BACKEND value: {other}. Supported: inmemory, sqlite, postgres")
        }
    }
}

/// A scratch directory holding a user root and a credential file.
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("users")
    }

    pub fn credential_file(&self) -> PathBuf {
        self.dir.path().join("passwd")
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig::new(self.root(), self.credential_file())
    }

    /// Open an engine with the default config and the matrix store.
    pub async fn engine(&self) -> Engine {
        self.engine_with(self.config()).await
    }

    pub async fn engine_with(&self, config: EngineConfig) -> Engine {
        Engine::open(config, test_store().await)
            .await
            .expect("Failed to open engine")
    }

    pub fn credential_content(&self) -> String {
        read(&self.credential_file())
    }

    /// Non-comment lines of the credential file.
    pub fn credential_lines(&self) -> Vec<String> {
        self.credential_content()
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    pub fn home(&self, username: &str) -> PathBuf {
        self.root().join(username)
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()))
}

/// Names of the files next to the credential file, excluding the user root.
pub fn siblings(env: &TestEnv) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(env.dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n != "users")
        .collect();
    names.sort();
    names
}

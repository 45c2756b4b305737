//! CLI argument definitions for the vusermgr binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Record store type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite database file (default)
    Sqlite,
    /// PostgreSQL database
    Postgres,
    /// In-memory store; users are lost when the process exits
    Inmemory,
}

/// Virtual user manager for vsftpd
#[derive(Parser, Debug)]
#[command(name = "vusermgr")]
#[command(about = "Keeps a vsftpd credential file and user directories in sync with a SQL store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP management server
    Serve(ServeArgs),
    /// Regenerate the credential file from the store and exit
    Sync(EngineArgs),
    /// Recreate missing user directories, remove orphaned ones, regenerate and exit
    Reconcile(EngineArgs),
    /// Check health of a running vusermgr server
    Health(HealthArgs),
}

/// Record store selection, shared by every command that opens an engine
#[derive(clap::Args, Debug, Clone)]
pub struct StoreArgs {
    /// Record store to use
    #[arg(short, long, default_value = "sqlite", env = "VUSERMGR_BACKEND")]
    pub backend: Backend,

    /// Database connection URL. Required for postgres; for sqlite it overrides --data-dir
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Directory holding vusermgr.db when the sqlite store is used without a URL
    #[arg(short = 'D', long, env = "VUSERMGR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

/// Arguments for commands that open an engine
#[derive(clap::Args, Debug, Clone)]
pub struct EngineArgs {
    /// Directory holding one home directory per user
    #[arg(env = "VUSERMGR_ROOT")]
    pub root: PathBuf,

    /// Credential file read by the FTP service
    #[arg(env = "VUSERMGR_PWDFILE")]
    pub pwdfile: PathBuf,

    /// Comment line written at the top of the credential file (repeatable)
    #[arg(long = "header", env = "VUSERMGR_HEADER")]
    pub header: Vec<String>,

    /// JSON directory tree used for users that do not send their own
    #[arg(long, env = "VUSERMGR_DEFAULT_TREE")]
    pub default_tree: Option<PathBuf>,

    /// Deadline in seconds for each store call
    #[arg(long, env = "VUSERMGR_STORE_TIMEOUT")]
    pub store_timeout: Option<u64>,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "VUSERMGR_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "127.0.0.1", env = "VUSERMGR_HOST")]
    pub host: String,

    /// Regenerate the credential file every N seconds (0 disables)
    #[arg(long, default_value_t = 0, env = "VUSERMGR_SYNC_INTERVAL")]
    pub sync_interval: u64,
}

/// Arguments for the health command
#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server to check
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "VUSERMGR_URL")]
    pub url: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}

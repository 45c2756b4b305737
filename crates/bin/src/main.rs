use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands {
    pub mod health;
    pub mod reconcile;
    pub mod serve;
    pub mod sync;
}
mod store;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let directive = match cli.command {
        // Keep the probe's output to its own verdict
        Commands::Health(_) => "vusermgr=warn",
        _ => "vusermgr=info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    match &cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Sync(args) => commands::sync::run(args).await,
        Commands::Reconcile(args) => commands::reconcile::run(args).await,
        Commands::Health(args) => commands::health::run(args).await,
    }
}

//! Sync command - regenerates the credential file once and exits.

use crate::cli::EngineArgs;
use crate::store::open_engine;

/// Run the sync command
pub async fn run(args: &EngineArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(args).await?;

    let result = engine.sync().await;
    engine.close().await?;
    result?;

    println!("Credential file {} regenerated", args.pwdfile.display());
    Ok(())
}

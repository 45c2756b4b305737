//! Reconcile command - aligns the user root with the store and exits.

use crate::cli::EngineArgs;
use crate::store::open_engine;

/// Run the reconcile command
pub async fn run(args: &EngineArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(args).await?;

    let result = engine.reconcile().await;
    engine.close().await?;
    let report = result?;

    for username in &report.created {
        println!("created  {}", args.root.join(username).display());
    }
    for entry in &report.removed {
        println!("removed  {}", args.root.join(entry).display());
    }
    println!(
        "Reconciled {}: {} created, {} removed",
        args.root.display(),
        report.created.len(),
        report.removed.len()
    );
    Ok(())
}

//! `prune` and `seed`: one-off storage maintenance.

use std::path::Path;

use anyhow::Result;

use memri::config::MemriConfig;
use memri::storage::Store;

/// Apply the configured retention policy once.
pub async fn prune(config: &MemriConfig) -> Result<()> {
    let store = Store::open(config)?;
    if !store.retention().is_enabled() {
        println!("Retention is disabled (set storage.retention_days or storage.max_captures).");
        return Ok(());
    }

    let report = store.prune().await?;
    println!("Expired:        {}", report.expired);
    println!("Trimmed:        {}", report.trimmed);
    println!("Files removed:  {}", report.files_removed);
    Ok(())
}

/// Seed captures from a folder of images into an empty database.
pub async fn seed(config: &MemriConfig, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }
    let store = Store::open(config)?;
    let seeded = memri::seed::seed_captures_from_dir(&store, dir).await?;
    if seeded == 0 {
        println!("Nothing seeded (database already has captures or no images found).");
    } else {
        println!("Seeded {seeded} capture(s) from {}", dir.display());
    }
    Ok(())
}

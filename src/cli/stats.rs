use anyhow::{Context, Result};

use memri::config::MemriConfig;
use memri::db;
use memri::storage::stats::storage_stats;

use super::format_ts;

/// Print storage counters and a database health report.
pub fn stats(config: &MemriConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `memri serve` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let stats = storage_stats(&conn, 10)?;
    let health = db::check_health(&conn).context("failed to run health check")?;

    println!("memri Storage");
    println!("{}", "=".repeat(40));
    println!("  Database:        {}", db_path.display());
    println!("  File size:       {} bytes", file_size);
    println!("  Schema version:  {}", health.schema_version);
    println!(
        "  Integrity:       {}",
        if health.integrity_ok { "ok" } else { health.integrity_details.as_str() }
    );
    println!();
    println!("  Captures:        {}", stats.total_captures);
    println!("  Windows:         {}", stats.total_windows);
    println!("  Chat messages:   {}", stats.total_chat_messages);
    if let Some(oldest) = stats.oldest_capture_ms {
        println!("  Oldest capture:  {}", format_ts(oldest));
    }
    if let Some(newest) = stats.newest_capture_ms {
        println!("  Newest capture:  {}", format_ts(newest));
    }

    if !stats.top_apps.is_empty() {
        println!();
        println!("Top apps:");
        for app in &stats.top_apps {
            println!("  {:<28} {}", app.app_name, app.windows);
        }
    }

    let retention = &config.storage;
    println!();
    println!(
        "Retention: {} days, {} captures max (0 = off)",
        retention.retention_days, retention.max_captures
    );
    Ok(())
}

use anyhow::Result;

use memri::config::MemriConfig;
use memri::storage::{search, SearchQuery};

use super::format_ts;

/// Keyword search from the terminal.
pub fn search(config: &MemriConfig, query: &str, limit: i64) -> Result<()> {
    let conn = memri::db::open_database(config.resolved_db_path())?;
    let results = search::search_captures(
        &conn,
        &SearchQuery {
            text: query.to_string(),
            limit,
            ..Default::default()
        },
    )?;

    if results.is_empty() {
        println!("No captures matched.");
        return Ok(());
    }

    println!("Found {} capture(s)\n", results.len());
    for capture in &results {
        println!("  #{} at {}", capture.capture_id, format_ts(capture.timestamp_ms));
        for window in &capture.windows {
            let preview: String = window.text.chars().take(100).collect();
            let ellipsis = if window.text.chars().count() > 100 { "..." } else { "" };
            println!("     {} | {}", window.app_name, window.window_name);
            if let Some(url) = &window.browser_url {
                println!("     {url}");
            }
            if !preview.is_empty() {
                println!("     {}{ellipsis}", preview.replace('\n', " "));
            }
        }
        println!();
    }
    Ok(())
}

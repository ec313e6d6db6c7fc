//! Retention: age- and count-based pruning of captures.
//!
//! Window rows go with their capture via `ON DELETE CASCADE`. The PNGs written
//! by the capture loop are removed from disk best-effort after the delete
//! commits; seeded captures (no monitor) point at user files and keep them.

use anyhow::Result;
use rusqlite::{params, Connection};

use super::types::{PruneReport, RetentionPolicy};

const DAY_MS: i64 = 86_400_000;

/// Apply `policy` relative to `now_ms`.
pub fn prune(conn: &mut Connection, policy: &RetentionPolicy, now_ms: i64) -> Result<PruneReport> {
    let mut report = PruneReport::default();
    if !policy.is_enabled() {
        return Ok(report);
    }

    let tx = conn.transaction()?;
    let mut doomed_files: Vec<String> = Vec::new();

    if let Some(days) = policy.retention_days {
        let days = i64::try_from(days).unwrap_or(i64::MAX);
        let cutoff = now_ms.saturating_sub(days.saturating_mul(DAY_MS));
        doomed_files.extend(collect_image_paths(
            &tx,
            "SELECT cw.image_path FROM captured_windows cw JOIN captures c ON c.id = cw.capture_id \
             WHERE c.timestamp_ms < ?1 AND c.monitor_id IS NOT NULL AND cw.image_path IS NOT NULL",
            cutoff,
        )?);
        report.expired = tx.execute("DELETE FROM captures WHERE timestamp_ms < ?1", params![cutoff])?;
    }

    if let Some(max) = policy.max_captures {
        let total: i64 = tx.query_row("SELECT COUNT(*) FROM captures", [], |row| row.get(0))?;
        let excess = total - i64::try_from(max).unwrap_or(i64::MAX);
        if excess > 0 {
            let oldest = "SELECT id FROM captures ORDER BY timestamp_ms ASC, id ASC LIMIT ?1";
            doomed_files.extend(collect_image_paths(
                &tx,
                &format!(
                    "SELECT cw.image_path FROM captured_windows cw JOIN captures c ON c.id = cw.capture_id \
                     WHERE c.id IN ({oldest}) AND c.monitor_id IS NOT NULL AND cw.image_path IS NOT NULL"
                ),
                excess,
            )?);
            report.trimmed = tx.execute(
                &format!("DELETE FROM captures WHERE id IN ({oldest})"),
                params![excess],
            )?;
        }
    }

    tx.commit()?;

    for path in doomed_files {
        match std::fs::remove_file(&path) {
            Ok(()) => report.files_removed += 1,
            Err(err) => tracing::debug!(path, "image cleanup skipped: {err}"),
        }
    }

    if report.expired + report.trimmed > 0 {
        tracing::info!(
            expired = report.expired,
            trimmed = report.trimmed,
            files_removed = report.files_removed,
            "pruned captures"
        );
    }
    Ok(report)
}

fn collect_image_paths(conn: &Connection, sql: &str, bound: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let paths = stmt
        .query_map(params![bound], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(paths)
}

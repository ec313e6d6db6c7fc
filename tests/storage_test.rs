mod helpers;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use helpers::{batch, window, NOON};
use memri::storage::captures::{
    count_captures, fetch_captures_metadata, fetch_images_for_captures, fetch_recent_captures,
    insert_capture,
};
use memri::storage::stats::storage_stats;
use memri::storage::{CaptureSink, CapturedWindowRecord};

#[test]
fn capture_and_windows_round_trip() {
    let mut conn = helpers::test_db();
    let mut browser = window("Firefox", "Rust Book", "ownership and borrowing");
    browser.browser_url = Some("https://doc.rust-lang.org/book/".into());
    browser.ocr_json = Some("[]".into());

    let id = insert_capture(
        &mut conn,
        &batch(3, NOON, vec![browser.clone(), window("Terminal", "zsh", "cargo test")]),
    )
    .unwrap();

    let captures = fetch_captures_metadata(&conn, 10).unwrap();
    assert_eq!(captures.len(), 1);
    let capture = &captures[0];
    assert_eq!(capture.capture_id, id);
    assert_eq!(capture.frame_number, 3);
    assert_eq!(capture.monitor_id, Some(0));
    assert_eq!(capture.windows.len(), 2);
    assert_eq!(capture.windows[0], browser);
    assert_eq!(capture.windows[1].app_name, "Terminal");
}

#[test]
fn timeline_is_newest_first_and_limited() {
    let mut conn = helpers::test_db();
    let old = helpers::insert_text(&mut conn, NOON - 2 * helpers::HOUR_MS, "A", "old");
    let new = helpers::insert_text(&mut conn, NOON, "B", "new");
    let mid = helpers::insert_text(&mut conn, NOON - helpers::HOUR_MS, "C", "mid");

    let ids: Vec<i64> = fetch_captures_metadata(&conn, 10)
        .unwrap()
        .iter()
        .map(|c| c.capture_id)
        .collect();
    assert_eq!(ids, vec![new, mid, old]);

    assert_eq!(fetch_captures_metadata(&conn, 2).unwrap().len(), 2);
    assert!(fetch_captures_metadata(&conn, 0).unwrap().is_empty());
    assert!(fetch_recent_captures(&conn, -5).unwrap().is_empty());
    assert_eq!(count_captures(&conn).unwrap(), 3);
}

#[test]
fn images_load_from_disk_or_inline() {
    let dir = tempfile::tempdir().unwrap();
    let png = helpers::png_bytes();
    let on_disk = dir.path().join("frame.png");
    std::fs::write(&on_disk, &png).unwrap();

    let mut conn = helpers::test_db();
    let from_file = insert_capture(
        &mut conn,
        &batch(
            0,
            NOON,
            vec![CapturedWindowRecord {
                image_path: Some(on_disk.to_string_lossy().into_owned()),
                ..window("Code", "main.rs", "")
            }],
        ),
    )
    .unwrap();
    let inline = insert_capture(
        &mut conn,
        &batch(
            1,
            NOON + 1,
            vec![CapturedWindowRecord {
                image_base64: Some("aW5saW5l".into()),
                ..window("Notes", "todo", "")
            }],
        ),
    )
    .unwrap();
    let missing = insert_capture(
        &mut conn,
        &batch(
            2,
            NOON + 2,
            vec![CapturedWindowRecord {
                image_path: Some(dir.path().join("gone.png").to_string_lossy().into_owned()),
                ..window("Mail", "inbox", "")
            }],
        ),
    )
    .unwrap();

    let recent = fetch_recent_captures(&conn, 10).unwrap();
    assert_eq!(recent[0].capture_id, missing);
    assert!(recent[0].windows[0].image_base64.is_none());
    assert_eq!(recent[1].windows[0].image_base64.as_deref(), Some("aW5saW5l"));
    assert_eq!(recent[2].windows[0].image_base64, Some(BASE64.encode(&png)));

    // metadata reads never carry images
    assert!(fetch_captures_metadata(&conn, 10)
        .unwrap()
        .iter()
        .all(|c| c.windows.iter().all(|w| w.image_base64.is_none())));

    let images = fetch_images_for_captures(&conn, &[from_file, inline, missing, 999]).unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[&from_file], BASE64.encode(&png));
    assert_eq!(images[&inline], "aW5saW5l");
    assert!(fetch_images_for_captures(&conn, &[]).unwrap().is_empty());
}

#[test]
fn deleting_a_capture_cascades_to_windows() {
    let mut conn = helpers::test_db();
    let id = insert_capture(
        &mut conn,
        &batch(0, NOON, vec![window("A", "a", "x"), window("B", "b", "y")]),
    )
    .unwrap();

    conn.execute("DELETE FROM captures WHERE id = ?1", [id]).unwrap();
    let windows: i64 = conn
        .query_row("SELECT COUNT(*) FROM captured_windows", [], |r| r.get(0))
        .unwrap();
    assert_eq!(windows, 0);
}

#[test]
fn stats_count_apps_by_window() {
    let mut conn = helpers::test_db();
    insert_capture(
        &mut conn,
        &batch(0, NOON - 10, vec![window("Code", "a.rs", ""), window("Slack", "general", "")]),
    )
    .unwrap();
    insert_capture(&mut conn, &batch(1, NOON, vec![window("Code", "b.rs", "")])).unwrap();
    memri::storage::chat::insert_chat_message(&conn, "user", "hi", NOON).unwrap();

    let stats = storage_stats(&conn, 5).unwrap();
    assert_eq!(stats.total_captures, 2);
    assert_eq!(stats.total_windows, 3);
    assert_eq!(stats.total_chat_messages, 1);
    assert_eq!(stats.oldest_capture_ms, Some(NOON - 10));
    assert_eq!(stats.newest_capture_ms, Some(NOON));
    assert_eq!(stats.top_apps[0].app_name, "Code");
    assert_eq!(stats.top_apps[0].windows, 2);
}

#[tokio::test]
async fn store_persists_batches_and_chat() {
    let store = helpers::test_store();

    let id = store
        .persist_batch(batch(0, NOON, vec![window("Figma", "Landing page", "hero copy")]))
        .await
        .unwrap();
    assert_eq!(store.count_captures().await.unwrap(), 1);
    assert_eq!(store.fetch_recent_captures(5).await.unwrap()[0].capture_id, id);

    let first = store.insert_chat_message("user", "what was I designing?").await.unwrap();
    let second = store.insert_chat_message("assistant", "A landing page [[CLIP:1]]").await.unwrap();
    assert!(second.id > first.id);

    let history = store.fetch_chat_messages(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], second);
    assert_eq!(history[1].role, "user");

    let health = store.health().await.unwrap();
    assert_eq!(health.capture_count, 1);
    assert_eq!(health.chat_count, 2);
}

#[test]
fn timeline_loads_beyond_sqlite_variable_limit() {
    let mut conn = helpers::test_db();
    let ids: Vec<i64> = (0..33_000)
        .map(|i| {
            insert_capture(
                &mut conn,
                &batch(
                    i as u64,
                    NOON + i,
                    vec![CapturedWindowRecord {
                        image_base64: Some("aW1n".into()),
                        ..window("App", "w", "")
                    }],
                ),
            )
            .unwrap()
        })
        .collect();

    let captures = fetch_captures_metadata(&conn, i64::MAX).unwrap();
    assert_eq!(captures.len(), 33_000);
    assert!(captures.iter().all(|c| c.windows.len() == 1));
    assert_eq!(captures[0].capture_id, ids[32_999]);

    let images = fetch_images_for_captures(&conn, &ids).unwrap();
    assert_eq!(images.len(), 33_000);
}

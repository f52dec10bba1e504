use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clipboard_history_sync::clipboard::MemoryClipboard;
use clipboard_history_sync::error::AppError;
use clipboard_history_sync::history::{ClipboardItem, HistoryEvent, MediaType};
use clipboard_history_sync::service::{HistoryHandle, HistoryService};
use clipboard_history_sync::settings::Settings;
use clipboard_history_sync::storage::LocalStorage;
use clipboard_history_sync::sync::{MemoryRemoteStore, RemoteRecord, RemoteStore};

const WAIT_LIMIT: Duration = Duration::from_secs(3);

fn test_settings(dir: &Path) -> Settings {
    Settings {
        poll_interval_ms: 50,
        data_dir: Some(dir.to_path_buf()),
        ..Settings::default()
    }
}

async fn wait_for_len(handle: &HistoryHandle, expected: usize) -> Vec<ClipboardItem> {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let items = handle.get_all().await.expect("service running");
        if items.len() == expected || tokio::time::Instant::now() >= deadline {
            return items;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

#[tokio::test]
async fn copied_text_appears_in_history_and_notifies() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clipboard = MemoryClipboard::new();
    let handle = HistoryService::start(test_settings(dir.path()), clipboard.clone(), None).await;
    let mut events = handle.subscribe();

    clipboard.copy_text("hello from another app");

    let event = tokio::time::timeout(WAIT_LIMIT, events.recv())
        .await
        .expect("update within time limit")
        .expect("event channel open");
    assert_eq!(event, HistoryEvent::Updated { len: 1 });

    let items = handle.get_all().await.expect("get all");
    assert_eq!(items[0].content(), "hello from another app");
    assert_eq!(handle.search("ANOTHER").await.expect("search").len(), 1);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn copy_to_source_is_not_ingested_again() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clipboard = MemoryClipboard::new();
    let handle = HistoryService::start(test_settings(dir.path()), clipboard.clone(), None).await;

    clipboard.copy_text("first");
    wait_for_len(&handle, 1).await;
    clipboard.copy_text("second");
    let items = wait_for_len(&handle, 2).await;
    assert_eq!(items.len(), 2);

    handle.copy_to_source(&items[1]).await.expect("copy back");
    assert_eq!(clipboard.text().as_deref(), Some("first"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(handle.get_all().await.expect("get all").len(), 2);

    clipboard.copy_text("third");
    assert_eq!(wait_for_len(&handle, 3).await.len(), 3);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn history_survives_restart() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clipboard = MemoryClipboard::new();

    let handle = HistoryService::start(test_settings(dir.path()), clipboard.clone(), None).await;
    clipboard.copy_text("keep me");
    wait_for_len(&handle, 1).await;
    clipboard.copy_image(MediaType::Png, vec![3_u8; 16], None);
    let before = wait_for_len(&handle, 2).await;
    assert_eq!(before.len(), 2);
    handle.shutdown().await.expect("shutdown");

    let restarted = HistoryService::start(test_settings(dir.path()), MemoryClipboard::new(), None).await;
    let after = restarted.get_all().await.expect("get all");
    assert_eq!(after, before);

    restarted.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn clear_persists_immediately() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clipboard = MemoryClipboard::new();
    let handle = HistoryService::start(test_settings(dir.path()), clipboard.clone(), None).await;

    clipboard.copy_text("secret");
    wait_for_len(&handle, 1).await;
    handle.save_now().await.expect("save now");

    handle.clear().await.expect("clear");
    assert!(handle.save_now().await.expect("save now"));

    let restarted = HistoryService::start(test_settings(dir.path()), MemoryClipboard::new(), None).await;
    assert!(restarted.get_all().await.expect("get all").is_empty());

    handle.shutdown().await.expect("shutdown");
    restarted.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn stop_monitoring_ignores_later_copies() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clipboard = MemoryClipboard::new();
    let handle = HistoryService::start(test_settings(dir.path()), clipboard.clone(), None).await;

    handle.stop_monitoring().await.expect("stop monitoring");
    clipboard.copy_text("too late");
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(handle.get_all().await.expect("get all").is_empty());
    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn handle_reports_closed_service_after_shutdown() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let handle = HistoryService::start(test_settings(dir.path()), MemoryClipboard::new(), None).await;

    handle.shutdown().await.expect("shutdown");
    assert!(matches!(handle.get_all().await, Err(AppError::ServiceClosed)));
}

async fn wait_for_snapshot(storage: &LocalStorage, expected: &[ClipboardItem]) -> Vec<ClipboardItem> {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let items = storage.load();
        if items == expected || tokio::time::Instant::now() >= deadline {
            return items;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn slow_clipboard_reads_do_not_stall_commands() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clipboard = MemoryClipboard::new();
    let handle = HistoryService::start(test_settings(dir.path()), clipboard.clone(), None).await;

    clipboard.set_read_delay(Some(Duration::from_millis(400)));
    clipboard.copy_text("slow to read");
    tokio::time::sleep(Duration::from_millis(150)).await;

    let started = std::time::Instant::now();
    assert!(handle.get_all().await.expect("get all").is_empty());
    assert!(started.elapsed() < Duration::from_millis(300));

    let items = wait_for_len(&handle, 1).await;
    assert_eq!(items[0].content(), "slow to read");

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn autosave_timer_writes_snapshot() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let settings = test_settings(dir.path());
    let autosave = settings.autosave_interval();
    let snapshot = LocalStorage::new(settings.history_file().expect("history file"));
    let clipboard = MemoryClipboard::new();
    let handle = HistoryService::start(settings, clipboard.clone(), None).await;

    clipboard.copy_text("saved by the timer");
    let items = wait_for_len(&handle, 1).await;
    assert_eq!(items.len(), 1);
    assert!(snapshot.load().is_empty());

    tokio::time::sleep(autosave).await;
    assert_eq!(wait_for_snapshot(&snapshot, &items).await, items);

    handle.shutdown().await.expect("shutdown");
}

fn sync_settings(dir: &Path) -> Settings {
    Settings {
        cloud_sync_enabled: true,
        ..test_settings(dir)
    }
}

#[tokio::test]
async fn remote_items_are_merged_on_start() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let remote_item = ClipboardItem::new_text("from another device", MediaType::String);
    let remote = Arc::new(MemoryRemoteStore::with_records(vec![RemoteRecord::from(&remote_item)]));
    let shared: Arc<dyn RemoteStore> = remote.clone();

    let handle = HistoryService::start(sync_settings(dir.path()), MemoryClipboard::new(), Some(shared)).await;

    let items = wait_for_len(&handle, 1).await;
    assert_eq!(items, vec![remote_item]);
    assert_eq!(handle.sync_now().await.expect("sync now"), 0);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn sync_now_pushes_local_items() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clipboard = MemoryClipboard::new();
    let remote = Arc::new(MemoryRemoteStore::new());
    let shared: Arc<dyn RemoteStore> = remote.clone();
    let handle = HistoryService::start(sync_settings(dir.path()), clipboard.clone(), Some(shared)).await;

    clipboard.copy_text("share me");
    wait_for_len(&handle, 1).await;
    handle.sync_now().await.expect("sync now");

    assert!(wait_until(|| remote.len() == 1).await);
    assert_eq!(remote.records()[0].item.content, "share me");

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn delete_is_propagated_to_remote() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let item = ClipboardItem::new_text("shared", MediaType::String);
    let remote = Arc::new(MemoryRemoteStore::with_records(vec![RemoteRecord::from(&item)]));
    let shared: Arc<dyn RemoteStore> = remote.clone();
    let handle = HistoryService::start(sync_settings(dir.path()), MemoryClipboard::new(), Some(shared)).await;
    wait_for_len(&handle, 1).await;

    assert!(handle.delete(item.id()).await.expect("delete"));
    assert!(wait_until(|| remote.is_empty()).await);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn clear_all_data_resets_local_and_remote() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clipboard = MemoryClipboard::new();
    let remote = Arc::new(MemoryRemoteStore::new());
    let shared: Arc<dyn RemoteStore> = remote.clone();
    let handle = HistoryService::start(sync_settings(dir.path()), clipboard.clone(), Some(shared)).await;

    clipboard.copy_text("everywhere");
    wait_for_len(&handle, 1).await;
    handle.sync_now().await.expect("sync now");
    assert!(wait_until(|| remote.len() == 1).await);

    assert!(handle.clear_all_data().await.expect("clear all data"));
    assert!(handle.get_all().await.expect("get all").is_empty());
    assert!(remote.is_empty());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn unreachable_remote_keeps_local_history() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let clipboard = MemoryClipboard::new();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.set_fail_requests(true);
    let shared: Arc<dyn RemoteStore> = remote.clone();
    let handle = HistoryService::start(sync_settings(dir.path()), clipboard.clone(), Some(shared)).await;

    clipboard.copy_text("offline");
    wait_for_len(&handle, 1).await;
    assert_eq!(handle.sync_now().await.expect("sync now"), 0);
    assert!(!handle.clear_all_data().await.expect("clear all data"));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn merged_remote_items_are_saved_before_autosave() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let settings = sync_settings(dir.path());
    let autosave = settings.autosave_interval();
    let snapshot = LocalStorage::new(settings.history_file().expect("history file"));
    let remote_item = ClipboardItem::new_text("synced elsewhere", MediaType::String);
    let remote: Arc<dyn RemoteStore> =
        Arc::new(MemoryRemoteStore::with_records(vec![RemoteRecord::from(&remote_item)]));

    let started = tokio::time::Instant::now();
    let handle = HistoryService::start(settings, MemoryClipboard::new(), Some(remote)).await;

    let expected = vec![remote_item];
    assert_eq!(wait_for_snapshot(&snapshot, &expected).await, expected);
    assert!(started.elapsed() < autosave);

    handle.shutdown().await.expect("shutdown");
}

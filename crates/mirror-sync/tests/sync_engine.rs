//! Uploader, Downloader and Connection Manager against in-memory fakes.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{DequeueReply, FakeHub, FakeStore, QueueReply};
use mirror_core::{Cursor, Queue, RowStatus};
use mirror_sync::{
    CheckpointStore, ConnectionManager, CursorPolicy, DownloadOutcome, Downloader,
    FileCheckpointStore, LinkState, MemoryCheckpointStore, SyncError, TableStore, Uploader,
};

fn uploader(store: &Arc<FakeStore>, hub: &Arc<FakeHub>) -> Uploader {
    Uploader::new(store.clone(), hub.clone())
}

fn downloader(
    store: &Arc<FakeStore>,
    hub: &Arc<FakeHub>,
    checkpoint: &Arc<MemoryCheckpointStore>,
    policy: CursorPolicy,
) -> Downloader {
    Downloader::new(store.clone(), hub.clone(), checkpoint.clone(), policy)
}

fn new_rows(ids: &[i64]) -> serde_json::Value {
    json!(ids
        .iter()
        .map(|id| json!({
            "ID": id,
            "SOURCE": "HUB",
            "DESTINATION": "ERP",
            "TYPE": "PRODUCTION_ORDER$POST",
            "DATA": "<root/>",
            "QUEUEDAT": "2020-01-01T00:00:00Z"
        }))
        .collect::<Vec<_>>())
}

// =============================================================================
// Uploader
// =============================================================================

#[tokio::test]
async fn accepted_row_takes_hub_status() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let id = store.push_tx("MATERIAL$POST");

    let report = uploader(&store, &hub).run().await.unwrap();

    assert_eq!(report.updated, 1);
    let row = store.tx_row(id);
    assert_eq!(row.status, RowStatus::Done);
    assert_eq!(row.error, None);
    assert!(row.processed_at.is_some());
}

#[tokio::test]
async fn failed_upload_is_retried_next_tick_and_never_after_acceptance() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let first = store.push_tx("MATERIAL$POST");
    let second = store.push_tx("LOCATION$POST");
    hub.script_queue([QueueReply::ServerError, QueueReply::Disposition("D", None)]);

    let report = uploader(&store, &hub).run().await.unwrap();
    assert_eq!((report.updated, report.failed), (1, 1));
    assert_eq!(store.tx_row(first).status, RowStatus::Queued);
    assert_eq!(store.tx_row(second).status, RowStatus::Done);

    uploader(&store, &hub).run().await.unwrap();
    assert_eq!(store.tx_row(first).status, RowStatus::Done);

    uploader(&store, &hub).run().await.unwrap();
    assert_eq!(hub.uploaded(), vec![first, second, first]);
}

#[tokio::test]
async fn hub_rejection_is_recorded_on_the_row() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let id = store.push_tx("INVENTORY$POST");
    hub.script_queue([QueueReply::Disposition("E", Some("unknown warehouse"))]);

    uploader(&store, &hub).run().await.unwrap();

    let row = store.tx_row(id);
    assert_eq!(row.status, RowStatus::Error);
    assert_eq!(row.error.as_deref(), Some("unknown warehouse"));
}

#[tokio::test]
async fn unknown_status_code_leaves_only_that_row_queued() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let odd = store.push_tx("MATERIAL$POST");
    let fine = store.push_tx("LOCATION$POST");
    hub.script_queue([QueueReply::Disposition("Z", None)]);

    let report = uploader(&store, &hub).run().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(store.tx_row(odd).status, RowStatus::Queued);
    assert_eq!(store.tx_row(fine).status, RowStatus::Done);
}

#[tokio::test]
async fn hub_asking_for_retry_keeps_row_queued() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let id = store.push_tx("MATERIAL$POST");
    hub.script_queue([QueueReply::Disposition("Q", None)]);

    uploader(&store, &hub).run().await.unwrap();

    let row = store.tx_row(id);
    assert_eq!(row.status, RowStatus::Queued);
    assert_eq!(row.processed_at, None);
}

#[tokio::test]
async fn row_finished_during_upload_keeps_its_final_status() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let raced = store.push_tx("MATERIAL$POST");
    let other = store.push_tx("LOCATION$POST");
    store.finish_after_read(raced, RowStatus::Done);
    hub.script_queue([QueueReply::Disposition("E", Some("duplicate"))]);

    let report = uploader(&store, &hub).run().await.unwrap();

    assert_eq!(report.superseded, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 0);
    let row = store.tx_row(raced);
    assert_eq!(row.status, RowStatus::Done);
    assert_eq!(row.error, None);
    assert_eq!(store.tx_row(other).status, RowStatus::Done);
}

#[tokio::test]
async fn unreachable_hub_mid_batch_stops_the_batch() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let first = store.push_tx("MATERIAL$POST");
    store.push_tx("LOCATION$POST");
    store.push_tx("INVENTORY$POST");
    hub.script_queue([QueueReply::Unreachable]);

    let report = uploader(&store, &hub).run().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(hub.uploaded(), vec![first]);
}

// =============================================================================
// Connections
// =============================================================================

#[tokio::test]
async fn unreachable_hub_does_not_affect_table_store() {
    let store = Arc::new(FakeStore::default());
    let hub = Arc::new(FakeHub::logged_out());
    hub.set_unreachable(true);
    let id = store.push_tx("MATERIAL$POST");

    let manager = ConnectionManager::new(store.clone(), hub.clone());
    let monitor = manager.monitor();
    manager.tick().await;

    assert_eq!(monitor.sql(), LinkState::Connected);
    assert_eq!(monitor.hub(), LinkState::Disconnected);

    let report = uploader(&store, &hub).run().await.unwrap();
    assert!(report.skipped);
    assert!(hub.uploaded().is_empty());
    assert_eq!(store.tx_row(id).status, RowStatus::Queued);

    hub.set_unreachable(false);
    manager.tick().await;
    assert!(monitor.is_ready());

    uploader(&store, &hub).run().await.unwrap();
    assert_eq!(store.tx_row(id).status, RowStatus::Done);
}

#[tokio::test]
async fn unauthorized_upload_forces_reauthentication() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let id = store.push_tx("MATERIAL$POST");
    hub.script_queue([QueueReply::Unauthorized]);

    let manager = ConnectionManager::new(store.clone(), hub.clone());
    let up = uploader(&store, &hub);

    up.run().await.unwrap();
    assert!(!hub.is_authenticated_now());
    assert_eq!(store.tx_row(id).status, RowStatus::Queued);

    // Until the connection timer runs, uploads are skipped.
    assert!(up.run().await.unwrap().skipped);

    manager.tick().await;
    assert_eq!(hub.auth_calls(), 1);

    up.run().await.unwrap();
    assert_eq!(store.tx_row(id).status, RowStatus::Done);
}

#[tokio::test]
async fn store_fault_is_repaired_by_connection_tick() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let manager = ConnectionManager::new(store.clone(), hub.clone());
    let monitor = manager.monitor();

    manager.tick().await;
    assert_eq!(monitor.sql(), LinkState::Connected);

    store.set_unreachable(true);
    manager.tick().await;
    assert_eq!(monitor.sql(), LinkState::Disconnected);
    assert_eq!(monitor.hub(), LinkState::Connected);

    store.set_unreachable(false);
    manager.tick().await;
    assert_eq!(monitor.sql(), LinkState::Connected);
    assert!(store.connect_calls() >= 2);
}

// =============================================================================
// Downloader
// =============================================================================

#[tokio::test]
async fn first_run_only_writes_a_cursor() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let checkpoint = Arc::new(MemoryCheckpointStore::new());

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime)
        .run()
        .await
        .unwrap();

    let DownloadOutcome::Initialized(cursor) = outcome else {
        panic!("expected Initialized, got {:?}", outcome);
    };
    assert_eq!(checkpoint.load().await.unwrap(), Some(cursor));
    assert!(hub.dequeue_cursors().is_empty());
}

#[tokio::test]
async fn unreadable_checkpoint_stops_the_download() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    hub.script_dequeue([DequeueReply::Items(new_rows(&[1]))]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hubsql.dat");
    std::fs::write(&path, "not a checkpoint").unwrap();
    let checkpoint = Arc::new(FileCheckpointStore::new(&path));

    let result = Downloader::new(store.clone(), hub.clone(), checkpoint, CursorPolicy::RequestTime)
        .run()
        .await;

    assert!(matches!(result, Err(SyncError::CheckpointCorrupt(_))));
    assert!(hub.dequeue_cursors().is_empty());
    assert!(store.rx_rows().is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "not a checkpoint");
}

#[tokio::test]
async fn failed_dequeue_keeps_cursor() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let start = Cursor::from_millis(1_000);
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(start));
    hub.script_dequeue([DequeueReply::ServerError]);

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome, DownloadOutcome::FetchFailed);
    assert_eq!(checkpoint.load().await.unwrap(), Some(start));
    assert!(checkpoint.saves().await.is_empty());
}

#[tokio::test]
async fn empty_batch_keeps_cursor() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(Cursor::from_millis(1_000)));

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome, DownloadOutcome::Empty);
    assert!(checkpoint.saves().await.is_empty());
}

#[tokio::test]
async fn disconnected_links_skip_the_download() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::logged_out());
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(Cursor::from_millis(1_000)));

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome, DownloadOutcome::Skipped);
    assert!(hub.dequeue_cursors().is_empty());
}

#[tokio::test]
async fn applied_batch_advances_cursor() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let start = Cursor::from_millis(1_000);
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(start));
    hub.script_dequeue([DequeueReply::Items(new_rows(&[10, 11, 12]))]);

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime)
        .run()
        .await
        .unwrap();

    let DownloadOutcome::Applied { items, cursor } = outcome else {
        panic!("expected Applied, got {:?}", outcome);
    };
    assert_eq!(items, 3);
    assert!(cursor > start);
    assert_eq!(checkpoint.saves().await, vec![cursor]);
    assert_eq!(hub.dequeue_cursors(), vec![start]);

    let rx = store.rx_rows();
    assert_eq!(rx.len(), 3);
    assert!(rx.iter().all(|r| r.status == RowStatus::Queued));
    assert_eq!(rx[0].remote_id.as_deref(), Some("10"));
}

#[tokio::test]
async fn partial_apply_never_checkpoints_and_refetches_same_cursor() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let start = Cursor::from_millis(1_000);
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(start));

    let first = store.push_tx("MATERIAL$POST");
    let second = store.push_tx("LOCATION$POST");
    let third = store.push_tx("INVENTORY$POST");
    let updates = json!([
        {"sourceId": first, "status": "D"},
        {"sourceId": second, "status": "D"},
        {"sourceId": third, "status": "E", "error": "bad lot"}
    ]);
    hub.script_dequeue([
        DequeueReply::Items(updates.clone()),
        DequeueReply::Items(updates),
    ]);
    store.fail_status_update_for(Some(second));

    let down = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime);
    assert_eq!(down.run().await.unwrap(), DownloadOutcome::ApplyFailed);
    assert!(checkpoint.saves().await.is_empty());
    assert_eq!(store.tx_row(first).status, RowStatus::Done);
    assert_eq!(store.tx_row(third).status, RowStatus::Queued);

    // The store reconnects and the same batch is fetched with the old cursor.
    store.fail_status_update_for(None);
    store.connect().await.unwrap();
    assert!(matches!(
        down.run().await.unwrap(),
        DownloadOutcome::Applied { items: 3, .. }
    ));
    assert_eq!(hub.dequeue_cursors(), vec![start, start]);
    assert_eq!(store.tx_row(first).status, RowStatus::Done);
    assert_eq!(store.tx_row(second).status, RowStatus::Done);
    assert_eq!(store.tx_row(third).status, RowStatus::Error);
    assert_eq!(store.tx_row(third).error.as_deref(), Some("bad lot"));
}

#[tokio::test]
async fn failed_row_insert_keeps_cursor() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let start = Cursor::from_millis(1_000);
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(start));
    hub.script_dequeue([DequeueReply::Items(new_rows(&[1, 2]))]);
    store.fail_inserts(true);

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome, DownloadOutcome::ApplyFailed);
    assert!(checkpoint.saves().await.is_empty());
    assert!(store.rx_rows().is_empty());
    assert!(!store.is_connected().await);
}

#[tokio::test]
async fn redelivered_rows_are_not_duplicated() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(Cursor::from_millis(1_000)));
    hub.script_dequeue([
        DequeueReply::Items(new_rows(&[7, 8])),
        DequeueReply::Items(new_rows(&[8, 9])),
    ]);

    let down = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime);
    down.run().await.unwrap();
    down.run().await.unwrap();

    let remote_ids: Vec<_> = store
        .rx_rows()
        .into_iter()
        .filter_map(|r| r.remote_id)
        .collect();
    assert_eq!(remote_ids, vec!["7", "8", "9"]);
}

#[tokio::test]
async fn status_updates_for_missing_or_final_rows_are_skipped() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(Cursor::from_millis(1_000)));

    let done = store.push_tx("MATERIAL$POST");
    store
        .set_row_status(Queue::Tx, done, RowStatus::Queued, RowStatus::Done, None)
        .await
        .unwrap();
    hub.script_dequeue([DequeueReply::Items(json!([
        {"sourceId": done, "status": "E", "error": "late"},
        {"sourceId": 999, "status": "D"}
    ]))]);

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime)
        .run()
        .await
        .unwrap();

    assert!(matches!(outcome, DownloadOutcome::Applied { items: 2, .. }));
    let row = store.tx_row(done);
    assert_eq!(row.status, RowStatus::Done);
    assert_eq!(row.error, None);
}

#[tokio::test]
async fn mixed_batch_is_rejected_without_checkpoint() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(Cursor::from_millis(1_000)));
    let id = store.push_tx("MATERIAL$POST");
    hub.script_dequeue([DequeueReply::Items(json!([
        {"sourceId": id, "status": "D"},
        {"ID": 5, "SOURCE": "HUB", "DESTINATION": "ERP", "TYPE": "CONSUMPTION$POST"}
    ]))]);

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome, DownloadOutcome::FetchFailed);
    assert!(checkpoint.saves().await.is_empty());
    assert_eq!(store.tx_row(id).status, RowStatus::Queued);
    assert!(store.rx_rows().is_empty());
}

#[tokio::test]
async fn non_final_status_update_rejects_the_batch() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(Cursor::from_millis(1_000)));
    let id = store.push_tx("MATERIAL$POST");
    store
        .set_row_status(Queue::Tx, id, RowStatus::Queued, RowStatus::Processing, None)
        .await
        .unwrap();
    hub.script_dequeue([DequeueReply::Items(json!([{"sourceId": id, "status": "Q"}]))]);

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::RequestTime)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome, DownloadOutcome::FetchFailed);
    assert!(checkpoint.saves().await.is_empty());
    let row = store.tx_row(id);
    assert_eq!(row.status, RowStatus::Processing);
    assert!(row.processed_at.is_some());
}

#[tokio::test]
async fn cursor_never_moves_backwards() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    // Far ahead of the 2020 timestamps the batches carry.
    let start = Cursor::from_millis(4_000_000_000_000);
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(start));
    hub.script_dequeue([
        DequeueReply::Items(new_rows(&[1])),
        DequeueReply::Items(new_rows(&[2])),
    ]);

    let down = downloader(&store, &hub, &checkpoint, CursorPolicy::NewestObserved);
    let mut seen = vec![start];
    for _ in 0..2 {
        down.run().await.unwrap();
        seen.push(checkpoint.load().await.unwrap().unwrap());
    }

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(checkpoint.load().await.unwrap(), Some(start));
}

#[tokio::test]
async fn newest_observed_policy_uses_row_timestamps() {
    let store = Arc::new(FakeStore::connected());
    let hub = Arc::new(FakeHub::authenticated());
    let checkpoint = Arc::new(MemoryCheckpointStore::with_cursor(Cursor::from_millis(0)));
    hub.script_dequeue([DequeueReply::Items(json!([
        {"ID": 1, "SOURCE": "HUB", "DESTINATION": "ERP", "TYPE": "A$POST", "QUEUEDAT": 1_600_000_000_000i64},
        {"ID": 2, "SOURCE": "HUB", "DESTINATION": "ERP", "TYPE": "B$POST", "PROCESSEDAT": 1_600_000_500_000i64}
    ]))]);

    let outcome = downloader(&store, &hub, &checkpoint, CursorPolicy::NewestObserved)
        .run()
        .await
        .unwrap();

    assert_eq!(
        outcome,
        DownloadOutcome::Applied {
            items: 2,
            cursor: Cursor::from_millis(1_600_000_500_000)
        }
    );
}

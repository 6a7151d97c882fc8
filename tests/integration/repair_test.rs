//! Integration tests for post-commit storage failures and the repair worker.

mod helpers;

use std::sync::Arc;

use bytes::Bytes;

use canopy_core::ErrorKind;
use canopy_core::config::RepairConfig;
use canopy_database::TreeStore;
use canopy_entity::NodeRef;
use canopy_entity::repair::RepairAction;
use canopy_service::CreateFileRequest;
use canopy_worker::RepairRunner;

fn runner(app: &helpers::TestApp) -> RepairRunner {
    RepairRunner::new(
        Arc::new(app.services.repairs.clone()),
        RepairConfig::default(),
        "test-worker".to_string(),
    )
}

#[tokio::test]
async fn test_failed_directory_creation_is_repaired_by_worker() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;

    app.objects.set_offline(true);
    let outcome = app
        .services
        .folders
        .create_folder(&ctx, root.id, "late")
        .await
        .unwrap();
    assert!(outcome.is_degraded());
    assert_eq!(outcome.warnings[0].kind, ErrorKind::InconsistentState);
    assert_eq!(outcome.repair_tickets.len(), 1);

    let folder = outcome.into_value();
    let address = app
        .services
        .folders
        .storage_address(&ctx, NodeRef::Folder(folder.id))
        .await
        .unwrap();
    app.assert_not_stored(&address).await;
    app.assert_aggregates_consistent(root.id).await;

    // Still offline: the attempt fails and the ticket stays queued.
    let report = runner(&app).run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    let pending = app.store.pending_repairs(10, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);

    app.objects.set_offline(false);
    let report = runner(&app).run_once().await.unwrap();
    assert_eq!(report.resolved, 1);
    app.assert_stored(&address).await;
    assert!(app.store.pending_repairs(10, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_relocation_is_replayed_against_live_address() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folders = &app.services.folders;
    let src = app.mkdir(&ctx, root.id, "src").await;
    let file = app.put(&ctx, src.id, "main.rs", b"fn main() {}").await;
    let dest = app.mkdir(&ctx, root.id, "dest").await;
    let old_address = folders
        .storage_address(&ctx, NodeRef::File(file.id))
        .await
        .unwrap();

    app.objects.set_offline(true);
    let outcome = folders.move_folder(&ctx, src.id, dest.id).await.unwrap();
    assert!(outcome.is_degraded());
    let new_address = folders
        .storage_address(&ctx, NodeRef::File(file.id))
        .await
        .unwrap();
    app.assert_stored(&old_address).await;
    app.assert_not_stored(&new_address).await;

    // A rename in between does not change where the repair lands.
    app.objects.set_offline(false);
    folders.rename_folder(&ctx, dest.id, "target").await.unwrap();

    let report = runner(&app).run_once().await.unwrap();
    assert_eq!(report.resolved, 1);
    app.assert_stored(&new_address).await;
    app.assert_not_stored(&old_address).await;
    assert_eq!(
        app.services
            .files
            .read_file(&ctx, file.id)
            .await
            .unwrap()
            .as_ref(),
        b"fn main() {}"
    );
}

#[tokio::test]
async fn test_ticket_for_vanished_node_is_closed() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;

    app.objects.set_offline(true);
    let folder = app
        .services
        .folders
        .create_folder(&ctx, root.id, "ghost")
        .await
        .unwrap()
        .into_value();
    app.objects.set_offline(false);
    app.services
        .folders
        .delete_folder(&ctx, folder.id)
        .await
        .unwrap();

    let report = runner(&app).run_once().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.resolved, 1);
    assert!(app.store.pending_repairs(10, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_delete_cleanup_is_finished_by_worker() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folder = app.mkdir(&ctx, root.id, "trash").await;
    app.put(&ctx, folder.id, "junk.bin", &[0u8; 32]).await;
    let address = app
        .services
        .folders
        .storage_address(&ctx, NodeRef::Folder(folder.id))
        .await
        .unwrap();

    app.objects.set_offline(true);
    let outcome = app
        .services
        .folders
        .delete_folder(&ctx, folder.id)
        .await
        .unwrap();
    assert!(outcome.is_degraded());
    assert_eq!(outcome.value.files, 1);
    app.assert_stored(&address).await;

    let pending = app.store.pending_repairs(10, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(matches!(
        pending[0].action.0,
        RepairAction::RemoveDirectory { .. }
    ));

    app.objects.set_offline(false);
    runner(&app).run_once().await.unwrap();
    app.assert_not_stored(&address).await;
    app.assert_aggregates_consistent(root.id).await;
}

#[tokio::test]
async fn test_rejected_commit_removes_uploaded_object() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folder = app.mkdir(&ctx, root.id, "uploads").await;
    let address = app
        .services
        .folders
        .storage_address(&ctx, NodeRef::Folder(folder.id))
        .await
        .unwrap();

    app.store.set_reject_commits(true);
    let err = app
        .services
        .files
        .create_file(
            &ctx,
            CreateFileRequest {
                folder_id: folder.id,
                name: "big.iso".into(),
                mime_type: None,
            },
            Bytes::from_static(b"image"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);
    app.store.set_reject_commits(false);

    assert_eq!(app.entries(&address), 0);
    assert!(app.store.files_in(folder.id).await.unwrap().is_empty());
    assert!(app.store.pending_repairs(10, 10).await.unwrap().is_empty());
    app.assert_aggregates_consistent(root.id).await;
}

#[tokio::test]
async fn test_orphaned_upload_is_queued_when_cleanup_fails() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folder = app.mkdir(&ctx, root.id, "uploads").await;
    let address = app
        .services
        .folders
        .storage_address(&ctx, NodeRef::Folder(folder.id))
        .await
        .unwrap();

    app.store.set_reject_commits(true);
    app.objects.set_offline(true);
    let err = app
        .services
        .files
        .create_file(
            &ctx,
            CreateFileRequest {
                folder_id: folder.id,
                name: "orphan.dat".into(),
                mime_type: Some("application/octet-stream".into()),
            },
            Bytes::from_static(b"orphan"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);
    assert_eq!(app.entries(&address), 1);

    let pending = app.store.pending_repairs(10, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(matches!(
        pending[0].action.0,
        RepairAction::RemoveObject { .. }
    ));

    app.store.set_reject_commits(false);
    app.objects.set_offline(false);
    let report = runner(&app).run_once().await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(app.entries(&address), 0);
}

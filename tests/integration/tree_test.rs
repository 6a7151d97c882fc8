//! Integration tests for folder structure, paths and subtree counters.

mod helpers;

use canopy_core::ErrorKind;
use canopy_core::types::pagination::PageRequest;
use canopy_database::TreeStore;
use canopy_entity::NodeRef;
use canopy_entity::permission::PermissionLevel;
use canopy_service::ChildEntry;

#[tokio::test]
async fn test_depth_limit_allows_four_levels_below_root() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;

    let mut parent = root.id;
    for depth in 1..=4 {
        let folder = app.mkdir(&ctx, parent, &format!("level{depth}")).await;
        parent = folder.id;
    }

    let err = app
        .services
        .folders
        .create_folder(&ctx, parent, "level5")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DepthLimitExceeded);

    let path = app
        .services
        .folders
        .display_path(&ctx, NodeRef::Folder(parent))
        .await
        .unwrap();
    assert_eq!(path, "/level1/level2/level3/level4");
}

#[tokio::test]
async fn test_root_is_immutable() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folders = &app.services.folders;
    let docs = app.mkdir(&ctx, root.id, "docs").await;

    let err = folders.rename_folder(&ctx, root.id, "home").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RootImmutable);

    let err = folders.move_folder(&ctx, root.id, docs.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RootImmutable);

    let err = folders.delete_folder(&ctx, root.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RootImmutable);

    let err = folders.provision_root(ctx.user_id()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    assert_eq!(
        folders
            .display_path(&ctx, NodeRef::Folder(root.id))
            .await
            .unwrap(),
        "/"
    );
}

#[tokio::test]
async fn test_rename_changes_display_path_but_not_address() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folders = &app.services.folders;
    let projects = app.mkdir(&ctx, root.id, "projects").await;
    let alpha = app.mkdir(&ctx, projects.id, "alpha").await;
    let file = app.put(&ctx, alpha.id, "notes.txt", b"hello").await;

    let before = folders
        .storage_address(&ctx, NodeRef::File(file.id))
        .await
        .unwrap();
    folders.rename_folder(&ctx, projects.id, "archive").await.unwrap();

    assert_eq!(
        folders
            .display_path(&ctx, NodeRef::Folder(alpha.id))
            .await
            .unwrap(),
        "/archive/alpha"
    );
    assert_eq!(
        folders
            .display_path(&ctx, NodeRef::File(file.id))
            .await
            .unwrap(),
        "/archive/alpha/notes.txt"
    );
    let after = folders
        .storage_address(&ctx, NodeRef::File(file.id))
        .await
        .unwrap();
    assert_eq!(before, after);
    app.assert_stored(&after).await;
}

#[tokio::test]
async fn test_sibling_names_must_be_unique() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folders = &app.services.folders;
    app.mkdir(&ctx, root.id, "a").await;
    let b = app.mkdir(&ctx, root.id, "b").await;

    let err = folders.create_folder(&ctx, root.id, "a").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameConflict);

    let err = folders.rename_folder(&ctx, b.id, "a").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameConflict);

    let err = folders.create_folder(&ctx, root.id, "x/y").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let unchanged = folders.rename_folder(&ctx, b.id, "b").await.unwrap();
    assert_eq!(unchanged.version, b.version);
}

#[tokio::test]
async fn test_move_into_descendant_is_rejected_and_tree_unchanged() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folders = &app.services.folders;
    let f = app.mkdir(&ctx, root.id, "F").await;
    let child = app.mkdir(&ctx, f.id, "child").await;
    let grandchild = app.mkdir(&ctx, child.id, "grandchild").await;

    let err = folders.move_folder(&ctx, f.id, grandchild.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CycleDetected);

    let err = folders.move_folder(&ctx, f.id, f.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CycleDetected);

    let reloaded = app.folder(f.id).await;
    assert_eq!(reloaded.parent_id, Some(root.id));
    assert_eq!(reloaded.version, f.version + 1);
    assert_eq!(
        folders
            .display_path(&ctx, NodeRef::Folder(grandchild.id))
            .await
            .unwrap(),
        "/F/child/grandchild"
    );
    app.assert_aggregates_consistent(root.id).await;
}

#[tokio::test]
async fn test_move_relocates_storage_and_respects_depth() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folders = &app.services.folders;
    let src = app.mkdir(&ctx, root.id, "src").await;
    let lib = app.mkdir(&ctx, src.id, "lib").await;
    let file = app.put(&ctx, lib.id, "mod.rs", b"pub fn f() {}").await;
    let dest = app.mkdir(&ctx, root.id, "dest").await;

    let old_address = folders
        .storage_address(&ctx, NodeRef::File(file.id))
        .await
        .unwrap();
    let outcome = folders.move_folder(&ctx, src.id, dest.id).await.unwrap();
    assert!(!outcome.is_degraded());

    let new_address = folders
        .storage_address(&ctx, NodeRef::File(file.id))
        .await
        .unwrap();
    assert_ne!(old_address, new_address);
    app.assert_not_stored(&old_address).await;
    app.assert_stored(&new_address).await;
    assert_eq!(
        app.services
            .files
            .read_file(&ctx, file.id)
            .await
            .unwrap()
            .as_ref(),
        b"pub fn f() {}"
    );
    assert_eq!(
        folders
            .display_path(&ctx, NodeRef::File(file.id))
            .await
            .unwrap(),
        "/dest/src/lib/mod.rs"
    );

    // Under c (depth 3) the moved lib folder would land at depth 6.
    let a = app.mkdir(&ctx, root.id, "a").await;
    let b = app.mkdir(&ctx, a.id, "b").await;
    let c = app.mkdir(&ctx, b.id, "c").await;
    let err = folders.move_folder(&ctx, dest.id, c.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::DepthLimitExceeded);

    app.assert_aggregates_consistent(root.id).await;
}

#[tokio::test]
async fn test_delete_removes_subtree_grants_and_storage() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (other, _) = app.user().await;
    let folders = &app.services.folders;
    let f = app.mkdir(&owner, root.id, "F").await;
    let sub = app.mkdir(&owner, f.id, "sub").await;
    let file = app.put(&owner, sub.id, "data.bin", &[7u8; 64]).await;
    app.services
        .permissions
        .grant(
            &owner,
            canopy_service::GrantRequest {
                target: NodeRef::Folder(f.id),
                user_id: other.user_id(),
                level: PermissionLevel::Read,
            },
        )
        .await
        .unwrap();
    let address = folders
        .storage_address(&owner, NodeRef::Folder(f.id))
        .await
        .unwrap();

    let outcome = folders.delete_folder(&owner, f.id).await.unwrap();
    assert!(!outcome.is_degraded());
    assert_eq!(outcome.value.folders, 2);
    assert_eq!(outcome.value.files, 1);
    assert_eq!(outcome.value.bytes, 64);

    for node in [
        NodeRef::Folder(f.id),
        NodeRef::Folder(sub.id),
        NodeRef::File(file.id),
    ] {
        let err = app
            .services
            .permissions
            .check(&owner.principal, node, PermissionLevel::Read)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
    assert!(app.store.grants_on(sub.id).await.unwrap().is_empty());
    assert!(app.store.grants_on(file.id).await.unwrap().is_empty());
    app.assert_not_stored(&address).await;

    let root_after = app.folder(root.id).await;
    assert_eq!(root_after.subtree_folders, 0);
    assert_eq!(root_after.subtree_files, 0);
    assert_eq!(root_after.subtree_bytes, 0);
}

#[tokio::test]
async fn test_batch_delete_folds_nested_selections() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let a = app.mkdir(&ctx, root.id, "a").await;
    let a1 = app.mkdir(&ctx, a.id, "a1").await;
    let b = app.mkdir(&ctx, root.id, "b").await;
    let keep = app.mkdir(&ctx, root.id, "keep").await;
    app.put(&ctx, a1.id, "x", b"12345").await;
    app.put(&ctx, b.id, "y", b"123").await;

    let outcome = app
        .services
        .folders
        .delete_folders(&ctx, &[a1.id, a.id, b.id, a.id])
        .await
        .unwrap();
    assert_eq!(outcome.value.folders, 3);
    assert_eq!(outcome.value.files, 2);
    assert_eq!(outcome.value.bytes, 8);

    let listing = app
        .services
        .folders
        .list_children(&ctx, root.id, PageRequest::new(1, 50))
        .await
        .unwrap();
    let names: Vec<&str> = listing.items.iter().map(ChildEntry::name).collect();
    assert_eq!(names, vec!["keep"]);
    assert_eq!(listing.items[0].node(), NodeRef::Folder(keep.id));
    app.assert_aggregates_consistent(root.id).await;
}

#[tokio::test]
async fn test_counters_match_recount_after_mixed_mutations() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let folders = &app.services.folders;
    let files = &app.services.files;

    let docs = app.mkdir(&ctx, root.id, "docs").await;
    let work = app.mkdir(&ctx, docs.id, "work").await;
    let media = app.mkdir(&ctx, root.id, "media").await;
    let report = app.put(&ctx, work.id, "report.pdf", &[1u8; 1000]).await;
    app.put(&ctx, docs.id, "readme.md", &[2u8; 10]).await;
    let photo = app.put(&ctx, media.id, "photo.png", &[3u8; 500]).await;
    app.assert_aggregates_consistent(root.id).await;

    folders.move_folder(&ctx, work.id, media.id).await.unwrap();
    app.assert_aggregates_consistent(root.id).await;

    files.move_file(&ctx, report.id, docs.id).await.unwrap();
    app.assert_aggregates_consistent(root.id).await;

    files.delete_file(&ctx, photo.id).await.unwrap();
    folders.delete_folder(&ctx, media.id).await.unwrap();
    app.assert_aggregates_consistent(root.id).await;

    let stats = folders
        .calculate_subtree_size(&ctx, NodeRef::Folder(root.id))
        .await
        .unwrap();
    assert_eq!(stats.total_bytes, 1010);
    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.folder_count, 1);

    let recount = folders.recompute_subtree_size(&ctx, root.id).await.unwrap();
    assert_eq!(recount.corrected, 0);
    assert_eq!(recount.stored, recount.computed);
}

#[tokio::test]
async fn test_tree_view_reports_paths_and_sizes() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let a = app.mkdir(&ctx, root.id, "a").await;
    let b = app.mkdir(&ctx, a.id, "b").await;
    app.mkdir(&ctx, root.id, "c").await;
    app.put(&ctx, b.id, "f.txt", b"abcdef").await;

    let tree = app.services.tree.get_tree(&ctx, a.id).await.unwrap();
    assert_eq!(tree.display_path, "/a");
    assert_eq!(tree.depth, 1);
    assert_eq!(tree.subtree_bytes, 6);
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].display_path, "/a/b");
    assert_eq!(tree.children[0].file_count, 1);

    let whole = app.services.tree.get_tree(&ctx, root.id).await.unwrap();
    assert_eq!(whole.total_folders(), 4);
}

#[tokio::test]
async fn test_file_lifecycle() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let files = &app.services.files;
    let inbox = app.mkdir(&ctx, root.id, "inbox").await;
    let file = app.put(&ctx, inbox.id, "letter.txt", b"Dear reader").await;
    assert_eq!(file.mime_type, "text/plain");
    assert_eq!(file.size_bytes, 11);

    let err = files
        .create_file(
            &ctx,
            canopy_service::CreateFileRequest {
                folder_id: inbox.id,
                name: "letter.txt".into(),
                mime_type: None,
            },
            bytes::Bytes::from_static(b"again"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameConflict);

    let renamed = files.rename_file(&ctx, file.id, "memo.txt").await.unwrap();
    assert_eq!(renamed.storage_key, file.storage_key);

    let address = app
        .services
        .folders
        .storage_address(&ctx, NodeRef::File(file.id))
        .await
        .unwrap();
    files.delete_file(&ctx, file.id).await.unwrap();
    app.assert_not_stored(&address).await;
    let err = files.get_file(&ctx, file.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    app.assert_aggregates_consistent(root.id).await;
}

#[tokio::test]
async fn test_upload_racing_ancestor_move_is_rejected() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let a = app.mkdir(&ctx, root.id, "a").await;
    let b = app.mkdir(&ctx, a.id, "b").await;
    let c = app.mkdir(&ctx, b.id, "c").await;
    let d = app.mkdir(&ctx, root.id, "d").await;

    let gate = app.store.hold_next_commit();
    let upload = app.services.files.create_file(
        &ctx,
        canopy_service::CreateFileRequest {
            folder_id: c.id,
            name: "late.bin".into(),
            mime_type: None,
        },
        bytes::Bytes::from_static(b"0123456789"),
    );
    let mover = async {
        gate.reached().await;
        let moved = app.services.folders.move_folder(&ctx, b.id, d.id).await;
        gate.release();
        moved
    };
    let (uploaded, moved) = tokio::join!(upload, mover);

    assert!(!moved.unwrap().is_degraded());
    assert_eq!(uploaded.unwrap_err().kind, ErrorKind::Conflict);
    assert!(app.store.files_in(c.id).await.unwrap().is_empty());
    app.assert_aggregates_consistent(root.id).await;
    assert_eq!(app.folder(a.id).await.subtree_folders, 0);
    assert_eq!(app.folder(d.id).await.subtree_folders, 2);

    let address = app
        .services
        .folders
        .storage_address(&ctx, NodeRef::Folder(c.id))
        .await
        .unwrap();
    assert_eq!(app.entries(&address), 0);
}

#[tokio::test]
async fn test_move_racing_upload_below_is_rejected() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let a = app.mkdir(&ctx, root.id, "a").await;
    let b = app.mkdir(&ctx, a.id, "b").await;
    let c = app.mkdir(&ctx, b.id, "c").await;
    let d = app.mkdir(&ctx, root.id, "d").await;

    let gate = app.store.hold_next_commit();
    let mover = app.services.folders.move_folder(&ctx, b.id, d.id);
    let uploader = async {
        gate.reached().await;
        let file = app.put(&ctx, c.id, "early.bin", b"0123456789").await;
        gate.release();
        file
    };
    let (moved, file) = tokio::join!(mover, uploader);

    assert_eq!(moved.unwrap_err().kind, ErrorKind::Conflict);
    assert_eq!(app.folder(b.id).await.parent_id, Some(a.id));
    assert_eq!(app.folder(a.id).await.subtree_bytes, 10);
    app.assert_aggregates_consistent(root.id).await;
    assert_eq!(
        app.services.files.read_file(&ctx, file.id).await.unwrap().as_ref(),
        b"0123456789"
    );
}

#[tokio::test]
async fn test_upload_mime_type_follows_extension_then_content() {
    let app = helpers::TestApp::new().await;
    let (ctx, root) = app.user().await;
    let docs = app.mkdir(&ctx, root.id, "docs").await;

    let json = app.put(&ctx, docs.id, "report.json", b"{\"ok\":true}").await;
    assert_eq!(json.mime_type, "application/json");

    let csv = app.put(&ctx, docs.id, "table.CSV", b"a,b\n1,2\n").await;
    assert_eq!(csv.mime_type, "text/csv");

    let plain = app.put(&ctx, docs.id, "README", b"read me first").await;
    assert_eq!(plain.mime_type, "text/plain");
}

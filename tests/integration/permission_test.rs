//! Integration tests for grant propagation, access checks and favorites.

mod helpers;

use canopy_core::ErrorKind;
use canopy_database::TreeStore;
use canopy_entity::NodeRef;
use canopy_entity::permission::PermissionLevel;
use canopy_entity::user::Principal;
use canopy_service::{GrantRequest, RequestContext};
use uuid::Uuid;

fn grant(target: NodeRef, user_id: Uuid, level: PermissionLevel) -> GrantRequest {
    GrantRequest {
        target,
        user_id,
        level,
    }
}

#[tokio::test]
async fn test_write_grant_on_folder_reaches_existing_files() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (user2, _) = app.user().await;
    let f = app.mkdir(&owner, root.id, "F").await;
    let x = app.put(&owner, f.id, "X", b"payload").await;

    app.services
        .permissions
        .grant(&owner, grant(NodeRef::Folder(f.id), user2.user_id(), PermissionLevel::Write))
        .await
        .unwrap();

    let decision = app
        .services
        .permissions
        .check(&user2.principal, NodeRef::File(x.id), PermissionLevel::Write)
        .await
        .unwrap();
    assert!(decision.is_allowed());

    // user2 can now create inside F; the new folder belongs to user2.
    let made = app.mkdir(&user2, f.id, "from-user2").await;
    assert_eq!(made.owner_id, user2.user_id());
    let root_check = app
        .services
        .permissions
        .check(&user2.principal, NodeRef::Folder(root.id), PermissionLevel::Read)
        .await
        .unwrap();
    assert!(!root_check.is_allowed());
}

#[tokio::test]
async fn test_folder_grant_keeps_more_specific_file_grant() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (user2, _) = app.user().await;
    let permissions = &app.services.permissions;
    let folder = app.mkdir(&owner, root.id, "shared").await;
    let special = app.put(&owner, folder.id, "special.txt", b"s").await;
    let plain = app.put(&owner, folder.id, "plain.txt", b"p").await;

    permissions
        .grant(&owner, grant(NodeRef::File(special.id), user2.user_id(), PermissionLevel::Write))
        .await
        .unwrap();
    let report = permissions
        .grant(&owner, grant(NodeRef::Folder(folder.id), user2.user_id(), PermissionLevel::Read))
        .await
        .unwrap();
    assert!(report.skipped >= 1);

    for (node, level, allowed) in [
        (NodeRef::File(plain.id), PermissionLevel::Read, true),
        (NodeRef::File(plain.id), PermissionLevel::Write, false),
        (NodeRef::File(special.id), PermissionLevel::Write, true),
    ] {
        let decision = permissions.check(&user2.principal, node, level).await.unwrap();
        assert_eq!(decision.is_allowed(), allowed, "{node} at {level}");
    }

    let own = app
        .store
        .find_grant(user2.user_id(), special.id)
        .await
        .unwrap()
        .expect("file grant should survive");
    assert_eq!(own.level, PermissionLevel::Write);
    assert_eq!(own.source_id, special.id);
}

#[tokio::test]
async fn test_new_children_inherit_grants() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (user2, _) = app.user().await;
    let folder = app.mkdir(&owner, root.id, "team").await;
    app.services
        .permissions
        .grant(&owner, grant(NodeRef::Folder(folder.id), user2.user_id(), PermissionLevel::Read))
        .await
        .unwrap();

    let later = app.mkdir(&owner, folder.id, "later").await;
    let file = app.put(&owner, later.id, "late.txt", b"l").await;

    let inherited = app
        .store
        .find_grant(user2.user_id(), file.id)
        .await
        .unwrap()
        .expect("file should inherit the grant");
    assert_eq!(inherited.level, PermissionLevel::Read);
    assert_eq!(inherited.source_id, folder.id);
    assert_eq!(
        app.services.files.read_file(&user2, file.id).await.unwrap().as_ref(),
        b"l"
    );
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (user2, _) = app.user().await;
    let permissions = &app.services.permissions;
    let folder = app.mkdir(&owner, root.id, "F").await;
    let child = app.mkdir(&owner, folder.id, "child").await;
    permissions
        .grant(&owner, grant(NodeRef::Folder(folder.id), user2.user_id(), PermissionLevel::Read))
        .await
        .unwrap();

    let first = permissions
        .revoke(&owner, NodeRef::Folder(folder.id), user2.user_id())
        .await
        .unwrap();
    assert_eq!(first.removed, 2);
    let after_first = app.store.grants_on_many(&[folder.id, child.id]).await.unwrap();

    let second = permissions
        .revoke(&owner, NodeRef::Folder(folder.id), user2.user_id())
        .await
        .unwrap();
    assert_eq!(second.removed, 0);
    let after_second = app.store.grants_on_many(&[folder.id, child.id]).await.unwrap();
    assert_eq!(after_first, after_second);
    assert!(after_second.is_empty());

    let err = app.services.folders.get_folder(&user2, child.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_grant_management_rules() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (user2, _) = app.user().await;
    let (user3, _) = app.user().await;
    let permissions = &app.services.permissions;
    let folder = app.mkdir(&owner, root.id, "F").await;
    let target = NodeRef::Folder(folder.id);

    permissions
        .grant(&owner, grant(target, user2.user_id(), PermissionLevel::Read))
        .await
        .unwrap();

    let err = permissions
        .grant(&owner, grant(target, user2.user_id(), PermissionLevel::Write))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    let err = permissions
        .grant(&owner, grant(target, owner.user_id(), PermissionLevel::Read))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    // user2 can read F but does not own it.
    let err = permissions
        .grant(&user2, grant(target, user3.user_id(), PermissionLevel::Read))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);
    let err = permissions.list_grants(&user2, target).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);

    // user3 cannot see F at all.
    let err = permissions.list_grants(&user3, target).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    permissions
        .change(&owner, grant(target, user2.user_id(), PermissionLevel::Write))
        .await
        .unwrap();
    let grants = permissions.list_grants(&owner, target).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].level, PermissionLevel::Write);
    assert!(grants[0].is_explicit());

    let admin = RequestContext::new(Principal::unrestricted_admin(Uuid::new_v4()));
    assert_eq!(permissions.list_grants(&admin, target).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_existence_policy() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (reader, _) = app.user().await;
    let (stranger, _) = app.user().await;
    let folder = app.mkdir(&owner, root.id, "F").await;
    app.services
        .permissions
        .grant(&owner, grant(NodeRef::Folder(folder.id), reader.user_id(), PermissionLevel::Read))
        .await
        .unwrap();
    let folders = &app.services.folders;

    let err = folders.create_folder(&reader, folder.id, "nope").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);

    let err = folders.create_folder(&stranger, folder.id, "nope").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = folders.get_folder(&stranger, folder.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let decision = app
        .services
        .permissions
        .check(&stranger.principal, NodeRef::Folder(folder.id), PermissionLevel::Read)
        .await
        .unwrap();
    assert!(!decision.is_allowed());

    let restricted = Principal::restricted_admin(Uuid::new_v4());
    let decision = app
        .services
        .permissions
        .check(&restricted, NodeRef::Folder(folder.id), PermissionLevel::Read)
        .await
        .unwrap();
    assert!(!decision.is_allowed());

    let admin = RequestContext::new(Principal::unrestricted_admin(Uuid::new_v4()));
    assert_eq!(folders.get_folder(&admin, folder.id).await.unwrap().id, folder.id);
}

#[tokio::test]
async fn test_favorites_follow_visibility() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (user2, _) = app.user().await;
    let favorites = &app.services.favorites;
    let folder = app.mkdir(&owner, root.id, "F").await;
    let node = NodeRef::Folder(folder.id);

    let err = favorites.mark(&user2, node).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    app.services
        .permissions
        .grant(&owner, grant(node, user2.user_id(), PermissionLevel::Read))
        .await
        .unwrap();
    assert!(favorites.mark(&user2, node).await.unwrap());
    assert!(!favorites.mark(&user2, node).await.unwrap());
    let listed = favorites.list(&user2).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].target(), node);

    app.services
        .permissions
        .revoke(&owner, node, user2.user_id())
        .await
        .unwrap();
    assert!(favorites.list(&user2).await.unwrap().is_empty());

    assert!(favorites.mark(&owner, node).await.unwrap());
    app.services.folders.delete_folder(&owner, folder.id).await.unwrap();
    assert!(favorites.list(&owner).await.unwrap().is_empty());
    assert!(!favorites.unmark(&owner, node).await.unwrap());
}

#[tokio::test]
async fn test_folder_owner_keeps_write_below_a_lower_grant() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (user2, _) = app.user().await;
    let permissions = &app.services.permissions;
    let f = app.mkdir(&owner, root.id, "F").await;
    permissions
        .grant(&owner, grant(NodeRef::Folder(f.id), user2.user_id(), PermissionLevel::Write))
        .await
        .unwrap();

    let c = app.mkdir(&user2, f.id, "C").await;
    assert_eq!(c.owner_id, user2.user_id());
    permissions
        .grant(&user2, grant(NodeRef::Folder(c.id), owner.user_id(), PermissionLevel::Read))
        .await
        .unwrap();

    let decision = permissions
        .check(&owner.principal, NodeRef::Folder(c.id), PermissionLevel::Write)
        .await
        .unwrap();
    assert!(decision.is_allowed());
    let x = app.mkdir(&owner, c.id, "x").await;
    assert_eq!(x.owner_id, owner.user_id());
}

#[tokio::test]
async fn test_grant_racing_delete_leaves_no_rows() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (user2, _) = app.user().await;
    let f = app.mkdir(&owner, root.id, "F").await;
    let sub = app.mkdir(&owner, f.id, "sub").await;

    let gate = app.store.hold_next_commit();
    let granting = app.services.permissions.grant(
        &owner,
        grant(NodeRef::Folder(f.id), user2.user_id(), PermissionLevel::Read),
    );
    let deleting = async {
        gate.reached().await;
        let deleted = app.services.folders.delete_folder(&owner, f.id).await;
        gate.release();
        deleted
    };
    let (granted, deleted) = tokio::join!(granting, deleting);

    assert_eq!(deleted.unwrap().value.folders, 2);
    assert_eq!(granted.unwrap_err().kind, ErrorKind::NotFound);
    let left = app.store.grants_on_many(&[f.id, sub.id]).await.unwrap();
    assert!(left.is_empty());
}

#[tokio::test]
async fn test_move_fails_when_grant_is_revoked_before_commit() {
    let app = helpers::TestApp::new().await;
    let (owner, root) = app.user().await;
    let (user2, _) = app.user().await;
    let f = app.mkdir(&owner, root.id, "F").await;
    let x = app.mkdir(&owner, f.id, "x").await;
    let y = app.mkdir(&owner, f.id, "y").await;
    app.services
        .permissions
        .grant(&owner, grant(NodeRef::Folder(f.id), user2.user_id(), PermissionLevel::Write))
        .await
        .unwrap();

    let gate = app.store.hold_next_commit();
    let moving = app.services.folders.move_folder(&user2, x.id, y.id);
    let revoking = async {
        gate.reached().await;
        let revoked = app
            .services
            .permissions
            .revoke(&owner, NodeRef::Folder(f.id), user2.user_id())
            .await;
        gate.release();
        revoked
    };
    let (moved, revoked) = tokio::join!(moving, revoking);

    assert_eq!(revoked.unwrap().removed, 3);
    assert_eq!(moved.unwrap_err().kind, ErrorKind::Conflict);
    assert_eq!(app.folder(x.id).await.parent_id, Some(f.id));
    app.assert_aggregates_consistent(root.id).await;
}

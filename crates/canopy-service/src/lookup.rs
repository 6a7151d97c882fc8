//! Node loading and access guards shared by the services.

use uuid::Uuid;

use canopy_auth::{AccessSource, EffectiveAccess, PermissionResolver};
use canopy_core::AppError;
use canopy_core::result::AppResult;
use canopy_database::{ChangeSet, Precondition, TreeStore};
use canopy_entity::NodeRef;
use canopy_entity::file::File;
use canopy_entity::folder::Folder;
use canopy_entity::permission::PermissionLevel;
use canopy_entity::user::Principal;

/// A loaded folder or file.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Folder(Folder),
    File(File),
}

impl Node {
    pub(crate) fn owner_id(&self) -> Uuid {
        match self {
            Self::Folder(f) => f.owner_id,
            Self::File(f) => f.owner_id,
        }
    }
}

pub(crate) async fn folder(store: &dyn TreeStore, id: Uuid) -> AppResult<Folder> {
    store
        .find_folder(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Folder {id} not found")))
}

pub(crate) async fn file(store: &dyn TreeStore, id: Uuid) -> AppResult<File> {
    store
        .find_file(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("File {id} not found")))
}

pub(crate) async fn node(store: &dyn TreeStore, target: NodeRef) -> AppResult<Node> {
    match target {
        NodeRef::Folder(id) => Ok(Node::Folder(folder(store, id).await?)),
        NodeRef::File(id) => Ok(Node::File(file(store, id).await?)),
    }
}

/// Effective access on a loaded node.
pub(crate) async fn access(
    resolver: &PermissionResolver,
    principal: &Principal,
    node: &Node,
) -> AppResult<EffectiveAccess> {
    match node {
        Node::Folder(f) => resolver.folder_access(principal, f).await,
        Node::File(f) => resolver.file_access(principal, f).await,
    }
}

/// Load `target` and require `level` on it.
pub(crate) async fn require(
    store: &dyn TreeStore,
    resolver: &PermissionResolver,
    principal: &Principal,
    target: NodeRef,
    level: PermissionLevel,
) -> AppResult<Node> {
    let node = node(store, target).await?;
    match &node {
        Node::Folder(f) => resolver.require_folder(principal, f, level).await?,
        Node::File(f) => resolver.require_file(principal, f, level).await?,
    };
    Ok(node)
}

/// Guard for structural changes to a folder.
///
/// Checks visibility first, then root immutability, then write access.
pub(crate) async fn require_mutable_folder(
    resolver: &PermissionResolver,
    principal: &Principal,
    folder: &Folder,
) -> AppResult<EffectiveAccess> {
    let access = resolver.folder_access(principal, folder).await?;
    if !access.allows(PermissionLevel::Read) {
        return Err(AppError::not_found(format!("Folder {} not found", folder.id)));
    }
    if folder.is_root() {
        return Err(AppError::root_immutable(
            "The root folder cannot be renamed, moved or deleted",
        ));
    }
    if !access.allows(PermissionLevel::Write) {
        return Err(AppError::permission_denied(format!(
            "write access required on folder {}",
            folder.id
        )));
    }
    Ok(access)
}

/// Re-check at commit time a level that was granted through a grant row.
///
/// Ownership needs no such check: owners never change, and the ancestor
/// chain preconditions catch a node leaving an owned subtree.
pub(crate) fn hold_access(
    changes: &mut ChangeSet,
    principal: &Principal,
    access: &EffectiveAccess,
    level: PermissionLevel,
) {
    if let AccessSource::Grant { node, .. } = access.source {
        changes.require(Precondition::GrantHeld {
            user_id: principal.user_id,
            target_id: node.id(),
            level,
        });
    }
}

/// Only the node owner or an unrestricted administrator manages grants.
///
/// Callers that cannot read the node get `NotFound`.
pub(crate) async fn require_grant_manager(
    store: &dyn TreeStore,
    resolver: &PermissionResolver,
    principal: &Principal,
    target: NodeRef,
) -> AppResult<Node> {
    let node = node(store, target).await?;
    if principal.is_unrestricted_admin() || node.owner_id() == principal.user_id {
        return Ok(node);
    }
    let access = access(resolver, principal, &node).await?;
    if !access.allows(PermissionLevel::Read) {
        return Err(AppError::not_found(format!("{target} not found")));
    }
    Err(AppError::permission_denied(format!(
        "Only the owner of {target} can manage its grants"
    )))
}

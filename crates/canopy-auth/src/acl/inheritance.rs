//! Folder-chain inheritance walk.
//!
//! Rules, applied in order:
//! - Owning the node (or, for a file, its containing folder) grants full access.
//! - Unrestricted administrators get full access; restricted ones get none.
//! - Owning any ancestor grants full access, whatever grant rows sit below it.
//! - Otherwise the nearest grant row on the way up is decisive, even when its
//!   level is lower than a grant further up.

use std::collections::HashMap;

use uuid::Uuid;

use canopy_entity::NodeRef;
use canopy_entity::file::File;
use canopy_entity::folder::Folder;
use canopy_entity::permission::PermissionGrant;
use canopy_entity::user::Principal;

use super::checker::EffectiveAccess;

/// Resolve a caller's effective access.
///
/// `chain` is the containing folder's ancestor chain, root first, ending with
/// the target folder (or the file's folder). `grants` holds the caller's rows
/// keyed by target ID.
pub fn resolve_access(
    principal: &Principal,
    file: Option<&File>,
    chain: &[Folder],
    grants: &HashMap<Uuid, PermissionGrant>,
) -> EffectiveAccess {
    let user_id = principal.user_id;
    let Some(nearest) = chain.last() else {
        return EffectiveAccess::denied();
    };

    if let Some(file) = file {
        if file.owner_id == user_id {
            return EffectiveAccess::owner(NodeRef::File(file.id));
        }
    }
    if nearest.owner_id == user_id {
        return EffectiveAccess::owner(NodeRef::Folder(nearest.id));
    }

    if principal.is_unrestricted_admin() {
        return EffectiveAccess::admin();
    }
    if principal.is_restricted_admin() {
        return EffectiveAccess::denied();
    }

    if let Some(owned) = chain.iter().rev().find(|f| f.owner_id == user_id) {
        return EffectiveAccess::owner(NodeRef::Folder(owned.id));
    }

    if let Some(file) = file {
        if let Some(grant) = grants.get(&file.id) {
            return EffectiveAccess::grant(NodeRef::File(file.id), grant.source_id, grant.level);
        }
    }

    for folder in chain.iter().rev() {
        if let Some(grant) = grants.get(&folder.id) {
            return EffectiveAccess::grant(NodeRef::Folder(folder.id), grant.source_id, grant.level);
        }
    }

    EffectiveAccess::denied()
}

/// Index a caller's grant rows by target ID.
pub fn index_grants(grants: Vec<PermissionGrant>) -> HashMap<Uuid, PermissionGrant> {
    grants.into_iter().map(|g| (g.target_id, g)).collect()
}

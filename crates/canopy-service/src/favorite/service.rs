//! Mark, unmark and list favorite folders and files.

use std::sync::Arc;

use tracing::{debug, info};

use canopy_auth::PermissionResolver;
use canopy_core::ErrorKind;
use canopy_core::result::AppResult;
use canopy_database::{Change, ChangeSet, TreeStore};
use canopy_entity::NodeRef;
use canopy_entity::favorite::Favorite;
use canopy_entity::permission::PermissionLevel;

use crate::context::RequestContext;
use crate::lookup;

/// Manages per-user favorite markers.
#[derive(Debug, Clone)]
pub struct FavoriteService {
    store: Arc<dyn TreeStore>,
    resolver: Arc<PermissionResolver>,
}

impl FavoriteService {
    /// Creates a new favorite service.
    pub fn new(store: Arc<dyn TreeStore>, resolver: Arc<PermissionResolver>) -> Self {
        Self { store, resolver }
    }

    /// Marks a readable node. Returns `false` if it was already marked.
    pub async fn mark(&self, ctx: &RequestContext, target: NodeRef) -> AppResult<bool> {
        lookup::require(
            self.store.as_ref(),
            &self.resolver,
            &ctx.principal,
            target,
            PermissionLevel::Read,
        )
        .await?;
        if self.store.is_favorite(ctx.user_id(), target).await? {
            return Ok(false);
        }

        let mut changes = ChangeSet::new();
        changes.push(Change::InsertFavorite(Favorite::new(ctx.user_id(), target)));
        self.store.commit(changes).await?;

        info!(user_id = %ctx.user_id(), target = %target, "Favorite marked");
        Ok(true)
    }

    /// Removes a marker. Returns `false` if there was none.
    pub async fn unmark(&self, ctx: &RequestContext, target: NodeRef) -> AppResult<bool> {
        if !self.store.is_favorite(ctx.user_id(), target).await? {
            return Ok(false);
        }

        let mut changes = ChangeSet::new();
        changes.push(Change::DeleteFavorite {
            user_id: ctx.user_id(),
            target,
        });
        self.store.commit(changes).await?;

        info!(user_id = %ctx.user_id(), target = %target, "Favorite removed");
        Ok(true)
    }

    /// The caller's favorites that are still readable, newest first.
    pub async fn list(&self, ctx: &RequestContext) -> AppResult<Vec<Favorite>> {
        let marked = self.store.favorites_for_user(ctx.user_id()).await?;
        let mut visible = Vec::with_capacity(marked.len());
        for favorite in marked {
            match self
                .resolver
                .check(&ctx.principal, favorite.target(), PermissionLevel::Read)
                .await
            {
                Ok(decision) if decision.is_allowed() => visible.push(favorite),
                Ok(_) => {
                    debug!(target = %favorite.target(), "Skipping favorite no longer readable");
                }
                Err(e) if e.is(ErrorKind::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(visible)
    }
}

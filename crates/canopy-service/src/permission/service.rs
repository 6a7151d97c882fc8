//! Grant management: grant, change, revoke, list and check.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use canopy_auth::{Decision, PermissionPropagator, PermissionResolver, PropagationReport};
use canopy_core::AppError;
use canopy_core::result::AppResult;
use canopy_database::{ChangeSet, TreeStore};
use canopy_entity::NodeRef;
use canopy_entity::permission::{PermissionGrant, PermissionLevel};
use canopy_entity::user::Principal;

use crate::context::RequestContext;
use crate::lookup;

/// Request to grant or change access.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GrantRequest {
    /// Node receiving the grant.
    pub target: NodeRef,
    /// User receiving access.
    pub user_id: Uuid,
    /// Access level.
    pub level: PermissionLevel,
}

/// Manages permission grants on folders and files.
#[derive(Debug, Clone)]
pub struct PermissionService {
    /// Relational tree store.
    store: Arc<dyn TreeStore>,
    /// Permission resolver.
    resolver: Arc<PermissionResolver>,
    /// Grant propagator.
    propagator: Arc<PermissionPropagator>,
}

impl PermissionService {
    /// Creates a new permission service.
    pub fn new(
        store: Arc<dyn TreeStore>,
        resolver: Arc<PermissionResolver>,
        propagator: Arc<PermissionPropagator>,
    ) -> Self {
        Self {
            store,
            resolver,
            propagator,
        }
    }

    /// Answers whether `principal` holds `required` on `target`.
    pub async fn check(
        &self,
        principal: &Principal,
        target: NodeRef,
        required: PermissionLevel,
    ) -> AppResult<Decision> {
        self.resolver.check(principal, target, required).await
    }

    /// Grants `level` on the target and every node below it that has no
    /// grant of its own for the user.
    pub async fn grant(
        &self,
        ctx: &RequestContext,
        req: GrantRequest,
    ) -> AppResult<PropagationReport> {
        self.ensure_manageable(ctx, &req).await?;

        let mut changes = ChangeSet::new();
        let report = self
            .propagator
            .grant(req.target, req.user_id, req.level, ctx.user_id(), &mut changes)
            .await?;
        self.store.commit(changes).await?;

        info!(
            granted_by = %ctx.user_id(),
            user_id = %req.user_id,
            target = %req.target,
            level = %req.level,
            created = report.created,
            skipped = report.skipped,
            "Permission granted"
        );
        Ok(report)
    }

    /// Changes the level of an existing grant and re-propagates it.
    pub async fn change(
        &self,
        ctx: &RequestContext,
        req: GrantRequest,
    ) -> AppResult<PropagationReport> {
        self.ensure_manageable(ctx, &req).await?;

        let mut changes = ChangeSet::new();
        let report = self
            .propagator
            .change(req.target, req.user_id, req.level, ctx.user_id(), &mut changes)
            .await?;
        self.store.commit(changes).await?;

        info!(
            granted_by = %ctx.user_id(),
            user_id = %req.user_id,
            target = %req.target,
            level = %req.level,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "Permission changed"
        );
        Ok(report)
    }

    /// Revokes a user's grant on the target and its lineage below.
    ///
    /// Revoking a grant that does not exist succeeds with nothing removed.
    pub async fn revoke(
        &self,
        ctx: &RequestContext,
        target: NodeRef,
        user_id: Uuid,
    ) -> AppResult<PropagationReport> {
        lookup::require_grant_manager(
            self.store.as_ref(),
            &self.resolver,
            &ctx.principal,
            target,
        )
        .await?;

        let mut changes = ChangeSet::new();
        let report = self.propagator.revoke(target, user_id, &mut changes).await?;
        if changes.is_empty() {
            return Ok(report);
        }
        self.store.commit(changes).await?;

        info!(
            revoked_by = %ctx.user_id(),
            user_id = %user_id,
            target = %target,
            removed = report.removed,
            skipped = report.skipped,
            "Permission revoked"
        );
        Ok(report)
    }

    /// Lists every grant row on a node.
    pub async fn list_grants(
        &self,
        ctx: &RequestContext,
        target: NodeRef,
    ) -> AppResult<Vec<PermissionGrant>> {
        lookup::require_grant_manager(
            self.store.as_ref(),
            &self.resolver,
            &ctx.principal,
            target,
        )
        .await?;
        self.store.grants_on(target.id()).await
    }

    async fn ensure_manageable(&self, ctx: &RequestContext, req: &GrantRequest) -> AppResult<()> {
        let node = lookup::require_grant_manager(
            self.store.as_ref(),
            &self.resolver,
            &ctx.principal,
            req.target,
        )
        .await?;
        if node.owner_id() == req.user_id {
            return Err(AppError::validation(
                "The owner already has full access and cannot receive a grant",
            ));
        }
        Ok(())
    }
}

//! Wires every service from a tree store, an object store and the config.

use std::sync::Arc;

use canopy_auth::{PermissionPropagator, PermissionResolver};
use canopy_core::config::AppConfig;
use canopy_core::traits::storage::ObjectStore;
use canopy_database::TreeStore;

use crate::effects::StorageEffects;
use crate::favorite::FavoriteService;
use crate::file::FileService;
use crate::folder::{FolderService, TreeService};
use crate::path::PathVirtualizer;
use crate::permission::PermissionService;
use crate::repair::RepairService;
use crate::size::SizeAggregator;

/// All services sharing one set of collaborators.
#[derive(Debug, Clone)]
pub struct Services {
    /// Folder mutations and reads.
    pub folders: FolderService,
    /// Tree views.
    pub tree: TreeService,
    /// File mutations and reads.
    pub files: FileService,
    /// Grant management.
    pub permissions: PermissionService,
    /// Favorite markers.
    pub favorites: FavoriteService,
    /// Repair ticket processing.
    pub repairs: RepairService,
    /// Path computation.
    pub paths: Arc<PathVirtualizer>,
    /// Subtree statistics.
    pub sizes: Arc<SizeAggregator>,
}

impl Services {
    /// Build every service.
    pub fn new(
        store: Arc<dyn TreeStore>,
        objects: Arc<dyn ObjectStore>,
        config: &AppConfig,
    ) -> Self {
        let resolver = Arc::new(PermissionResolver::new(Arc::clone(&store)));
        let propagator = Arc::new(PermissionPropagator::new(Arc::clone(&store)));
        let paths = Arc::new(PathVirtualizer::new(
            Arc::clone(&store),
            config.tree.storage_key_length,
        ));
        let sizes = Arc::new(SizeAggregator::new(Arc::clone(&store)));
        let effects = Arc::new(StorageEffects::new(
            Arc::clone(&objects),
            Arc::clone(&store),
        ));

        Self {
            folders: FolderService::new(
                Arc::clone(&store),
                Arc::clone(&resolver),
                Arc::clone(&propagator),
                Arc::clone(&paths),
                Arc::clone(&sizes),
                Arc::clone(&effects),
                config.tree.clone(),
            ),
            tree: TreeService::new(Arc::clone(&store), Arc::clone(&resolver), Arc::clone(&paths)),
            files: FileService::new(
                Arc::clone(&store),
                Arc::clone(&objects),
                Arc::clone(&resolver),
                Arc::clone(&propagator),
                Arc::clone(&paths),
                Arc::clone(&effects),
                config.tree.clone(),
                config.storage.max_object_size_bytes,
            ),
            permissions: PermissionService::new(
                Arc::clone(&store),
                Arc::clone(&resolver),
                Arc::clone(&propagator),
            ),
            favorites: FavoriteService::new(Arc::clone(&store), Arc::clone(&resolver)),
            repairs: RepairService::new(
                Arc::clone(&store),
                objects,
                effects,
                Arc::clone(&paths),
            ),
            paths,
            sizes,
        }
    }
}

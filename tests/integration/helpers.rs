//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::Notify;
use uuid::Uuid;

use canopy_core::config::AppConfig;
use canopy_core::error::AppError;
use canopy_core::result::AppResult;
use canopy_core::traits::storage::{ObjectStore, StoredObjectMeta};
use canopy_database::{ChangeSet, MemoryTreeStore, SubtreeSnapshot, TreeStore};
use canopy_entity::NodeRef;
use canopy_entity::favorite::Favorite;
use canopy_entity::file::File;
use canopy_entity::folder::{Folder, SubtreeStats};
use canopy_entity::permission::PermissionGrant;
use canopy_entity::repair::RepairTicket;
use canopy_service::{CreateFileRequest, RequestContext, Services, SizeAggregator};
use canopy_storage::LocalStorageProvider;

/// Object store over a temp directory whose mutations can be switched off.
///
/// `put` and reads always work; directory and object mutations fail while
/// `offline` is set.
#[derive(Debug)]
pub struct FlakyObjectStore {
    inner: LocalStorageProvider,
    offline: AtomicBool,
}

impl FlakyObjectStore {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::storage("object store offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FlakyObjectStore {
    fn provider_type(&self) -> &str {
        "flaky-local"
    }
    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
    async fn put(&self, address: &str, data: Bytes) -> AppResult<()> {
        self.inner.put(address, data).await
    }
    async fn read_bytes(&self, address: &str) -> AppResult<Bytes> {
        self.inner.read_bytes(address).await
    }
    async fn exists(&self, address: &str) -> AppResult<bool> {
        self.inner.exists(address).await
    }
    async fn delete(&self, address: &str) -> AppResult<()> {
        self.check()?;
        self.inner.delete(address).await
    }
    async fn delete_dir(&self, address: &str) -> AppResult<()> {
        self.check()?;
        self.inner.delete_dir(address).await
    }
    async fn create_dir(&self, address: &str) -> AppResult<()> {
        self.check()?;
        self.inner.create_dir(address).await
    }
    async fn rename(&self, from: &str, to: &str) -> AppResult<()> {
        self.check()?;
        self.inner.rename(from, to).await
    }
    async fn size(&self, address: &str) -> AppResult<u64> {
        self.inner.size(address).await
    }
    async fn mime_type(&self, address: &str) -> AppResult<String> {
        self.inner.mime_type(address).await
    }
    async fn metadata(&self, address: &str) -> AppResult<StoredObjectMeta> {
        self.inner.metadata(address).await
    }
}

/// Parks one commit until the test lets it through.
#[derive(Debug, Default)]
pub struct CommitGate {
    reached: Notify,
    release: Notify,
}

impl CommitGate {
    /// Wait until the held commit has been submitted.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the held commit proceed.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// In-memory tree store whose commits can be made to fail or be held back.
#[derive(Debug, Default)]
pub struct FlakyTreeStore {
    inner: MemoryTreeStore,
    reject_commits: AtomicBool,
    gate: Mutex<Option<Arc<CommitGate>>>,
}

impl FlakyTreeStore {
    pub fn set_reject_commits(&self, reject: bool) {
        self.reject_commits.store(reject, Ordering::SeqCst);
    }

    /// Hold the next commit at the gate. Later commits pass straight through.
    pub fn hold_next_commit(&self) -> Arc<CommitGate> {
        let gate = Arc::new(CommitGate::default());
        *self.gate.lock().expect("gate lock poisoned") = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl TreeStore for FlakyTreeStore {
    async fn find_folder(&self, id: Uuid) -> AppResult<Option<Folder>> {
        self.inner.find_folder(id).await
    }
    async fn find_file(&self, id: Uuid) -> AppResult<Option<File>> {
        self.inner.find_file(id).await
    }
    async fn find_root(&self, owner_id: Uuid) -> AppResult<Option<Folder>> {
        self.inner.find_root(owner_id).await
    }
    async fn ancestors(&self, folder_id: Uuid) -> AppResult<Vec<Folder>> {
        self.inner.ancestors(folder_id).await
    }
    async fn child_folders(&self, parent_id: Uuid) -> AppResult<Vec<Folder>> {
        self.inner.child_folders(parent_id).await
    }
    async fn files_in(&self, folder_id: Uuid) -> AppResult<Vec<File>> {
        self.inner.files_in(folder_id).await
    }
    async fn subtree(&self, folder_id: Uuid) -> AppResult<Option<SubtreeSnapshot>> {
        self.inner.subtree(folder_id).await
    }
    async fn find_grant(&self, user_id: Uuid, target_id: Uuid) -> AppResult<Option<PermissionGrant>> {
        self.inner.find_grant(user_id, target_id).await
    }
    async fn grants_for_user(
        &self,
        user_id: Uuid,
        target_ids: &[Uuid],
    ) -> AppResult<Vec<PermissionGrant>> {
        self.inner.grants_for_user(user_id, target_ids).await
    }
    async fn grants_on(&self, target_id: Uuid) -> AppResult<Vec<PermissionGrant>> {
        self.inner.grants_on(target_id).await
    }
    async fn grants_on_many(&self, target_ids: &[Uuid]) -> AppResult<Vec<PermissionGrant>> {
        self.inner.grants_on_many(target_ids).await
    }
    async fn favorites_for_user(&self, user_id: Uuid) -> AppResult<Vec<Favorite>> {
        self.inner.favorites_for_user(user_id).await
    }
    async fn is_favorite(&self, user_id: Uuid, target: NodeRef) -> AppResult<bool> {
        self.inner.is_favorite(user_id, target).await
    }
    async fn commit(&self, changes: ChangeSet) -> AppResult<()> {
        if self.reject_commits.load(Ordering::SeqCst) {
            return Err(AppError::database("connection reset during commit"));
        }
        let gate = self.gate.lock().expect("gate lock poisoned").take();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        self.inner.commit(changes).await
    }
    async fn open_repair(&self, ticket: RepairTicket) -> AppResult<()> {
        self.inner.open_repair(ticket).await
    }
    async fn pending_repairs(&self, limit: i64, max_attempts: i32) -> AppResult<Vec<RepairTicket>> {
        self.inner.pending_repairs(limit, max_attempts).await
    }
    async fn record_repair_failure(&self, id: Uuid, error: &str) -> AppResult<()> {
        self.inner.record_repair_failure(id, error).await
    }
    async fn close_repair(&self, id: Uuid) -> AppResult<()> {
        self.inner.close_repair(id).await
    }
}

/// Test application context
pub struct TestApp {
    /// All services wired over the stores below
    pub services: Services,
    /// Relational store
    pub store: Arc<FlakyTreeStore>,
    /// Object store
    pub objects: Arc<FlakyObjectStore>,
    /// Application config
    pub config: AppConfig,
    /// Keeps the object directory alive
    pub dir: TempDir,
}

impl TestApp {
    /// Create a new test application
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let inner = LocalStorageProvider::new(dir.path())
            .await
            .expect("Failed to init storage");
        let objects = Arc::new(FlakyObjectStore {
            inner,
            offline: AtomicBool::new(false),
        });
        let store = Arc::new(FlakyTreeStore::default());
        let config = AppConfig::default();
        let services = Services::new(store.clone(), objects.clone(), &config);

        Self {
            services,
            store,
            objects,
            config,
            dir,
        }
    }

    /// Provision a new user and return its context and root folder
    pub async fn user(&self) -> (RequestContext, Folder) {
        let user_id = Uuid::new_v4();
        let outcome = self
            .services
            .folders
            .provision_root(user_id)
            .await
            .expect("Failed to provision root");
        (RequestContext::user(user_id), outcome.into_value())
    }

    /// Create a folder, expecting a clean outcome
    pub async fn mkdir(&self, ctx: &RequestContext, parent: Uuid, name: &str) -> Folder {
        let outcome = self
            .services
            .folders
            .create_folder(ctx, parent, name)
            .await
            .expect("Failed to create folder");
        assert!(!outcome.is_degraded(), "unexpected warnings: {:?}", outcome.warnings);
        outcome.into_value()
    }

    /// Store a file with the given content
    pub async fn put(&self, ctx: &RequestContext, folder_id: Uuid, name: &str, data: &[u8]) -> File {
        self.services
            .files
            .create_file(
                ctx,
                CreateFileRequest {
                    folder_id,
                    name: name.to_string(),
                    mime_type: None,
                },
                Bytes::copy_from_slice(data),
            )
            .await
            .expect("Failed to create file")
            .into_value()
    }

    /// Reload a folder from the store
    pub async fn folder(&self, id: Uuid) -> Folder {
        self.store
            .find_folder(id)
            .await
            .expect("store read failed")
            .expect("folder should exist")
    }

    /// Assert that a physical address exists in the object store
    pub async fn assert_stored(&self, address: &str) {
        assert!(
            self.objects.exists(address).await.expect("stat failed"),
            "expected {address} to exist"
        );
    }

    /// Assert that a physical address is absent from the object store
    pub async fn assert_not_stored(&self, address: &str) {
        assert!(
            !self.objects.exists(address).await.expect("stat failed"),
            "expected {address} to be gone"
        );
    }

    /// Number of entries stored directly under an address
    pub fn entries(&self, address: &str) -> usize {
        std::fs::read_dir(self.dir.path().join(address))
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    /// Assert that every folder's stored counters match a full recount
    pub async fn assert_aggregates_consistent(&self, root_id: Uuid) {
        let snapshot = self
            .store
            .subtree(root_id)
            .await
            .expect("store read failed")
            .expect("root should exist");
        let computed = SizeAggregator::compute(&snapshot);
        for (folder, _) in snapshot.pre_order() {
            assert_eq!(
                SubtreeStats::from(folder),
                computed[&folder.id],
                "counters of folder '{}' drifted",
                folder.name
            );
        }
    }
}

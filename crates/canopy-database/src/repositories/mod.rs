//! Repository implementations for all Canopy tables.

pub mod favorite;
pub mod file;
pub mod folder;
pub mod permission;
pub mod repair;

pub use favorite::FavoriteRepository;
pub use file::FileRepository;
pub use folder::FolderRepository;
pub use permission::GrantRepository;
pub use repair::RepairRepository;

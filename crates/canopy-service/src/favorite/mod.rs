//! Favorite markers.

pub mod service;

pub use service::FavoriteService;

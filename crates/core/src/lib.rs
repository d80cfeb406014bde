#![warn(clippy::all, missing_docs)]

//! Core domain logic for GameShelf.
//!
//! This crate hosts the data models, configuration handling, game
//! discovery and change tracking, cache reconciliation, and persistence
//! used by the terminal UI and any future frontends.

pub mod config;
pub mod error;
pub mod library;
pub mod models;
pub mod service;
pub mod store;

pub use config::AppConfig;
pub use error::{EditError, LaunchError, ScanError, ServiceError, WatchError};
pub use library::MetadataEdit;
pub use models::{CacheEntry, GameCache, GameRecord, RawGameEntry};
pub use service::{LibraryEvent, LibraryHandle, LibraryService};
pub use store::{PersistentStore, StoreState};

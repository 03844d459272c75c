//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IObjectStore`] - S3-compatible object storage primitives
//! - [`IStoreResolver`] - Maps a storage profile to a connected store
//! - [`ILocalFileSystem`] - Local filesystem walking, I/O and fingerprints

pub mod local_filesystem;
pub mod object_store;

pub use local_filesystem::{FileSystemState, ILocalFileSystem, LocalFileInfo, LocalWalk};
pub use object_store::{IObjectStore, IStoreResolver, ObjectInfo, ObjectPage};

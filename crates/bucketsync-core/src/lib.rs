//! bucketsync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `FileEntry`, `SyncOperation`, `SyncResult`, `Task`, `SyncEvent`
//! - **Port definitions** - Traits for adapters: `IObjectStore`, `IStoreResolver`, `ILocalFileSystem`
//! - **Configuration** - YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! The domain module holds plain data and state machines with no I/O.
//! Ports define trait interfaces that adapter crates implement; the sync
//! engine in `bucketsync-sync` orchestrates domain types through them.

pub mod config;
pub mod domain;
pub mod ports;

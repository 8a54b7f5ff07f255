//! gitsync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncState`, `SyncOutcome`, `RepositoryHandle`, `ConflictSegment`
//! - **Port definitions** - Traits for adapters: `IVersionControl`, `INotificationService`, `IConnectivity`
//! - **Configuration** - YAML-backed settings with validation and a builder
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates implement.

pub mod config;
pub mod domain;
pub mod ports;

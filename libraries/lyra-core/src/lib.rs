//! Lyra - Core Types
//!
//! Shared types and collaborator interfaces for the Lyra playback engine.
//!
//! This crate provides:
//! - `Song` and id types used across the engine
//! - Play mode and queue metadata types
//! - Repository traits for the catalog/queue/preferences services
//! - Host collaborator traits (audio URL resolution, offline state,
//!   media session)
//!
//! # Architecture
//!
//! `lyra-core` has no runtime of its own: it is the seam between the
//! playback engine and its environment. The engine talks to the server
//! through the repository traits and to the host platform through the
//! collaborator traits; both are implemented out of tree.

pub mod error;
pub mod repository;
pub mod types;

pub use error::{CoreError, RepositoryError, Result};
pub use types::{PlayMode, Song, SongId, SongKind, SortField, SortOrder};

//! HTTP server for the keg NuGet feed.
//!
//! This crate provides:
//! - The indexing pipeline shared by push and mirroring
//! - Read-through mirroring of an upstream V3 or V2 feed
//! - Deletion policies
//! - The NuGet V3 HTTP surface

pub mod auth;
pub mod content;
pub mod deletion;
pub mod error;
pub mod handlers;
pub mod indexing;
pub mod metrics;
pub mod mirror;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use indexing::{IndexingPipeline, IndexingResult};
pub use mirror::{MirrorClient, MirrorService};
pub use routes::create_router;
pub use state::AppState;

//! Remote catalog/configuration service.
//!
//! The playback engine only needs [`Catalog::chunks`]; the rest serves camera selection,
//! day browsing and mat annotations.

pub mod client;
pub mod types;

use std::fmt;

use crate::core::chunk_index::ChunkEntry;

pub use client::CatalogClient;
pub use types::{CameraConfig, CameraConfigs, ChunkGroup, MatInfo, MatPatch};

#[derive(Debug)]
pub enum CatalogError {
    /// Transport failure or timeout
    Http(String),
    /// Unexpected status for an operation that must succeed
    Status(u16),
    /// Body did not match the expected shape
    Decode(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Http(msg) => write!(f, "catalog request failed: {}", msg),
            CatalogError::Status(code) => write!(f, "catalog returned HTTP {}", code),
            CatalogError::Decode(msg) => write!(f, "catalog response invalid: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Catalog operations. Implementations block; callers never hold a lock across them.
pub trait Catalog: Send + Sync {
    /// Segments of one camera for one day. Empty when not (yet) available.
    fn chunks(&self, day: &str, camera: u32) -> Result<Vec<ChunkEntry>, CatalogError>;

    /// Camera placements for a day. Empty when the day is unknown.
    fn cams(&self, day: &str) -> Result<CameraConfigs, CatalogError>;

    /// Recorded days, sorted ascending
    fn days(&self) -> Result<Vec<String>, CatalogError>;

    fn assign_camera(&self, day: &str, camera: u32, config: CameraConfig) -> Result<(), CatalogError>;

    fn delete_day(&self, day: &str) -> Result<(), CatalogError>;

    fn mat(&self, day: &str, mat: u32) -> Result<MatInfo, CatalogError>;

    fn patch_mat(&self, day: &str, mat: u32, patch: &MatPatch) -> Result<(), CatalogError>;

    fn player_camera(&self, player: &str) -> Result<Option<u32>, CatalogError>;

    fn set_player_camera(&self, player: &str, camera: Option<u32>) -> Result<(), CatalogError>;

    fn recording(&self) -> Result<bool, CatalogError>;

    fn set_recording(&self, on: bool) -> Result<(), CatalogError>;
}

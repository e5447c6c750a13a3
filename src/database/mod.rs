// Database module
// LanceDB storage for the chunk vectors

pub mod lancedb;

pub use lancedb::{IndexManifest, SearchHit, VectorIndex};

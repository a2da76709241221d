//! CLI command implementations.
//!
//! - [`stats`] - Cache statistics
//! - [`tile`] - Read and seed individual tiles

pub mod stats;
pub mod tile;

//! laketile: water-body entity extraction from radar pixel-cloud tiles
//!
//! This library turns the sparse cloud of radar-detected water pixels of one
//! satellite swath tile into discrete entities with calibrated,
//! uncertainty-quantified height and area measurements. File readers and
//! product writers are external collaborators: the crate consumes in-memory
//! channel arrays plus tile metadata and produces entity labels, edge
//! bookkeeping for cross-tile stitching, and per-entity aggregates.

pub mod types;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{TileError, TileFootprint, TileMetadata, TileResult};

pub use core::{
    AreaMethod, EdgeClassification, EdgeClassifier, EntityLabeler, EntitySummary,
    HeightAreaAggregator, HeightMethod, InterferogramFlattener, LabelingParams, NadirChannels,
    PixelChannels, PixelCloud, PixelSelector, SelectionParams,
};

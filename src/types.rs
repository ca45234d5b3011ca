use chrono::{DateTime, Utc};
use num_complex::Complex;
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Complex interferogram sample (I + jQ)
pub type IfgSample = Complex<f64>;

/// Fill value for double-precision channels (netCDF default)
pub const FV_DOUBLE: f64 = 9.969_209_968_386_869e36;

/// Fill value for single-precision channels (netCDF default)
pub const FV_FLOAT: f32 = 9.96921e36;

/// Sentinel std used to deweight pixels with degenerate phase noise,
/// instead of letting Inf/NaN propagate into aggregates
pub const DEWEIGHT_STD: f64 = 1.0e5;

/// Out-of-band classification code marking pixels rejected before selection
pub const CLASSIF_REJECTED: u8 = 100;

/// Classification code: land
pub const CLASSIF_LAND: u8 = 1;
/// Classification code: land near water (land edge)
pub const CLASSIF_LAND_EDGE: u8 = 2;
/// Classification code: water near land (water edge)
pub const CLASSIF_WATER_EDGE: u8 = 3;
/// Classification code: interior (open) water
pub const CLASSIF_INTERIOR_WATER: u8 = 4;
/// Classification code: land near dark water
pub const CLASSIF_LAND_NEAR_DARK_WATER: u8 = 22;
/// Classification code: dark water edge
pub const CLASSIF_DARK_EDGE: u8 = 23;
/// Classification code: dark water
pub const CLASSIF_DARK: u8 = 24;

/// True if a value is neither its type's fill value nor NaN/Inf
pub fn is_valid<T: Float>(value: T, fill: T) -> bool {
    value.is_finite() && value < fill
}

/// True if a double-precision value is neither the fill value nor NaN/Inf
pub fn is_valid_f64(value: f64) -> bool {
    is_valid(value, FV_DOUBLE)
}

/// Normalize a longitude to [-180, 180] degrees
pub fn convert_to_m180_180(longitude: f64) -> f64 {
    let mut lon = longitude % 360.0;
    if lon > 180.0 {
        lon -= 360.0;
    } else if lon < -180.0 {
        lon += 360.0;
    }
    lon
}

/// Per-tile global attributes fed by the external reader collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileMetadata {
    /// Tile identifier used when reporting fatal errors upward
    pub tile_name: String,
    /// Number of pixels in range dimension (interferogram_size_range)
    pub nb_pix_range: usize,
    /// Number of pixels in azimuth dimension (interferogram_size_azimuth)
    pub nb_pix_azimuth: usize,
    /// Slant range for the first image pixel, in meters
    pub near_range: f64,
    /// Wavelength of the effective radar carrier, in meters
    pub wavelength: f64,
    /// Ratio between actual samples and effective independent samples
    pub looks_to_efflooks: f64,
    /// Geodetic tile corner: inner edge, first azimuth line (lon, lat)
    pub inner_first: (f64, f64),
    /// Geodetic tile corner: outer edge, first azimuth line (lon, lat)
    pub outer_first: (f64, f64),
    /// Geodetic tile corner: outer edge, last azimuth line (lon, lat)
    pub outer_last: (f64, f64),
    /// Geodetic tile corner: inner edge, last azimuth line (lon, lat)
    pub inner_last: (f64, f64),
    /// Time coverage bounds of the pass segment
    pub time_coverage_start: Option<DateTime<Utc>>,
    pub time_coverage_end: Option<DateTime<Utc>>,
}

/// Tile footprint polygon built from the four geodetic corner attributes,
/// longitude-normalized to [-180, 180]. Read-only after construction,
/// used for spatial pre-filtering only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileFootprint {
    ring: Vec<(f64, f64)>,
}

impl TileFootprint {
    /// Build the 4-corner ring from tile metadata
    pub fn from_metadata(meta: &TileMetadata) -> Self {
        let corners = [meta.inner_first, meta.outer_first, meta.outer_last, meta.inner_last];
        let ring = corners
            .iter()
            .map(|&(lon, lat)| (convert_to_m180_180(lon), lat))
            .collect();
        Self { ring }
    }

    /// Corner ring (first corner not repeated)
    pub fn ring(&self) -> &[(f64, f64)] {
        &self.ring
    }

    /// Point-in-polygon test (ray casting) against the corner ring
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let lon = convert_to_m180_180(lon);
        let n = self.ring.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.ring[i];
            let (xj, yj) = self.ring[j];
            if (yi > lat) != (yj > lat) {
                let x_cross = (xj - xi) * (lat - yi) / (yj - yi) + xi;
                if lon < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Error types for tile processing
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("tile {tile}: missing required channel '{channel}'")]
    MissingChannel { tile: String, channel: &'static str },

    #[error("tile {tile}: channel '{channel}' has {got} samples, expected {expected}")]
    ChannelLength {
        tile: String,
        channel: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("tile {tile}: degenerate grid of {nb_pix_range} x {nb_pix_azimuth} pixels")]
    EmptyGrid {
        tile: String,
        nb_pix_range: usize,
        nb_pix_azimuth: usize,
    },

    #[error("tile {tile}: {axis} index {index} outside grid of {size} pixels")]
    IndexOutOfBounds {
        tile: String,
        axis: &'static str,
        index: usize,
        size: usize,
    },

    #[error("invalid classification flag list '{0}'")]
    InvalidFlagList(String),

    #[error("processing error: {0}")]
    Processing(String),
}

/// Result type for tile processing operations
pub type TileResult<T> = Result<T, TileError>;

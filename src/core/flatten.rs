use crate::types::{IfgSample, TileError, TileResult};
use num_complex::Complex;
use std::f64::consts::PI;

/// Per-pixel interferometer geometry: both antenna phase-center positions
/// in ECEF coordinates, co-indexed with the selected pixel arrays
#[derive(Debug, Clone, Copy)]
pub struct AntennaGeometry<'a> {
    pub plus_y_x: &'a [f64],
    pub plus_y_y: &'a [f64],
    pub plus_y_z: &'a [f64],
    pub minus_y_x: &'a [f64],
    pub minus_y_y: &'a [f64],
    pub minus_y_z: &'a [f64],
}

/// Removes the geometric phase ramp from the raw interferogram
pub struct InterferogramFlattener {
    wavelength: f64,
}

impl InterferogramFlattener {
    pub fn new(wavelength: f64) -> Self {
        Self { wavelength }
    }

    /// Flatten the interferogram for one feature.
    ///
    /// `target_xyz` holds the geocentric positions of the feature's
    /// height-refined target points, one per subset pixel. The expected
    /// interferometric phase from the two antenna ranges is removed
    /// multiplicatively from the raw sample; results are written in place
    /// into `flattened` restricted to the subset, all other pixels keep
    /// their previous value.
    pub fn flatten(
        &self,
        raw: &[IfgSample],
        geometry: &AntennaGeometry<'_>,
        subset: &[usize],
        target_xyz: &[[f64; 3]],
        flattened: &mut [IfgSample],
    ) -> TileResult<()> {
        if target_xyz.len() != subset.len() {
            return Err(TileError::Processing(format!(
                "flattening: {} target positions for {} subset pixels",
                target_xyz.len(),
                subset.len()
            )));
        }

        for (k, &i) in subset.iter().enumerate() {
            let target = target_xyz[k];
            let range_plus = distance(
                [geometry.plus_y_x[i], geometry.plus_y_y[i], geometry.plus_y_z[i]],
                target,
            );
            let range_minus = distance(
                [geometry.minus_y_x[i], geometry.minus_y_y[i], geometry.minus_y_z[i]],
                target,
            );
            // Expected geometric phase from the antenna baseline
            let phase_geo = -2.0 * PI / self.wavelength * (range_plus - range_minus);
            flattened[i] = raw[i] * Complex::from_polar(1.0, -phase_geo);
        }
        Ok(())
    }
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

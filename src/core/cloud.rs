use crate::core::aggregate::{
    AreaInputs, AreaMethod, HeightAreaAggregator, HeightMethod, HeightUncertInputs,
};
use crate::core::edges::{EdgeClassification, EdgeClassifier, EdgeLocation};
use crate::core::flatten::{AntennaGeometry, InterferogramFlattener};
use crate::core::labeling::EntityLabeler;
use crate::core::selection::{PixelSelector, SelectionParams};
use crate::types::{
    is_valid_f64, IfgSample, TileError, TileFootprint, TileMetadata, TileResult,
    CLASSIF_INTERIOR_WATER, DEWEIGHT_STD, FV_DOUBLE,
};
use num_complex::Complex;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Co-indexed per-pixel channels of one tile, as fed by the external
/// reader collaborator. A fixed record of named fields: every required
/// channel is populated before any aggregation can run.
#[derive(Debug, Clone, Default)]
pub struct PixelChannels {
    pub classification: Vec<u8>,
    pub range_index: Vec<usize>,
    pub azimuth_index: Vec<usize>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub height: Vec<f64>,
    pub cross_track: Vec<f64>,
    pub pixel_area: Vec<f64>,
    pub water_frac: Vec<f64>,
    pub water_frac_uncert: Vec<f64>,
    pub false_detection_rate: Vec<f64>,
    pub missed_detection_rate: Vec<f64>,
    pub interferogram: Vec<IfgSample>,
    pub power_plus_y: Vec<f64>,
    pub power_minus_y: Vec<f64>,
    pub phase_noise_std: Vec<f64>,
    pub dheight_dphase: Vec<f64>,
    pub dlatitude_dphase: Vec<f64>,
    pub dlongitude_dphase: Vec<f64>,
    pub dheight_drange: Vec<f64>,
    pub darea_dheight: Vec<f64>,
    pub eff_num_rare_looks: Vec<f64>,
    pub eff_num_medium_looks: Vec<f64>,
    pub illumination_time: Vec<f64>,
    pub geoid: Vec<f64>,
    pub solid_earth_tide: Vec<f64>,
    pub pole_tide: Vec<f64>,
    pub load_tide_fes: Vec<f64>,
}

impl PixelChannels {
    /// Number of pixels (length of the classification channel)
    pub fn len(&self) -> usize {
        self.classification.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classification.is_empty()
    }

    /// Check that every channel has the same length; fatal otherwise
    pub fn validate(&self, tile_name: &str) -> TileResult<()> {
        let expected = self.len();
        let check = |channel: &'static str, got: usize| -> TileResult<()> {
            if got != expected {
                Err(TileError::ChannelLength {
                    tile: tile_name.to_string(),
                    channel,
                    got,
                    expected,
                })
            } else {
                Ok(())
            }
        };
        check("range_index", self.range_index.len())?;
        check("azimuth_index", self.azimuth_index.len())?;
        check("latitude", self.latitude.len())?;
        check("longitude", self.longitude.len())?;
        check("height", self.height.len())?;
        check("cross_track", self.cross_track.len())?;
        check("pixel_area", self.pixel_area.len())?;
        check("water_frac", self.water_frac.len())?;
        check("water_frac_uncert", self.water_frac_uncert.len())?;
        check("false_detection_rate", self.false_detection_rate.len())?;
        check("missed_detection_rate", self.missed_detection_rate.len())?;
        check("interferogram", self.interferogram.len())?;
        check("power_plus_y", self.power_plus_y.len())?;
        check("power_minus_y", self.power_minus_y.len())?;
        check("phase_noise_std", self.phase_noise_std.len())?;
        check("dheight_dphase", self.dheight_dphase.len())?;
        check("dlatitude_dphase", self.dlatitude_dphase.len())?;
        check("dlongitude_dphase", self.dlongitude_dphase.len())?;
        check("dheight_drange", self.dheight_drange.len())?;
        check("darea_dheight", self.darea_dheight.len())?;
        check("eff_num_rare_looks", self.eff_num_rare_looks.len())?;
        check("eff_num_medium_looks", self.eff_num_medium_looks.len())?;
        check("illumination_time", self.illumination_time.len())?;
        check("geoid", self.geoid.len())?;
        check("solid_earth_tide", self.solid_earth_tide.len())?;
        check("pole_tide", self.pole_tide.len())?;
        check("load_tide_fes", self.load_tide_fes.len())?;
        Ok(())
    }

    /// New record holding only the pixels at `index`, in that order
    fn subset(&self, index: &[usize]) -> Self {
        let pick_f64 = |v: &Vec<f64>| index.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        Self {
            classification: index.iter().map(|&i| self.classification[i]).collect(),
            range_index: index.iter().map(|&i| self.range_index[i]).collect(),
            azimuth_index: index.iter().map(|&i| self.azimuth_index[i]).collect(),
            latitude: pick_f64(&self.latitude),
            longitude: pick_f64(&self.longitude),
            height: pick_f64(&self.height),
            cross_track: pick_f64(&self.cross_track),
            pixel_area: pick_f64(&self.pixel_area),
            water_frac: pick_f64(&self.water_frac),
            water_frac_uncert: pick_f64(&self.water_frac_uncert),
            false_detection_rate: pick_f64(&self.false_detection_rate),
            missed_detection_rate: pick_f64(&self.missed_detection_rate),
            interferogram: index.iter().map(|&i| self.interferogram[i]).collect(),
            power_plus_y: pick_f64(&self.power_plus_y),
            power_minus_y: pick_f64(&self.power_minus_y),
            phase_noise_std: pick_f64(&self.phase_noise_std),
            dheight_dphase: pick_f64(&self.dheight_dphase),
            dlatitude_dphase: pick_f64(&self.dlatitude_dphase),
            dlongitude_dphase: pick_f64(&self.dlongitude_dphase),
            dheight_drange: pick_f64(&self.dheight_drange),
            darea_dheight: pick_f64(&self.darea_dheight),
            eff_num_rare_looks: pick_f64(&self.eff_num_rare_looks),
            eff_num_medium_looks: pick_f64(&self.eff_num_medium_looks),
            illumination_time: pick_f64(&self.illumination_time),
            geoid: pick_f64(&self.geoid),
            solid_earth_tide: pick_f64(&self.solid_earth_tide),
            pole_tide: pick_f64(&self.pole_tide),
            load_tide_fes: pick_f64(&self.load_tide_fes),
        }
    }
}

/// Nadir-geometry time series from the sensor group, sampled on the
/// spacecraft track (not per pixel)
#[derive(Debug, Clone, Default)]
pub struct NadirChannels {
    pub time: Vec<f64>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub vx: Vec<f64>,
    pub vy: Vec<f64>,
    pub vz: Vec<f64>,
    pub plus_y_antenna_x: Vec<f64>,
    pub plus_y_antenna_y: Vec<f64>,
    pub plus_y_antenna_z: Vec<f64>,
    pub minus_y_antenna_x: Vec<f64>,
    pub minus_y_antenna_y: Vec<f64>,
    pub minus_y_antenna_z: Vec<f64>,
}

impl NadirChannels {
    pub fn validate(&self, tile_name: &str) -> TileResult<()> {
        if self.time.is_empty() {
            return Err(TileError::MissingChannel {
                tile: tile_name.to_string(),
                channel: "nadir time",
            });
        }
        Ok(())
    }

    fn subset(&self, index: &[usize]) -> Self {
        let pick = |v: &Vec<f64>| index.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        Self {
            time: pick(&self.time),
            latitude: pick(&self.latitude),
            longitude: pick(&self.longitude),
            x: pick(&self.x),
            y: pick(&self.y),
            z: pick(&self.z),
            vx: pick(&self.vx),
            vy: pick(&self.vy),
            vz: pick(&self.vz),
            plus_y_antenna_x: pick(&self.plus_y_antenna_x),
            plus_y_antenna_y: pick(&self.plus_y_antenna_y),
            plus_y_antenna_z: pick(&self.plus_y_antenna_z),
            minus_y_antenna_x: pick(&self.minus_y_antenna_x),
            minus_y_antenna_y: pick(&self.minus_y_antenna_y),
            minus_y_antenna_z: pick(&self.minus_y_antenna_z),
        }
    }
}

/// One row of the writer-facing edge-pixel table, indexed back into the
/// original (pre-selection) pixel arrays
#[derive(Debug, Clone, Copy)]
pub struct EdgeRecord {
    /// Index into the original raw arrays
    pub pixc_index: usize,
    /// Index into the selected arrays
    pub selected_pos: usize,
    pub label: u32,
    pub location: EdgeLocation,
}

/// Per-entity measurement summary produced for the external lake assembly
#[derive(Debug, Clone, Copy)]
pub struct EntitySummary {
    pub label: u32,
    pub nb_pixels: usize,
    pub height: f64,
    pub height_std: f64,
    pub height_uncert: f64,
    /// Total water area (including dark water) and its uncertainty
    pub area_total: f64,
    pub area_total_uncert: f64,
    /// Area of confidently detected water and its uncertainty
    pub area_detected: f64,
    pub area_detected_uncert: f64,
}

/// Pixel-cloud context for one tile: selected channels, derived channels,
/// labels, and edge bookkeeping. Owns everything for the tile's lifetime.
#[derive(Debug)]
pub struct PixelCloud {
    pub metadata: TileMetadata,
    pub footprint: TileFootprint,
    /// Indices of selected pixels into the raw arrays, ascending
    pub selected_index: Vec<usize>,
    pub nb_selected: usize,
    /// Channels subset to the selected pixels
    pub channels: PixelChannels,
    /// Nadir geometry interpolated onto each selected pixel
    pub nadir: NadirChannels,
    /// Classification as if all pixels were interior water
    pub classif_full_water: Vec<u8>,
    /// Classification with dark-water codes zeroed out
    pub classif_without_dw: Vec<u8>,
    /// Per-pixel height std, degenerate values deweighted to a sentinel
    pub height_std_pix: Vec<f64>,
    /// Height corrected from geoid and tide terms, all-or-nothing per pixel
    pub corrected_height: Vec<f64>,
    /// Pixel area scaled by water fraction where valid
    pub inundated_area: Vec<f64>,
    /// Flattened interferogram, zero until the flattener runs per feature
    pub interferogram_flattened: Vec<IfgSample>,
    /// 1-based entity label per selected pixel; empty until labeling runs
    pub labels: Vec<u32>,
    pub nb_obj: usize,
    edges: Option<EdgeClassification>,
}

impl PixelCloud {
    /// Ingest one tile: validate channels, select usable pixels, subset
    /// every channel, interpolate nadir geometry, and compute the derived
    /// channels. A tile with zero selected pixels is a valid degenerate
    /// context, not an error.
    pub fn from_arrays(
        metadata: TileMetadata,
        raw: &PixelChannels,
        nadir: &NadirChannels,
        index_reject: Option<&[usize]>,
        selection: &SelectionParams,
    ) -> TileResult<Self> {
        if metadata.nb_pix_range == 0 || metadata.nb_pix_azimuth == 0 {
            return Err(TileError::EmptyGrid {
                tile: metadata.tile_name.clone(),
                nb_pix_range: metadata.nb_pix_range,
                nb_pix_azimuth: metadata.nb_pix_azimuth,
            });
        }
        raw.validate(&metadata.tile_name)?;
        nadir.validate(&metadata.tile_name)?;
        let footprint = TileFootprint::from_metadata(&metadata);

        let selector = PixelSelector::new(selection.clone());
        let selected =
            selector.select(&raw.classification, &raw.longitude, &raw.latitude, index_reject);

        let channels = raw.subset(&selected.selected_index);
        let nb_selected = selected.nb_selected;

        // Nadir geometry at each pixel's illumination time
        let nadir_index = nadir_index_for_times(&nadir.time, &channels.illumination_time);
        let nadir = nadir.subset(&nadir_index);

        let classif_full_water = vec![CLASSIF_INTERIOR_WATER; nb_selected];
        let classif_without_dw = channels
            .classification
            .iter()
            .map(|c| if selection.dark_flags.contains(c) { 0 } else { *c })
            .collect();

        // Degenerate per-pixel height stds are deweighted, not excluded
        let height_std_pix = channels
            .phase_noise_std
            .iter()
            .zip(channels.dheight_dphase.iter())
            .map(|(&noise, &sens)| {
                let std = (noise * sens).abs();
                if std.is_finite() && std > 0.0 && std < FV_DOUBLE {
                    std
                } else {
                    DEWEIGHT_STD
                }
            })
            .collect();

        // Corrections are all-or-nothing per pixel
        let corrected_height = (0..nb_selected)
            .map(|i| {
                let valid = is_valid_f64(channels.geoid[i])
                    && is_valid_f64(channels.solid_earth_tide[i])
                    && is_valid_f64(channels.pole_tide[i])
                    && is_valid_f64(channels.load_tide_fes[i]);
                if valid {
                    channels.height[i]
                        - channels.geoid[i]
                        - channels.solid_earth_tide[i]
                        - channels.pole_tide[i]
                        - channels.load_tide_fes[i]
                } else {
                    FV_DOUBLE
                }
            })
            .collect();

        let inundated_area = (0..nb_selected)
            .map(|i| {
                if is_valid_f64(channels.water_frac[i]) {
                    channels.pixel_area[i] * channels.water_frac[i]
                } else {
                    channels.pixel_area[i]
                }
            })
            .collect();

        let interferogram_flattened = vec![Complex::new(0.0, 0.0); nb_selected];

        Ok(Self {
            metadata,
            footprint,
            selected_index: selected.selected_index,
            nb_selected,
            channels,
            nadir,
            classif_full_water,
            classif_without_dw,
            height_std_pix,
            corrected_height,
            inundated_area,
            interferogram_flattened,
            labels: Vec::new(),
            nb_obj: 0,
            edges: None,
        })
    }

    /// Identify all separate water entities in the tile
    pub fn label_entities(&mut self, labeler: &EntityLabeler) -> TileResult<()> {
        if self.nb_selected == 0 {
            log::info!("no selected pixel, tile contributes no entity");
            self.labels = Vec::new();
            self.nb_obj = 0;
            return Ok(());
        }
        let result = labeler.label(
            &self.metadata.tile_name,
            &self.channels.range_index,
            &self.channels.azimuth_index,
            &self.channels.height,
            self.metadata.nb_pix_range,
            self.metadata.nb_pix_azimuth,
        )?;
        self.labels = result.labels;
        self.nb_obj = result.nb_obj;
        Ok(())
    }

    /// Partition entities by tile-boundary contact and build the edge
    /// bookkeeping; requires labeling to have run
    pub fn classify_edges(&mut self) -> &EdgeClassification {
        let classification = EdgeClassifier::classify(
            &self.channels.azimuth_index,
            &self.labels,
            self.metadata.nb_pix_azimuth,
            self.nb_obj,
        );
        self.edges.insert(classification)
    }

    pub fn edges(&self) -> Option<&EdgeClassification> {
        self.edges.as_ref()
    }

    /// Writer-facing edge table with indices mapped back to the raw arrays
    pub fn edge_pixel_rows(&self) -> Vec<EdgeRecord> {
        match &self.edges {
            None => Vec::new(),
            Some(edges) => edges
                .edge_pixels
                .iter()
                .map(|p| EdgeRecord {
                    pixc_index: self.selected_index[p.index],
                    selected_pos: p.index,
                    label: p.label,
                    location: p.location,
                })
                .collect(),
        }
    }

    /// Selected-pixel indices belonging to one entity
    pub fn entity_pixels(&self, label: u32) -> Vec<usize> {
        (0..self.labels.len()).filter(|&i| self.labels[i] == label).collect()
    }

    /// Flatten the interferogram for one feature; must run before
    /// `aggregate_height_with_uncert` on the same subset
    pub fn flatten_interferogram(
        &mut self,
        subset: &[usize],
        target_xyz: &[[f64; 3]],
    ) -> TileResult<()> {
        let flattener = InterferogramFlattener::new(self.metadata.wavelength);
        let geometry = AntennaGeometry {
            plus_y_x: &self.nadir.plus_y_antenna_x,
            plus_y_y: &self.nadir.plus_y_antenna_y,
            plus_y_z: &self.nadir.plus_y_antenna_z,
            minus_y_x: &self.nadir.minus_y_antenna_x,
            minus_y_y: &self.nadir.minus_y_antenna_y,
            minus_y_z: &self.nadir.minus_y_antenna_z,
        };
        flattener.flatten(
            &self.channels.interferogram,
            &geometry,
            subset,
            target_xyz,
            &mut self.interferogram_flattened,
        )
    }

    /// Aggregate raw height over a feature
    pub fn aggregate_height(&self, subset: &[usize], method: HeightMethod) -> f64 {
        HeightAreaAggregator::new().aggregate_height(
            &self.channels.height,
            &self.height_std_pix,
            subset,
            method,
        )
    }

    /// Aggregate corrected height with std and formal uncertainty.
    /// Precondition: the interferogram has been flattened for `subset`.
    pub fn aggregate_height_with_uncert(
        &self,
        subset: &[usize],
        method: HeightMethod,
    ) -> crate::core::aggregate::HeightUncertAggregate {
        HeightAreaAggregator::new().aggregate_height_with_uncert(
            &self.height_uncert_inputs(),
            subset,
            method,
        )
    }

    /// Aggregate water area over a feature, once over all water pixels
    /// and once with dark-water codes zeroed out.
    /// Returns (total, total_uncert, detected, detected_uncert).
    pub fn aggregate_area_with_uncert(
        &self,
        subset: &[usize],
        method: AreaMethod,
    ) -> (f64, f64, f64, f64) {
        let aggregator = HeightAreaAggregator::new();
        let total = aggregator.aggregate_area_with_uncert(
            &self.area_inputs(&self.classif_full_water),
            subset,
            method,
        );
        let detected = aggregator.aggregate_area_with_uncert(
            &self.area_inputs(&self.classif_without_dw),
            subset,
            method,
        );
        (total.area, total.area_uncert, detected.area, detected.area_uncert)
    }

    fn height_uncert_inputs(&self) -> HeightUncertInputs<'_> {
        HeightUncertInputs {
            corrected_height: &self.corrected_height,
            height_std_pix: &self.height_std_pix,
            eff_num_rare_looks: &self.channels.eff_num_rare_looks,
            eff_num_medium_looks: &self.channels.eff_num_medium_looks,
            ifgram_flattened: &self.interferogram_flattened,
            power_plus_y: &self.channels.power_plus_y,
            power_minus_y: &self.channels.power_minus_y,
            dheight_dphase: &self.channels.dheight_dphase,
            looks_to_efflooks: self.metadata.looks_to_efflooks,
        }
    }

    fn area_inputs<'a>(&'a self, classification: &'a [u8]) -> AreaInputs<'a> {
        AreaInputs {
            pixel_area: &self.channels.pixel_area,
            water_frac: &self.channels.water_frac,
            water_frac_uncert: &self.channels.water_frac_uncert,
            darea_dheight: &self.channels.darea_dheight,
            classification,
            false_detection_rate: &self.channels.false_detection_rate,
            missed_detection_rate: &self.channels.missed_detection_rate,
        }
    }

    /// Per-entity summaries, aggregated in parallel across entities when
    /// the `parallel` feature is enabled (the default).
    ///
    /// The flattened-interferogram channel is read-only here, so the pass
    /// is safe provided all flattening ran beforehand (single owner of
    /// that channel, then parallel aggregation).
    pub fn summarize_entities(
        &self,
        height_method: HeightMethod,
        area_method: AreaMethod,
    ) -> Vec<EntitySummary> {
        #[cfg(feature = "parallel")]
        {
            (1..=self.nb_obj as u32)
                .into_par_iter()
                .map(|label| self.summarize_entity(label, height_method, area_method))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            (1..=self.nb_obj as u32)
                .map(|label| self.summarize_entity(label, height_method, area_method))
                .collect()
        }
    }

    fn summarize_entity(
        &self,
        label: u32,
        height_method: HeightMethod,
        area_method: AreaMethod,
    ) -> EntitySummary {
        let subset = self.entity_pixels(label);
        let height = self.aggregate_height_with_uncert(&subset, height_method);
        let (area_total, area_total_uncert, area_detected, area_detected_uncert) =
            self.aggregate_area_with_uncert(&subset, area_method);
        EntitySummary {
            label,
            nb_pixels: subset.len(),
            height: height.height,
            height_std: height.height_std,
            height_uncert: height.height_uncert,
            area_total,
            area_total_uncert,
            area_detected,
            area_detected_uncert,
        }
    }
}

/// Map each illumination time onto the nearest nadir sample by linear
/// interpolation of the fractional sample index against nadir time
pub fn nadir_index_for_times(nadir_time: &[f64], illumination_time: &[f64]) -> Vec<usize> {
    let n = nadir_time.len();
    illumination_time
        .iter()
        .map(|&t| {
            if n == 1 || t <= nadir_time[0] {
                return 0;
            }
            if t >= nadir_time[n - 1] {
                return n - 1;
            }
            let k = match nadir_time.partition_point(|&v| v <= t) {
                0 => 0,
                p => p - 1,
            };
            let t0 = nadir_time[k];
            let t1 = nadir_time[k + 1];
            let frac = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
            (k as f64 + frac).round() as usize
        })
        .collect()
}

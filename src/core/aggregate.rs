use crate::types::{
    is_valid_f64, IfgSample, CLASSIF_INTERIOR_WATER, CLASSIF_LAND_EDGE, CLASSIF_WATER_EDGE,
    DEWEIGHT_STD, FV_DOUBLE,
};
use serde::{Deserialize, Serialize};

/// Height aggregation estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightMethod {
    /// Inverse-variance weighted mean
    Weighted,
    /// Unweighted mean
    Uniform,
    /// Median
    Median,
}

/// Area aggregation estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaMethod {
    /// Full pixel area for every water pixel
    Simple,
    /// Pixel area scaled by water fraction for every water pixel
    WaterFraction,
    /// Full area for interior water, fraction-scaled area for edge pixels
    Composite,
}

/// Aggregated height with its formal uncertainty terms
#[derive(Debug, Clone, Copy)]
pub struct HeightUncertAggregate {
    /// Aggregate height over the feature
    pub height: f64,
    /// Within-feature height std, scaled by effective independent pixels
    pub height_std: f64,
    /// Formal height uncertainty from the multilooked flattened interferogram
    pub height_uncert: f64,
}

/// Aggregated area with its uncertainty
#[derive(Debug, Clone, Copy)]
pub struct AreaAggregate {
    /// Total aggregated area
    pub area: f64,
    /// Area uncertainty (one sigma)
    pub area_uncert: f64,
    /// Area uncertainty as a percentage of the area
    pub area_pcnt_uncert: f64,
}

/// Per-pixel channels consumed by the height-uncertainty aggregation.
/// All slices are co-indexed with the selected pixel arrays.
#[derive(Debug, Clone, Copy)]
pub struct HeightUncertInputs<'a> {
    pub corrected_height: &'a [f64],
    pub height_std_pix: &'a [f64],
    pub eff_num_rare_looks: &'a [f64],
    pub eff_num_medium_looks: &'a [f64],
    /// Flattened interferogram; the flattener must already have run for
    /// the subset being aggregated
    pub ifgram_flattened: &'a [IfgSample],
    pub power_plus_y: &'a [f64],
    pub power_minus_y: &'a [f64],
    pub dheight_dphase: &'a [f64],
    pub looks_to_efflooks: f64,
}

/// Per-pixel channels consumed by the area aggregation
#[derive(Debug, Clone, Copy)]
pub struct AreaInputs<'a> {
    pub pixel_area: &'a [f64],
    pub water_frac: &'a [f64],
    pub water_frac_uncert: &'a [f64],
    pub darea_dheight: &'a [f64],
    /// Classification view: all-interior for total water, dark codes
    /// zeroed for detected-only water. Code 0 means "not water here".
    pub classification: &'a [u8],
    pub false_detection_rate: &'a [f64],
    pub missed_detection_rate: &'a [f64],
}

/// Parameters of the binomial detection-error area model
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AreaModelParams {
    /// Probability of correct pixel assignment
    pub p_correct_assignment: f64,
    /// Prior probability that an ambiguous pixel is water
    pub p_water_prior: f64,
    /// True-positive probability of the detector
    pub p_true_positive: f64,
    /// Reference DEM height standard deviation, in meters
    pub ref_dem_std: f64,
}

impl Default for AreaModelParams {
    fn default() -> Self {
        Self {
            p_correct_assignment: 0.9,
            p_water_prior: 0.5,
            p_true_positive: 0.5,
            ref_dem_std: 10.0,
        }
    }
}

/// Swappable area-uncertainty estimator, so alternate statistical models
/// can be validated independently of the aggregation plumbing
pub trait AreaUncertaintyModel {
    fn area_with_uncert(
        &self,
        inputs: &AreaInputs<'_>,
        subset: &[usize],
        method: AreaMethod,
    ) -> AreaAggregate;
}

/// Default model: binomial false/missed-detection variance plus
/// water-fraction and reference-DEM terms, combined in quadrature
#[derive(Debug, Clone, Copy, Default)]
pub struct BinomialAreaModel {
    pub params: AreaModelParams,
}

impl BinomialAreaModel {
    pub fn new(params: AreaModelParams) -> Self {
        Self { params }
    }
}

impl AreaUncertaintyModel for BinomialAreaModel {
    fn area_with_uncert(
        &self,
        inputs: &AreaInputs<'_>,
        subset: &[usize],
        method: AreaMethod,
    ) -> AreaAggregate {
        let area = area_only(inputs, subset, method);

        // Missed detections are compensated according to the water prior
        // and true-positive odds relative to correct assignment
        let miss_prior = self.params.p_water_prior * self.params.p_true_positive
            / self.params.p_correct_assignment;

        let mut variance = 0.0f64;
        for &i in subset {
            let klass = inputs.classification[i];
            if klass == 0 {
                continue;
            }
            let pixel_area = inputs.pixel_area[i];
            if !is_valid_f64(pixel_area) {
                continue;
            }
            let is_edge = klass == CLASSIF_WATER_EDGE || klass == CLASSIF_LAND_EDGE;
            let effective_area = if is_edge && is_valid_f64(inputs.water_frac[i]) {
                pixel_area * inputs.water_frac[i]
            } else {
                pixel_area
            };

            // Water-fraction term on edge pixels
            if is_edge && is_valid_f64(inputs.water_frac_uncert[i]) {
                variance += (pixel_area * inputs.water_frac_uncert[i]).powi(2);
            }

            // Binomial detection terms
            let p_fd = clamp_probability(inputs.false_detection_rate[i]);
            variance += p_fd * (1.0 - p_fd) * effective_area.powi(2);
            let p_md = clamp_probability(inputs.missed_detection_rate[i]);
            variance += p_md * (1.0 - p_md) * effective_area.powi(2) * miss_prior;

            // Reference DEM height term through the area sensitivity
            if is_valid_f64(inputs.darea_dheight[i]) {
                variance += (inputs.darea_dheight[i] * self.params.ref_dem_std).powi(2);
            }
        }

        let area_uncert = variance.sqrt();
        let area_pcnt_uncert = if area > 0.0 { 100.0 * area_uncert / area } else { 0.0 };
        AreaAggregate {
            area,
            area_uncert,
            area_pcnt_uncert,
        }
    }
}

/// Clamp a detection rate to [0, 1]; fill or non-finite rates count as 0
fn clamp_probability(rate: f64) -> f64 {
    if is_valid_f64(rate) {
        rate.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Aggregate area over a subset without uncertainty
pub fn area_only(inputs: &AreaInputs<'_>, subset: &[usize], method: AreaMethod) -> f64 {
    let mut area = 0.0f64;
    for &i in subset {
        let klass = inputs.classification[i];
        if klass == 0 {
            continue;
        }
        let pixel_area = inputs.pixel_area[i];
        if !is_valid_f64(pixel_area) {
            continue;
        }
        let fraction_scaled = if is_valid_f64(inputs.water_frac[i]) {
            pixel_area * inputs.water_frac[i]
        } else {
            pixel_area
        };
        area += match method {
            AreaMethod::Simple => pixel_area,
            AreaMethod::WaterFraction => fraction_scaled,
            AreaMethod::Composite => {
                if klass == CLASSIF_INTERIOR_WATER {
                    pixel_area
                } else if klass == CLASSIF_WATER_EDGE || klass == CLASSIF_LAND_EDGE {
                    fraction_scaled
                } else {
                    pixel_area
                }
            }
        };
    }
    area
}

/// Aggregate height over a subset.
///
/// Returns the aggregate and the normalized per-pixel weights (aligned
/// with `subset`), which the multilook uncertainty reuses. Pixels with
/// fill-valued or non-finite height are masked out; degenerate per-pixel
/// stds are replaced by a bounded sentinel rather than excluded. An empty
/// or fully masked subset yields a fill-valued aggregate.
pub fn height_only(
    height: &[f64],
    height_std_pix: &[f64],
    subset: &[usize],
    method: HeightMethod,
) -> (f64, Vec<f64>) {
    let valid: Vec<usize> = subset
        .iter()
        .enumerate()
        .filter(|(_, &i)| is_valid_f64(height[i]))
        .map(|(k, _)| k)
        .collect();
    if valid.is_empty() {
        return (FV_DOUBLE, vec![0.0; subset.len()]);
    }

    let mut weight_norm = vec![0.0f64; subset.len()];
    let aggregate = match method {
        HeightMethod::Median => {
            let mut values: Vec<f64> = valid.iter().map(|&k| height[subset[k]]).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let n = values.len();
            let median = if n % 2 == 1 {
                values[n / 2]
            } else {
                0.5 * (values[n / 2 - 1] + values[n / 2])
            };
            for &k in &valid {
                weight_norm[k] = 1.0 / n as f64;
            }
            median
        }
        HeightMethod::Uniform => {
            let n = valid.len() as f64;
            let mean = valid.iter().map(|&k| height[subset[k]]).sum::<f64>() / n;
            for &k in &valid {
                weight_norm[k] = 1.0 / n;
            }
            mean
        }
        HeightMethod::Weighted => {
            let mut weight_sum = 0.0f64;
            let mut weighted_height = 0.0f64;
            let mut weights = vec![0.0f64; subset.len()];
            for &k in &valid {
                let i = subset[k];
                let std = height_std_pix[i];
                let std = if std.is_finite() && std > 0.0 { std } else { DEWEIGHT_STD };
                let w = 1.0 / (std * std);
                weights[k] = w;
                weight_sum += w;
                weighted_height += w * height[i];
            }
            for &k in &valid {
                weight_norm[k] = weights[k] / weight_sum;
            }
            weighted_height / weight_sum
        }
    };

    (aggregate, weight_norm)
}

/// Computes per-feature height and area aggregates over arbitrary
/// pixel-index subsets
pub struct HeightAreaAggregator<M = BinomialAreaModel> {
    model: M,
}

impl HeightAreaAggregator<BinomialAreaModel> {
    /// Aggregator with the default binomial area model
    pub fn new() -> Self {
        Self {
            model: BinomialAreaModel::default(),
        }
    }
}

impl Default for HeightAreaAggregator<BinomialAreaModel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: AreaUncertaintyModel> HeightAreaAggregator<M> {
    /// Aggregator with a caller-supplied uncertainty model
    pub fn with_model(model: M) -> Self {
        Self { model }
    }

    /// Aggregate height over a subset; fill-valued for empty subsets
    pub fn aggregate_height(
        &self,
        height: &[f64],
        height_std_pix: &[f64],
        subset: &[usize],
        method: HeightMethod,
    ) -> f64 {
        height_only(height, height_std_pix, subset, method).0
    }

    /// Aggregate height with its within-feature std and the formal
    /// uncertainty from the multilooked flattened interferogram.
    ///
    /// The flattener must have been run for `subset` beforehand.
    pub fn aggregate_height_with_uncert(
        &self,
        inputs: &HeightUncertInputs<'_>,
        subset: &[usize],
        method: HeightMethod,
    ) -> HeightUncertAggregate {
        let (height, weight_norm) =
            height_only(inputs.corrected_height, inputs.height_std_pix, subset, method);

        let valid: Vec<usize> = subset
            .iter()
            .copied()
            .filter(|&i| is_valid_f64(inputs.corrected_height[i]))
            .collect();
        if valid.is_empty() {
            return HeightUncertAggregate {
                height,
                height_std: FV_DOUBLE,
                height_uncert: FV_DOUBLE,
            };
        }

        // Sample std, scaled by the effective number of independent pixels
        let values: Vec<f64> = valid.iter().map(|&i| inputs.corrected_height[i]).collect();
        let sample_std = population_std(&values);
        let n = valid.len() as f64;
        let rare_looks = mean_over(&valid, inputs.eff_num_rare_looks) / 2.0;
        let medium_looks = mean_over(&valid, inputs.eff_num_medium_looks);
        let nb_independent = if medium_looks > 0.0 && rare_looks > 0.0 {
            n * rare_looks / medium_looks
        } else {
            n
        };
        let height_std = if nb_independent > 0.0 {
            sample_std / nb_independent.sqrt()
        } else {
            FV_DOUBLE
        };

        // Multilook the flattened interferogram over the feature and take
        // the phase variance from the Cramer-Rao bound
        let mut agg_re = 0.0f64;
        let mut agg_im = 0.0f64;
        let mut agg_p1 = 0.0f64;
        let mut agg_p2 = 0.0f64;
        let mut num_looks = 0.0f64;
        let mut agg_dh_dphi = 0.0f64;
        for (k, &i) in subset.iter().enumerate() {
            let z = inputs.ifgram_flattened[i];
            if z.re.is_finite() && z.im.is_finite() {
                agg_re += z.re;
                agg_im += z.im;
            }
            if is_valid_f64(inputs.power_plus_y[i]) {
                agg_p1 += inputs.power_plus_y[i];
            }
            if is_valid_f64(inputs.power_minus_y[i]) {
                agg_p2 += inputs.power_minus_y[i];
            }
            if is_valid_f64(inputs.eff_num_rare_looks[i]) && inputs.looks_to_efflooks > 0.0 {
                num_looks += inputs.eff_num_rare_looks[i] / inputs.looks_to_efflooks;
            }
            if is_valid_f64(inputs.dheight_dphase[i]) {
                agg_dh_dphi += weight_norm[k] * inputs.dheight_dphase[i].abs();
            }
        }

        let power_product = agg_p1 * agg_p2;
        let height_uncert = if power_product > 0.0 && num_looks > 0.0 {
            let coherence = (agg_re * agg_re + agg_im * agg_im).sqrt() / power_product.sqrt();
            if coherence > 0.0 {
                let phase_var =
                    (0.5 / num_looks) * (1.0 - coherence * coherence) / (coherence * coherence);
                phase_var.sqrt() * agg_dh_dphi
            } else {
                FV_DOUBLE
            }
        } else {
            FV_DOUBLE
        };

        HeightUncertAggregate {
            height,
            height_std,
            height_uncert,
        }
    }

    /// Aggregate area with uncertainty via the configured model;
    /// zero-valued for empty subsets
    pub fn aggregate_area_with_uncert(
        &self,
        inputs: &AreaInputs<'_>,
        subset: &[usize],
        method: AreaMethod,
    ) -> AreaAggregate {
        self.model.area_with_uncert(inputs, subset, method)
    }
}

fn mean_over(subset: &[usize], channel: &[f64]) -> f64 {
    let valid: Vec<f64> = subset
        .iter()
        .map(|&i| channel[i])
        .filter(|&v| is_valid_f64(v))
        .collect();
    if valid.is_empty() {
        0.0
    } else {
        valid.iter().sum::<f64>() / valid.len() as f64
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex;

    #[test]
    fn test_height_methods() {
        let height = [10.0, 12.0, 14.0];
        let std = [1.0, 1.0, 1.0];
        let subset = [0usize, 1, 2];
        let agg = HeightAreaAggregator::new();

        assert_relative_eq!(
            agg.aggregate_height(&height, &std, &subset, HeightMethod::Uniform),
            12.0
        );
        assert_relative_eq!(
            agg.aggregate_height(&height, &std, &subset, HeightMethod::Median),
            12.0
        );
        // Equal stds: weighted mean equals uniform mean
        assert_relative_eq!(
            agg.aggregate_height(&height, &std, &subset, HeightMethod::Weighted),
            12.0
        );
    }

    #[test]
    fn test_weighted_height_prefers_low_std() {
        let height = [10.0, 20.0];
        let std = [1.0, 10.0];
        let (h, norm) = height_only(&height, &std, &[0, 1], HeightMethod::Weighted);
        assert!(h < 11.0);
        assert_relative_eq!(norm.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_std_is_deweighted_not_excluded() {
        let height = [10.0, 20.0];
        let std = [1.0, f64::INFINITY];
        let (h, _) = height_only(&height, &std, &[0, 1], HeightMethod::Weighted);
        assert!(h.is_finite());
        assert!(h > 10.0 && h < 10.1);
    }

    #[test]
    fn test_empty_subset_height_is_fill() {
        let agg = HeightAreaAggregator::new();
        let h = agg.aggregate_height(&[], &[], &[], HeightMethod::Weighted);
        assert_eq!(h, FV_DOUBLE);
    }

    #[test]
    fn test_fill_heights_are_masked() {
        let height = [10.0, FV_DOUBLE, 14.0];
        let std = [1.0; 3];
        let (h, _) = height_only(&height, &std, &[0, 1, 2], HeightMethod::Uniform);
        assert_relative_eq!(h, 12.0);
    }

    fn area_inputs<'a>(
        pixel_area: &'a [f64],
        water_frac: &'a [f64],
        water_frac_uncert: &'a [f64],
        darea_dheight: &'a [f64],
        classification: &'a [u8],
        fdr: &'a [f64],
        mdr: &'a [f64],
    ) -> AreaInputs<'a> {
        AreaInputs {
            pixel_area,
            water_frac,
            water_frac_uncert,
            darea_dheight,
            classification,
            false_detection_rate: fdr,
            missed_detection_rate: mdr,
        }
    }

    #[test]
    fn test_area_composite_three_pixels() {
        let pixel_area = [10.0, 10.0, 10.0];
        let water_frac = [1.0, 1.0, 1.0];
        let wf_uncert = [0.1, 0.1, 0.1];
        let darea = [0.5, 0.5, 0.5];
        let klass = [CLASSIF_INTERIOR_WATER; 3];
        let fdr = [0.05, 0.05, 0.05];
        let mdr = [0.05, 0.05, 0.05];
        let inputs = area_inputs(&pixel_area, &water_frac, &wf_uncert, &darea, &klass, &fdr, &mdr);

        let agg = HeightAreaAggregator::new();
        let result = agg.aggregate_area_with_uncert(&inputs, &[0, 1, 2], AreaMethod::Composite);
        assert_relative_eq!(result.area, 30.0);
        assert!(result.area_uncert > 0.0);
        assert!(result.area_pcnt_uncert > 0.0);
    }

    #[test]
    fn test_area_edge_pixels_use_water_fraction() {
        let pixel_area = [10.0, 10.0];
        let water_frac = [1.0, 0.5];
        let wf_uncert = [0.0, 0.0];
        let darea = [0.0, 0.0];
        let klass = [CLASSIF_INTERIOR_WATER, CLASSIF_WATER_EDGE];
        let fdr = [0.0, 0.0];
        let mdr = [0.0, 0.0];
        let inputs = area_inputs(&pixel_area, &water_frac, &wf_uncert, &darea, &klass, &fdr, &mdr);

        let area = area_only(&inputs, &[0, 1], AreaMethod::Composite);
        assert_relative_eq!(area, 15.0);
        assert_relative_eq!(area_only(&inputs, &[0, 1], AreaMethod::Simple), 20.0);
    }

    #[test]
    fn test_area_zeroed_classification_is_excluded() {
        // Dark-zeroed view: code 0 pixels contribute nothing
        let pixel_area = [10.0, 10.0];
        let water_frac = [1.0, 1.0];
        let wf_uncert = [0.0, 0.0];
        let darea = [0.0, 0.0];
        let klass = [CLASSIF_INTERIOR_WATER, 0];
        let fdr = [0.0, 0.0];
        let mdr = [0.0, 0.0];
        let inputs = area_inputs(&pixel_area, &water_frac, &wf_uncert, &darea, &klass, &fdr, &mdr);
        assert_relative_eq!(area_only(&inputs, &[0, 1], AreaMethod::Composite), 10.0);
    }

    #[test]
    fn test_area_empty_subset() {
        let inputs = area_inputs(&[], &[], &[], &[], &[], &[], &[]);
        let agg = HeightAreaAggregator::new();
        let result = agg.aggregate_area_with_uncert(&inputs, &[], AreaMethod::Composite);
        assert_eq!(result.area, 0.0);
        assert_eq!(result.area_uncert, 0.0);
        assert_eq!(result.area_pcnt_uncert, 0.0);
    }

    #[test]
    fn test_height_uncert_is_finite_for_coherent_feature() {
        let n = 4;
        let corrected_height = vec![10.0; n];
        let height_std_pix = vec![0.1; n];
        let rare = vec![4.0; n];
        let medium = vec![8.0; n];
        let ifgram = vec![Complex::new(0.9, 0.1); n];
        let p1 = vec![1.0; n];
        let p2 = vec![1.0; n];
        let dh_dphi = vec![20.0; n];
        let inputs = HeightUncertInputs {
            corrected_height: &corrected_height,
            height_std_pix: &height_std_pix,
            eff_num_rare_looks: &rare,
            eff_num_medium_looks: &medium,
            ifgram_flattened: &ifgram,
            power_plus_y: &p1,
            power_minus_y: &p2,
            dheight_dphase: &dh_dphi,
            looks_to_efflooks: 1.5,
        };
        let subset: Vec<usize> = (0..n).collect();
        let agg = HeightAreaAggregator::new();
        let result = agg.aggregate_height_with_uncert(&inputs, &subset, HeightMethod::Weighted);
        assert_relative_eq!(result.height, 10.0);
        assert!(result.height_uncert.is_finite() && result.height_uncert < FV_DOUBLE);
        assert!(result.height_uncert > 0.0);
        // Identical heights: sample std is zero
        assert_relative_eq!(result.height_std, 0.0);
    }

    #[test]
    fn test_height_uncert_degenerate_power_gives_fill() {
        let corrected_height = [10.0];
        let height_std_pix = [0.1];
        let rare = [4.0];
        let medium = [8.0];
        let ifgram = [Complex::new(0.0, 0.0)];
        let p1 = [0.0];
        let p2 = [0.0];
        let dh_dphi = [20.0];
        let inputs = HeightUncertInputs {
            corrected_height: &corrected_height,
            height_std_pix: &height_std_pix,
            eff_num_rare_looks: &rare,
            eff_num_medium_looks: &medium,
            ifgram_flattened: &ifgram,
            power_plus_y: &p1,
            power_minus_y: &p2,
            dheight_dphase: &dh_dphi,
            looks_to_efflooks: 1.5,
        };
        let agg = HeightAreaAggregator::new();
        let result = agg.aggregate_height_with_uncert(&inputs, &[0], HeightMethod::Uniform);
        assert_eq!(result.height_uncert, FV_DOUBLE);
    }
}

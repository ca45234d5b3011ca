use approx::assert_relative_eq;
use laketile::core::{AreaMethod, HeightMethod, LabelingParams};
use laketile::types::FV_DOUBLE;
use laketile::{
    EntityLabeler, NadirChannels, PixelChannels, PixelCloud, SelectionParams, TileMetadata,
};
use num_complex::Complex;

fn tile_metadata(nb_pix_range: usize, nb_pix_azimuth: usize) -> TileMetadata {
    TileMetadata {
        tile_name: "042_123_L".to_string(),
        nb_pix_range,
        nb_pix_azimuth,
        near_range: 890_000.0,
        wavelength: 0.008385803,
        looks_to_efflooks: 1.5,
        inner_first: (0.0, 0.0),
        outer_first: (1.0, 0.0),
        outer_last: (1.0, 1.0),
        inner_last: (0.0, 1.0),
        time_coverage_start: None,
        time_coverage_end: None,
    }
}

/// Raw channels for water pixels at the given grid coordinates, with
/// physically plausible defaults for every other channel
fn raw_channels(range_index: &[usize], azimuth_index: &[usize]) -> PixelChannels {
    let n = range_index.len();
    assert_eq!(n, azimuth_index.len());
    PixelChannels {
        classification: vec![4; n],
        range_index: range_index.to_vec(),
        azimuth_index: azimuth_index.to_vec(),
        latitude: vec![0.5; n],
        longitude: vec![0.5; n],
        height: vec![10.0; n],
        cross_track: vec![12_000.0; n],
        pixel_area: vec![10.0; n],
        water_frac: vec![1.0; n],
        water_frac_uncert: vec![0.1; n],
        false_detection_rate: vec![0.05; n],
        missed_detection_rate: vec![0.05; n],
        interferogram: vec![Complex::new(0.9, 0.1); n],
        power_plus_y: vec![1.0; n],
        power_minus_y: vec![1.0; n],
        phase_noise_std: vec![0.01; n],
        dheight_dphase: vec![20.0; n],
        dlatitude_dphase: vec![1e-6; n],
        dlongitude_dphase: vec![1e-6; n],
        dheight_drange: vec![0.1; n],
        darea_dheight: vec![0.5; n],
        eff_num_rare_looks: vec![4.0; n],
        eff_num_medium_looks: vec![8.0; n],
        illumination_time: (0..n).map(|i| i as f64 * 0.1).collect(),
        geoid: vec![0.5; n],
        solid_earth_tide: vec![0.01; n],
        pole_tide: vec![0.002; n],
        load_tide_fes: vec![0.003; n],
    }
}

fn nadir_channels(nb_samples: usize) -> NadirChannels {
    NadirChannels {
        time: (0..nb_samples).map(|i| i as f64 * 0.1).collect(),
        latitude: vec![0.5; nb_samples],
        longitude: vec![0.4; nb_samples],
        x: vec![7.0e6; nb_samples],
        y: vec![0.0; nb_samples],
        z: vec![0.0; nb_samples],
        vx: vec![0.0; nb_samples],
        vy: vec![7500.0; nb_samples],
        vz: vec![0.0; nb_samples],
        plus_y_antenna_x: vec![7.0e6; nb_samples],
        plus_y_antenna_y: vec![5.0; nb_samples],
        plus_y_antenna_z: vec![0.0; nb_samples],
        minus_y_antenna_x: vec![7.0e6; nb_samples],
        minus_y_antenna_y: vec![-5.0; nb_samples],
        minus_y_antenna_z: vec![0.0; nb_samples],
    }
}

fn selection_params() -> SelectionParams {
    SelectionParams::from_flag_strings("3;4", "23;24").unwrap()
}

fn ingest(
    metadata: TileMetadata,
    raw: &PixelChannels,
) -> PixelCloud {
    let nadir = nadir_channels(raw.len().max(1) + 2);
    PixelCloud::from_arrays(metadata, raw, &nadir, None, &selection_params()).unwrap()
}

#[test]
fn test_single_interior_blob_scenario() {
    // 3-pixel diagonal blob entirely inside azimuth rows 1..=3 of a 5x5 tile
    let raw = raw_channels(&[1, 2, 3], &[1, 2, 3]);
    let mut cloud = ingest(tile_metadata(5, 5), &raw);
    assert_eq!(cloud.nb_selected, 3);

    let labeler = EntityLabeler::new(LabelingParams::default());
    cloud.label_entities(&labeler).unwrap();
    assert_eq!(cloud.nb_obj, 1);
    assert_eq!(cloud.labels, vec![1, 1, 1]);

    cloud.classify_edges();
    let edges = cloud.edges().unwrap();
    assert_eq!(edges.labels_inside, vec![1]);
    assert_eq!(edges.nb_obj_at_bottom_edge(), 0);
    assert_eq!(edges.nb_obj_at_top_edge(), 0);
    assert_eq!(edges.nb_obj_at_both_edges(), 0);
    assert_eq!(cloud.edge_pixel_rows().len(), 0);

    // water_frac = 1.0 and pixel_area = 10.0 for all 3 pixels
    let subset = cloud.entity_pixels(1);
    let (area_total, area_total_uncert, area_detected, _) =
        cloud.aggregate_area_with_uncert(&subset, AreaMethod::Composite);
    assert_relative_eq!(area_total, 30.0, epsilon = 1e-9);
    assert!(area_total_uncert > 0.0);
    assert_relative_eq!(area_detected, 30.0, epsilon = 1e-9);
}

#[test]
fn test_both_edges_strip_scenario() {
    // Tall vertical strip straddling azimuth 0 and azimuth max
    let az: Vec<usize> = (0..5).collect();
    let rg = vec![2usize; 5];
    let raw = raw_channels(&rg, &az);
    let mut cloud = ingest(tile_metadata(5, 5), &raw);

    let labeler = EntityLabeler::new(LabelingParams::default());
    cloud.label_entities(&labeler).unwrap();
    // Only once in the dense label space
    assert_eq!(cloud.nb_obj, 1);

    cloud.classify_edges();
    let edges = cloud.edges().unwrap();
    assert_eq!(edges.labels_at_both_edges, vec![1]);
    assert_eq!(edges.nb_obj_inside(), 0);
    assert_eq!(
        edges.nb_obj_inside()
            + edges.nb_obj_at_bottom_edge()
            + edges.nb_obj_at_top_edge()
            + edges.nb_obj_at_both_edges(),
        cloud.nb_obj
    );

    // Every member pixel is tagged "both", even the non-boundary rows,
    // so the stitcher sees the entity at each boundary
    let rows = cloud.edge_pixel_rows();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.location.code() == 2));
}

#[test]
fn test_edge_partition_is_complete() {
    // Bottom entity, interior entity, top entity
    let rg = vec![0usize, 0, 2, 2, 4, 4];
    let az = vec![0usize, 1, 2, 3, 8, 9];
    let raw = raw_channels(&rg, &az);
    let mut cloud = ingest(tile_metadata(5, 10), &raw);

    let labeler = EntityLabeler::new(LabelingParams::default());
    cloud.label_entities(&labeler).unwrap();
    assert_eq!(cloud.nb_obj, 3);

    cloud.classify_edges();
    let edges = cloud.edges().unwrap();
    assert_eq!(edges.nb_obj_at_bottom_edge(), 1);
    assert_eq!(edges.nb_obj_inside(), 1);
    assert_eq!(edges.nb_obj_at_top_edge(), 1);
    assert_eq!(
        edges.nb_obj_inside()
            + edges.nb_obj_at_bottom_edge()
            + edges.nb_obj_at_top_edge()
            + edges.nb_obj_at_both_edges(),
        cloud.nb_obj
    );

    // Every pixel carries exactly one label in 1..=nb_obj
    assert!(cloud.labels.iter().all(|&l| l >= 1 && l <= cloud.nb_obj as u32));

    // Edge rows map back to the original pixel indices
    let rows = cloud.edge_pixel_rows();
    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert_eq!(row.pixc_index, cloud.selected_index[row.selected_pos]);
    }
}

#[test]
fn test_empty_tile_is_degenerate_not_fatal() {
    // Land-only tile: nothing selected, every downstream step degrades
    let mut raw = raw_channels(&[1, 2], &[1, 2]);
    raw.classification = vec![1, 1];
    let mut cloud = ingest(tile_metadata(5, 5), &raw);
    assert_eq!(cloud.nb_selected, 0);

    let labeler = EntityLabeler::new(LabelingParams::default());
    cloud.label_entities(&labeler).unwrap();
    assert_eq!(cloud.nb_obj, 0);

    let height = cloud.aggregate_height(&[], HeightMethod::Weighted);
    assert_eq!(height, FV_DOUBLE);
    let (area, area_uncert, _, _) = cloud.aggregate_area_with_uncert(&[], AreaMethod::Composite);
    assert_eq!(area, 0.0);
    assert_eq!(area_uncert, 0.0);

    assert!(cloud.summarize_entities(HeightMethod::Weighted, AreaMethod::Composite).is_empty());
}

#[test]
fn test_corrected_height_masking_is_all_or_nothing() {
    let mut raw = raw_channels(&[1, 2], &[1, 2]);
    // Second pixel has a fill-valued FES load tide, everything else valid
    raw.load_tide_fes[1] = FV_DOUBLE;
    let cloud = ingest(tile_metadata(5, 5), &raw);

    let expected = 10.0 - 0.5 - 0.01 - 0.002 - 0.003;
    assert_relative_eq!(cloud.corrected_height[0], expected, epsilon = 1e-9);
    // No partially corrected value: the pixel gets fill
    assert_eq!(cloud.corrected_height[1], FV_DOUBLE);
}

#[test]
fn test_segmentation_threshold_disable_matches_skip() {
    // A contiguous strip with a sharp height step down its middle
    let rg = vec![1usize; 6];
    let az: Vec<usize> = (0..6).collect();
    let mut raw = raw_channels(&rg, &az);
    raw.height = vec![10.0, 10.0, 10.0, 42.0, 42.0, 42.0];

    let mut disabled = ingest(tile_metadata(5, 6), &raw);
    disabled
        .label_entities(&EntityLabeler::new(LabelingParams { max_height_std: -1.0 }))
        .unwrap();

    let mut enabled = ingest(tile_metadata(5, 6), &raw);
    enabled
        .label_entities(&EntityLabeler::new(LabelingParams { max_height_std: 2.0 }))
        .unwrap();

    assert_eq!(disabled.nb_obj, 1);
    assert_eq!(enabled.nb_obj, 2);
}

#[test]
fn test_flatten_then_summarize_entities() {
    let _ = env_logger::builder().is_test(true).try_init();

    let raw = raw_channels(&[1, 2, 3], &[1, 2, 3]);
    let mut cloud = ingest(tile_metadata(5, 5), &raw);
    let labeler = EntityLabeler::new(LabelingParams::default());
    cloud.label_entities(&labeler).unwrap();
    cloud.classify_edges();

    // Serial flattening pass for every entity, then parallel aggregation
    for label in 1..=cloud.nb_obj as u32 {
        let subset = cloud.entity_pixels(label);
        let targets: Vec<[f64; 3]> = subset.iter().map(|_| [6.4e6, 1.0e5, 0.0]).collect();
        cloud.flatten_interferogram(&subset, &targets).unwrap();
    }

    let summaries = cloud.summarize_entities(HeightMethod::Weighted, AreaMethod::Composite);
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.label, 1);
    assert_eq!(summary.nb_pixels, 3);
    let expected_height = 10.0 - 0.5 - 0.01 - 0.002 - 0.003;
    assert_relative_eq!(summary.height, expected_height, epsilon = 1e-9);
    assert!(summary.height_uncert > 0.0 && summary.height_uncert < FV_DOUBLE);
    assert_relative_eq!(summary.area_total, 30.0, epsilon = 1e-9);
    assert!(summary.area_total_uncert > 0.0);
}

#[test]
fn test_zero_sized_grid_aborts_tile() {
    // Malformed tile attributes must be rejected up front, not discovered
    // deep inside the edge partition
    let raw = raw_channels(&[], &[]);
    let nadir = nadir_channels(2);
    let err = PixelCloud::from_arrays(tile_metadata(5, 0), &raw, &nadir, None, &selection_params())
        .unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("042_123_L"));
    assert!(msg.contains("grid"));

    let err = PixelCloud::from_arrays(tile_metadata(0, 5), &raw, &nadir, None, &selection_params())
        .unwrap_err();
    assert!(format!("{}", err).contains("grid"));
}

#[test]
fn test_summaries_are_ordered_by_label() {
    // Two separated blobs aggregated through the parallel entity sweep
    let rg = vec![0usize, 0, 4, 4];
    let az = vec![1usize, 2, 7, 8];
    let raw = raw_channels(&rg, &az);
    let mut cloud = ingest(tile_metadata(5, 10), &raw);
    cloud.label_entities(&EntityLabeler::new(LabelingParams::default())).unwrap();
    assert_eq!(cloud.nb_obj, 2);

    let summaries = cloud.summarize_entities(HeightMethod::Weighted, AreaMethod::Composite);
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].label, 1);
    assert_eq!(summaries[1].label, 2);
    assert_eq!(summaries[0].nb_pixels + summaries[1].nb_pixels, 4);
}

#[test]
fn test_grid_index_out_of_bounds_aborts_tile() {
    let raw = raw_channels(&[7], &[1]);
    let mut cloud = ingest(tile_metadata(5, 5), &raw);
    let labeler = EntityLabeler::new(LabelingParams::default());
    let err = cloud.label_entities(&labeler).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("042_123_L"));
    assert!(msg.contains("range"));
}

use serde::{Deserialize, Serialize};

/// Edge location of an entity touching a tile azimuth boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeLocation {
    Bottom = 0,
    Top = 1,
    Both = 2,
}

impl EdgeLocation {
    /// Wire code consumed by the external cross-tile stitcher
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One row of the flat edge-pixel table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgePixel {
    /// Pixel index into the selected arrays
    pub index: usize,
    /// Entity label of the pixel
    pub label: u32,
    /// Edge location, uniform across the whole entity
    pub location: EdgeLocation,
}

/// Partition of tile entities into interior vs. edge-touching classes,
/// plus the flat edge-pixel bookkeeping for the external stitcher
#[derive(Debug, Clone, Default)]
pub struct EdgeClassification {
    /// Labels of entities entirely inside the tile
    pub labels_inside: Vec<u32>,
    /// Labels present only at azimuth row 0
    pub labels_at_bottom_edge: Vec<u32>,
    /// Labels present only at azimuth row nb_pix_azimuth - 1
    pub labels_at_top_edge: Vec<u32>,
    /// Labels present at both boundary rows
    pub labels_at_both_edges: Vec<u32>,
    /// Flat edge-pixel table; all member pixels of every non-interior
    /// entity, tagged with the entity's uniform location code
    pub edge_pixels: Vec<EdgePixel>,
}

impl EdgeClassification {
    pub fn nb_obj_inside(&self) -> usize {
        self.labels_inside.len()
    }
    pub fn nb_obj_at_bottom_edge(&self) -> usize {
        self.labels_at_bottom_edge.len()
    }
    pub fn nb_obj_at_top_edge(&self) -> usize {
        self.labels_at_top_edge.len()
    }
    pub fn nb_obj_at_both_edges(&self) -> usize {
        self.labels_at_both_edges.len()
    }
    pub fn nb_edge_pix(&self) -> usize {
        self.edge_pixels.len()
    }
}

/// Partitions labeled entities by tile-boundary contact
pub struct EdgeClassifier;

impl EdgeClassifier {
    /// Classify every label as interior, bottom, top, or both, and gather
    /// the member pixels of each non-interior label.
    ///
    /// Entity granularity rules: even the pixels of a "both" entity that
    /// are not literally on a boundary row carry location code 2, because
    /// the external stitcher merges whole entities, not pixels. An empty
    /// edge table is a valid output, not an error.
    pub fn classify(
        azimuth_index: &[usize],
        labels: &[u32],
        nb_pix_azimuth: usize,
        nb_obj: usize,
    ) -> EdgeClassification {
        // A degenerate tile with no azimuth rows has no boundary rows either
        let top_row = nb_pix_azimuth.saturating_sub(1);
        let labels_at_az_0 = labels_present_at(azimuth_index, labels, 0);
        let labels_at_az_max = labels_present_at(azimuth_index, labels, top_row);

        let labels_at_both_edges: Vec<u32> = labels_at_az_0
            .iter()
            .copied()
            .filter(|l| labels_at_az_max.contains(l))
            .collect();
        let labels_at_bottom_edge: Vec<u32> = labels_at_az_0
            .iter()
            .copied()
            .filter(|l| !labels_at_both_edges.contains(l))
            .collect();
        let labels_at_top_edge: Vec<u32> = labels_at_az_max
            .iter()
            .copied()
            .filter(|l| !labels_at_both_edges.contains(l))
            .collect();

        log::info!(
            "> {} labels at bottom (az=0) AND top (az={}) of the tile",
            labels_at_both_edges.len(),
            top_row
        );
        log::info!("> {} labels at bottom of the tile (az=0)", labels_at_bottom_edge.len());
        log::info!(
            "> {} labels at top of the tile (az={})",
            labels_at_top_edge.len(),
            top_row
        );

        let labels_inside: Vec<u32> = (1..=nb_obj as u32)
            .filter(|l| {
                !labels_at_bottom_edge.contains(l)
                    && !labels_at_top_edge.contains(l)
                    && !labels_at_both_edges.contains(l)
            })
            .collect();
        log::info!("> {} objects entirely inside the tile", labels_inside.len());

        let mut edge_pixels = Vec::new();
        for (label_set, location) in [
            (&labels_at_bottom_edge, EdgeLocation::Bottom),
            (&labels_at_top_edge, EdgeLocation::Top),
            (&labels_at_both_edges, EdgeLocation::Both),
        ] {
            for &label in label_set.iter() {
                for (index, &pix_label) in labels.iter().enumerate() {
                    if pix_label == label {
                        edge_pixels.push(EdgePixel { index, label, location });
                    }
                }
            }
        }
        if edge_pixels.is_empty() {
            log::info!("NO edge pixel to deal with");
        }

        EdgeClassification {
            labels_inside,
            labels_at_bottom_edge,
            labels_at_top_edge,
            labels_at_both_edges,
            edge_pixels,
        }
    }
}

/// Sorted distinct labels present at one azimuth row
fn labels_present_at(azimuth_index: &[usize], labels: &[u32], row: usize) -> Vec<u32> {
    let mut present: Vec<u32> = azimuth_index
        .iter()
        .zip(labels.iter())
        .filter(|(&az, _)| az == row)
        .map(|(_, &l)| l)
        .collect();
    present.sort_unstable();
    present.dedup();
    present
}

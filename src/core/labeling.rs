use crate::types::{TileError, TileResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Parameters for entity labeling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelingParams {
    /// Maximum allowed height std within one label before it is re-split.
    /// A negative value (canonically -1) disables height re-segmentation.
    pub max_height_std: f64,
}

impl Default for LabelingParams {
    fn default() -> Self {
        Self { max_height_std: -1.0 }
    }
}

/// Result of entity labeling over one tile
#[derive(Debug, Clone)]
pub struct LabelingResult {
    /// 1-based label per selected pixel, aligned with pixel index order
    pub labels: Vec<u32>,
    /// Number of distinct entities (labels are dense in 1..=nb_obj)
    pub nb_obj: usize,
}

/// Builds the water occupancy grid, finds connected components, and
/// optionally re-splits components with discontinuous height
pub struct EntityLabeler {
    params: LabelingParams,
}

impl EntityLabeler {
    pub fn new(params: LabelingParams) -> Self {
        Self { params }
    }

    /// Label all separate water entities in the tile.
    ///
    /// Inputs are the selected pixels' grid coordinates and heights plus the
    /// tile dimensions. Every pixel receives exactly one label in
    /// 1..=nb_obj; grid coordinates outside the tile are a fatal error.
    pub fn label(
        &self,
        tile_name: &str,
        range_index: &[usize],
        azimuth_index: &[usize],
        height: &[f64],
        nb_pix_range: usize,
        nb_pix_azimuth: usize,
    ) -> TileResult<LabelingResult> {
        let water_mask =
            build_water_mask(tile_name, range_index, azimuth_index, nb_pix_range, nb_pix_azimuth)?;

        let (label_grid, nb_obj) = label_regions(&water_mask);
        log::info!("{} separate entities in the water mask", nb_obj);

        // Map the 2D label grid back onto the 1D pixel order
        let mut labels: Vec<u32> = range_index
            .iter()
            .zip(azimuth_index.iter())
            .map(|(&rg, &az)| label_grid[[rg, az]])
            .collect();

        if self.params.max_height_std < 0.0 {
            log::info!("Entity segmentation following height disabled");
        } else {
            labels = self.resegment_by_height(&labels, range_index, azimuth_index, height);
        }

        // Explicit densification: labels become 1..=nb_obj whatever the
        // split order produced
        let nb_obj = densify_labels(&mut labels);

        Ok(LabelingResult { labels, nb_obj })
    }

    /// Re-split labels whose member heights vary more than the threshold.
    /// Sub-components are appended past the running maximum label.
    fn resegment_by_height(
        &self,
        labels: &[u32],
        range_index: &[usize],
        azimuth_index: &[usize],
        height: &[f64],
    ) -> Vec<u32> {
        let mut new_labels = vec![0u32; labels.len()];
        let mut next_base = 0u32;

        for label in unique_sorted(labels) {
            let idx: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == label).collect();

            // Normalize member coordinates to the local bounding box
            let min_rg = idx.iter().map(|&i| range_index[i]).min().unwrap_or(0);
            let min_az = idx.iter().map(|&i| azimuth_index[i]).min().unwrap_or(0);
            let local_rg: Vec<usize> = idx.iter().map(|&i| range_index[i] - min_rg).collect();
            let local_az: Vec<usize> = idx.iter().map(|&i| azimuth_index[i] - min_az).collect();
            let local_height: Vec<f64> = idx.iter().map(|&i| height[i]).collect();

            let sub = relabel_by_height(&local_rg, &local_az, &local_height, self.params.max_height_std);
            let nb_sub = sub.iter().copied().max().unwrap_or(0);
            if nb_sub > 1 {
                log::debug!("label {} split into {} height components", label, nb_sub);
            }
            for (k, &i) in idx.iter().enumerate() {
                new_labels[i] = next_base + sub[k];
            }
            next_base += nb_sub;
        }

        new_labels
    }
}

/// Build the boolean water occupancy grid (range x azimuth) from the
/// selected pixels' grid coordinates
pub fn build_water_mask(
    tile_name: &str,
    range_index: &[usize],
    azimuth_index: &[usize],
    nb_pix_range: usize,
    nb_pix_azimuth: usize,
) -> TileResult<Array2<bool>> {
    let mut mask = Array2::<bool>::from_elem((nb_pix_range, nb_pix_azimuth), false);
    for (&rg, &az) in range_index.iter().zip(azimuth_index.iter()) {
        if rg >= nb_pix_range {
            return Err(TileError::IndexOutOfBounds {
                tile: tile_name.to_string(),
                axis: "range",
                index: rg,
                size: nb_pix_range,
            });
        }
        if az >= nb_pix_azimuth {
            return Err(TileError::IndexOutOfBounds {
                tile: tile_name.to_string(),
                axis: "azimuth",
                index: az,
                size: nb_pix_azimuth,
            });
        }
        mask[[rg, az]] = true;
    }
    Ok(mask)
}

/// Connected-component labeling over a boolean grid, 8-connectivity.
///
/// Two-pass union-find; returns the label grid (0 = background) and the
/// number of components, with labels dense in 1..=count.
pub fn label_regions(mask: &Array2<bool>) -> (Array2<u32>, usize) {
    let (rows, cols) = mask.dim();
    let mut grid = Array2::<u32>::zeros((rows, cols));
    let mut parent: Vec<u32> = vec![0]; // parent[0] unused (background)

    // First pass: provisional labels from already-visited 8-neighbors
    for i in 0..rows {
        for j in 0..cols {
            if !mask[[i, j]] {
                continue;
            }
            let mut neighbor_label = 0u32;
            let mut neighbors: [u32; 4] = [0; 4];
            let mut n = 0;
            if i > 0 {
                if j > 0 && grid[[i - 1, j - 1]] != 0 {
                    neighbors[n] = grid[[i - 1, j - 1]];
                    n += 1;
                }
                if grid[[i - 1, j]] != 0 {
                    neighbors[n] = grid[[i - 1, j]];
                    n += 1;
                }
                if j + 1 < cols && grid[[i - 1, j + 1]] != 0 {
                    neighbors[n] = grid[[i - 1, j + 1]];
                    n += 1;
                }
            }
            if j > 0 && grid[[i, j - 1]] != 0 {
                neighbors[n] = grid[[i, j - 1]];
                n += 1;
            }
            for &nb in &neighbors[..n] {
                let root = find(&mut parent, nb);
                if neighbor_label == 0 || root < neighbor_label {
                    neighbor_label = root;
                }
            }
            if neighbor_label == 0 {
                // New provisional component
                let new_label = parent.len() as u32;
                parent.push(new_label);
                grid[[i, j]] = new_label;
            } else {
                grid[[i, j]] = neighbor_label;
                for &nb in &neighbors[..n] {
                    union(&mut parent, neighbor_label, nb);
                }
            }
        }
    }

    // Second pass: resolve roots and compress to dense labels
    let mut dense: Vec<u32> = vec![0; parent.len()];
    let mut count = 0u32;
    for i in 0..rows {
        for j in 0..cols {
            let label = grid[[i, j]];
            if label == 0 {
                continue;
            }
            let root = find(&mut parent, label);
            if dense[root as usize] == 0 {
                count += 1;
                dense[root as usize] = count;
            }
            grid[[i, j]] = dense[root as usize];
        }
    }

    (grid, count as usize)
}

fn find(parent: &mut Vec<u32>, label: u32) -> u32 {
    let mut root = label;
    while parent[root as usize] != root {
        root = parent[root as usize];
    }
    // Path compression
    let mut cur = label;
    while parent[cur as usize] != root {
        let next = parent[cur as usize];
        parent[cur as usize] = root;
        cur = next;
    }
    root
}

fn union(parent: &mut Vec<u32>, a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi as usize] = lo;
    }
}

/// Split one entity's pixels by height similarity, then by spatial
/// adjacency inside each height cluster.
///
/// Coordinates are local to the entity's bounding box. Returns 1-based
/// sub-labels, dense in 1..=nb_sub. A height std at or below the threshold
/// keeps the entity whole.
pub fn relabel_by_height(
    local_rg: &[usize],
    local_az: &[usize],
    height: &[f64],
    max_height_std: f64,
) -> Vec<u32> {
    let n = height.len();
    if n < 2 || population_std(height) <= max_height_std {
        return vec![1u32; n];
    }

    // Grow k until every height cluster fits the threshold
    let max_k = n.min(8);
    let mut assignment = vec![0usize; n];
    for k in 2..=max_k {
        assignment = kmeans_1d(height, k);
        let ok = (0..k).all(|c| {
            let members: Vec<f64> = (0..n).filter(|&i| assignment[i] == c).map(|i| height[i]).collect();
            members.len() < 2 || population_std(&members) <= max_height_std
        });
        if ok {
            break;
        }
    }

    // Spatial relabeling inside each height cluster
    let rows = local_rg.iter().copied().max().unwrap_or(0) + 1;
    let cols = local_az.iter().copied().max().unwrap_or(0) + 1;
    let nb_clusters = assignment.iter().copied().max().unwrap_or(0) + 1;
    let mut sub_labels = vec![0u32; n];
    let mut offset = 0u32;
    for c in 0..nb_clusters {
        let members: Vec<usize> = (0..n).filter(|&i| assignment[i] == c).collect();
        if members.is_empty() {
            continue;
        }
        let mut mask = Array2::<bool>::from_elem((rows, cols), false);
        for &i in &members {
            mask[[local_rg[i], local_az[i]]] = true;
        }
        let (grid, nb) = label_regions(&mask);
        for &i in &members {
            sub_labels[i] = offset + grid[[local_rg[i], local_az[i]]];
        }
        offset += nb as u32;
    }

    sub_labels
}

/// Deterministic 1-D k-means on heights: centroids seeded at evenly
/// spaced quantiles of the sorted values, fixed iteration cap.
fn kmeans_1d(values: &[f64], k: usize) -> Vec<usize> {
    let n = values.len();
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut centroids: Vec<f64> = (0..k)
        .map(|c| sorted[((c as f64 + 0.5) / k as f64 * n as f64) as usize % n])
        .collect();
    let mut assignment = vec![0usize; n];

    for _ in 0..50 {
        let mut changed = false;
        for i in 0..n {
            let mut best = 0usize;
            let mut best_dist = f64::INFINITY;
            for (c, &centroid) in centroids.iter().enumerate() {
                let dist = (values[i] - centroid).abs();
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            if assignment[i] != best {
                assignment[i] = best;
                changed = true;
            }
        }
        for c in 0..k {
            let members: Vec<f64> = (0..n).filter(|&i| assignment[i] == c).map(|i| values[i]).collect();
            if !members.is_empty() {
                centroids[c] = members.iter().sum::<f64>() / members.len() as f64;
            }
        }
        if !changed {
            break;
        }
    }
    assignment
}

/// Remap labels onto a dense 1..=nb_obj space, preserving relative order.
/// Returns the number of distinct labels.
pub fn densify_labels(labels: &mut [u32]) -> usize {
    let distinct = unique_sorted(labels);
    let mut remap = std::collections::HashMap::with_capacity(distinct.len());
    for (rank, &label) in distinct.iter().enumerate() {
        remap.insert(label, rank as u32 + 1);
    }
    for label in labels.iter_mut() {
        if let Some(&dense) = remap.get(label) {
            *label = dense;
        }
    }
    distinct.len()
}

fn unique_sorted(labels: &[u32]) -> Vec<u32> {
    let mut distinct: Vec<u32> = labels.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    distinct
}

/// Population standard deviation (matches the reference behavior)
fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

use crate::types::{is_valid_f64, TileError, TileResult, CLASSIF_REJECTED};
use serde::{Deserialize, Serialize};

/// Classification keep-lists for pixel selection
///
/// The external config collaborator supplies the water and dark-water flag
/// groups as semicolon-delimited integer lists (e.g. `"3;4"` and `"23;24"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionParams {
    /// Classification codes counted as water
    pub water_flags: Vec<u8>,
    /// Classification codes counted as dark water (lower confidence)
    pub dark_flags: Vec<u8>,
}

impl SelectionParams {
    /// Build keep-lists from the config collaborator's semicolon-delimited strings
    pub fn from_flag_strings(water: &str, dark: &str) -> TileResult<Self> {
        Ok(Self {
            water_flags: parse_flag_list(water)?,
            dark_flags: parse_flag_list(dark)?,
        })
    }

    /// All classification codes to keep (water then dark)
    pub fn keep_flags(&self) -> Vec<u8> {
        let mut flags = self.water_flags.clone();
        flags.extend_from_slice(&self.dark_flags);
        flags
    }
}

/// Parse a semicolon-delimited classification flag list, e.g. `"3;4"`.
/// An empty string yields an empty list.
pub fn parse_flag_list(list: &str) -> TileResult<Vec<u8>> {
    let trimmed = list.trim().trim_matches('"');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(';')
        .map(|tok| {
            tok.trim()
                .parse::<u8>()
                .map_err(|_| TileError::InvalidFlagList(list.to_string()))
        })
        .collect()
}

/// Result of pixel selection: an ascending index list into the raw arrays
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    /// Indices of kept pixels, ascending in original order
    pub selected_index: Vec<usize>,
    /// Number of kept pixels (= selected_index.len())
    pub nb_selected: usize,
}

/// Filters the raw per-pixel channels down to the subset usable for a tile
pub struct PixelSelector {
    params: SelectionParams,
}

impl PixelSelector {
    pub fn new(params: SelectionParams) -> Self {
        Self { params }
    }

    /// Select pixels whose classification is in the keep-set and whose
    /// longitude/latitude are neither fill nor NaN.
    ///
    /// `index_reject` lists pixels to force-exclude (e.g. pixels already
    /// attributed to a river mask upstream). The caller's arrays are never
    /// mutated; rejection is marked on a local working copy.
    pub fn select(
        &self,
        classification: &[u8],
        longitude: &[f64],
        latitude: &[f64],
        index_reject: Option<&[usize]>,
    ) -> SelectionResult {
        let nb_pix = classification.len();
        log::info!("There are {} pixels in the input pixel cloud", nb_pix);

        // Local working copy so the caller's classification stays untouched
        let mut tmp_classif = classification.to_vec();

        if let Some(reject) = index_reject {
            let nb_in_range = reject.iter().filter(|&&idx| idx < nb_pix).count();
            log::info!("{} pixels are force-excluded (river mask) => rejected", nb_in_range);
            for &idx in reject {
                if idx < nb_pix {
                    tmp_classif[idx] = CLASSIF_REJECTED;
                }
            }
        }

        // Reject pixels with fill-valued or NaN geolocation
        let mut nb_bad_lon = 0usize;
        let mut nb_bad_lat = 0usize;
        for i in 0..nb_pix {
            if !is_valid_f64(longitude[i]) {
                tmp_classif[i] = CLASSIF_REJECTED;
                nb_bad_lon += 1;
            } else if !is_valid_f64(latitude[i]) {
                tmp_classif[i] = CLASSIF_REJECTED;
                nb_bad_lat += 1;
            }
        }
        if nb_bad_lon != 0 {
            log::info!("{} pixels have fill or NaN longitude => rejected", nb_bad_lon);
        }
        if nb_bad_lat != 0 {
            log::info!("{} pixels have fill or NaN latitude => rejected", nb_bad_lat);
        }

        let keep = self.params.keep_flags();
        for flag in &keep {
            let count = tmp_classif.iter().filter(|&&c| c == *flag).count();
            log::info!("{} pixels with classification flag = {}", count, flag);
        }

        // Ascending, order-preserving scan over the keep-set
        let selected_index: Vec<usize> = (0..nb_pix)
            .filter(|&i| keep.contains(&tmp_classif[i]))
            .collect();
        let nb_selected = selected_index.len();
        log::info!("=> {} pixels to keep", nb_selected);

        SelectionResult {
            selected_index,
            nb_selected,
        }
    }
}

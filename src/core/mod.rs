//! Core pixel-cloud processing modules

pub mod selection;
pub mod labeling;
pub mod edges;
pub mod aggregate;
pub mod flatten;
pub mod cloud;

// Re-export main types
pub use selection::{parse_flag_list, PixelSelector, SelectionParams, SelectionResult};
pub use labeling::{build_water_mask, label_regions, EntityLabeler, LabelingParams, LabelingResult};
pub use edges::{EdgeClassification, EdgeClassifier, EdgeLocation, EdgePixel};
pub use aggregate::{
    AreaAggregate, AreaInputs, AreaMethod, AreaModelParams, AreaUncertaintyModel,
    BinomialAreaModel, HeightAreaAggregator, HeightMethod, HeightUncertAggregate,
    HeightUncertInputs,
};
pub use flatten::{AntennaGeometry, InterferogramFlattener};
pub use cloud::{EdgeRecord, EntitySummary, NadirChannels, PixelChannels, PixelCloud};

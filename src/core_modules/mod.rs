pub mod detected_region;
pub mod manifest;
pub mod quality;
pub mod reconciliation;
pub mod region_detector;
pub mod severity;
pub mod shelf_image;
pub mod utils;

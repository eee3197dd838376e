// Building blocks of the trail engine, from raw pixel operations up to the
// per-pass algorithms the pipeline strings together.

pub mod background_model;
pub mod compositor;
pub mod correction;
pub mod detection_box;
pub mod frame;
pub mod job_control;
pub mod keyframes;
pub mod motion_detector;
pub mod overlap_filter;
pub mod raster;
pub mod region_extractor;

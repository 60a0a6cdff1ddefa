mod capture;

pub use capture::{mat_to_raster, OpenCvVideo, ThreadedCamera};

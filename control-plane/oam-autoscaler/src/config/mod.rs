mod types;

pub use types::{AutoscalerConfig, KindSet};

pub mod autoscaler;
pub mod scaled_object;

// Mapping module: occupancy grid and ultrasonic scan fusion

pub mod occupancy_grid;
pub mod scan_fusion;

pub use occupancy_grid::*;
pub use scan_fusion::*;

//! Utility modules for picar_navigation

pub mod geometry;
pub mod visualization;

pub use geometry::*;
pub use visualization::{colors, PathStyle, PointStyle, Visualizer};

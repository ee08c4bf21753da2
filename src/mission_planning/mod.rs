//! Mission planning: the scan, plan and drive loop

pub mod navigator;

pub use navigator::*;

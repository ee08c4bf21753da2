//! picar_navigation - grid navigation stack for a small ultrasonic-sensing car
//!
//! Sweeps an ultrasonic sensor, fuses the readings into an occupancy grid,
//! plans with A* and drives the path with calibrated turn and drive
//! primitives, re-planning whenever new obstacles appear.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Navigation stack
pub mod mapping;
pub mod path_planning;
pub mod control;
pub mod mission_planning;
pub mod simulation;

// Re-export common types for convenience
pub use common::{Coordinate, Direction, GridPath, Leg, RangeSample, VehiclePose};
pub use common::{Clock, DriveActuator, GridPathPlanner, RangeSensor};
pub use common::{NavigationError, NavigationResult};
pub use config::NavigationConfig;

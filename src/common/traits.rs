//! Common traits defining the seams of the navigation stack

use std::time::Duration;

use crate::common::error::NavigationResult;
use crate::common::types::*;
use crate::mapping::OccupancyGrid;

/// Ultrasonic range sensor mounted on a sweep servo
pub trait RangeSensor {
    /// Point the sensor at `degrees` relative to the vehicle heading
    fn set_sweep_angle(&mut self, degrees: i32);

    /// Distance in cm, or `None` when there is no reliable echo
    fn read_distance(&mut self) -> Option<f64>;
}

/// Drivetrain commands. Every call is fire-and-forget; the caller controls
/// duration by sleeping before calling [`DriveActuator::stop`].
pub trait DriveActuator {
    fn drive_forward(&mut self, power: u8);

    fn drive_backward(&mut self, power: u8);

    fn turn_left(&mut self, power: u8);

    fn turn_right(&mut self, power: u8);

    fn stop(&mut self);
}

/// Time source used by the controller for motion timing
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;

    fn sleep(&mut self, duration: Duration);
}

/// Trait for grid-based path planning algorithms
pub trait GridPathPlanner {
    /// Plan a path on `grid` from start to goal, both inclusive
    fn plan(
        &self,
        grid: &OccupancyGrid,
        start: Coordinate,
        goal: Coordinate,
    ) -> NavigationResult<GridPath>;
}

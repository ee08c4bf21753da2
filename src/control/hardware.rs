//! Hardware composition
//!
//! Sensor, drivetrain and clock usually come from separate drivers; [`Hardware`]
//! bundles them into the single value the controller owns.

use std::thread;
use std::time::{Duration, Instant};

use crate::common::{Clock, DriveActuator, RangeSensor};

/// Wall clock backed by [`Instant`] and [`thread::sleep`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Range sensor, drivetrain and clock driven as one unit
#[derive(Debug)]
pub struct Hardware<S, D, C> {
    pub sensor: S,
    pub drive: D,
    pub clock: C,
}

impl<S, D, C> Hardware<S, D, C> {
    pub fn new(sensor: S, drive: D, clock: C) -> Self {
        Self { sensor, drive, clock }
    }
}

impl<S: RangeSensor, D, C> RangeSensor for Hardware<S, D, C> {
    fn set_sweep_angle(&mut self, degrees: i32) {
        self.sensor.set_sweep_angle(degrees);
    }

    fn read_distance(&mut self) -> Option<f64> {
        self.sensor.read_distance()
    }
}

impl<S, D: DriveActuator, C> DriveActuator for Hardware<S, D, C> {
    fn drive_forward(&mut self, power: u8) {
        self.drive.drive_forward(power);
    }

    fn drive_backward(&mut self, power: u8) {
        self.drive.drive_backward(power);
    }

    fn turn_left(&mut self, power: u8) {
        self.drive.turn_left(power);
    }

    fn turn_right(&mut self, power: u8) {
        self.drive.turn_right(power);
    }

    fn stop(&mut self) {
        self.drive.stop();
    }
}

impl<S, D, C: Clock> Clock for Hardware<S, D, C> {
    fn now(&self) -> Duration {
        self.clock.now()
    }

    fn sleep(&mut self, duration: Duration) {
        self.clock.sleep(duration);
    }
}

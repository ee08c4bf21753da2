//! Simulated PiCar
//!
//! Stands in for the ultrasonic sensor, the drivetrain and the clock at once.
//! The world is a set of obstacle cells; motion is integrated with the same
//! speed curve and turn table the controller uses, so a noise-free run lets
//! the controller's dead reckoning be checked against ground truth.

use std::collections::HashSet;
use std::time::Duration;

use nalgebra::Vector2;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::common::{
    Clock, Coordinate, Direction, DriveActuator, NavigationError, NavigationResult, RangeSensor,
    VehiclePose,
};
use crate::control::MotionCalibration;
use crate::utils::geometry::supercover_line;

/// Straight wall between two cells, both inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WallSpec {
    pub from: Coordinate,
    pub to: Coordinate,
}

/// Simulated world and sensor model
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Longest echo the sensor returns, cm
    pub max_range_cm: f64,
    /// Standard deviation of Gaussian range noise, 0 disables noise
    pub noise_std_cm: f64,
    pub seed: u64,
    /// Ray marching resolution, cm
    pub ray_step_cm: f64,
    pub walls: Vec<WallSpec>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_range_cm: 300.0,
            noise_std_cm: 0.0,
            seed: 42,
            ray_step_cm: 0.5,
            walls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Idle,
    Forward(u8),
    Backward(u8),
    TurningLeft,
    TurningRight,
}

/// Simulated vehicle implementing [`RangeSensor`], [`DriveActuator`] and
/// [`Clock`]
pub struct SimulatedCar {
    config: SimulationConfig,
    calibration: MotionCalibration,
    obstacles: HashSet<Coordinate>,
    position: Vector2<f64>,
    heading: Direction,
    servo_angle: i32,
    motion: Motion,
    turn_elapsed: Duration,
    now: Duration,
    rng: StdRng,
    noise: Option<Normal<f64>>,
    collisions: usize,
    trajectory: Vec<Vector2<f64>>,
}

impl SimulatedCar {
    pub fn new(
        pose: VehiclePose,
        calibration: MotionCalibration,
        config: SimulationConfig,
    ) -> NavigationResult<Self> {
        if config.ray_step_cm <= 0.0 || config.max_range_cm <= 0.0 {
            return Err(NavigationError::InvalidParameter(
                "simulation ray step and range must be positive".to_string(),
            ));
        }
        calibration.validate()?;
        let noise = if config.noise_std_cm > 0.0 {
            Some(Normal::new(0.0, config.noise_std_cm).map_err(|e| {
                NavigationError::InvalidParameter(format!("range noise: {}", e))
            })?)
        } else {
            None
        };
        let position = pose.location.to_vector();
        let mut car = Self {
            rng: StdRng::seed_from_u64(config.seed),
            calibration,
            obstacles: HashSet::new(),
            position,
            heading: pose.heading,
            servo_angle: 0,
            motion: Motion::Idle,
            turn_elapsed: Duration::ZERO,
            now: Duration::ZERO,
            noise,
            collisions: 0,
            trajectory: vec![position],
            config,
        };
        let walls = car.config.walls.clone();
        for wall in walls {
            car.add_wall(wall.from, wall.to);
        }
        Ok(car)
    }

    pub fn add_obstacle(&mut self, cell: Coordinate) {
        self.obstacles.insert(cell);
    }

    pub fn add_wall(&mut self, from: Coordinate, to: Coordinate) {
        self.obstacles.extend(supercover_line(from, to));
    }

    pub fn obstacles(&self) -> &HashSet<Coordinate> {
        &self.obstacles
    }

    /// True position in cm
    pub fn position(&self) -> Vector2<f64> {
        self.position
    }

    /// Cell under the vehicle
    pub fn location(&self) -> Coordinate {
        Coordinate::new(self.position.x.round() as i32, self.position.y.round() as i32)
    }

    pub fn heading(&self) -> Direction {
        self.heading
    }

    pub fn servo_angle(&self) -> i32 {
        self.servo_angle
    }

    /// Integration steps that ran into an obstacle cell
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Positions recorded after every simulated interval of motion
    pub fn trajectory(&self) -> &[Vector2<f64>] {
        &self.trajectory
    }

    /// Distance to the first obstacle along `angle` (absolute heading
    /// convention), or `None` within the sensor range
    pub fn ray_cast(&self, angle: i32) -> Option<f64> {
        let rad = (angle as f64).to_radians();
        let dir = Vector2::new(-rad.sin(), rad.cos());
        let step = self.config.ray_step_cm;
        let mut t = step;
        while t <= self.config.max_range_cm {
            let p = self.position + dir * t;
            let cell = Coordinate::new(p.x.round() as i32, p.y.round() as i32);
            if self.obstacles.contains(&cell) {
                return Some(t);
            }
            t += step;
        }
        None
    }

    fn integrate(&mut self, distance: f64, direction: Vector2<f64>) {
        let step = self.config.ray_step_cm;
        let mut remaining = distance;
        while remaining > 0.0 {
            let ds = remaining.min(step);
            let next = self.position + direction * ds;
            let cell = Coordinate::new(next.x.round() as i32, next.y.round() as i32);
            if self.obstacles.contains(&cell) {
                self.collisions += 1;
                debug!("Simulated car blocked by obstacle at {}", cell);
                break;
            }
            self.position = next;
            remaining -= ds;
        }
        self.trajectory.push(self.position);
    }

    /// Finish the current motion. A turn lands on the table entry whose
    /// duration is closest to the time spent turning.
    fn settle_motion(&mut self) {
        let left = match self.motion {
            Motion::TurningLeft => Some(true),
            Motion::TurningRight => Some(false),
            _ => None,
        };
        if let Some(left) = left {
            if !self.turn_elapsed.is_zero() {
                let elapsed = self.turn_elapsed.as_secs_f64();
                let closest = self
                    .calibration
                    .turn_durations
                    .entries()
                    .into_iter()
                    .min_by_key(|(_, d)| OrderedFloat((d.as_secs_f64() - elapsed).abs()));
                if let Some((magnitude, _)) = closest {
                    let turn = if left { magnitude } else { -magnitude };
                    if let Some(heading) = self.heading.rotated(turn) {
                        trace!("Simulated turn of {} degrees to {}", turn, heading);
                        self.heading = heading;
                    }
                }
            }
        }
        self.motion = Motion::Idle;
        self.turn_elapsed = Duration::ZERO;
    }

    fn command(&mut self, motion: Motion) {
        if self.motion != motion {
            self.settle_motion();
            self.motion = motion;
        }
    }
}

impl RangeSensor for SimulatedCar {
    fn set_sweep_angle(&mut self, degrees: i32) {
        self.servo_angle = degrees;
    }

    fn read_distance(&mut self) -> Option<f64> {
        let distance = self.ray_cast(self.heading.angle() + self.servo_angle)?;
        let noisy = match self.noise {
            Some(normal) => distance + normal.sample(&mut self.rng),
            None => distance,
        };
        Some(noisy.max(0.0))
    }
}

impl DriveActuator for SimulatedCar {
    fn drive_forward(&mut self, power: u8) {
        self.command(Motion::Forward(power));
    }

    fn drive_backward(&mut self, power: u8) {
        self.command(Motion::Backward(power));
    }

    fn turn_left(&mut self, _power: u8) {
        self.command(Motion::TurningLeft);
    }

    fn turn_right(&mut self, _power: u8) {
        self.command(Motion::TurningRight);
    }

    fn stop(&mut self) {
        self.settle_motion();
    }
}

impl Clock for SimulatedCar {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        match self.motion {
            Motion::Forward(power) => {
                let distance = self.calibration.speed(power) * duration.as_secs_f64();
                self.integrate(distance, self.heading.unit_vector());
            }
            Motion::Backward(power) => {
                let distance = self.calibration.speed(power) * duration.as_secs_f64();
                self.integrate(distance, -self.heading.unit_vector());
            }
            Motion::TurningLeft | Motion::TurningRight => self.turn_elapsed += duration,
            Motion::Idle => {}
        }
        self.now += duration;
    }
}

//! Calibrated motion primitives
//!
//! The drivetrain has no odometry, so turns and drives are open loop: a turn
//! is a fixed-duration command looked up from a table per 45 degree
//! magnitude, and a drive lasts `distance / speed(power)` seconds.

use std::time::Duration;

use serde::Deserialize;

use crate::common::{Coordinate, Direction, NavigationError, NavigationResult};
use crate::utils::geometry::{calc_angle_between, normalize_degrees, round_to_increment};

/// Power at which `base_speed_cm_s` was measured
pub const BASELINE_POWER: f64 = 10.0;

/// Rotation sense of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Left,
    Right,
    NoTurn,
}

/// A turn the drivetrain can execute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnCommand {
    pub direction: TurnDirection,
    /// Signed turn in degrees, positive turns left
    pub angle: i32,
    pub duration: Duration,
}

impl TurnCommand {
    pub fn magnitude(&self) -> i32 {
        self.angle.abs()
    }

    pub fn is_noop(&self) -> bool {
        self.direction == TurnDirection::NoTurn
    }
}

/// A straight drive: how far and for how long
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementPlan {
    pub distance: f64,
    pub duration: Duration,
}

/// Measured time to turn by each supported magnitude, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TurnDurations {
    #[serde(rename = "45")]
    pub deg_45: f64,
    #[serde(rename = "90")]
    pub deg_90: f64,
    #[serde(rename = "135")]
    pub deg_135: f64,
    #[serde(rename = "180")]
    pub deg_180: f64,
}

impl Default for TurnDurations {
    fn default() -> Self {
        Self { deg_45: 0.48, deg_90: 0.92, deg_135: 1.35, deg_180: 1.75 }
    }
}

impl TurnDurations {
    fn seconds(&self) -> [(i32, f64); 4] {
        [
            (45, self.deg_45),
            (90, self.deg_90),
            (135, self.deg_135),
            (180, self.deg_180),
        ]
    }

    /// Every entry must convert to a [`Duration`]: finite, non-negative and
    /// in range
    pub fn validate(&self) -> NavigationResult<()> {
        for (magnitude, secs) in self.seconds() {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(NavigationError::InvalidParameter(format!(
                    "turn duration {} s for {} degrees must be a non-negative number",
                    secs, magnitude
                )));
            }
        }
        Ok(())
    }

    /// Duration for a turn of `magnitude` degrees, `None` unless it is one of
    /// 0, 45, 90, 135, 180 with a valid table entry
    pub fn for_magnitude(&self, magnitude: i32) -> Option<Duration> {
        if magnitude == 0 {
            return Some(Duration::ZERO);
        }
        self.seconds()
            .into_iter()
            .find(|(m, _)| *m == magnitude)
            .and_then(|(_, secs)| Duration::try_from_secs_f64(secs).ok())
    }

    /// (magnitude, duration) pairs for every valid non-zero turn
    pub fn entries(&self) -> Vec<(i32, Duration)> {
        self.seconds()
            .into_iter()
            .filter_map(|(m, secs)| Duration::try_from_secs_f64(secs).ok().map(|d| (m, d)))
            .collect()
    }
}

/// Speed curve and turn table of one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct MotionCalibration {
    /// Forward speed at power 10, cm/s
    pub base_speed_cm_s: f64,
    /// Extra cm/s for every 10 units of power above 10
    pub speed_increment_per_10_power: f64,
    pub turn_durations: TurnDurations,
}

impl Default for MotionCalibration {
    fn default() -> Self {
        Self {
            base_speed_cm_s: 26.7,
            speed_increment_per_10_power: 2.5,
            turn_durations: TurnDurations::default(),
        }
    }
}

impl MotionCalibration {
    pub fn validate(&self) -> NavigationResult<()> {
        if !self.base_speed_cm_s.is_finite() || !self.speed_increment_per_10_power.is_finite() {
            return Err(NavigationError::InvalidParameter(format!(
                "speed curve {} cm/s + {} per 10 power must be finite",
                self.base_speed_cm_s, self.speed_increment_per_10_power
            )));
        }
        self.turn_durations.validate()
    }

    /// Forward speed in cm/s at `power`
    pub fn speed(&self, power: u8) -> f64 {
        let extra = (power as f64 - BASELINE_POWER) / 10.0 * self.speed_increment_per_10_power;
        self.base_speed_cm_s + extra
    }

    /// Distance and duration of the straight drive from `from` to `to`
    pub fn get_movement_data(
        &self,
        from: Coordinate,
        to: Coordinate,
        power: u8,
    ) -> NavigationResult<MovementPlan> {
        self.movement_for_distance(from.distance(&to), power)
    }

    pub fn movement_for_distance(&self, distance: f64, power: u8) -> NavigationResult<MovementPlan> {
        let speed = self.speed(power);
        if speed <= 0.0 || !speed.is_finite() {
            return Err(NavigationError::InvalidParameter(format!(
                "speed {} cm/s at power {} is not positive",
                speed, power
            )));
        }
        if distance < 0.0 || !distance.is_finite() {
            return Err(NavigationError::InvalidParameter(format!(
                "drive distance {} must be a non-negative number",
                distance
            )));
        }
        let duration = Duration::try_from_secs_f64(distance / speed).map_err(|e| {
            NavigationError::InvalidParameter(format!(
                "drive of {}cm at {} cm/s has no valid duration: {}",
                distance, speed, e
            ))
        })?;
        Ok(MovementPlan { distance, duration })
    }

    /// Turn needed to face `target_angle` from `heading`.
    ///
    /// The difference is rounded to 45 degrees and reduced to (-180, 180], so
    /// a request for 225 becomes a right turn of 135.
    pub fn get_turn_data(&self, heading: Direction, target_angle: f64) -> NavigationResult<TurnCommand> {
        self.turn_durations.validate()?;
        let rounded = round_to_increment(target_angle - heading.angle() as f64, 45);
        let angle = normalize_degrees(rounded);
        let direction = match angle {
            a if a > 0 => TurnDirection::Left,
            a if a < 0 => TurnDirection::Right,
            _ => TurnDirection::NoTurn,
        };
        let duration = self
            .turn_durations
            .for_magnitude(angle.abs())
            .ok_or(NavigationError::InvalidHeadingTransition {
                from: heading,
                turn: angle,
                angle: heading.angle() + angle,
            })?;
        Ok(TurnCommand { direction, angle, duration })
    }

    /// Turn needed to face `to` when standing at `from` with `heading`
    pub fn turn_towards(&self, heading: Direction, from: Coordinate, to: Coordinate) -> NavigationResult<TurnCommand> {
        self.get_turn_data(heading, calc_angle_between(from, to))
    }
}

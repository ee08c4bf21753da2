//! PiCar vehicle controller
//!
//! Owns the vehicle pose and turns planned legs into timed turn and drive
//! commands on the hardware. Pose is dead-reckoned: after every primitive the
//! location is advanced by the distance actually driven, derived from elapsed
//! time when a drive is cut short by an obstacle.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::common::{
    Clock, Coordinate, Direction, DriveActuator, NavigationError, NavigationResult, RangeSample,
    RangeSensor, VehiclePose,
};
use crate::control::motion::{MotionCalibration, MovementPlan, TurnCommand, TurnDirection};
use crate::utils::geometry::{drive_displacement, polar_to_absolute};

/// Configuration for the vehicle controller
#[derive(Debug, Clone)]
pub struct PiCarConfig {
    /// Drive power, 0 to 100
    pub power: u8,
    pub turn_power: u8,
    pub car_width_cm: f64,
    /// Stop when an obstacle is this close while driving
    pub obstacle_threshold_cm: f64,
    /// Total servo sweep, centered on the heading
    pub angle_range_deg: i32,
    /// Sweep readings beyond this are treated as no detection
    pub max_trusted_range_cm: f64,
    /// Subtracted from every raw reading
    pub us_offset_cm: f64,
    /// Servo settle time per sweep step
    pub settle: Duration,
    /// Poll period of the drive loop
    pub tick: Duration,
    pub calibration: MotionCalibration,
}

impl Default for PiCarConfig {
    fn default() -> Self {
        Self {
            power: 10,
            turn_power: 30,
            car_width_cm: 25.0,
            obstacle_threshold_cm: 15.0,
            angle_range_deg: 140,
            max_trusted_range_cm: 50.0,
            us_offset_cm: 8.0,
            settle: Duration::from_millis(40),
            tick: Duration::from_millis(20),
            calibration: MotionCalibration::default(),
        }
    }
}

impl PiCarConfig {
    pub fn validate(&self) -> NavigationResult<()> {
        if self.angle_range_deg < 10 || self.angle_range_deg > 180 {
            return Err(NavigationError::InvalidParameter(format!(
                "sweep angle range {} must be within [10, 180]",
                self.angle_range_deg
            )));
        }
        if self.max_trusted_range_cm <= 0.0 {
            return Err(NavigationError::InvalidParameter(
                "max trusted range must be positive".to_string(),
            ));
        }
        if self.tick.is_zero() {
            return Err(NavigationError::InvalidParameter("drive tick must be non-zero".to_string()));
        }
        self.calibration.validate()?;
        if self.calibration.speed(self.power) <= 0.0 {
            return Err(NavigationError::InvalidParameter(format!(
                "power {} gives no forward speed",
                self.power
            )));
        }
        Ok(())
    }
}

/// Mutable vehicle state owned by the controller
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub location: Coordinate,
    pub heading: Direction,
    pub power: u8,
    /// Cumulative distance driven, cm
    pub distance_traveled: f64,
    pub car_width_cm: f64,
    pub obstacle_threshold_cm: f64,
    pub angle_range: i32,
    /// Signed servo step; the sign is the current ping-pong direction
    pub step: i32,
    pub current_angle: i32,
}

impl VehicleState {
    fn new(pose: VehiclePose, config: &PiCarConfig) -> Self {
        Self {
            location: pose.location,
            heading: pose.heading,
            power: config.power,
            distance_traveled: 0.0,
            car_width_cm: config.car_width_cm,
            obstacle_threshold_cm: config.obstacle_threshold_cm,
            angle_range: config.angle_range_deg,
            step: config.angle_range_deg / 10,
            current_angle: 0,
        }
    }

    pub fn pose(&self) -> VehiclePose {
        VehiclePose::new(self.location, self.heading)
    }

    pub fn max_angle(&self) -> i32 {
        self.angle_range / 2
    }

    pub fn min_angle(&self) -> i32 {
        -self.max_angle()
    }
}

/// Result of a forward drive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveOutcome {
    Completed {
        distance: f64,
    },
    /// Stopped early with an obstacle inside the threshold
    ObstacleDetected {
        distance_traveled: f64,
        elapsed: Duration,
        sensor_angle: i32,
        obstacle_distance: f64,
        obstacle: Coordinate,
    },
}

impl DriveOutcome {
    pub fn distance(&self) -> f64 {
        match self {
            DriveOutcome::Completed { distance } => *distance,
            DriveOutcome::ObstacleDetected { distance_traveled, .. } => *distance_traveled,
        }
    }

    pub fn is_obstacle(&self) -> bool {
        matches!(self, DriveOutcome::ObstacleDetected { .. })
    }
}

/// Vehicle controller over any hardware providing a range sensor, a
/// drivetrain and a clock. The drivetrain is stopped when the controller is
/// dropped.
pub struct PiCar<H: DriveActuator> {
    hardware: H,
    state: VehicleState,
    config: PiCarConfig,
}

impl<H: RangeSensor + DriveActuator + Clock> PiCar<H> {
    pub fn new(mut hardware: H, pose: VehiclePose, config: PiCarConfig) -> NavigationResult<Self> {
        config.validate()?;
        hardware.set_sweep_angle(0);
        let state = VehicleState::new(pose, &config);
        info!("PiCar ready at {} facing {}", pose.location, pose.heading);
        Ok(Self { hardware, state, config })
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn config(&self) -> &PiCarConfig {
        &self.config
    }

    pub fn pose(&self) -> VehiclePose {
        self.state.pose()
    }

    pub fn location(&self) -> Coordinate {
        self.state.location
    }

    pub fn heading(&self) -> Direction {
        self.state.heading
    }

    pub fn distance_traveled(&self) -> f64 {
        self.state.distance_traveled
    }

    pub fn calibration(&self) -> &MotionCalibration {
        &self.config.calibration
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn now(&self) -> Duration {
        self.hardware.now()
    }

    /// Reading corrected by the sensor offset. Echoes nearer than the
    /// offset clamp to 0 so they still count as the closest obstacle.
    fn read_adjusted(&mut self) -> Option<f64> {
        self.hardware
            .read_distance()
            .map(|d| (d - self.config.us_offset_cm).max(0.0))
    }

    /// Servo angles of one full sweep, starting from the end the servo is
    /// closest to
    pub fn sweep_angles(&self) -> Vec<i32> {
        let step = self.state.step.abs().max(1);
        let (min, max) = (self.state.min_angle(), self.state.max_angle());
        let (start, end, step) = if self.state.current_angle > 0 {
            (max, min, -step)
        } else {
            (min, max, step)
        };

        let mut angles = Vec::new();
        let mut angle = start;
        while (min..=max).contains(&angle) {
            angles.push(angle);
            angle += step;
        }
        if angles.last() != Some(&end) {
            angles.push(end);
        }
        angles
    }

    /// Sweep the sensor across the whole range and collect the trusted
    /// readings
    pub fn scan_sweep_map(&mut self) -> Vec<RangeSample> {
        let angles = self.sweep_angles();
        let mut samples = Vec::with_capacity(angles.len());
        for angle in angles {
            self.hardware.set_sweep_angle(angle);
            self.state.current_angle = angle;
            self.hardware.sleep(self.config.settle);
            match self.read_adjusted() {
                Some(d) if d <= self.config.max_trusted_range_cm => {
                    samples.push(RangeSample::new(angle, d));
                }
                _ => {}
            }
        }
        debug!("Sweep at {} collected {} readings", self.state.location, samples.len());
        samples
    }

    /// Advance the servo one step, reversing at either end, and read
    pub fn sweep_step(&mut self) -> Option<f64> {
        let (min, max) = (self.state.min_angle(), self.state.max_angle());
        self.state.current_angle += self.state.step;
        if self.state.current_angle >= max {
            self.state.current_angle = max;
            self.state.step = -self.state.step.abs();
        } else if self.state.current_angle <= min {
            self.state.current_angle = min;
            self.state.step = self.state.step.abs();
        }
        self.hardware.set_sweep_angle(self.state.current_angle);
        self.read_adjusted()
    }

    /// Execute a turn and update the heading.
    ///
    /// The new heading is checked before the drivetrain moves; a turn that
    /// does not land on a compass direction stops the car and fails.
    pub fn turn(&mut self, command: &TurnCommand) -> NavigationResult<Direction> {
        if command.is_noop() {
            return Ok(self.state.heading);
        }
        let previous = self.state.heading;
        let new_heading = match previous.rotated(command.angle) {
            Some(h) => h,
            None => {
                self.hardware.stop();
                return Err(NavigationError::InvalidHeadingTransition {
                    from: previous,
                    turn: command.angle,
                    angle: previous.angle() + command.angle,
                });
            }
        };

        info!(
            "Turning {:?} for {:.2}sec by {} degrees",
            command.direction,
            command.duration.as_secs_f64(),
            command.magnitude()
        );
        match command.direction {
            TurnDirection::Left => self.hardware.turn_left(self.config.turn_power),
            TurnDirection::Right => self.hardware.turn_right(self.config.turn_power),
            TurnDirection::NoTurn => {}
        }
        self.hardware.sleep(command.duration);
        self.hardware.stop();

        self.state.heading = new_heading;
        info!("New heading {}, previous heading {}", new_heading, previous);
        Ok(new_heading)
    }

    /// Turn to face `target` from the current location
    pub fn turn_towards(&mut self, target: Coordinate) -> NavigationResult<TurnCommand> {
        let command = self
            .config
            .calibration
            .turn_towards(self.state.heading, self.state.location, target)?;
        self.turn(&command)?;
        Ok(command)
    }

    /// Drive forward for `plan.duration`.
    ///
    /// With `scan` set, every tick steps the servo and reads the sensor; an
    /// obstacle inside the threshold stops the car and the pose advances only
    /// by the share of the distance covered in the elapsed time.
    pub fn drive(&mut self, plan: &MovementPlan, scan: bool) -> NavigationResult<DriveOutcome> {
        info!(
            "Moving FORWARD at {} power for {:.2}sec for a distance of {:.2}cm",
            self.state.power,
            plan.duration.as_secs_f64(),
            plan.distance
        );
        let start = self.hardware.now();
        let mut outcome = DriveOutcome::Completed { distance: plan.distance };

        loop {
            let elapsed = self.hardware.now().saturating_sub(start);
            if elapsed >= plan.duration {
                break;
            }
            self.hardware.drive_forward(self.state.power);

            if scan {
                if let Some(d) = self.sweep_step() {
                    if d <= self.state.obstacle_threshold_cm {
                        self.hardware.stop();
                        let elapsed = self.hardware.now().saturating_sub(start);
                        let fraction = if plan.duration.is_zero() {
                            1.0
                        } else {
                            (elapsed.as_secs_f64() / plan.duration.as_secs_f64()).min(1.0)
                        };
                        let obstacle = polar_to_absolute(
                            self.state.current_angle as f64,
                            d,
                            &self.state.pose(),
                        );
                        info!(
                            "Object {:.1}cm away at an angle of {} degrees near {}, within threshold of {}cm. Stopping.",
                            d, self.state.current_angle, obstacle, self.state.obstacle_threshold_cm
                        );
                        outcome = DriveOutcome::ObstacleDetected {
                            distance_traveled: fraction * plan.distance,
                            elapsed,
                            sensor_angle: self.state.current_angle,
                            obstacle_distance: d,
                            obstacle,
                        };
                        break;
                    }
                }
            }

            let remaining = plan.duration.saturating_sub(elapsed);
            self.hardware.sleep(self.config.tick.min(remaining));
        }
        self.hardware.stop();

        if let DriveOutcome::ObstacleDetected { distance_traveled, elapsed, .. } = outcome {
            info!(
                "Stopped early due to object detection, traveled {:.2}cm in {:.2}sec",
                distance_traveled,
                elapsed.as_secs_f64()
            );
        }
        self.advance(outcome.distance(), self.state.heading);
        Ok(outcome)
    }

    /// Reverse for `plan.duration` without scanning
    pub fn drive_backward(&mut self, plan: &MovementPlan) -> NavigationResult<()> {
        info!(
            "Moving BACKWARD at {} power for {:.2}sec for a distance of {:.2}cm",
            self.state.power,
            plan.duration.as_secs_f64(),
            plan.distance
        );
        self.hardware.drive_backward(self.state.power);
        self.hardware.sleep(plan.duration);
        self.hardware.stop();
        self.advance(plan.distance, self.state.heading.rotated(180).unwrap_or(self.state.heading));
        Ok(())
    }

    fn advance(&mut self, distance: f64, along: Direction) {
        let previous = self.state.location;
        self.state.location = previous + drive_displacement(distance, along);
        self.state.distance_traveled += distance;
        info!(
            "New location {}, previous location {}, total distance {:.2}cm",
            self.state.location, previous, self.state.distance_traveled
        );
    }

    pub fn stop(&mut self) {
        self.hardware.stop();
    }
}

impl<H: DriveActuator> Drop for PiCar<H> {
    fn drop(&mut self) {
        self.hardware.stop();
        if std::thread::panicking() {
            warn!("PiCar dropped while panicking, drivetrain stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        Forward(u8),
        Backward(u8),
        Left(u8),
        Right(u8),
        Stop,
        Angle(i32),
    }

    /// Hardware double with a manual clock. Readings come from a queue, or
    /// from `obstacle_at` once the clock passes it.
    #[derive(Default)]
    struct ScriptedHardware {
        now: Duration,
        readings: VecDeque<Option<f64>>,
        obstacle_at: Option<(Duration, f64)>,
        log: Vec<Command>,
    }

    impl RangeSensor for ScriptedHardware {
        fn set_sweep_angle(&mut self, degrees: i32) {
            self.log.push(Command::Angle(degrees));
        }

        fn read_distance(&mut self) -> Option<f64> {
            if let Some((at, d)) = self.obstacle_at {
                return if self.now >= at { Some(d) } else { None };
            }
            self.readings.pop_front().flatten()
        }
    }

    impl DriveActuator for ScriptedHardware {
        fn drive_forward(&mut self, power: u8) {
            self.log.push(Command::Forward(power));
        }
        fn drive_backward(&mut self, power: u8) {
            self.log.push(Command::Backward(power));
        }
        fn turn_left(&mut self, power: u8) {
            self.log.push(Command::Left(power));
        }
        fn turn_right(&mut self, power: u8) {
            self.log.push(Command::Right(power));
        }
        fn stop(&mut self) {
            self.log.push(Command::Stop);
        }
    }

    impl Clock for ScriptedHardware {
        fn now(&self) -> Duration {
            self.now
        }
        fn sleep(&mut self, duration: Duration) {
            self.now += duration;
        }
    }

    fn car(hardware: ScriptedHardware, heading: Direction) -> PiCar<ScriptedHardware> {
        PiCar::new(
            hardware,
            VehiclePose::new(Coordinate::origin(), heading),
            PiCarConfig { us_offset_cm: 0.0, ..Default::default() },
        )
        .unwrap()
    }

    #[test]
    fn test_obstacle_stop_reports_partial_distance() {
        let hw = ScriptedHardware {
            obstacle_at: Some((Duration::from_millis(400), 5.0)),
            ..Default::default()
        };
        let mut picar = car(hw, Direction::North);
        let plan = MovementPlan { distance: 50.0, duration: Duration::from_secs(2) };
        let outcome = picar.drive(&plan, true).unwrap();

        assert!(outcome.is_obstacle());
        assert_relative_eq!(outcome.distance(), 10.0, epsilon = 1e-9);
        assert_eq!(picar.location(), Coordinate::new(0, 10));
        assert_relative_eq!(picar.distance_traveled(), 10.0, epsilon = 1e-9);
        assert_eq!(picar.hardware().log.last(), Some(&Command::Stop));
    }

    #[test]
    fn test_echo_inside_sensor_offset_stops() {
        let hw = ScriptedHardware {
            obstacle_at: Some((Duration::from_millis(200), 5.0)),
            ..Default::default()
        };
        let mut picar = PiCar::new(hw, VehiclePose::default(), PiCarConfig::default()).unwrap();
        let plan = MovementPlan { distance: 50.0, duration: Duration::from_secs(2) };
        let outcome = picar.drive(&plan, true).unwrap();

        match outcome {
            DriveOutcome::ObstacleDetected { obstacle_distance, distance_traveled, .. } => {
                assert_eq!(obstacle_distance, 0.0);
                assert_relative_eq!(distance_traveled, 5.0, epsilon = 1e-9);
            }
            other => panic!("expected an obstacle stop, got {:?}", other),
        }
        assert_eq!(picar.location(), Coordinate::new(0, 5));
    }

    #[test]
    fn test_zero_echo_stops_and_is_mapped() {
        let hw = ScriptedHardware {
            obstacle_at: Some((Duration::ZERO, 0.0)),
            ..Default::default()
        };
        let mut picar = car(hw, Direction::North);
        let plan = MovementPlan { distance: 10.0, duration: Duration::from_millis(400) };
        assert!(picar.drive(&plan, true).unwrap().is_obstacle());
        assert_eq!(picar.location(), Coordinate::origin());

        let samples = picar.scan_sweep_map();
        assert_eq!(samples.len(), 11);
        assert!(samples.iter().all(|s| s.distance == 0.0));
    }

    #[test]
    fn test_drive_completes_without_obstacle() {
        let mut picar = car(ScriptedHardware::default(), Direction::NorthWest);
        let plan = picar.calibration().movement_for_distance(3.0 * std::f64::consts::SQRT_2, 10).unwrap();
        let outcome = picar.drive(&plan, true).unwrap();

        assert!(!outcome.is_obstacle());
        assert_eq!(picar.location(), Coordinate::new(-3, 3));
        assert!(picar.hardware().now >= plan.duration);
        assert!(picar.hardware().log.contains(&Command::Forward(10)));
    }

    #[test]
    fn test_readings_beyond_threshold_do_not_stop() {
        let hw = ScriptedHardware {
            obstacle_at: Some((Duration::ZERO, 40.0)),
            ..Default::default()
        };
        let mut picar = car(hw, Direction::East);
        let plan = MovementPlan { distance: 10.0, duration: Duration::from_millis(300) };
        let outcome = picar.drive(&plan, true).unwrap();
        assert!(!outcome.is_obstacle());
        assert_eq!(picar.location(), Coordinate::new(10, 0));
    }

    #[test]
    fn test_turn_updates_heading() {
        let mut picar = car(ScriptedHardware::default(), Direction::SouthWest);
        let command = picar.turn_towards(Coordinate::new(0, 10)).unwrap();
        assert_eq!(command.direction, TurnDirection::Right);
        assert_eq!(picar.heading(), Direction::North);
        assert_eq!(picar.hardware().now, Duration::from_millis(1350));
        let log = &picar.hardware().log;
        assert_eq!(&log[log.len() - 2..], &[Command::Right(30), Command::Stop]);
    }

    #[test]
    fn test_invalid_turn_stops_before_moving() {
        let mut picar = car(ScriptedHardware::default(), Direction::North);
        let bad = TurnCommand {
            direction: TurnDirection::Left,
            angle: 30,
            duration: Duration::from_millis(300),
        };
        let err = picar.turn(&bad).unwrap_err();
        assert!(matches!(err, NavigationError::InvalidHeadingTransition { turn: 30, .. }));
        assert_eq!(picar.heading(), Direction::North);
        assert_eq!(picar.hardware().log.last(), Some(&Command::Stop));
        assert!(!picar.hardware().log.contains(&Command::Left(30)));
    }

    #[test]
    fn test_sweep_alternates_direction() {
        let mut picar = car(ScriptedHardware::default(), Direction::North);
        let first = picar.sweep_angles();
        assert_eq!(first.len(), 11);
        assert_eq!(first[0], -70);
        assert_eq!(first[10], 70);

        picar.scan_sweep_map();
        assert_eq!(picar.state().current_angle, 70);
        let second = picar.sweep_angles();
        assert_eq!(second[0], 70);
        assert_eq!(second[10], -70);
    }

    #[test]
    fn test_sweep_ends_on_range_limit() {
        let picar = PiCar::new(
            ScriptedHardware::default(),
            VehiclePose::default(),
            PiCarConfig { angle_range_deg: 145, ..Default::default() },
        )
        .unwrap();
        let angles = picar.sweep_angles();
        assert_eq!(angles.first(), Some(&-72));
        assert_eq!(angles.last(), Some(&72));
        assert!(angles.iter().all(|a| a.abs() <= 72));
    }

    #[test]
    fn test_sweep_filters_readings() {
        let readings: VecDeque<Option<f64>> = vec![
            Some(20.0),
            None,
            Some(60.0),
            Some(5.0),
            Some(58.0),
            Some(30.0),
            None,
            None,
            None,
            None,
            None,
        ]
        .into();
        let hw = ScriptedHardware { readings, ..Default::default() };
        let mut picar = PiCar::new(hw, VehiclePose::default(), PiCarConfig::default()).unwrap();
        let samples = picar.scan_sweep_map();
        // 8 cm offset: 20 -> 12, 60 -> dropped, 5 -> 0, 58 -> 50, 30 -> 22
        let distances: Vec<f64> = samples.iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![12.0, 0.0, 50.0, 22.0]);
        assert_eq!(samples[1].angle, -28);
        assert_eq!(samples[0].angle, -70);
        assert_eq!(picar.hardware().now, Duration::from_millis(440));
    }

    #[test]
    fn test_ping_pong_step() {
        let mut picar = car(ScriptedHardware::default(), Direction::North);
        let mut angles = Vec::new();
        for _ in 0..12 {
            picar.sweep_step();
            angles.push(picar.state().current_angle);
        }
        assert_eq!(&angles[..6], &[14, 28, 42, 56, 70, 56]);
        assert_eq!(angles[10], -14);
        assert_eq!(angles[11], -28);
    }

    #[test]
    fn test_drive_backward() {
        let mut picar = car(ScriptedHardware::default(), Direction::North);
        let plan = MovementPlan { distance: 7.0, duration: Duration::from_millis(260) };
        picar.drive_backward(&plan).unwrap();
        assert_eq!(picar.location(), Coordinate::new(0, -7));
        assert_eq!(picar.heading(), Direction::North);
        assert!(picar.hardware().log.contains(&Command::Backward(10)));
    }

    #[test]
    fn test_drop_stops_drivetrain() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Flag(Rc<RefCell<bool>>);
        impl DriveActuator for Flag {
            fn drive_forward(&mut self, _: u8) {}
            fn drive_backward(&mut self, _: u8) {}
            fn turn_left(&mut self, _: u8) {}
            fn turn_right(&mut self, _: u8) {}
            fn stop(&mut self) {
                *self.0.borrow_mut() = true;
            }
        }
        impl RangeSensor for Flag {
            fn set_sweep_angle(&mut self, _: i32) {}
            fn read_distance(&mut self) -> Option<f64> {
                None
            }
        }
        impl Clock for Flag {
            fn now(&self) -> Duration {
                Duration::ZERO
            }
            fn sleep(&mut self, _: Duration) {}
        }

        let stopped = Rc::new(RefCell::new(false));
        let picar = PiCar::new(Flag(stopped.clone()), VehiclePose::default(), PiCarConfig::default()).unwrap();
        drop(picar);
        assert!(*stopped.borrow());
    }
}

//! Navigation loop
//!
//! One cycle: check arrival, sweep the sensor, fuse the sweep into a fresh
//! map, plan to the goal, then drive the path leg by leg.
//!
//! Without obstacles in view the whole path is driven while scanning
//! (cruise). With obstacles the path is followed until the vehicle is past
//! the farthest obstacle cell along the route (the clearance point), then the
//! cycle starts over with a new sweep (detour). Any error stops the
//! drivetrain before it is returned.

use std::fmt;
use std::io::Write;

use nalgebra::Vector2;
use tracing::{debug, enabled, error, info, warn, Level};

use crate::common::{
    Clock, Coordinate, DriveActuator, GridPath, GridPathPlanner, Leg, NavigationError,
    NavigationResult, RangeSensor, VehiclePose,
};
use crate::config::NavigationConfig;
use crate::control::PiCar;
use crate::mapping::{OccupancyGrid, ScanFusion};
use crate::path_planning::AStarPlanner;

/// Phases of the navigation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Idle,
    Scanning,
    Planning,
    Turning,
    Driving,
    ObstacleAvoidance,
    Arrived,
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NavigationState::Idle => "idle",
            NavigationState::Scanning => "scanning",
            NavigationState::Planning => "planning",
            NavigationState::Turning => "turning",
            NavigationState::Driving => "driving",
            NavigationState::ObstacleAvoidance => "obstacle_avoidance",
            NavigationState::Arrived => "arrived",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for the navigation loop
#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    /// Arrived once closer than this to the goal, cm
    pub arrival_tolerance_cm: f64,
    /// Distance past the farthest obstacle before re-scanning, cm
    pub clearance_buffer_cm: f64,
    pub max_cycles: usize,
    /// Keep scanning while driving a detour
    pub scan_during_detour: bool,
    /// Clear the map before every sweep
    pub forget_obstacles: bool,
    /// Half size of the debug map window around the vehicle
    pub map_window_radius: i32,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            arrival_tolerance_cm: 4.0,
            clearance_buffer_cm: 6.0,
            max_cycles: 200,
            scan_during_detour: false,
            forget_obstacles: true,
            map_window_radius: 5,
        }
    }
}

/// Point along the route the vehicle has to pass before re-planning.
///
/// Progress is measured by projecting onto the unit vector from the scan
/// location towards the goal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearancePoint {
    origin: Coordinate,
    farthest: Coordinate,
    direction: Vector2<f64>,
    buffer: f64,
}

impl ClearancePoint {
    /// `None` when `origin` and `goal` coincide
    pub fn new(origin: Coordinate, farthest: Coordinate, goal: Coordinate, buffer: f64) -> Option<Self> {
        let route = (goal - origin).to_vector();
        let norm = route.norm();
        if norm < f64::EPSILON {
            return None;
        }
        Some(Self { origin, farthest, direction: route / norm, buffer })
    }

    pub fn farthest(&self) -> Coordinate {
        self.farthest
    }

    /// Progress along the route needed to clear the obstacle
    pub fn threshold(&self) -> f64 {
        (self.farthest - self.origin).to_vector().dot(&self.direction) + self.buffer
    }

    pub fn has_passed(&self, current: Coordinate) -> bool {
        (current - self.origin).to_vector().dot(&self.direction) >= self.threshold()
    }
}

/// Summary of a finished navigation run
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationReport {
    pub start: Coordinate,
    pub goal: Coordinate,
    pub final_pose: VehiclePose,
    pub distance_traveled: f64,
    /// Scan and plan cycles executed
    pub cycles: usize,
    /// Within the arrival tolerance of the requested goal
    pub goal_reached: bool,
}

enum LegsResult {
    Finished,
    ObstacleStop,
    ClearancePassed,
    Desynchronized,
}

/// Drives a [`PiCar`] to a goal through repeated scan, plan and execute
/// cycles
pub struct Navigator<H: DriveActuator, P = AStarPlanner> {
    car: PiCar<H>,
    grid: OccupancyGrid,
    fusion: ScanFusion,
    planner: P,
    config: NavigatorConfig,
    state: NavigationState,
    history: Vec<NavigationState>,
    last_path: Option<GridPath>,
    trajectory: Vec<Coordinate>,
}

impl<H: RangeSensor + DriveActuator + Clock> Navigator<H, AStarPlanner> {
    /// Navigator with the A* planner, everything configured from `config`
    pub fn from_config(hardware: H, start: VehiclePose, config: &NavigationConfig) -> NavigationResult<Self> {
        config.validate()?;
        let car = PiCar::new(hardware, start, config.picar_config())?;
        let grid = OccupancyGrid::new(config.mapping.bounds)?;
        Ok(Self::new(
            car,
            grid,
            ScanFusion::new(config.fusion_config()),
            AStarPlanner::new(config.astar_config()),
            config.navigator_config(),
        ))
    }
}

impl<H: RangeSensor + DriveActuator + Clock, P: GridPathPlanner> Navigator<H, P> {
    pub fn new(
        car: PiCar<H>,
        grid: OccupancyGrid,
        fusion: ScanFusion,
        planner: P,
        config: NavigatorConfig,
    ) -> Self {
        let location = car.location();
        Self {
            car,
            grid,
            fusion,
            planner,
            config,
            state: NavigationState::Idle,
            history: vec![NavigationState::Idle],
            last_path: None,
            trajectory: vec![location],
        }
    }

    pub fn car(&self) -> &PiCar<H> {
        &self.car
    }

    pub fn car_mut(&mut self) -> &mut PiCar<H> {
        &mut self.car
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    /// Every state entered, in order
    pub fn history(&self) -> &[NavigationState] {
        &self.history
    }

    pub fn last_path(&self) -> Option<&GridPath> {
        self.last_path.as_ref()
    }

    /// Dead-reckoned location after every leg
    pub fn trajectory(&self) -> &[Coordinate] {
        &self.trajectory
    }

    /// Dump the current map as an integer matrix
    pub fn write_map_snapshot<W: Write>(&self, writer: W) -> NavigationResult<()> {
        self.grid.write_snapshot(writer)
    }

    fn transition(&mut self, next: NavigationState) {
        if self.state != next {
            debug!("State {} -> {}", self.state, next);
            self.state = next;
            self.history.push(next);
        }
    }

    /// Drive to `goal`. The drivetrain is stopped on every error path.
    pub fn navigate(&mut self, goal: Coordinate) -> NavigationResult<NavigationReport> {
        let start = self.car.location();
        match self.run(start, goal) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.car.stop();
                error!("Navigation from {} to {} aborted at {}: {}", start, goal, self.car.location(), e);
                self.transition(NavigationState::Idle);
                Err(e)
            }
        }
    }

    fn run(&mut self, start: Coordinate, goal: Coordinate) -> NavigationResult<NavigationReport> {
        self.transition(NavigationState::Idle);
        info!("Navigating from {} to {}", start, goal);

        for cycle in 0..self.config.max_cycles {
            if self.car.location().distance(&goal) < self.config.arrival_tolerance_cm {
                return Ok(self.arrive(start, goal, cycle));
            }

            self.transition(NavigationState::Scanning);
            if self.config.forget_obstacles {
                self.grid.clear();
                debug!("Cleared obstacle map");
            }
            let samples = self.car.scan_sweep_map();
            let pose = self.car.pose();
            let fused = self.fusion.fuse(&samples, &pose, &mut self.grid);
            self.log_map_window(pose.location);

            self.transition(NavigationState::Planning);
            let path = self.planner.plan(&self.grid, pose.location, goal)?;
            info!("Recomputed path with {} cells to {}", path.len(), path.goal());
            debug!("Path: {:?}", path.points());
            if path.is_arrived() {
                self.last_path = Some(path);
                return Ok(self.arrive(start, goal, cycle + 1));
            }
            let legs = path.legs();
            self.last_path = Some(path);

            let clearance = fused
                .farthest_obstacle
                .and_then(|f| ClearancePoint::new(pose.location, f, goal, self.config.clearance_buffer_cm));

            let result = match clearance {
                Some(point) if fused.has_obstacles() => {
                    info!(
                        "Obstacles ahead, farthest at {}; detouring until {:.1}cm along the route",
                        point.farthest(),
                        point.threshold()
                    );
                    self.transition(NavigationState::ObstacleAvoidance);
                    self.follow_legs(&legs, self.config.scan_during_detour, Some(point))?
                }
                _ => self.follow_legs(&legs, true, None)?,
            };

            match result {
                LegsResult::ObstacleStop => self.transition(NavigationState::ObstacleAvoidance),
                LegsResult::ClearancePassed => info!("Passed clearance point at {}", self.car.location()),
                LegsResult::Desynchronized | LegsResult::Finished => {}
            }
        }

        Err(NavigationError::CycleLimitExceeded { cycles: self.config.max_cycles })
    }

    fn follow_legs(
        &mut self,
        legs: &[Leg],
        scan: bool,
        clearance: Option<ClearancePoint>,
    ) -> NavigationResult<LegsResult> {
        for leg in legs {
            if self.car.location() != leg.from {
                warn!(
                    "Location {} does not match leg start {}, re-planning",
                    self.car.location(),
                    leg.from
                );
                return Ok(LegsResult::Desynchronized);
            }

            self.transition(NavigationState::Turning);
            self.car.turn_towards(leg.to)?;

            self.transition(NavigationState::Driving);
            let power = self.car.state().power;
            let plan = self.car.calibration().get_movement_data(leg.from, leg.to, power)?;
            let outcome = self.car.drive(&plan, scan)?;
            self.trajectory.push(self.car.location());

            if outcome.is_obstacle() {
                return Ok(LegsResult::ObstacleStop);
            }
            if let Some(point) = clearance {
                if point.has_passed(self.car.location()) {
                    return Ok(LegsResult::ClearancePassed);
                }
            }
        }
        Ok(LegsResult::Finished)
    }

    fn arrive(&mut self, start: Coordinate, goal: Coordinate, cycles: usize) -> NavigationReport {
        self.car.stop();
        self.transition(NavigationState::Arrived);
        let final_pose = self.car.pose();
        let goal_reached = final_pose.location.distance(&goal) < self.config.arrival_tolerance_cm;
        if !goal_reached {
            warn!("Path ended at {}, short of the requested goal {}", final_pose.location, goal);
        }
        info!(
            "Arrived at {} facing {} after {} cycles, traveled {:.2}cm",
            final_pose.location,
            final_pose.heading,
            cycles,
            self.car.distance_traveled()
        );
        NavigationReport {
            start,
            goal,
            final_pose,
            distance_traveled: self.car.distance_traveled(),
            cycles,
            goal_reached,
        }
    }

    fn log_map_window(&mut self, location: Coordinate) {
        if !enabled!(Level::DEBUG) {
            return;
        }
        self.grid.mark_vehicle(location);
        debug!(
            "Map around {}:\n{}",
            location,
            self.grid.render_window(location, self.config.map_window_radius)
        );
        self.grid.clear_vehicle_marker();
    }
}

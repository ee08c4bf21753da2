//! Configuration loading for picar_navigation
//!
//! Every field has a default, so an empty file (or no file) gives the
//! calibration of the reference vehicle.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::common::{NavigationError, NavigationResult};
use crate::control::{MotionCalibration, PiCarConfig, TurnDurations};
use crate::mapping::{BehindFilter, GridBounds, ScanFusionConfig};
use crate::mission_planning::NavigatorConfig;
use crate::path_planning::{AStarConfig, Connectivity};
use crate::simulation::SimulationConfig;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NavigationConfig {
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub navigation: NavigationLoopConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Drivetrain calibration
#[derive(Clone, Debug, Deserialize)]
pub struct VehicleConfig {
    #[serde(default = "default_power")]
    pub power: u8,

    #[serde(default = "default_turn_power")]
    pub turn_power: u8,

    /// Readings closer together than this are joined into one obstacle
    #[serde(default = "default_car_width")]
    pub car_width_cm: f64,

    #[serde(default = "default_obstacle_threshold")]
    pub obstacle_threshold_cm: f64,

    /// Forward speed at power 10
    #[serde(default = "default_base_speed")]
    pub base_speed_cm_s: f64,

    #[serde(default = "default_speed_increment")]
    pub speed_increment_per_10_power: f64,

    /// Seconds per turn magnitude, keyed "45", "90", "135", "180"
    #[serde(default)]
    pub turn_durations: TurnDurations,
}

/// Ultrasonic sensor and servo
#[derive(Clone, Debug, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_angle_range")]
    pub angle_range_deg: i32,

    #[serde(default = "default_max_trusted_range")]
    pub max_trusted_range_cm: f64,

    #[serde(default = "default_us_offset")]
    pub us_offset_cm: f64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

/// Occupancy grid and scan fusion
#[derive(Clone, Debug, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub bounds: GridBounds,

    #[serde(default = "default_buffer_radius")]
    pub buffer_radius: i32,

    #[serde(default)]
    pub behind_filter: BehindFilter,

    #[serde(default = "default_true")]
    pub forget_obstacles: bool,
}

/// A* planner
#[derive(Clone, Debug, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_connectivity")]
    pub connectivity: Connectivity,

    #[serde(default = "default_heuristic_weight")]
    pub heuristic_weight: f64,

    #[serde(default)]
    pub allow_corner_cutting: bool,
}

/// Navigation loop
#[derive(Clone, Debug, Deserialize)]
pub struct NavigationLoopConfig {
    #[serde(default = "default_arrival_tolerance")]
    pub arrival_tolerance_cm: f64,

    #[serde(default = "default_clearance_buffer")]
    pub clearance_buffer_cm: f64,

    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,

    #[serde(default)]
    pub scan_during_detour: bool,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            power: default_power(),
            turn_power: default_turn_power(),
            car_width_cm: default_car_width(),
            obstacle_threshold_cm: default_obstacle_threshold(),
            base_speed_cm_s: default_base_speed(),
            speed_increment_per_10_power: default_speed_increment(),
            turn_durations: TurnDurations::default(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            angle_range_deg: default_angle_range(),
            max_trusted_range_cm: default_max_trusted_range(),
            us_offset_cm: default_us_offset(),
            settle_ms: default_settle_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            bounds: GridBounds::default(),
            buffer_radius: default_buffer_radius(),
            behind_filter: BehindFilter::default(),
            forget_obstacles: default_true(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            connectivity: default_connectivity(),
            heuristic_weight: default_heuristic_weight(),
            allow_corner_cutting: false,
        }
    }
}

impl Default for NavigationLoopConfig {
    fn default() -> Self {
        Self {
            arrival_tolerance_cm: default_arrival_tolerance(),
            clearance_buffer_cm: default_clearance_buffer(),
            max_cycles: default_max_cycles(),
            scan_during_detour: false,
        }
    }
}

// Default value functions
fn default_power() -> u8 {
    10
}
fn default_turn_power() -> u8 {
    30
}
fn default_car_width() -> f64 {
    25.0
}
fn default_obstacle_threshold() -> f64 {
    15.0
}
fn default_base_speed() -> f64 {
    26.7
}
fn default_speed_increment() -> f64 {
    2.5
}
fn default_angle_range() -> i32 {
    140
}
fn default_max_trusted_range() -> f64 {
    50.0
}
fn default_us_offset() -> f64 {
    8.0
}
fn default_settle_ms() -> u64 {
    40
}
fn default_tick_ms() -> u64 {
    20
}
fn default_buffer_radius() -> i32 {
    2
}
fn default_true() -> bool {
    true
}
fn default_connectivity() -> Connectivity {
    Connectivity::Eight
}
fn default_heuristic_weight() -> f64 {
    1.0
}
fn default_arrival_tolerance() -> f64 {
    4.0
}
fn default_clearance_buffer() -> f64 {
    6.0
}
fn default_max_cycles() -> usize {
    200
}

impl NavigationConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> NavigationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NavigationError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> NavigationResult<Self> {
        let config: NavigationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> NavigationResult<()> {
        let invalid = |msg: String| Err(NavigationError::Config(msg));

        GridBounds::new(
            self.mapping.bounds.x_lower,
            self.mapping.bounds.x_upper,
            self.mapping.bounds.y_lower,
            self.mapping.bounds.y_upper,
        )
        .map_err(|e| NavigationError::Config(e.to_string()))?;

        if self.mapping.buffer_radius < 0 {
            return invalid(format!("buffer_radius {} must not be negative", self.mapping.buffer_radius));
        }
        if !(self.planner.heuristic_weight > 0.0 && self.planner.heuristic_weight <= 1.0) {
            return invalid(format!(
                "heuristic_weight {} must be in (0, 1] to keep A* optimal",
                self.planner.heuristic_weight
            ));
        }
        if self.navigation.arrival_tolerance_cm <= 0.0 {
            return invalid("arrival_tolerance_cm must be positive".to_string());
        }
        if self.navigation.max_cycles == 0 {
            return invalid("max_cycles must be at least 1".to_string());
        }
        if self.vehicle.car_width_cm <= 0.0 {
            return invalid("car_width_cm must be positive".to_string());
        }
        self.picar_config()
            .validate()
            .map_err(|e| NavigationError::Config(e.to_string()))
    }

    pub fn calibration(&self) -> MotionCalibration {
        MotionCalibration {
            base_speed_cm_s: self.vehicle.base_speed_cm_s,
            speed_increment_per_10_power: self.vehicle.speed_increment_per_10_power,
            turn_durations: self.vehicle.turn_durations,
        }
    }

    pub fn picar_config(&self) -> PiCarConfig {
        PiCarConfig {
            power: self.vehicle.power,
            turn_power: self.vehicle.turn_power,
            car_width_cm: self.vehicle.car_width_cm,
            obstacle_threshold_cm: self.vehicle.obstacle_threshold_cm,
            angle_range_deg: self.sensor.angle_range_deg,
            max_trusted_range_cm: self.sensor.max_trusted_range_cm,
            us_offset_cm: self.sensor.us_offset_cm,
            settle: Duration::from_millis(self.sensor.settle_ms),
            tick: Duration::from_millis(self.sensor.tick_ms),
            calibration: self.calibration(),
        }
    }

    pub fn fusion_config(&self) -> ScanFusionConfig {
        ScanFusionConfig {
            width_threshold: self.vehicle.car_width_cm,
            buffer_radius: self.mapping.buffer_radius,
            behind_filter: self.mapping.behind_filter,
        }
    }

    pub fn astar_config(&self) -> AStarConfig {
        AStarConfig {
            connectivity: self.planner.connectivity,
            heuristic_weight: self.planner.heuristic_weight,
            allow_corner_cutting: self.planner.allow_corner_cutting,
        }
    }

    pub fn navigator_config(&self) -> NavigatorConfig {
        NavigatorConfig {
            arrival_tolerance_cm: self.navigation.arrival_tolerance_cm,
            clearance_buffer_cm: self.navigation.clearance_buffer_cm,
            max_cycles: self.navigation.max_cycles,
            scan_during_detour: self.navigation.scan_during_detour,
            forget_obstacles: self.mapping.forget_obstacles,
            ..NavigatorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = NavigationConfig::from_toml_str("").unwrap();
        assert_eq!(config.vehicle.power, 10);
        assert_eq!(config.sensor.angle_range_deg, 140);
        assert_eq!(config.mapping.bounds, GridBounds::default());
        assert_eq!(config.mapping.behind_filter, BehindFilter::Both);
        assert_eq!(config.planner.connectivity, Connectivity::Eight);
        assert_eq!(config.navigation.max_cycles, 200);
        assert!(!config.navigation.scan_during_detour);

        let picar = config.picar_config();
        assert_eq!(picar.settle, Duration::from_millis(40));
        assert_relative_eq!(picar.calibration.speed(10), 26.7, epsilon = 1e-9);
        assert_relative_eq!(config.fusion_config().width_threshold, 25.0);
    }

    #[test]
    fn test_partial_sections() {
        let text = r#"
            [vehicle]
            power = 30
            turn_durations = { "90" = 1.0 }

            [mapping]
            buffer_radius = 1
            behind_filter = "before_buffer"
            bounds = { x_lower = -100, x_upper = 100, y_lower = 0, y_upper = 200 }

            [planner]
            connectivity = "four"

            [[simulation.walls]]
            from = { x = -10, y = 40 }
            to = { x = 10, y = 40 }
        "#;
        let config = NavigationConfig::from_toml_str(text).unwrap();
        assert_eq!(config.vehicle.power, 30);
        assert_relative_eq!(config.vehicle.turn_durations.deg_90, 1.0);
        assert_relative_eq!(config.vehicle.turn_durations.deg_45, 0.48);
        assert_eq!(config.mapping.behind_filter, BehindFilter::BeforeBuffer);
        assert_eq!(config.mapping.bounds.width(), 200);
        assert_eq!(config.astar_config().connectivity, Connectivity::Four);
        assert_eq!(config.simulation.walls.len(), 1);
        assert_eq!(config.simulation.walls[0].to.x, 10);
        assert_eq!(config.navigator_config().clearance_buffer_cm, 6.0);
    }

    #[test]
    fn test_validation_errors() {
        let bad_weight = "[planner]\nheuristic_weight = 1.5";
        assert!(matches!(
            NavigationConfig::from_toml_str(bad_weight),
            Err(NavigationError::Config(_))
        ));

        let empty_bounds = "[mapping]\nbounds = { x_lower = 0, x_upper = 0, y_lower = 0, y_upper = 10 }";
        assert!(NavigationConfig::from_toml_str(empty_bounds).is_err());

        let narrow_sweep = "[sensor]\nangle_range_deg = 5";
        assert!(NavigationConfig::from_toml_str(narrow_sweep).is_err());

        let negative_turn = "[vehicle]\nturn_durations = { \"90\" = -1.0 }";
        assert!(matches!(
            NavigationConfig::from_toml_str(negative_turn),
            Err(NavigationError::Config(_))
        ));

        let nan_turn = "[vehicle]\nturn_durations = { \"45\" = nan }";
        assert!(NavigationConfig::from_toml_str(nan_turn).is_err());

        let nan_speed = "[vehicle]\nspeed_increment_per_10_power = nan";
        assert!(NavigationConfig::from_toml_str(nan_speed).is_err());

        let garbage = "[vehicle]\npower = \"fast\"";
        assert!(matches!(
            NavigationConfig::from_toml_str(garbage),
            Err(NavigationError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = NavigationConfig::load(Path::new("/nonexistent/picar.toml")).unwrap_err();
        assert!(matches!(err, NavigationError::Config(_)));
    }
}

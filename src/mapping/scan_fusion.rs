//! Scan fusion
//!
//! Turns one ultrasonic sweep into obstacle cells on the occupancy grid:
//!
//! 1. project every (angle, distance) sample into absolute grid coordinates
//! 2. drop samples outside the grid or behind the vehicle
//! 3. sort and deduplicate, then join neighbouring readings closer than the
//!    car width with a supercover line so thin walls stay closed
//! 4. inflate every obstacle cell by a square clearance radius
//!
//! Sorting before interpolation makes the resulting grid independent of the
//! order the samples arrived in.

use itertools::Itertools;
use serde::Deserialize;
use tracing::debug;

use crate::common::{Coordinate, RangeSample, VehiclePose};
use crate::mapping::{CellState, OccupancyGrid};
use crate::utils::geometry::{
    find_farthest_point, interpolate_segment, is_behind, polar_to_absolute, within_radius,
};

/// Stage at which cells behind the vehicle are discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehindFilter {
    /// Filter projected and interpolated readings; buffer cells may spill behind
    BeforeBuffer,
    /// Keep all readings for interpolation and filter every marked cell
    AfterBuffer,
    /// Filter readings and buffer cells
    Both,
}

impl Default for BehindFilter {
    fn default() -> Self {
        BehindFilter::Both
    }
}

/// Configuration for scan fusion
#[derive(Debug, Clone)]
pub struct ScanFusionConfig {
    /// Readings closer than this (cm) are joined into one obstacle
    pub width_threshold: f64,
    /// Square clearance radius in cells marked around each obstacle
    pub buffer_radius: i32,
    pub behind_filter: BehindFilter,
}

impl Default for ScanFusionConfig {
    fn default() -> Self {
        Self {
            width_threshold: 25.0,
            buffer_radius: 2,
            behind_filter: BehindFilter::Both,
        }
    }
}

/// What a fused sweep put on the map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionReport {
    /// Projected readings inside the grid, sorted and deduplicated
    pub scan_points: Vec<Coordinate>,
    /// Readings plus interpolated cells that were marked
    pub obstacle_points: Vec<Coordinate>,
    /// Clearance cells newly marked around the obstacle points
    pub buffer_points: Vec<Coordinate>,
    /// Marked cell farthest from the vehicle
    pub farthest_obstacle: Option<Coordinate>,
}

impl FusionReport {
    pub fn has_obstacles(&self) -> bool {
        !self.obstacle_points.is_empty()
    }
}

/// Fuses range sweeps into an [`OccupancyGrid`]
#[derive(Debug, Clone, Default)]
pub struct ScanFusion {
    config: ScanFusionConfig,
}

impl ScanFusion {
    pub fn new(config: ScanFusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanFusionConfig {
        &self.config
    }

    /// Mark the obstacles seen in `samples` from `pose` on `grid`
    pub fn fuse(
        &self,
        samples: &[RangeSample],
        pose: &VehiclePose,
        grid: &mut OccupancyGrid,
    ) -> FusionReport {
        let filter_readings = matches!(
            self.config.behind_filter,
            BehindFilter::BeforeBuffer | BehindFilter::Both
        );
        let filter_marks = matches!(
            self.config.behind_filter,
            BehindFilter::AfterBuffer | BehindFilter::Both
        );
        let keep_reading = |p: &Coordinate| !(filter_readings && is_behind(*p, pose));
        let keep_mark =
            |p: &Coordinate| *p != pose.location && !(filter_marks && is_behind(*p, pose));

        let scan_points: Vec<Coordinate> = samples
            .iter()
            .map(|s| polar_to_absolute(s.angle as f64, s.distance, pose))
            .filter(|p| grid.contains(*p))
            .filter(|p| keep_reading(p))
            .sorted()
            .dedup()
            .collect();

        if scan_points.is_empty() {
            return FusionReport::default();
        }

        let interpolated = scan_points
            .windows(2)
            .flat_map(|pair| interpolate_segment(pair[0], pair[1], self.config.width_threshold))
            .filter(|p| keep_reading(p));

        let obstacle_points: Vec<Coordinate> = scan_points
            .iter()
            .copied()
            .chain(interpolated)
            .sorted()
            .dedup()
            .filter(|p| keep_mark(p))
            .filter(|p| grid.mark_obstacle(*p))
            .collect();

        debug!(
            "Location {}: {} readings fused into {} obstacle cells",
            pose.location,
            scan_points.len(),
            obstacle_points.len()
        );

        let buffer_points: Vec<Coordinate> = obstacle_points
            .iter()
            .flat_map(|p| within_radius(*p, self.config.buffer_radius))
            .sorted()
            .dedup()
            .filter(|p| {
                keep_mark(p) && grid.get(*p) != CellState::Obstacle && grid.mark_obstacle(*p)
            })
            .collect();

        let marked: Vec<Coordinate> = obstacle_points
            .iter()
            .chain(buffer_points.iter())
            .copied()
            .sorted()
            .dedup()
            .collect();
        let farthest_obstacle = find_farthest_point(pose.location, &marked);

        debug!(
            "Marked {} buffer cells, farthest obstacle {:?}",
            buffer_points.len(),
            farthest_obstacle
        );

        FusionReport {
            scan_points,
            obstacle_points,
            buffer_points,
            farthest_obstacle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Direction;

    fn pose() -> VehiclePose {
        VehiclePose::new(Coordinate::new(50, 50), Direction::North)
    }

    fn wall_samples() -> Vec<RangeSample> {
        vec![
            RangeSample::new(-14, 20.0),
            RangeSample::new(0, 20.0),
            RangeSample::new(14, 20.0),
            RangeSample::new(28, 22.0),
            RangeSample::new(-70, 45.0),
        ]
    }

    #[test]
    fn test_fusion_is_order_independent() {
        let fusion = ScanFusion::default();
        let mut a = OccupancyGrid::with_size(100, 100).unwrap();
        let mut b = OccupancyGrid::with_size(100, 100).unwrap();

        let samples = wall_samples();
        let mut reversed = samples.clone();
        reversed.reverse();
        reversed.swap(0, 2);

        let report_a = fusion.fuse(&samples, &pose(), &mut a);
        let report_b = fusion.fuse(&reversed, &pose(), &mut b);
        assert_eq!(a, b);
        assert_eq!(report_a, report_b);
    }

    #[test]
    fn test_close_readings_form_a_closed_wall() {
        let fusion = ScanFusion::new(ScanFusionConfig { buffer_radius: 0, ..Default::default() });
        let mut grid = OccupancyGrid::with_size(100, 100).unwrap();
        let samples = [RangeSample::new(14, 20.0), RangeSample::new(-14, 20.0)];
        let report = fusion.fuse(&samples, &pose(), &mut grid);

        assert_eq!(report.scan_points, vec![Coordinate::new(45, 69), Coordinate::new(55, 69)]);
        for x in 45..=55 {
            assert_eq!(grid.get(Coordinate::new(x, 69)), CellState::Obstacle);
        }
        assert!(report.buffer_points.is_empty());
    }

    #[test]
    fn test_far_readings_stay_separate() {
        let fusion = ScanFusion::new(ScanFusionConfig {
            buffer_radius: 0,
            width_threshold: 5.0,
            ..Default::default()
        });
        let mut grid = OccupancyGrid::with_size(100, 100).unwrap();
        let samples = [RangeSample::new(14, 20.0), RangeSample::new(-14, 20.0)];
        let report = fusion.fuse(&samples, &pose(), &mut grid);
        assert_eq!(report.obstacle_points.len(), 2);
        assert!(grid.is_free(Coordinate::new(50, 69)));
    }

    #[test]
    fn test_buffer_skips_vehicle_and_cells_behind() {
        let fusion = ScanFusion::default();
        let mut grid = OccupancyGrid::with_size(100, 100).unwrap();
        let report = fusion.fuse(&[RangeSample::new(0, 1.0)], &pose(), &mut grid);

        assert_eq!(report.obstacle_points, vec![Coordinate::new(50, 51)]);
        assert!(grid.is_free(Coordinate::new(50, 50)));
        assert!(grid.is_free(Coordinate::new(50, 49)));
        assert!(grid.is_free(Coordinate::new(52, 48)));
        assert_eq!(grid.get(Coordinate::new(51, 50)), CellState::Obstacle);
        assert_eq!(grid.get(Coordinate::new(52, 53)), CellState::Obstacle);
        assert_eq!(report.farthest_obstacle, Some(Coordinate::new(48, 53)));
    }

    #[test]
    fn test_before_buffer_lets_clearance_spill_behind() {
        let fusion = ScanFusion::new(ScanFusionConfig {
            behind_filter: BehindFilter::BeforeBuffer,
            ..Default::default()
        });
        let mut grid = OccupancyGrid::with_size(100, 100).unwrap();
        fusion.fuse(&[RangeSample::new(0, 1.0)], &pose(), &mut grid);
        assert!(grid.is_free(Coordinate::new(50, 50)));
        assert_eq!(grid.get(Coordinate::new(50, 49)), CellState::Obstacle);
    }

    #[test]
    fn test_readings_behind_are_dropped() {
        let fusion = ScanFusion::default();
        let mut grid = OccupancyGrid::with_size(100, 100).unwrap();
        let report = fusion.fuse(&[RangeSample::new(180, 10.0)], &pose(), &mut grid);
        assert!(!report.has_obstacles());
        assert_eq!(grid.obstacle_count(), 0);
    }

    #[test]
    fn test_readings_outside_grid_are_dropped() {
        let fusion = ScanFusion::default();
        let mut grid = OccupancyGrid::with_size(100, 100).unwrap();
        let report = fusion.fuse(&[RangeSample::new(0, 80.0)], &pose(), &mut grid);
        assert!(report.scan_points.is_empty());
        assert_eq!(grid.obstacle_count(), 0);
    }
}

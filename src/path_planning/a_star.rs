//! A* path planning on the occupancy grid
//!
//! Classic A* keyed on `f = g + h` with a Euclidean heuristic. Neighbors are
//! 4- or 8-connected; the vehicle only turns in 45 degree increments, so the
//! navigation loop uses the 8-connected model.
//!
//! A cell may be pushed again whenever a cheaper `g` is found for it; stale
//! heap entries are skipped once the cell is closed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use ordered_float::OrderedFloat;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::common::{Coordinate, GridPath, GridPathPlanner, NavigationError, NavigationResult};
use crate::mapping::OccupancyGrid;

/// Order in which the neighbors of a blocked goal are tried
pub const GOAL_NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (0, -1),
    (0, 1),
    (-1, 0),
    (1, 0),
    (-1, -1),
    (-1, 1),
    (1, -1),
    (1, 1),
];

/// Neighborhood used for expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Four,
    Eight,
}

/// Configuration for A* planner
#[derive(Debug, Clone)]
pub struct AStarConfig {
    pub connectivity: Connectivity,
    /// Heuristic weight, must stay <= 1.0 for optimal paths
    pub heuristic_weight: f64,
    /// Allow diagonal moves between two blocked orthogonal cells
    pub allow_corner_cutting: bool,
}

impl Default for AStarConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Eight,
            heuristic_weight: 1.0,
            allow_corner_cutting: false,
        }
    }
}

/// Search node, alive for one planning call
#[derive(Debug, Clone, Copy)]
struct Node {
    position: Coordinate,
    g: f64,
    h: f64,
    f: f64,
    parent_index: Option<usize>,
}

/// Heap entry. Lowest `f` first, then lowest `h`, then insertion order.
#[derive(Debug, PartialEq, Eq)]
struct PriorityNode {
    f: OrderedFloat<f64>,
    h: OrderedFloat<f64>,
    sequence: usize,
    index: usize,
}

impl Ord for PriorityNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        (other.f, other.h, other.sequence).cmp(&(self.f, self.h, self.sequence))
    }
}

impl PartialOrd for PriorityNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* grid planner
pub struct AStarPlanner {
    config: AStarConfig,
    motion: Vec<(i32, i32, f64)>,
}

impl AStarPlanner {
    pub fn new(config: AStarConfig) -> Self {
        let motion = Self::get_motion_model(config.connectivity);
        AStarPlanner { config, motion }
    }

    pub fn config(&self) -> &AStarConfig {
        &self.config
    }

    fn calc_heuristic(&self, a: Coordinate, b: Coordinate) -> f64 {
        self.config.heuristic_weight * a.distance(&b)
    }

    fn get_motion_model(connectivity: Connectivity) -> Vec<(i32, i32, f64)> {
        // dx, dy, cost
        let mut motion = vec![(1, 0, 1.0), (0, 1, 1.0), (-1, 0, 1.0), (0, -1, 1.0)];
        if connectivity == Connectivity::Eight {
            motion.extend_from_slice(&[
                (-1, -1, std::f64::consts::SQRT_2),
                (-1, 1, std::f64::consts::SQRT_2),
                (1, -1, std::f64::consts::SQRT_2),
                (1, 1, std::f64::consts::SQRT_2),
            ]);
        }
        motion
    }

    /// Goal to search for: the requested one, or its first free neighbor
    /// when the goal cell itself is an obstacle
    fn resolve_goal(&self, grid: &OccupancyGrid, goal: Coordinate) -> NavigationResult<Coordinate> {
        if !grid.get(goal).is_blocked() {
            return Ok(goal);
        }
        let retarget = GOAL_NEIGHBOR_OFFSETS
            .iter()
            .map(|&(dx, dy)| Coordinate::new(goal.x + dx, goal.y + dy))
            .find(|c| !grid.get(*c).is_blocked());
        match retarget {
            Some(free) => {
                warn!(
                    "The ending point of {} has an obstacle, cannot navigate there. Navigating to {} instead.",
                    goal, free
                );
                Ok(free)
            }
            None => Err(NavigationError::DestinationUnreachable { goal }),
        }
    }

    fn can_move(&self, grid: &OccupancyGrid, from: Coordinate, dx: i32, dy: i32) -> bool {
        let to = Coordinate::new(from.x + dx, from.y + dy);
        if grid.get(to).is_blocked() {
            return false;
        }
        if dx != 0 && dy != 0 && !self.config.allow_corner_cutting {
            let side_x = grid.get(Coordinate::new(from.x + dx, from.y));
            let side_y = grid.get(Coordinate::new(from.x, from.y + dy));
            if side_x.is_blocked() || side_y.is_blocked() {
                return false;
            }
        }
        true
    }

    fn build_path(&self, goal_index: usize, node_storage: &[Node], requested_goal: Coordinate) -> NavigationResult<GridPath> {
        let mut points = Vec::new();
        let mut current_index = Some(goal_index);

        while let Some(index) = current_index {
            let node = &node_storage[index];
            points.push(node.position);
            current_index = node.parent_index;
        }

        points.reverse();
        GridPath::new(points, requested_goal).ok_or_else(|| {
            NavigationError::InvalidParameter("path reconstruction produced no cells".to_string())
        })
    }
}

impl Default for AStarPlanner {
    fn default() -> Self {
        Self::new(AStarConfig::default())
    }
}

impl GridPathPlanner for AStarPlanner {
    fn plan(
        &self,
        grid: &OccupancyGrid,
        start: Coordinate,
        goal: Coordinate,
    ) -> NavigationResult<GridPath> {
        for coord in [start, goal] {
            if !grid.contains(coord) {
                return Err(NavigationError::InvalidCoordinate { coord, bounds: grid.bounds() });
            }
        }
        let requested_goal = goal;
        let goal = self.resolve_goal(grid, goal)?;

        let mut open_set = BinaryHeap::new();
        let mut closed_set: HashSet<Coordinate> = HashSet::new();
        let mut g_values: HashMap<Coordinate, f64> = HashMap::new();
        let mut node_storage: Vec<Node> = Vec::new();
        let mut sequence = 0;

        let h = self.calc_heuristic(start, goal);
        node_storage.push(Node { position: start, g: 0.0, h, f: h, parent_index: None });
        g_values.insert(start, 0.0);
        open_set.push(PriorityNode {
            f: OrderedFloat(h),
            h: OrderedFloat(h),
            sequence,
            index: 0,
        });

        let mut iteration = 0;
        while let Some(item) = open_set.pop() {
            let current = node_storage[item.index];

            // Skip stale entries superseded by a cheaper path
            if closed_set.contains(&current.position) {
                continue;
            }
            iteration += 1;

            if current.position == goal {
                debug!(
                    "Found goal {} after {} iterations, cost {:.2}",
                    goal, iteration, current.f
                );
                return self.build_path(item.index, &node_storage, requested_goal);
            }

            closed_set.insert(current.position);

            for &(dx, dy, cost) in &self.motion {
                let next = Coordinate::new(current.position.x + dx, current.position.y + dy);
                if closed_set.contains(&next) || !self.can_move(grid, current.position, dx, dy) {
                    continue;
                }

                let g = current.g + cost;
                let existing_g = g_values.get(&next).copied().unwrap_or(f64::INFINITY);
                if g < existing_g {
                    g_values.insert(next, g);
                    let h = self.calc_heuristic(next, goal);
                    node_storage.push(Node {
                        position: next,
                        g,
                        h,
                        f: g + h,
                        parent_index: Some(item.index),
                    });
                    sequence += 1;
                    open_set.push(PriorityNode {
                        f: OrderedFloat(g + h),
                        h: OrderedFloat(h),
                        sequence,
                        index: node_storage.len() - 1,
                    });
                }
            }
        }

        debug!("Open set is empty after {} iterations", iteration);
        Err(NavigationError::NoPath { start, goal })
    }
}

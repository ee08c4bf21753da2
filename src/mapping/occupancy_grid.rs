// Occupancy grid for obstacle mapping
// Cells are addressed in absolute vehicle coordinates (1 cell = 1 cm).

use std::fmt;
use std::io::Write;
use std::ops::Deref;

use nalgebra::DMatrix;
use serde::Deserialize;

use crate::common::{Coordinate, NavigationError, NavigationResult};

/// State of one grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Free,
    Obstacle,
    /// Vehicle position, only written for logging and cleared before planning
    Vehicle,
    /// Returned by lookups outside the grid, never stored
    OutOfRange,
}

impl CellState {
    /// Integer code used in map dumps
    pub fn code(&self) -> i32 {
        match self {
            CellState::Free => 0,
            CellState::Obstacle => 1,
            CellState::Vehicle => 4,
            CellState::OutOfRange => -1,
        }
    }

    /// Obstacles and out-of-range cells both block expansion
    pub fn is_blocked(&self) -> bool {
        matches!(self, CellState::Obstacle | CellState::OutOfRange)
    }
}

/// Half-open rectangle `[x_lower, x_upper) x [y_lower, y_upper)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GridBounds {
    pub x_lower: i32,
    pub x_upper: i32,
    pub y_lower: i32,
    pub y_upper: i32,
}

impl GridBounds {
    pub fn new(x_lower: i32, x_upper: i32, y_lower: i32, y_upper: i32) -> NavigationResult<Self> {
        if x_upper <= x_lower || y_upper <= y_lower {
            return Err(NavigationError::InvalidParameter(format!(
                "empty grid bounds [{}, {}) x [{}, {})",
                x_lower, x_upper, y_lower, y_upper
            )));
        }
        Ok(Self { x_lower, x_upper, y_lower, y_upper })
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        coord.x >= self.x_lower
            && coord.x < self.x_upper
            && coord.y >= self.y_lower
            && coord.y < self.y_upper
    }

    pub fn width(&self) -> usize {
        (self.x_upper - self.x_lower) as usize
    }

    pub fn height(&self) -> usize {
        (self.y_upper - self.y_lower) as usize
    }
}

impl Default for GridBounds {
    fn default() -> Self {
        Self { x_lower: -1500, x_upper: 1500, y_lower: -1500, y_upper: 1500 }
    }
}

impl fmt::Display for GridBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}) x [{}, {})",
            self.x_lower, self.x_upper, self.y_lower, self.y_upper
        )
    }
}

/// Bounded binary obstacle map.
///
/// Marks outside the bounds are ignored so that scan overshoot never fails,
/// and lookups outside return [`CellState::OutOfRange`] instead of panicking.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    bounds: GridBounds,
    cells: DMatrix<CellState>,
    vehicle_marker: Option<Coordinate>,
}

impl OccupancyGrid {
    pub fn new(bounds: GridBounds) -> NavigationResult<Self> {
        let bounds = GridBounds::new(bounds.x_lower, bounds.x_upper, bounds.y_lower, bounds.y_upper)?;
        let cells = DMatrix::from_element(bounds.width(), bounds.height(), CellState::Free);
        Ok(Self { bounds, cells, vehicle_marker: None })
    }

    /// Grid covering `[0, width) x [0, height)`
    pub fn with_size(width: usize, height: usize) -> NavigationResult<Self> {
        Self::new(GridBounds::new(0, width as i32, 0, height as i32)?)
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    pub fn width(&self) -> usize {
        self.bounds.width()
    }

    pub fn height(&self) -> usize {
        self.bounds.height()
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        self.bounds.contains(coord)
    }

    fn index(&self, coord: Coordinate) -> Option<(usize, usize)> {
        if !self.contains(coord) {
            return None;
        }
        Some((
            (coord.x - self.bounds.x_lower) as usize,
            (coord.y - self.bounds.y_lower) as usize,
        ))
    }

    pub fn get(&self, coord: Coordinate) -> CellState {
        match self.index(coord) {
            Some(idx) => self.cells[idx],
            None => CellState::OutOfRange,
        }
    }

    pub fn is_free(&self, coord: Coordinate) -> bool {
        self.get(coord) == CellState::Free
    }

    /// Mark an obstacle if `coord` is inside the grid. Returns whether the
    /// cell was written.
    pub fn mark_obstacle(&mut self, coord: Coordinate) -> bool {
        let bounds = self.bounds;
        self.mark_obstacle_in(coord, &bounds)
    }

    /// Mark an obstacle only if `coord` lies inside both `bounds` and the grid
    pub fn mark_obstacle_in(&mut self, coord: Coordinate, bounds: &GridBounds) -> bool {
        if !bounds.contains(coord) {
            return false;
        }
        match self.index(coord) {
            Some(idx) => {
                self.cells[idx] = CellState::Obstacle;
                true
            }
            None => false,
        }
    }

    /// Write the transient vehicle marker, replacing any previous one.
    /// An obstacle under the vehicle is left untouched.
    pub fn mark_vehicle(&mut self, coord: Coordinate) {
        self.clear_vehicle_marker();
        if let Some(idx) = self.index(coord) {
            if self.cells[idx] == CellState::Free {
                self.cells[idx] = CellState::Vehicle;
                self.vehicle_marker = Some(coord);
            }
        }
    }

    pub fn clear_vehicle_marker(&mut self) {
        if let Some(coord) = self.vehicle_marker.take() {
            if let Some(idx) = self.index(coord) {
                if self.cells[idx] == CellState::Vehicle {
                    self.cells[idx] = CellState::Free;
                }
            }
        }
    }

    /// Reset every cell to free
    pub fn clear(&mut self) {
        self.cells.fill(CellState::Free);
        self.vehicle_marker = None;
    }

    pub fn obstacle_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == CellState::Obstacle).count()
    }

    /// All obstacle cells, sorted by x then y
    pub fn obstacles(&self) -> Vec<Coordinate> {
        let mut out = Vec::new();
        for ix in 0..self.cells.nrows() {
            for iy in 0..self.cells.ncols() {
                if self.cells[(ix, iy)] == CellState::Obstacle {
                    out.push(Coordinate::new(
                        ix as i32 + self.bounds.x_lower,
                        iy as i32 + self.bounds.y_lower,
                    ));
                }
            }
        }
        out
    }

    /// Cell codes around `center`, one row per y (top row is the highest y)
    pub fn render_window(&self, center: Coordinate, radius: i32) -> String {
        let mut rows = Vec::new();
        for y in ((center.y - radius)..=(center.y + radius)).rev() {
            let row: Vec<String> = ((center.x - radius)..=(center.x + radius))
                .map(|x| match self.get(Coordinate::new(x, y)) {
                    CellState::OutOfRange => ".".to_string(),
                    state => state.code().to_string(),
                })
                .collect();
            rows.push(row.join(" "));
        }
        rows.join("\n")
    }

    /// Dump the grid as a plain integer matrix, one line per x index
    pub fn write_snapshot<W: Write>(&self, mut writer: W) -> NavigationResult<()> {
        writeln!(writer, "# bounds {}", self.bounds)?;
        for ix in 0..self.cells.nrows() {
            let line: Vec<String> = (0..self.cells.ncols())
                .map(|iy| self.cells[(ix, iy)].code().to_string())
                .collect();
            writeln!(writer, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

impl Deref for OccupancyGrid {
    type Target = DMatrix<CellState>;

    fn deref(&self) -> &Self::Target {
        &self.cells
    }
}

//! Visualization of navigation runs
//!
//! Collects layers (obstacle cells, planned paths, the driven trajectory and
//! the vehicle pose) and renders them into a single gnuplot axes.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};
use nalgebra::Vector2;

use crate::common::{Coordinate, GridPath, NavigationError, NavigationResult, VehiclePose};
use crate::mapping::OccupancyGrid;

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const CYAN: &str = "#00FFFF";
    pub const ORANGE: &str = "#FFA500";
    pub const GRAY: &str = "#808080";

    // Semantic colors
    pub const OBSTACLE: &str = BLACK;
    pub const WORLD: &str = GRAY;
    pub const START: &str = GREEN;
    pub const GOAL: &str = BLUE;
    pub const PATH: &str = RED;
    pub const TRAJECTORY: &str = ORANGE;
    pub const VEHICLE: &str = CYAN;
}

/// Style for path rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self {
            color: colors::PATH.to_string(),
            line_width: 2.0,
            caption: "Path".to_string(),
        }
    }
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Lines { x: Vec<f64>, y: Vec<f64>, style: PathStyle, captioned: bool },
    Points { x: Vec<f64>, y: Vec<f64>, style: PointStyle },
}

/// Layered navigation plot
pub struct Visualizer {
    figure: Figure,
    title: String,
    x_label: String,
    y_label: String,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    aspect_ratio: Option<f64>,
    layers: Vec<Layer>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            figure: Figure::new(),
            title: String::new(),
            x_label: "X [cm]".to_string(),
            y_label: "Y [cm]".to_string(),
            x_range: None,
            y_range: None,
            aspect_ratio: Some(1.0),
            layers: Vec::new(),
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_x_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.x_range = Some((min, max));
        self
    }

    pub fn set_y_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.y_range = Some((min, max));
        self
    }

    /// Set aspect ratio (None for auto)
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Number of layers queued for rendering
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn push_points(&mut self, cells: &[Coordinate], style: PointStyle) -> &mut Self {
        if cells.is_empty() {
            return self;
        }
        let x = cells.iter().map(|c| c.x as f64).collect();
        let y = cells.iter().map(|c| c.y as f64).collect();
        self.layers.push(Layer::Points { x, y, style });
        self
    }

    /// Plot obstacle cells
    pub fn plot_obstacles(&mut self, cells: &[Coordinate], caption: &str) -> &mut Self {
        self.push_points(
            cells,
            PointStyle::new(colors::OBSTACLE, caption).with_symbol('S').with_size(0.5),
        )
    }

    /// Plot ground-truth obstacles of a simulated world
    pub fn plot_world(&mut self, cells: &[Coordinate]) -> &mut Self {
        self.push_points(
            cells,
            PointStyle::new(colors::WORLD, "World").with_symbol('S').with_size(0.3),
        )
    }

    /// Plot every obstacle currently on the grid
    pub fn plot_grid(&mut self, grid: &OccupancyGrid) -> &mut Self {
        let cells = grid.obstacles();
        self.plot_obstacles(&cells, "Mapped obstacles")
    }

    /// Plot a planned path
    pub fn plot_path(&mut self, path: &GridPath, style: &PathStyle) -> &mut Self {
        self.layers.push(Layer::Lines {
            x: path.x_coords(),
            y: path.y_coords(),
            style: style.clone(),
            captioned: true,
        });
        self
    }

    /// Plot the driven trajectory
    pub fn plot_trajectory(&mut self, points: &[Vector2<f64>]) -> &mut Self {
        if points.is_empty() {
            return self;
        }
        self.layers.push(Layer::Lines {
            x: points.iter().map(|p| p.x).collect(),
            y: points.iter().map(|p| p.y).collect(),
            style: PathStyle::new(colors::TRAJECTORY, "Trajectory").with_line_width(1.5),
            captioned: true,
        });
        self
    }

    /// Plot the vehicle with a short heading line
    pub fn plot_vehicle(&mut self, pose: &VehiclePose, size: f64) -> &mut Self {
        let origin = pose.location.to_vector();
        let tip = origin + pose.heading.unit_vector() * size * 2.0;
        self.push_points(
            &[pose.location],
            PointStyle::new(colors::VEHICLE, "Vehicle").with_size(size),
        );
        self.layers.push(Layer::Lines {
            x: vec![origin.x, tip.x],
            y: vec![origin.y, tip.y],
            style: PathStyle::new(colors::VEHICLE, ""),
            captioned: false,
        });
        self
    }

    pub fn plot_start(&mut self, cell: Coordinate) -> &mut Self {
        self.push_points(&[cell], PointStyle::new(colors::START, "Start").with_size(1.5))
    }

    pub fn plot_goal(&mut self, cell: Coordinate) -> &mut Self {
        self.push_points(&[cell], PointStyle::new(colors::GOAL, "Goal").with_size(1.5).with_symbol('x'))
    }

    /// Finalize and show the plot
    pub fn show(&mut self) -> NavigationResult<()> {
        self.render();
        self.figure.show().map_err(plot_error)?;
        Ok(())
    }

    /// Save plot to PNG file
    pub fn save_png(&mut self, path: &str, width: u32, height: u32) -> NavigationResult<()> {
        self.render();
        self.figure.save_to_png(path, width, height).map_err(plot_error)
    }

    /// Save plot to SVG file
    pub fn save_svg(&mut self, path: &str) -> NavigationResult<()> {
        self.render();
        self.figure.save_to_svg(path, 800, 600).map_err(plot_error)
    }

    fn render(&mut self) {
        self.figure.clear_axes();
        let axes = self.figure.axes2d();

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);
        if let Some((min, max)) = self.x_range {
            axes.set_x_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some((min, max)) = self.y_range {
            axes.set_y_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }

        for layer in &self.layers {
            match layer {
                Layer::Lines { x, y, style, captioned } => {
                    let mut options = vec![Color(style.color.as_str()), LineWidth(style.line_width)];
                    if *captioned {
                        options.push(Caption(style.caption.as_str()));
                    }
                    axes.lines(x, y, &options);
                }
                Layer::Points { x, y, style } => {
                    axes.points(
                        x,
                        y,
                        &[
                            Caption(style.caption.as_str()),
                            Color(style.color.as_str()),
                            PointSymbol(style.symbol),
                            PointSize(style.size),
                        ],
                    );
                }
            }
        }
    }
}

fn plot_error<E: std::fmt::Display>(e: E) -> NavigationError {
    NavigationError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Plot of one navigation run: mapped obstacles, last planned path,
/// trajectory and endpoints
pub fn quick_plot_navigation(
    grid: &OccupancyGrid,
    path: Option<&GridPath>,
    trajectory: &[Vector2<f64>],
    start: Coordinate,
    goal: Coordinate,
    title: &str,
) -> Visualizer {
    let mut vis = Visualizer::new();
    vis.set_title(title);
    vis.plot_grid(grid);
    if let Some(p) = path {
        vis.plot_path(p, &PathStyle::default());
    }
    vis.plot_trajectory(trajectory);
    vis.plot_start(start);
    vis.plot_goal(goal);
    vis
}

//! Error types for picar_navigation

use thiserror::Error;

use crate::common::types::{Coordinate, Direction};
use crate::mapping::GridBounds;

/// Main error type for the navigation stack
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Start or goal lies outside the occupancy grid
    #[error("Invalid coordinate: {coord} is outside the grid bounds {bounds}")]
    InvalidCoordinate { coord: Coordinate, bounds: GridBounds },

    /// The goal cell and all of its neighbors are obstacles
    #[error("Destination unreachable: {goal} and all adjacent cells are obstacles")]
    DestinationUnreachable { goal: Coordinate },

    /// The open set was exhausted before reaching the goal
    #[error("No path found from {start} to {goal}")]
    NoPath { start: Coordinate, goal: Coordinate },

    /// A turn produced a heading that is not one of the 8 directions
    #[error("Invalid heading transition: {from} turned by {turn} degrees gives {angle} degrees")]
    InvalidHeadingTransition { from: Direction, turn: i32, angle: i32 },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// The navigation loop ran out of cycles before arriving
    #[error("Navigation stopped after {cycles} cycles without arriving")]
    CycleLimitExceeded { cycles: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NavigationError {
    /// True for both flavours of "the goal cannot be reached"
    pub fn is_destination_unreachable(&self) -> bool {
        matches!(
            self,
            NavigationError::DestinationUnreachable { .. } | NavigationError::NoPath { .. }
        )
    }
}

impl From<toml::de::Error> for NavigationError {
    fn from(e: toml::de::Error) -> Self {
        NavigationError::Config(e.to_string())
    }
}

/// Result type alias for navigation operations
pub type NavigationResult<T> = Result<T, NavigationError>;

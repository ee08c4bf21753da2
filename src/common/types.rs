//! Common types used throughout picar_navigation

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use nalgebra::Vector2;
use serde::Deserialize;

use crate::utils::geometry::normalize_degrees;

/// Integer grid coordinate. One cell is one centimetre.
///
/// Ordering is by `x` then `y`, which is what scan fusion relies on to sort
/// obstacle readings deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0, y: 0 }
    }

    pub fn distance(&self, other: &Coordinate) -> f64 {
        (((self.x - other.x).pow(2) + (self.y - other.y).pow(2)) as f64).sqrt()
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x as f64, self.y as f64)
    }
}

impl Add for Coordinate {
    type Output = Coordinate;

    fn add(self, other: Coordinate) -> Coordinate {
        Coordinate::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Coordinate {
    type Output = Coordinate;

    fn sub(self, other: Coordinate) -> Coordinate {
        Coordinate::new(self.x - other.x, self.y - other.y)
    }
}

impl From<(i32, i32)> for Coordinate {
    fn from(tuple: (i32, i32)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x:{},y:{})", self.x, self.y)
    }
}

impl FromStr for Coordinate {
    type Err = String;

    /// Parses `"x,y"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected `x,y`, got `{}`", s))?;
        let x = x.trim().parse::<i32>().map_err(|e| format!("bad x in `{}`: {}", s, e))?;
        let y = y.trim().parse::<i32>().map_err(|e| format!("bad y in `{}`: {}", s, e))?;
        Ok(Coordinate::new(x, y))
    }
}

/// Compass heading of the vehicle.
///
/// North is 0 degrees along +y and angles grow counter-clockwise, so east is
/// -90 and west is +90. Every heading lies in (-180, 180]; south is 180.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Heading angle in degrees
    pub fn angle(&self) -> i32 {
        match self {
            Direction::North => 0,
            Direction::NorthEast => -45,
            Direction::East => -90,
            Direction::SouthEast => -135,
            Direction::South => 180,
            Direction::SouthWest => 135,
            Direction::West => 90,
            Direction::NorthWest => 45,
        }
    }

    /// Look up the direction for an angle in degrees.
    ///
    /// The angle is wrapped into (-180, 180] first, so -180 is south.
    /// Anything that is not a multiple of 45 has no direction.
    pub fn from_angle(angle: i32) -> Option<Direction> {
        let angle = normalize_degrees(angle);
        Direction::ALL.iter().copied().find(|d| d.angle() == angle)
    }

    /// Heading after turning by `turn` degrees (positive is left)
    pub fn rotated(&self, turn: i32) -> Option<Direction> {
        Direction::from_angle(self.angle() + turn)
    }

    /// Unit vector of the heading: x = -sin(heading), y = cos(heading)
    pub fn unit_vector(&self) -> Vector2<f64> {
        let rad = (self.angle() as f64).to_radians();
        Vector2::new(-rad.sin(), rad.cos())
    }

    /// Grid step taken when moving one cell in this direction
    pub fn grid_step(&self) -> Coordinate {
        match self {
            Direction::North => Coordinate::new(0, 1),
            Direction::NorthEast => Coordinate::new(1, 1),
            Direction::East => Coordinate::new(1, 0),
            Direction::SouthEast => Coordinate::new(1, -1),
            Direction::South => Coordinate::new(0, -1),
            Direction::SouthWest => Coordinate::new(-1, -1),
            Direction::West => Coordinate::new(-1, 0),
            Direction::NorthWest => Coordinate::new(-1, 1),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::NorthEast => "northeast",
            Direction::East => "east",
            Direction::SouthEast => "southeast",
            Direction::South => "south",
            Direction::SouthWest => "southwest",
            Direction::West => "west",
            Direction::NorthWest => "northwest",
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Direction::North
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.angle())
    }
}

/// Location and discrete heading of the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VehiclePose {
    pub location: Coordinate,
    pub heading: Direction,
}

impl VehiclePose {
    pub fn new(location: Coordinate, heading: Direction) -> Self {
        Self { location, heading }
    }
}

/// One ultrasonic reading taken during a sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSample {
    /// Servo angle in degrees relative to the vehicle heading
    pub angle: i32,
    /// Distance in cm, already corrected by the sensor offset
    pub distance: f64,
}

impl RangeSample {
    pub fn new(angle: i32, distance: f64) -> Self {
        Self { angle, distance }
    }
}

/// Straight run of identical grid steps inside a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leg {
    pub from: Coordinate,
    pub to: Coordinate,
    /// Per-step delta, one of the 8 neighbor offsets
    pub step: Coordinate,
    pub steps: usize,
}

impl Leg {
    pub fn distance(&self) -> f64 {
        self.from.distance(&self.to)
    }
}

/// Planned path from start to goal, both inclusive.
///
/// A path always holds at least the start cell; a single-cell path means the
/// vehicle is already at the goal. Failure is never represented as a path.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPath {
    points: Vec<Coordinate>,
    requested_goal: Coordinate,
}

impl GridPath {
    /// Returns `None` for an empty point list
    pub fn new(points: Vec<Coordinate>, requested_goal: Coordinate) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(Self { points, requested_goal })
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn start(&self) -> Coordinate {
        self.points[0]
    }

    pub fn goal(&self) -> Coordinate {
        self.points[self.points.len() - 1]
    }

    /// Goal passed to the planner, before any retargeting
    pub fn requested_goal(&self) -> Coordinate {
        self.requested_goal
    }

    pub fn was_retargeted(&self) -> bool {
        self.goal() != self.requested_goal
    }

    /// Number of coordinates, start and goal included
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Number of moves between cells
    pub fn steps(&self) -> usize {
        self.points.len() - 1
    }

    pub fn is_arrived(&self) -> bool {
        self.points.len() == 1
    }

    pub fn total_length(&self) -> f64 {
        self.points.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }

    pub fn x_coords(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x as f64).collect()
    }

    pub fn y_coords(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y as f64).collect()
    }

    /// Collapse consecutive identical steps into legs
    pub fn legs(&self) -> Vec<Leg> {
        let mut legs: Vec<Leg> = Vec::new();
        for w in self.points.windows(2) {
            let step = w[1] - w[0];
            match legs.last_mut() {
                Some(leg) if leg.step == step => {
                    leg.to = w[1];
                    leg.steps += 1;
                }
                _ => legs.push(Leg { from: w[0], to: w[1], step, steps: 1 }),
            }
        }
        legs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_coordinate_ordering_is_x_then_y() {
        let mut coords = vec![
            Coordinate::new(2, 0),
            Coordinate::new(1, 5),
            Coordinate::new(1, -3),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![Coordinate::new(1, -3), Coordinate::new(1, 5), Coordinate::new(2, 0)]
        );
    }

    #[test]
    fn test_coordinate_arithmetic_and_parse() {
        let a = Coordinate::new(3, 4);
        assert_eq!(a + Coordinate::new(1, -1), Coordinate::new(4, 3));
        assert_eq!(a - a, Coordinate::origin());
        assert!((Coordinate::origin().distance(&a) - 5.0).abs() < 1e-10);
        assert_eq!("12, -7".parse::<Coordinate>().unwrap(), Coordinate::new(12, -7));
        assert!("12".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_direction_angle_table_round_trips() {
        for d in Direction::ALL.iter() {
            assert_eq!(Direction::from_angle(d.angle()), Some(*d));
            assert_eq!(d.angle() % 45, 0);
            assert!(d.angle() > -180 && d.angle() <= 180);
        }
        assert_eq!(Direction::from_angle(-180), Some(Direction::South));
        assert_eq!(Direction::from_angle(-225), Some(Direction::SouthWest));
        assert_eq!(Direction::from_angle(30), None);
    }

    #[test]
    fn test_direction_rotation() {
        assert_eq!(Direction::SouthWest.rotated(-135), Some(Direction::North));
        assert_eq!(Direction::North.rotated(90), Some(Direction::West));
        assert_eq!(Direction::East.rotated(-90), Some(Direction::South));
        assert_eq!(Direction::North.rotated(10), None);
    }

    #[test]
    fn test_unit_vector_matches_grid_step() {
        for d in Direction::ALL.iter() {
            let v = d.unit_vector();
            let expected = d.grid_step().to_vector().normalize();
            assert_abs_diff_eq!(v.x, expected.x, epsilon = 1e-12);
            assert_abs_diff_eq!(v.y, expected.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_grid_path_legs() {
        let points = vec![
            Coordinate::new(0, 0),
            Coordinate::new(1, 1),
            Coordinate::new(2, 2),
            Coordinate::new(2, 3),
            Coordinate::new(2, 4),
            Coordinate::new(3, 4),
        ];
        let path = GridPath::new(points, Coordinate::new(3, 4)).unwrap();
        let legs = path.legs();
        assert_eq!(legs.len(), 3);
        assert_eq!(legs[0].to, Coordinate::new(2, 2));
        assert_eq!(legs[0].steps, 2);
        assert_eq!(legs[1].step, Coordinate::new(0, 1));
        assert_eq!(legs[2].from, Coordinate::new(2, 4));
        assert_eq!(path.steps(), 5);
        assert!(!path.was_retargeted());
    }

    #[test]
    fn test_grid_path_never_empty() {
        assert!(GridPath::new(Vec::new(), Coordinate::origin()).is_none());
        let arrived = GridPath::new(vec![Coordinate::origin()], Coordinate::origin()).unwrap();
        assert!(arrived.is_arrived());
        assert!(arrived.legs().is_empty());
    }
}

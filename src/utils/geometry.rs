//! Grid geometry shared by scan fusion, the planner and the vehicle controller
//!
//! All angles follow the vehicle convention: degrees, north = 0 along +y,
//! positive angles to the left (west = +90), wrapped into (-180, 180].
//! Projection uses x = -d * sin(angle), y = d * cos(angle) everywhere; pose
//! updates in the controller use the same convention through
//! [`Direction::unit_vector`].

use nalgebra::Vector2;

use crate::common::{Coordinate, Direction, VehiclePose};

/// Wrap an integer angle into (-180, 180]
pub fn normalize_degrees(angle: i32) -> i32 {
    let a = angle.rem_euclid(360);
    if a > 180 {
        a - 360
    } else {
        a
    }
}

/// Wrap an angle into (-180, 180]
pub fn normalize_degrees_f64(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

/// Round to the nearest multiple of `increment` degrees
pub fn round_to_increment(angle: f64, increment: i32) -> i32 {
    (angle / increment as f64).round() as i32 * increment
}

/// Heading angle from `from` to `to`.
///
/// `atan2` is called with the x delta first because 0 degrees points along
/// +y, and negated because east is -90.
pub fn calc_angle_between(from: Coordinate, to: Coordinate) -> f64 {
    let dx = (to.x - from.x) as f64;
    let dy = (to.y - from.y) as f64;
    -dx.atan2(dy).to_degrees()
}

/// Offset of a sensor reading relative to the vehicle, in cells
pub fn polar_to_offset(angle: f64, distance: f64, heading: Direction) -> Vector2<f64> {
    let rad = (angle + heading.angle() as f64).to_radians();
    Vector2::new(-distance * rad.sin(), distance * rad.cos())
}

/// Absolute grid cell hit by a reading taken at `angle` (relative to the
/// heading) and `distance` from the vehicle
pub fn polar_to_absolute(angle: f64, distance: f64, pose: &VehiclePose) -> Coordinate {
    let offset = polar_to_offset(angle, distance, pose.heading);
    Coordinate::new(
        (pose.location.x as f64 + offset.x).round() as i32,
        (pose.location.y as f64 + offset.y).round() as i32,
    )
}

/// Inverse of [`polar_to_offset`]: returns `(angle, distance)` with the angle
/// relative to `heading`
pub fn offset_to_polar(offset: Vector2<f64>, heading: Direction) -> (f64, f64) {
    let distance = offset.norm();
    let absolute = (-offset.x).atan2(offset.y).to_degrees();
    (normalize_degrees_f64(absolute - heading.angle() as f64), distance)
}

/// Cells touched by the segment between two readings.
///
/// Readings farther apart than `width_threshold` belong to separate
/// obstacles and are returned unconnected.
pub fn interpolate_segment(p1: Coordinate, p2: Coordinate, width_threshold: f64) -> Vec<Coordinate> {
    if p1.distance(&p2) > width_threshold {
        return vec![p1, p2];
    }
    supercover_line(p1, p2)
}

/// Every cell the ideal line from `start` to `end` passes through.
///
/// Where the line crosses exactly through a cell corner, the x-side cell is
/// emitted before the diagonal cell and the y-side cell is skipped. Consecutive
/// cells are still always 4-adjacent, so a diagonal move can never slip
/// through the segment.
pub fn supercover_line(start: Coordinate, end: Coordinate) -> Vec<Coordinate> {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let nx = dx.abs();
    let ny = dy.abs();
    let sign_x = if dx > 0 { 1 } else { -1 };
    let sign_y = if dy > 0 { 1 } else { -1 };

    let mut p = start;
    let mut points = vec![p];
    let (mut ix, mut iy) = (0, 0);
    while ix < nx || iy < ny {
        let decision = (1 + 2 * ix) * ny - (1 + 2 * iy) * nx;
        if decision == 0 {
            points.push(Coordinate::new(p.x + sign_x, p.y));
            p = Coordinate::new(p.x + sign_x, p.y + sign_y);
            ix += 1;
            iy += 1;
        } else if decision < 0 {
            p = Coordinate::new(p.x + sign_x, p.y);
            ix += 1;
        } else {
            p = Coordinate::new(p.x, p.y + sign_y);
            iy += 1;
        }
        points.push(p);
    }
    points
}

/// Square neighborhood of side `2 * radius + 1` around `center`
pub fn within_radius(center: Coordinate, radius: i32) -> Vec<Coordinate> {
    let mut points = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)).max(0) as usize);
    for x in (center.x - radius)..=(center.x + radius) {
        for y in (center.y - radius)..=(center.y + radius) {
            points.push(Coordinate::new(x, y));
        }
    }
    points
}

/// True when `point` lies strictly behind the vehicle.
///
/// Uses the integer grid step of the heading so the sign test is exact for
/// cells exactly abeam of the vehicle.
pub fn is_behind(point: Coordinate, pose: &VehiclePose) -> bool {
    let rel = point - pose.location;
    let step = pose.heading.grid_step();
    rel.x * step.x + rel.y * step.y < 0
}

/// Point of `points` farthest from `location`; the first one wins ties
pub fn find_farthest_point(location: Coordinate, points: &[Coordinate]) -> Option<Coordinate> {
    let mut farthest: Option<(Coordinate, f64)> = None;
    for p in points {
        let d = location.distance(p);
        match farthest {
            Some((_, best)) if d <= best => {}
            _ => farthest = Some((*p, d)),
        }
    }
    farthest.map(|(p, _)| p)
}

/// `floor`, except values within 1e-6 of an integer snap to it.
///
/// Diagonal legs are multiples of sqrt(2) and their projections land a few
/// ulps under the exact cell count.
pub fn snap_floor(value: f64) -> i32 {
    let nearest = value.round();
    if (value - nearest).abs() < 1e-6 {
        nearest as i32
    } else {
        value.floor() as i32
    }
}

/// Cell displacement after driving `distance` cm along `heading`
pub fn drive_displacement(distance: f64, heading: Direction) -> Coordinate {
    let v = heading.unit_vector() * distance;
    Coordinate::new(snap_floor(v.x), snap_floor(v.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(-225), 135);
        assert_eq!(normalize_degrees(225), -135);
        assert_eq!(normalize_degrees(-180), 180);
        assert_eq!(normalize_degrees(180), 180);
        assert_eq!(normalize_degrees(360), 0);
        assert_abs_diff_eq!(normalize_degrees_f64(-190.0), 170.0);
    }

    #[test]
    fn test_calc_angle_between_cardinals() {
        let o = Coordinate::origin();
        assert_abs_diff_eq!(calc_angle_between(o, Coordinate::new(0, 5)), 0.0);
        assert_abs_diff_eq!(calc_angle_between(o, Coordinate::new(5, 0)), -90.0);
        assert_abs_diff_eq!(calc_angle_between(o, Coordinate::new(-5, 0)), 90.0);
        assert_abs_diff_eq!(calc_angle_between(o, Coordinate::new(0, -5)).abs(), 180.0);
        assert_abs_diff_eq!(calc_angle_between(o, Coordinate::new(3, 3)), -45.0);
    }

    #[test]
    fn test_rounded_angle_is_a_compass_angle() {
        let allowed = [-180, -135, -90, -45, 0, 45, 90, 135, 180];
        for x in -7..=7 {
            for y in -7..=7 {
                let a = Coordinate::new(1, -2);
                let b = Coordinate::new(1 + x, -2 + y);
                let rounded = round_to_increment(calc_angle_between(a, b), 45);
                assert!(allowed.contains(&rounded), "{} -> {}", b, rounded);
            }
        }
    }

    #[test]
    fn test_polar_to_absolute_respects_heading() {
        let north = VehiclePose::new(Coordinate::new(10, 10), Direction::North);
        assert_eq!(polar_to_absolute(0.0, 20.0, &north), Coordinate::new(10, 30));
        // +90 on the servo looks west
        assert_eq!(polar_to_absolute(90.0, 20.0, &north), Coordinate::new(-10, 10));

        let east = VehiclePose::new(Coordinate::new(10, 10), Direction::East);
        assert_eq!(polar_to_absolute(0.0, 20.0, &east), Coordinate::new(30, 10));
        assert_eq!(polar_to_absolute(90.0, 20.0, &east), Coordinate::new(10, 30));

        let south_west = VehiclePose::new(Coordinate::origin(), Direction::SouthWest);
        assert_eq!(polar_to_absolute(0.0, 10.0, &south_west), Coordinate::new(-7, -7));
    }

    #[test]
    fn test_polar_round_trip() {
        for heading in Direction::ALL.iter() {
            for angle in (-70..=70).step_by(14) {
                let distance = 37.5;
                let offset = polar_to_offset(angle as f64, distance, *heading);
                let (a, d) = offset_to_polar(offset, *heading);
                assert_abs_diff_eq!(a, angle as f64, epsilon = 1e-9);
                assert_abs_diff_eq!(d, distance, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_supercover_is_four_connected() {
        let cases = [
            (Coordinate::new(0, 0), Coordinate::new(3, 3)),
            (Coordinate::new(0, 0), Coordinate::new(7, -2)),
            (Coordinate::new(4, 1), Coordinate::new(-3, 6)),
            (Coordinate::new(0, 0), Coordinate::new(0, 5)),
        ];
        for (a, b) in cases.iter() {
            let line = supercover_line(*a, *b);
            assert_eq!(line.first(), Some(a));
            assert_eq!(line.last(), Some(b));
            for w in line.windows(2) {
                let d = w[1] - w[0];
                assert_eq!(d.x.abs() + d.y.abs(), 1, "{} -> {}", w[0], w[1]);
            }
        }
        assert_eq!(supercover_line(Coordinate::new(0, 0), Coordinate::new(3, 3)).len(), 7);
        assert_eq!(
            supercover_line(Coordinate::new(0, 0), Coordinate::new(1, 1)),
            vec![Coordinate::new(0, 0), Coordinate::new(1, 0), Coordinate::new(1, 1)]
        );
    }

    #[test]
    fn test_interpolate_segment_threshold() {
        let a = Coordinate::new(0, 0);
        let near = Coordinate::new(10, 0);
        let far = Coordinate::new(40, 0);
        assert_eq!(interpolate_segment(a, near, 25.0).len(), 11);
        assert_eq!(interpolate_segment(a, far, 25.0), vec![a, far]);
    }

    #[test]
    fn test_within_radius() {
        let points = within_radius(Coordinate::new(5, 5), 2);
        assert_eq!(points.len(), 25);
        assert!(points.contains(&Coordinate::new(3, 7)));
        assert!(!points.contains(&Coordinate::new(8, 5)));
        assert_eq!(within_radius(Coordinate::origin(), 0), vec![Coordinate::origin()]);
    }

    #[test]
    fn test_is_behind() {
        let pose = VehiclePose::new(Coordinate::new(0, 0), Direction::North);
        assert!(is_behind(Coordinate::new(3, -1), &pose));
        assert!(!is_behind(Coordinate::new(3, 0), &pose));
        assert!(!is_behind(Coordinate::new(-3, 4), &pose));

        let south = VehiclePose::new(Coordinate::new(0, 0), Direction::South);
        assert!(!is_behind(Coordinate::new(5, 0), &south));
        assert!(is_behind(Coordinate::new(0, 1), &south));

        let north_east = VehiclePose::new(Coordinate::new(0, 0), Direction::NorthEast);
        assert!(!is_behind(Coordinate::new(1, -1), &north_east));
        assert!(is_behind(Coordinate::new(-1, -1), &north_east));
    }

    #[test]
    fn test_find_farthest_point() {
        let o = Coordinate::origin();
        assert_eq!(find_farthest_point(o, &[]), None);
        let points = [Coordinate::new(1, 1), Coordinate::new(-4, 0), Coordinate::new(0, 4)];
        assert_eq!(find_farthest_point(o, &points), Some(Coordinate::new(-4, 0)));
    }

    #[test]
    fn test_drive_displacement_snaps_diagonals() {
        let d = 10.0 * std::f64::consts::SQRT_2;
        assert_eq!(drive_displacement(d, Direction::NorthEast), Coordinate::new(10, 10));
        assert_eq!(drive_displacement(d, Direction::SouthWest), Coordinate::new(-10, -10));
        assert_eq!(drive_displacement(10.0, Direction::East), Coordinate::new(10, 0));
        assert_eq!(drive_displacement(5.5, Direction::North), Coordinate::new(0, 5));
        assert_eq!(drive_displacement(5.5, Direction::South), Coordinate::new(0, -6));
    }
}

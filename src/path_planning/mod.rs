// Path planning on the occupancy grid

pub mod a_star;

pub use a_star::*;

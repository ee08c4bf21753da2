//! Vehicle control
//!
//! Calibrated motion primitives and the PiCar controller that executes them.

pub mod hardware;
pub mod motion;
pub mod picar;

pub use hardware::*;
pub use motion::*;
pub use picar::*;

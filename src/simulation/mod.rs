//! Simulated hardware for closed-loop runs without a vehicle

pub mod sim_car;

pub use sim_car::*;

//! Common types, traits, and error definitions for picar_navigation
//!
//! This module provides the foundational building blocks shared by the
//! map, planner, and vehicle controller.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;

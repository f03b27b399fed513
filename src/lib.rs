//! Timetable generation: turns a weekly demand list into a conflict-free
//! calendar of lessons, then folds it into recurring templates.

pub mod config;
pub mod data;
pub mod error;
pub mod server;
pub mod solver;

pub use config::EngineConfig;
pub use data::{GenerationRequest, GenerationResult};
pub use error::{ConfigError, EngineError};
pub use solver::{solve, solve_with, solve_with_cancel};

//! Progress aggregation and completion for trainings, sub-units and courses.

pub mod config;
pub mod course;
pub mod db;
pub mod engine;
pub mod error;
pub mod gamification;
pub mod models;
pub mod notify;
pub mod progress;
pub mod quiz;
pub mod recalc;
pub mod routes;
pub mod store;
pub mod validate;
pub mod weights;

pub use engine::{EngineSettings, LearningEngine};
pub use error::{EngineError, EngineResult};

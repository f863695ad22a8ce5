//! HTTP front end for filegen generators and the object cache.

pub mod serve;
pub mod startup;
pub mod web;

pub use startup::start_generators;
pub use web::{router, AppState};

pub mod ai;
pub mod cache;
pub mod insights;
pub mod questions;
pub mod telemetry;

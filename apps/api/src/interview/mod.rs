pub mod handlers;
pub mod machine;
pub mod models;
pub mod orchestrator;
pub mod questions;
pub mod scenario;

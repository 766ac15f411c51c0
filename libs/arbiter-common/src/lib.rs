pub mod config;
pub mod queue;
pub mod store;
pub mod types;

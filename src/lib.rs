pub mod api;
pub mod assignment;
pub mod cache;
pub mod cli;
pub mod geo;
pub mod lifecycle;
pub mod map;
pub mod resolver;
pub mod store;
pub mod sweep;
pub mod telemetry;
pub mod utils;

pub mod aggregate;
pub mod cache;
pub mod client;
pub mod collector;
pub mod config;
pub mod context;
pub mod metrics;
pub mod models;
pub mod refresh;

pub mod cost;
pub mod exchange;

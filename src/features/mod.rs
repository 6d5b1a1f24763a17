pub mod aggregations;
pub mod matrix;
pub mod types;

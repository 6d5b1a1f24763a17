pub mod engine;
pub mod isolation_forest;
pub mod rescaler;

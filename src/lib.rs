pub mod config;
pub mod eval;

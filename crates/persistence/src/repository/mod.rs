//! Repository implementations for database operations

pub mod settings;

pub use settings::*;

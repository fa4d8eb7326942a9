//! Neural network components

pub mod layers;
pub mod models;

pub use layers::*;
pub use models::*;

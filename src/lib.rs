// Core modules
pub mod api;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod settings;
pub mod strategy;

// Re-export commonly used types
pub use error::{BotError, BotResult};
pub use models::*;
pub use settings::BotConfig;

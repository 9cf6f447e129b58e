//! Model loading, configuration and logging for the `streamlinq` binary

pub mod config;
pub mod logging;
pub mod model;

pub use config::{Config, ConfigError};
pub use model::{Model, ModelError, QueryModel};

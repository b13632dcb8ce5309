//! Public configuration types for the movie-streams topology.
//!
//! These types are shared by the engine and by anything that deploys it.
//! Everything here can be deserialized from YAML or JSON.

pub mod config;
pub mod constants;
pub mod error;

pub use config::{StreamsConfig, TopicsConfig};
pub use error::ConfigError;

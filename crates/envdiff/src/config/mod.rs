//! Bootstrap settings and the `DiffConfig` document.

use std::time::Duration;

pub mod error;
pub mod loader;
pub mod schema;
pub mod settings;
pub mod validation;

pub use error::ConfigError;
pub use loader::{load_config, parse_config, LoadedConfig};
pub use schema::{
    DiffConfig, DiffConfigSpec, EnvironmentSpec, Environments, ImageSpec, ObjectMeta,
    API_VERSION, DIFF_CONFIG_KIND,
};
pub use settings::DifferSettings;
pub use validation::ConfigValidator;

pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_CONFIG_PATH: &str = "envdiff.yaml";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub mod settings;
pub mod validation;

pub use settings::{get_settings, ConfigError, LogFormat, Settings, StorageType, VectorDbType};

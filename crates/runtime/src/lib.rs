mod config;
pub mod logging;
pub mod settings;

pub use config::{
    DEFAULT_MAX_BATCH_AGE_MS, DEFAULT_MAX_BATCH_SIZE, PROGRAM_NAME, config_dir,
    default_settings_path,
};

pub use logging::init;
pub use settings::{SettingsError, StageSettings};

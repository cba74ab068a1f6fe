//! User configuration for routekeeper.
//!
//! Settings are read from `~/.routekeeper/config.ini`, one INI section per
//! component. A missing file yields defaults; a present but invalid value
//! is an error naming the section and key.
//!
//! # Example
//!
//! ```no_run
//! use routekeeper::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! let offline = config.offline_config();
//! let viewport = config.viewport_config();
//! # Ok::<(), routekeeper::config::ConfigFileError>(())
//! ```

mod convert;
mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{
    default_log_dir, CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_LOG_FILE, DEFAULT_LOG_LEVEL,
};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, DeliverySettings, LocationSettings, LoggingSettings, OfflineSettings,
    RecoverySettings, ViewportSettings,
};

mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    DispatcherSettings, ForwardSettings, LoggingSettings, PersistenceSettings, ServerSettings,
    Settings, WorkerSettings,
};

/// Prefix of environment overrides, e.g. `MSGRELAY_DISPATCHER__CAPACITY=10`.
pub const ENV_PREFIX: &str = "MSGRELAY";

/// Loads the configuration from the default file and environment variables.
///
/// `config/default.toml` is optional. Values missing from every source are
/// taken from `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Like [`load_config`], but reads `path` (which must exist) instead of the
/// default file when one is given.
pub fn load_config_from(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // Try to deserialize what is available, then merge with defaults
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge(Settings::default());

    settings.validate().map_err(ConfigError::Message)?;
    Ok(settings)
}

use crate::{error::*, settings::ServiceConfig, validation};
use figment::{
    providers::{Env, Format, Serialized, Toml, Yaml},
    Figment,
};
use std::path::Path;
use tracing::{debug, info};

/// Prefix for environment overrides; `__` separates nesting levels,
/// e.g. `FREEFLOW_STORAGE__BACKEND=postgres`
pub const ENV_PREFIX: &str = "FREEFLOW_";

/// Layered sources: built-in defaults, then the optional file, then env
pub fn layered_sources(path: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::SourceNotFound(path.display().to_string()));
        }
        figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => figment.merge(Toml::file(path)),
            _ => figment.merge(Yaml::file(path)),
        };
        debug!("Configuration file: {}", path.display());
    }

    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

/// Load and validate the service configuration
pub fn load(path: Option<&Path>) -> Result<ServiceConfig> {
    let config: ServiceConfig = layered_sources(path)?.extract()?;
    validation::validate(&config)?;

    info!(
        backend = ?config.storage.backend,
        bind = %config.server.bind_address(),
        "Configuration loaded"
    );
    Ok(config)
}

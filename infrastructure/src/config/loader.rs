//! Configuration file loader with multi-source merging

use super::GatewayConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::PathBuf;

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `ATRIUM_*` environment variables
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./atrium.toml` or `./.atrium.toml`
    /// 4. XDG config: `$XDG_CONFIG_HOME/atrium/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&PathBuf>) -> Result<GatewayConfig, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(GatewayConfig::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(&global_path));
            }
        }

        for filename in &["atrium.toml", ".atrium.toml"] {
            let path = PathBuf::from(filename);
            if path.exists() {
                figment = figment.merge(Toml::file(&path));
                break;
            }
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("ATRIUM_"));

        figment.extract().map_err(Box::new)
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> GatewayConfig {
        GatewayConfig::default()
    }

    /// Get the global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("atrium").join("config.toml"))
    }
}

//! Manages depot configuration by loading settings from standard locations.
//!
//! This crate provides a unified configuration object (`Config`) that aggregates
//! settings from the compiled-in defaults, the user's configuration file and
//! `DEPOT_`-prefixed environment variables. The binary loads it once through the
//! lazily initialized static reference (`CONFIG`); library code never reads the
//! static and receives the values it needs explicitly.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use etcetera::BaseStrategy;
use figment::providers::{Env, Format, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

/// The default configuration values
const DEFAULT_TOML_CONFIG: &str = include_str!("./depot.default.toml");

/// Name of the user configuration file inside the platform config directory.
const CONFIG_FILE: &str = "depot/depot.toml";

//================================================================================================
// Statics
//================================================================================================

/// Provides a lazily instantiated static reference to the application `Config`.
pub static CONFIG: LazyLock<Config> = LazyLock::new(load_config);

//================================================================================================
// Types
//================================================================================================

/// Represents the application's primary configuration structure.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root directory of the local artifact repository.
    #[serde(default = "default_local_repository")]
    pub local_repository: PathBuf,
    /// A previously merged repository configuration to resolve against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_configuration: Option<PathBuf>,
    /// Part enrichment settings.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Dependency resolution settings.
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Settings for the enrichment worker pool and its locks.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentConfig {
    /// Number of concurrent enrichment workers.
    pub workers: usize,
    /// Age in seconds after which a left-over solution lock file is broken.
    pub stale_lock_secs: u64,
    /// How long a setup waits for view artifacts locked by someone else.
    pub contention_wait_secs: u64,
}

/// Settings steering transitive resolution.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ResolutionConfig {
    /// Continue past unresolved dependencies.
    pub lenient: bool,
    /// Which candidate wins a version clash.
    pub clash_strategy: ClashStrategyConfig,
}

/// Configured clash strategy.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClashStrategyConfig {
    #[default]
    HighestVersion,
    NearestPath,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for Config {
    fn default() -> Self {
        Self {
            local_repository: default_local_repository(),
            repository_configuration: None,
            enrichment: EnrichmentConfig::default(),
            resolution: ResolutionConfig::default(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            stale_lock_secs: 600,
            contention_wait_secs: 60,
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            lenient: true,
            clash_strategy: ClashStrategyConfig::default(),
        }
    }
}

impl Config {
    /// Constructs a `Figment` instance for configuration loading.
    ///
    /// Layers, in increasing priority: built-in defaults, the user configuration
    /// file and `DEPOT_` environment variables (`__` separates nested keys).
    pub fn figment() -> Figment {
        let user = etcetera::choose_base_strategy()
            .ok()
            .map(|c| c.config_dir().join(CONFIG_FILE));
        Self::figment_with(user.as_deref())
    }

    /// Same as [`Config::figment`] with an explicit user configuration file.
    pub fn figment_with(user_config: Option<&Path>) -> Figment {
        let mut fig = Figment::from(Config::default()).merge(Toml::string(DEFAULT_TOML_CONFIG));

        if let Some(path) = user_config {
            fig = fig.admerge(Toml::file(path));
        }

        fig.admerge(Env::prefixed("DEPOT_").split("__"))
    }

    /// Creates a `Config` instance from a given provider.
    pub fn from<T: Provider>(provider: T) -> Result<Config, Box<figment::Error>> {
        Figment::from(provider).extract().map_err(Box::new)
    }

    /// Worker count clamped to at least one.
    pub fn workers(&self) -> usize {
        self.enrichment.workers.max(1)
    }
}

impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("Depot Config")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Determines the default local repository below the platform cache directory.
fn default_local_repository() -> PathBuf {
    let base = if let Ok(c) = etcetera::choose_base_strategy() {
        c.cache_dir().join("depot")
    } else {
        std::env::temp_dir().join("depot")
    };
    base.join("repository")
}

/// Loads the application configuration using the default `Figment` provider.
fn load_config() -> Config {
    Config::figment().extract().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "problem loading config from default sources, falling back to defaults");
        Config::default()
    })
}

//================================================================================================
// Tests
//================================================================================================

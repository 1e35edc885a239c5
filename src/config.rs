//! Configuration management for the permit relayer
//!
//! Loads configuration from a TOML file with `${VAR}` environment variable
//! substitution, then layers `RELAYER__SECTION__KEY` overrides on top.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ApiConfig,
    pub relay: RelayConfig,
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
    pub wallet: WalletConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Upper bound on waiting for a submitted transaction to be mined
    pub inclusion_timeout_secs: u64,
    pub confirmations: usize,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Names of the environment variables holding the two relay keys
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub fee_payer_key_env: String,
    pub spender_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub permit_address: String,
    #[serde(default)]
    pub tx_type: TxEncoding,
    pub enabled: bool,
}

/// Transaction envelope a chain accepts
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxEncoding {
    Legacy,
    #[default]
    Eip1559,
}

impl Settings {
    /// Load settings from the configured file
    pub fn load() -> Result<Self> {
        let config_path = env::var("RELAYER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let port_override = env::var("PORT").ok();

        let settings: Settings = Config::builder()
            .add_source(File::from_str(&config_str, FileFormat::Toml))
            .add_source(
                Environment::with_prefix("RELAYER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.port", port_override)
            .context("Invalid PORT override")?
            .build()
            .context("Failed to parse configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in self.enabled_chains() {
            if chain.rpc_url.trim().is_empty() {
                anyhow::bail!("Chain {} has no RPC URL configured", name);
            }
            if chain.permit_address.trim().is_empty() {
                anyhow::bail!("Chain {} has no permit contract address configured", name);
            }
        }

        if self.database.enabled && self.database.url.is_empty() {
            anyhow::bail!("Database is enabled but no URL is configured");
        }

        if self.wallet.fee_payer_key_env == self.wallet.spender_key_env {
            anyhow::bail!("Fee payer and spender keys must come from different variables");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");
    }

    ENV_VAR
        .replace_all(input, |cap: &regex::Captures<'_>| {
            env::var(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}

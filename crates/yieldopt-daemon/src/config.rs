//! Configuration file management.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use yieldopt_types::{AccountId, Amount, UNITS_PER_TOKEN};
use yieldopt_vault::{BootstrapParams, CompoundPolicy};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Vault and token deployment settings.
    #[serde(default)]
    pub vault: VaultConfig,
    /// Staking venue settings.
    #[serde(default)]
    pub staking: StakingConfig,
    /// Compound keeper settings.
    #[serde(default)]
    pub keeper: KeeperConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Vault and token deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Deployer account: 64 hex characters or a label.
    #[serde(default = "default_deployer")]
    pub deployer: String,
    /// Label the vault's account id is derived from.
    #[serde(default = "default_vault_label")]
    pub vault_label: String,
    /// Base asset name.
    #[serde(default = "default_asset_name")]
    pub asset_name: String,
    /// Base asset symbol.
    #[serde(default = "default_asset_symbol")]
    pub asset_symbol: String,
    /// Share token name.
    #[serde(default = "default_share_name")]
    pub share_name: String,
    /// Share token symbol.
    #[serde(default = "default_share_symbol")]
    pub share_symbol: String,
    /// Whole tokens minted to the deployer at startup.
    #[serde(default = "default_initial_supply")]
    pub initial_supply_tokens: u64,
}

/// Staking venue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Label the venue's account id is derived from.
    #[serde(default = "default_staking_label")]
    pub staking_label: String,
    /// Reward emitted per second, in base units.
    #[serde(default = "default_reward_per_second")]
    pub reward_per_second: u64,
    /// Unix time emission stops. Absent = never.
    #[serde(default)]
    pub emission_ends_at: Option<u64>,
    /// Whole tokens of the deployer's supply moved into the reward reserve.
    #[serde(default = "default_reward_funding")]
    pub reward_funding_tokens: u64,
}

/// Compound keeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Keeper account: 64 hex characters or a label.
    #[serde(default = "default_keeper_account")]
    pub account: String,
    /// Seconds between automatic compounds. 0 = disabled.
    #[serde(default)]
    pub compound_interval_secs: u64,
    /// Only the keeper may call `compound`.
    #[serde(default)]
    pub restrict_compound: bool,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Event bus buffer per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Allow the `faucet` RPC method.
    #[serde(default = "default_true")]
    pub faucet_enabled: bool,
}

// Default value functions

fn default_deployer() -> String {
    "deployer".to_string()
}

fn default_vault_label() -> String {
    "vault".to_string()
}

fn default_asset_name() -> String {
    "DepositToken".to_string()
}

fn default_asset_symbol() -> String {
    "DT".to_string()
}

fn default_share_name() -> String {
    "ReceiptToken".to_string()
}

fn default_share_symbol() -> String {
    "RT".to_string()
}

fn default_initial_supply() -> u64 {
    10_000
}

fn default_staking_label() -> String {
    "stake".to_string()
}

fn default_reward_per_second() -> u64 {
    1_000_000_000_000_000
}

fn default_reward_funding() -> u64 {
    1_000
}

fn default_keeper_account() -> String {
    "keeper".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_buffer() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            deployer: default_deployer(),
            vault_label: default_vault_label(),
            asset_name: default_asset_name(),
            asset_symbol: default_asset_symbol(),
            share_name: default_share_name(),
            share_symbol: default_share_symbol(),
            initial_supply_tokens: default_initial_supply(),
        }
    }
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            staking_label: default_staking_label(),
            reward_per_second: default_reward_per_second(),
            emission_ends_at: None,
            reward_funding_tokens: default_reward_funding(),
        }
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            account: default_keeper_account(),
            compound_interval_secs: 0,
            restrict_compound: false,
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            log_level: default_log_level(),
            event_buffer: default_event_buffer(),
            faucet_enabled: true,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.advanced.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.advanced.data_dir)
        }
    }

    /// The deployer account.
    pub fn deployer(&self) -> AccountId {
        AccountId::resolve(&self.vault.deployer)
    }

    /// The keeper account.
    pub fn keeper(&self) -> AccountId {
        AccountId::resolve(&self.keeper.account)
    }

    /// Deployment parameters for [`yieldopt_vault::bootstrap`].
    pub fn bootstrap_params(&self) -> anyhow::Result<BootstrapParams> {
        let compound_policy = if self.keeper.restrict_compound {
            CompoundPolicy::Keeper(self.keeper())
        } else {
            CompoundPolicy::Permissionless
        };
        Ok(BootstrapParams {
            asset_name: self.vault.asset_name.clone(),
            asset_symbol: self.vault.asset_symbol.clone(),
            share_name: self.vault.share_name.clone(),
            share_symbol: self.vault.share_symbol.clone(),
            vault_label: self.vault.vault_label.clone(),
            staking_label: self.staking.staking_label.clone(),
            initial_mint: whole_tokens(self.vault.initial_supply_tokens)?,
            reward_funding: whole_tokens(self.staking.reward_funding_tokens)?,
            compound_policy,
        })
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("YIELDOPT_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/YieldOpt")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".yieldopt")
        }
    }
}

fn whole_tokens(tokens: u64) -> anyhow::Result<Amount> {
    Amount::from(tokens)
        .checked_mul(UNITS_PER_TOKEN)
        .ok_or_else(|| anyhow::anyhow!("{tokens} tokens overflow the base unit range"))
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/yieldopt"))
}

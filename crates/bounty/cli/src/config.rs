//! Configuration for bountyctl

use bounty_types::{AccountId, LedgerError, LedgerPolicy};
use serde::{Deserialize, Serialize};

/// Errors raised while assembling the effective configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid ledger policy: {0}")]
    Policy(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Invalid(String),
}

/// Main ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Lock, quorum and reward parameters
    #[serde(default)]
    pub policy: LedgerPolicy,

    /// Owner of the ledger and bootstrap attestor
    #[serde(default = "default_operator")]
    pub operator: String,

    /// Additional attestors enrolled at startup
    #[serde(default)]
    pub attestors: Vec<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            policy: LedgerPolicy::default(),
            operator: default_operator(),
            attestors: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_operator() -> String {
    "operator".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LedgerConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `BOUNTY_`-prefixed environment variables
    ///
    /// Nested keys use a double underscore, e.g.
    /// `BOUNTY_POLICY__WITHDRAWAL_QUORUM=3`.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&LedgerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BOUNTY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: LedgerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;
        if self.operator.trim().is_empty() {
            return Err(ConfigError::Invalid("operator must not be empty".into()));
        }
        Ok(())
    }

    pub fn operator_account(&self) -> AccountId {
        AccountId::new(self.operator.clone())
    }

    pub fn attestor_accounts(&self) -> Vec<AccountId> {
        self.attestors.iter().map(AccountId::new).collect()
    }
}

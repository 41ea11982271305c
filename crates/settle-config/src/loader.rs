//! Configuration loading from files and environment.

use crate::types::SettleConfig;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
	/// Load configuration from file, format chosen by extension.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SettleConfig> {
		let path = path.as_ref();
		info!("Loading configuration from {:?}", path);

		let contents = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {:?}", path))?;

		let config = match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Self::from_toml(&contents)?,
			Some("json") => Self::from_json(&contents)?,
			Some("yaml") | Some("yml") => Self::from_yaml(&contents)?,
			_ => anyhow::bail!("Unsupported config format: {:?}", path),
		};

		Self::validate_config(&config)?;
		Ok(config)
	}

	/// Load from TOML string
	pub fn from_toml(contents: &str) -> Result<SettleConfig> {
		toml::from_str(contents).map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))
	}

	/// Load from JSON string
	pub fn from_json(contents: &str) -> Result<SettleConfig> {
		serde_json::from_str(contents).context("Failed to parse JSON")
	}

	/// Load from YAML string
	pub fn from_yaml(contents: &str) -> Result<SettleConfig> {
		serde_yaml::from_str(contents).context("Failed to parse YAML")
	}

	/// Load from environment variables with optional file override
	pub fn from_env_and_file(file_path: Option<&Path>) -> Result<SettleConfig> {
		let mut config = if let Some(path) = file_path {
			Self::from_file(path)?
		} else {
			SettleConfig::default()
		};

		Self::apply_env_overrides(&mut config)?;

		Self::validate_config(&config)?;
		Ok(config)
	}

	/// Apply environment variable overrides
	fn apply_env_overrides(config: &mut SettleConfig) -> Result<()> {
		if let Ok(port) = std::env::var("SETTLE_HTTP_PORT") {
			debug!("Overriding HTTP port from environment");
			config.service.http_port = port
				.parse()
				.context("SETTLE_HTTP_PORT must be a port number")?;
		}

		if let Ok(level) = std::env::var("SETTLE_LOG_LEVEL") {
			debug!("Overriding log level from environment");
			config.service.log_level = level;
		}

		if let Ok(bps) = std::env::var("SETTLE_FEE_BPS") {
			debug!("Overriding fee bps from environment");
			config.fees.fee_bps = bps.parse().context("SETTLE_FEE_BPS must be an integer")?;
		}

		if let Ok(account) = std::env::var("SETTLE_ESCROW_ACCOUNT") {
			debug!("Overriding escrow account from environment");
			config.ledger.escrow_account = account;
		}

		Ok(())
	}

	/// Validate configuration
	fn validate_config(config: &SettleConfig) -> Result<()> {
		if config.fees.fee_bps > 1000 {
			anyhow::bail!(
				"fees.fee_bps {} exceeds the 1000 bps maximum",
				config.fees.fee_bps
			);
		}

		if config.ledger.escrow_account.trim().is_empty() {
			anyhow::bail!("ledger.escrow_account must not be empty");
		}

		if config.currency.local_ccy.trim().is_empty()
			|| config.currency.settlement_ccy.trim().is_empty()
		{
			anyhow::bail!("currency codes must not be empty");
		}

		for entry in &config.rates {
			if entry.rate <= Decimal::ZERO {
				anyhow::bail!(
					"rate for {}/{} must be positive",
					entry.local_ccy,
					entry.settlement_ccy
				);
			}
		}

		if config.reconciler.sweep_interval_secs == 0 {
			anyhow::bail!("reconciler.sweep_interval_secs must be greater than zero");
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const SAMPLE: &str = r#"
vendors = ["vendor-1"]

[service]
name = "settle"
http_port = 9090

[currency]
local_ccy = "KES"
settlement_ccy = "USDC"

[fees]
fee_bps = 25

[ledger]
escrow_account = "platform-escrow"

[[rates]]
local_ccy = "KES"
settlement_ccy = "USDC"
rate = "0.0077"
"#;

	#[test]
	fn loads_toml_from_file() {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		file.write_all(SAMPLE.as_bytes()).unwrap();

		let config = ConfigLoader::from_file(file.path()).unwrap();
		assert_eq!(config.service.http_port, 9090);
		assert_eq!(config.fees.fee_bps, 25);
		assert_eq!(config.rates.len(), 1);
		assert_eq!(config.vendors, vec!["vendor-1".to_string()]);
	}

	#[test]
	fn rejects_fee_bps_above_bound() {
		let mut config = SettleConfig::default();
		config.fees.fee_bps = 1001;
		assert!(ConfigLoader::validate_config(&config).is_err());

		config.fees.fee_bps = 1000;
		assert!(ConfigLoader::validate_config(&config).is_ok());
	}

	#[test]
	fn rejects_empty_escrow_account() {
		let mut config = SettleConfig::default();
		config.ledger.escrow_account = " ".to_string();
		assert!(ConfigLoader::validate_config(&config).is_err());
	}
}

//! Configuration types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
	pub service: ServiceConfig,
	pub currency: CurrencyConfig,
	pub fees: FeeConfig,
	pub ledger: LedgerConfig,
	/// Seed table for the fixed rate source.
	pub rates: Vec<RateEntry>,
	/// Vendors considered active at startup.
	pub vendors: Vec<String>,
	pub reconciler: ReconcilerSettings,
}

impl Default for SettleConfig {
	fn default() -> Self {
		Self {
			service: ServiceConfig::default(),
			currency: CurrencyConfig::default(),
			fees: FeeConfig::default(),
			ledger: LedgerConfig::default(),
			rates: Vec::new(),
			vendors: Vec::new(),
			reconciler: ReconcilerSettings::default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
	pub name: String,
	pub http_port: u16,
	pub log_level: String,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			name: "settle".to_string(),
			http_port: 8080,
			log_level: "info".to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
	pub local_ccy: String,
	pub settlement_ccy: String,
}

impl Default for CurrencyConfig {
	fn default() -> Self {
		Self {
			local_ccy: "KES".to_string(),
			settlement_ccy: "USDC".to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
	/// Platform fee in basis points, at most 1000.
	pub fee_bps: u32,
}

impl Default for FeeConfig {
	fn default() -> Self {
		Self { fee_bps: 25 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
	/// Account holding completed-order funds until payout or refund.
	pub escrow_account: String,
}

impl Default for LedgerConfig {
	fn default() -> Self {
		Self {
			escrow_account: "platform-escrow".to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateEntry {
	pub local_ccy: String,
	pub settlement_ccy: String,
	pub rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerSettings {
	pub initial_backoff_ms: u64,
	pub max_backoff_ms: u64,
	pub max_elapsed_ms: u64,
	pub max_lag_ms: u64,
	pub sweep_interval_secs: u64,
	pub sweep_sample_size: usize,
}

impl Default for ReconcilerSettings {
	fn default() -> Self {
		Self {
			initial_backoff_ms: 50,
			max_backoff_ms: 2_000,
			max_elapsed_ms: 30_000,
			max_lag_ms: 5_000,
			sweep_interval_secs: 30,
			sweep_sample_size: 100,
		}
	}
}

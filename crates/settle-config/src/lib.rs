//! Configuration for the settlement service.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{
	CurrencyConfig, FeeConfig, LedgerConfig, RateEntry, ReconcilerSettings, ServiceConfig,
	SettleConfig,
};

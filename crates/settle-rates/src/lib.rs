//! Conversion rate sourcing.
//!
//! The engine consumes rates through the [`RateSource`] trait; production
//! deployments plug a live feed in behind it. [`CachingRateSource`] wraps
//! any source with a last-known-rate fallback so that a feed outage
//! degrades order creation (stale-rate flag) instead of blocking it.

pub mod cache;
pub mod sources;

pub use cache::{CachingRateSource, ResolvedRate};
pub use sources::FixedRateSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A rate observation from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
	pub rate: Decimal,
	pub as_of: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RateError {
	#[error("rate source unavailable: {0}")]
	Unavailable(String),
	#[error("no rate published for {local_ccy}/{settlement_ccy}")]
	UnknownPair {
		local_ccy: String,
		settlement_ccy: String,
	},
}

/// Supplier of local-to-settlement currency conversion rates.
#[async_trait]
pub trait RateSource: Send + Sync {
	async fn get_rate(
		&self,
		local_ccy: &str,
		settlement_ccy: &str,
	) -> Result<RateQuote, RateError>;
}

//! Rate source implementations.

use crate::{RateError, RateQuote, RateSource};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};

/// Rate source backed by a fixed table, loaded from configuration.
///
/// Serves the configured rate with a fresh timestamp on every call. The
/// availability toggle lets tests and operational drills exercise the
/// stale-fallback path without swapping the source out.
pub struct FixedRateSource {
	rates: DashMap<(String, String), Decimal>,
	available: AtomicBool,
}

impl FixedRateSource {
	pub fn new() -> Self {
		Self {
			rates: DashMap::new(),
			available: AtomicBool::new(true),
		}
	}

	pub fn with_rate(
		self,
		local_ccy: impl Into<String>,
		settlement_ccy: impl Into<String>,
		rate: Decimal,
	) -> Self {
		self.set_rate(local_ccy, settlement_ccy, rate);
		self
	}

	pub fn set_rate(
		&self,
		local_ccy: impl Into<String>,
		settlement_ccy: impl Into<String>,
		rate: Decimal,
	) {
		self.rates
			.insert((local_ccy.into(), settlement_ccy.into()), rate);
	}

	/// Simulate or reflect feed availability.
	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::SeqCst);
	}
}

impl Default for FixedRateSource {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl RateSource for FixedRateSource {
	async fn get_rate(
		&self,
		local_ccy: &str,
		settlement_ccy: &str,
	) -> Result<RateQuote, RateError> {
		if !self.available.load(Ordering::SeqCst) {
			return Err(RateError::Unavailable("feed marked offline".to_string()));
		}

		let key = (local_ccy.to_string(), settlement_ccy.to_string());
		match self.rates.get(&key) {
			Some(rate) => Ok(RateQuote {
				rate: *rate,
				as_of: Utc::now(),
			}),
			None => Err(RateError::UnknownPair {
				local_ccy: local_ccy.to_string(),
				settlement_ccy: settlement_ccy.to_string(),
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	#[tokio::test]
	async fn serves_configured_rate() {
		let source = FixedRateSource::new().with_rate("KES", "USDC", dec!(0.0077));
		let quote = source.get_rate("KES", "USDC").await.unwrap();
		assert_eq!(quote.rate, dec!(0.0077));
	}

	#[tokio::test]
	async fn unknown_pair_and_offline_are_distinct_errors() {
		let source = FixedRateSource::new().with_rate("KES", "USDC", dec!(0.0077));

		let err = source.get_rate("NGN", "USDC").await.unwrap_err();
		assert!(matches!(err, RateError::UnknownPair { .. }));

		source.set_available(false);
		let err = source.get_rate("KES", "USDC").await.unwrap_err();
		assert!(matches!(err, RateError::Unavailable(_)));
	}
}

//! Last-known-rate cache with stale fallback.

use crate::{RateError, RateQuote, RateSource};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

/// A rate the engine can price an order with.
///
/// `is_stale` is true when the live source failed and the value came from
/// the cache; callers surface it so buyers can be warned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRate {
	pub rate: Decimal,
	pub as_of: DateTime<Utc>,
	pub is_stale: bool,
}

/// Wraps a [`RateSource`] and remembers the last good quote per pair.
///
/// A source failure degrades to the cached quote marked stale. Only when
/// the pair has never been quoted does resolution fail outright.
pub struct CachingRateSource {
	inner: Arc<dyn RateSource>,
	last_known: DashMap<(String, String), RateQuote>,
}

impl CachingRateSource {
	pub fn new(inner: Arc<dyn RateSource>) -> Self {
		Self {
			inner,
			last_known: DashMap::new(),
		}
	}

	pub async fn resolve(
		&self,
		local_ccy: &str,
		settlement_ccy: &str,
	) -> Result<ResolvedRate, RateError> {
		let key = (local_ccy.to_string(), settlement_ccy.to_string());

		match self.inner.get_rate(local_ccy, settlement_ccy).await {
			Ok(quote) => {
				self.last_known.insert(key, quote);
				debug!(
					"Live rate {}/{}: {} as of {}",
					local_ccy, settlement_ccy, quote.rate, quote.as_of
				);
				Ok(ResolvedRate {
					rate: quote.rate,
					as_of: quote.as_of,
					is_stale: false,
				})
			}
			Err(err) => match self.last_known.get(&key) {
				Some(cached) => {
					warn!(
						"Rate source failed for {}/{} ({}), falling back to rate from {}",
						local_ccy, settlement_ccy, err, cached.as_of
					);
					Ok(ResolvedRate {
						rate: cached.rate,
						as_of: cached.as_of,
						is_stale: true,
					})
				}
				None => Err(err),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sources::FixedRateSource;
	use rust_decimal_macros::dec;

	#[tokio::test]
	async fn falls_back_to_last_known_rate_when_source_down() {
		let source = Arc::new(FixedRateSource::new().with_rate("KES", "USDC", dec!(0.0077)));
		let cache = CachingRateSource::new(source.clone());

		let live = cache.resolve("KES", "USDC").await.unwrap();
		assert!(!live.is_stale);

		source.set_available(false);
		let stale = cache.resolve("KES", "USDC").await.unwrap();
		assert!(stale.is_stale);
		assert_eq!(stale.rate, dec!(0.0077));
		assert_eq!(stale.as_of, live.as_of);
	}

	#[tokio::test]
	async fn never_quoted_pair_fails_when_source_down() {
		let source = Arc::new(FixedRateSource::new());
		source.set_available(false);
		let cache = CachingRateSource::new(source);

		assert!(cache.resolve("KES", "USDC").await.is_err());
	}
}

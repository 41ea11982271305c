//! Fee and FX computation.
//!
//! All arithmetic here is pure and deterministic: no I/O, no clock. The
//! engine calls [`compute_quote`] exactly once per order, at creation time,
//! and the results are frozen onto the order. `fee_bps` validity is
//! enforced at the policy-update boundary ([`FeePolicy::set_fee_bps`]), not
//! at computation time.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use settle_types::{Operation, Result, SettleError};
use tokio::sync::RwLock;
use tracing::info;

/// Maximum platform fee, in basis points (10%).
pub const MAX_FEE_BPS: u32 = 1000;

/// Decimal places for all settlement-currency amounts.
pub const SETTLEMENT_SCALE: u32 = 6;

/// Result of the creation-time fee/FX computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
	pub amount_settlement: Decimal,
	pub platform_fee: Decimal,
	pub vendor_amount: Decimal,
}

fn round_settlement(value: Decimal) -> Decimal {
	value.round_dp_with_strategy(SETTLEMENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the settlement amount and fee split for an order.
///
/// `vendor_amount` is derived by subtraction, so
/// `platform_fee + vendor_amount == amount_settlement` holds exactly at
/// 6dp. Assumes `fee_bps` has already been validated against
/// [`MAX_FEE_BPS`].
pub fn compute_quote(amount_local: Decimal, fx_rate: Decimal, fee_bps: u32) -> Quote {
	let amount_settlement = round_settlement(amount_local * fx_rate);
	let platform_fee =
		round_settlement(amount_settlement * Decimal::from(fee_bps) / Decimal::from(10_000u32));
	let vendor_amount = amount_settlement - platform_fee;

	Quote {
		amount_settlement,
		platform_fee,
		vendor_amount,
	}
}

/// The live platform fee rate.
///
/// The only mutable piece of fee state. Updates are validated here so every
/// downstream computation can assume a legal rate.
pub struct FeePolicy {
	fee_bps: RwLock<u32>,
}

impl FeePolicy {
	/// Create a policy with an initial rate. Out-of-range initial values
	/// are rejected the same way updates are.
	pub fn new(fee_bps: u32) -> Result<Self> {
		Self::check_bps(fee_bps)?;
		Ok(Self {
			fee_bps: RwLock::new(fee_bps),
		})
	}

	fn check_bps(fee_bps: u32) -> Result<()> {
		if fee_bps > MAX_FEE_BPS {
			return Err(SettleError::Validation {
				operation: Operation::UpdatePolicy,
				reason: format!("fee_bps {} exceeds maximum {}", fee_bps, MAX_FEE_BPS),
			});
		}
		Ok(())
	}

	pub async fn fee_bps(&self) -> u32 {
		*self.fee_bps.read().await
	}

	/// Update the platform fee rate, clamping boundary: `[0, 1000]`.
	pub async fn set_fee_bps(&self, fee_bps: u32) -> Result<()> {
		Self::check_bps(fee_bps)?;
		let mut guard = self.fee_bps.write().await;
		info!("Updating platform fee from {} to {} bps", *guard, fee_bps);
		*guard = fee_bps;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	#[test]
	fn quote_matches_reference_values() {
		// 100 local at 0.0611 with a 25 bps fee.
		let quote = compute_quote(dec!(100), dec!(0.0611), 25);
		assert_eq!(quote.amount_settlement, dec!(6.110000));
		assert_eq!(quote.platform_fee, dec!(0.015275));
		assert_eq!(quote.vendor_amount, dec!(6.094725));
	}

	#[test]
	fn fee_plus_vendor_always_equals_settlement() {
		let cases = [
			(dec!(0.01), dec!(0.0611), 0u32),
			(dec!(12345.67), dec!(1.000001), 1000),
			(dec!(99999.99), dec!(0.000123), 333),
			(dec!(1), dec!(153.4), 25),
		];
		for (amount_local, fx_rate, fee_bps) in cases {
			let q = compute_quote(amount_local, fx_rate, fee_bps);
			assert_eq!(q.platform_fee + q.vendor_amount, q.amount_settlement);
			assert!(q.amount_settlement.scale() <= SETTLEMENT_SCALE);
		}
	}

	#[test]
	fn zero_fee_gives_everything_to_vendor() {
		let q = compute_quote(dec!(50), dec!(2), 0);
		assert_eq!(q.platform_fee, dec!(0));
		assert_eq!(q.vendor_amount, dec!(100.000000));
	}

	#[tokio::test]
	async fn policy_accepts_boundary_and_rejects_above() {
		let policy = FeePolicy::new(25).unwrap();

		policy.set_fee_bps(1000).await.unwrap();
		assert_eq!(policy.fee_bps().await, 1000);

		let err = policy.set_fee_bps(1001).await.unwrap_err();
		assert!(matches!(err, SettleError::Validation { .. }));
		// Rejected update leaves the rate untouched.
		assert_eq!(policy.fee_bps().await, 1000);
	}

	#[test]
	fn out_of_range_initial_rate_is_rejected() {
		assert!(FeePolicy::new(1001).is_err());
		assert!(FeePolicy::new(1000).is_ok());
	}
}

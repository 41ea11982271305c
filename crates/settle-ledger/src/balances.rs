//! Settlement-currency balance provider.
//!
//! Balances are the one shared mutable resource in the system; the ledger
//! only touches them inside Complete and Refund, under the per-order lock.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum TransferError {
	#[error("insufficient funds: need {needed}, have {available}")]
	InsufficientFunds { needed: Decimal, available: Decimal },
}

/// Access to settlement-currency account balances.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
	/// Current balance; unknown accounts read as zero.
	async fn balance(&self, account_ref: &str) -> Decimal;

	/// Move `amount` between accounts atomically. Either both balances
	/// change or neither does.
	async fn transfer(
		&self,
		from: &str,
		to: &str,
		amount: Decimal,
	) -> Result<(), TransferError>;
}

/// In-memory balance provider backing tests and the default wiring.
///
/// A single lock guards the whole table, which makes every transfer
/// check-and-move atomic.
pub struct InMemoryBalances {
	accounts: Mutex<HashMap<String, Decimal>>,
}

impl InMemoryBalances {
	pub fn new() -> Self {
		Self {
			accounts: Mutex::new(HashMap::new()),
		}
	}

	pub async fn deposit(&self, account_ref: &str, amount: Decimal) {
		let mut accounts = self.accounts.lock().await;
		*accounts.entry(account_ref.to_string()).or_default() += amount;
	}
}

impl Default for InMemoryBalances {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl BalanceProvider for InMemoryBalances {
	async fn balance(&self, account_ref: &str) -> Decimal {
		let accounts = self.accounts.lock().await;
		accounts.get(account_ref).copied().unwrap_or_default()
	}

	async fn transfer(
		&self,
		from: &str,
		to: &str,
		amount: Decimal,
	) -> Result<(), TransferError> {
		let mut accounts = self.accounts.lock().await;
		let available = accounts.get(from).copied().unwrap_or_default();
		if available < amount {
			return Err(TransferError::InsufficientFunds {
				needed: amount,
				available,
			});
		}
		*accounts.entry(from.to_string()).or_default() -= amount;
		*accounts.entry(to.to_string()).or_default() += amount;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	#[tokio::test]
	async fn transfer_moves_funds_or_nothing() {
		let balances = InMemoryBalances::new();
		balances.deposit("buyer-1", dec!(10)).await;

		balances.transfer("buyer-1", "escrow", dec!(4)).await.unwrap();
		assert_eq!(balances.balance("buyer-1").await, dec!(6));
		assert_eq!(balances.balance("escrow").await, dec!(4));

		let err = balances
			.transfer("buyer-1", "escrow", dec!(7))
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::InsufficientFunds { .. }));
		// Failed transfer leaves both sides untouched.
		assert_eq!(balances.balance("buyer-1").await, dec!(6));
		assert_eq!(balances.balance("escrow").await, dec!(4));
	}
}

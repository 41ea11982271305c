//! Reconciler: propagates ledger transitions into the mirror store.
//!
//! Replication is one-directional (ledger -> mirror) and idempotent,
//! keyed on `order_id` with the ledger's per-order version as the apply
//! watermark. A failed mirror write is retried with exponential backoff
//! against a fresh read of the ledger, never a replay of a stale snapshot.
//! A periodic sweep compares ledger records against mirror records and
//! re-applies any that drifted.

use backoff::ExponentialBackoff;
use chrono::Utc;
use dashmap::DashMap;
use settle_ledger::OrderLedger;
use settle_mirror::{MirrorRecord, MirrorStore};
use settle_types::{Order, OrderId, OrderStatus, Result, SettleError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reconciler tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
	/// First retry delay after a mirror write failure.
	pub initial_backoff: Duration,
	/// Ceiling for the backoff interval.
	pub max_backoff: Duration,
	/// Give up retrying a single apply after this long.
	pub max_elapsed: Duration,
	/// An apply taking longer than this is logged as reconciliation lag.
	pub max_lag: Duration,
	/// How often the consistency sweep runs.
	pub sweep_interval: Duration,
	/// How many ledger records one sweep inspects.
	pub sweep_sample_size: usize,
}

impl Default for ReconcilerConfig {
	fn default() -> Self {
		Self {
			initial_backoff: Duration::from_millis(50),
			max_backoff: Duration::from_secs(2),
			max_elapsed: Duration::from_secs(30),
			max_lag: Duration::from_secs(5),
			sweep_interval: Duration::from_secs(30),
			sweep_sample_size: 100,
		}
	}
}

pub struct Reconciler {
	ledger: Arc<OrderLedger>,
	mirror: Arc<MirrorStore>,
	config: ReconcilerConfig,
	/// Serializes apply_snapshot per order: the read-decide-write over the
	/// mirror record and accrual counters must not interleave between an
	/// inline apply and the sweep.
	apply_locks: DashMap<OrderId, Arc<Mutex<()>>>,
	sweep_cursor: AtomicUsize,
}

impl Reconciler {
	pub fn new(
		ledger: Arc<OrderLedger>,
		mirror: Arc<MirrorStore>,
		config: ReconcilerConfig,
	) -> Self {
		Self {
			ledger,
			mirror,
			config,
			apply_locks: DashMap::new(),
			sweep_cursor: AtomicUsize::new(0),
		}
	}

	/// Bring the mirror up to date with the ledger for one order.
	///
	/// Each attempt re-reads the authoritative state, so converging after
	/// retries always lands on the ledger's current status, never an
	/// intermediate one.
	pub async fn apply(&self, order_id: &OrderId) -> Result<()> {
		let started = Instant::now();

		let policy = ExponentialBackoff {
			initial_interval: self.config.initial_backoff,
			max_interval: self.config.max_backoff,
			max_elapsed_time: Some(self.config.max_elapsed),
			..Default::default()
		};

		backoff::future::retry(policy, || async {
			let snapshot = self
				.ledger
				.get(order_id)
				.await
				.map_err(backoff::Error::permanent)?;
			self.apply_snapshot(&snapshot)
				.map_err(backoff::Error::transient)
		})
		.await?;

		let elapsed = started.elapsed();
		if elapsed > self.config.max_lag {
			// Internal condition only; callers never see this.
			warn!(
				"Reconciliation lag for order {}: converged after {:?}",
				order_id, elapsed
			);
		}

		Ok(())
	}

	/// Apply one authoritative snapshot to the mirror. Idempotent: a
	/// snapshot at or below the mirror's watermark is a no-op.
	///
	/// Applies for the same order are mutually exclusive, same as the
	/// ledger's per-order row locks: without that, two appliers could both
	/// read `accrual_applied == false` and both add the accrual.
	pub fn apply_snapshot(&self, snapshot: &Order) -> Result<()> {
		let lock = self
			.apply_locks
			.entry(snapshot.order_id)
			.or_default()
			.clone();
		let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

		let existing = self.mirror.get(&snapshot.order_id);

		if let Some(record) = &existing {
			if record.applied_version >= snapshot.version {
				debug!(
					"Mirror already at version {} for order {}, skipping",
					record.applied_version, snapshot.order_id
				);
				return Ok(());
			}

			// Same rules the ledger enforces, checked a second time. The
			// mirror may lag several transitions, so reachability is what
			// matters, not adjacency.
			let from = record.order.status;
			if !Self::is_reachable(from, snapshot.status) {
				// Can only mean mirror corruption; the ledger wins.
				warn!(
					"Mirror status {} for order {} cannot reach ledger status {}, overwriting",
					from, snapshot.order_id, snapshot.status
				);
			}
		}

		let mut accrual_applied = existing.as_ref().map(|r| r.accrual_applied).unwrap_or(false);
		let mut accrual_reversed = existing
			.as_ref()
			.map(|r| r.accrual_reversed)
			.unwrap_or(false);

		// Decide accrual effects first, write the record (the fallible
		// step), then touch the counters, so a failed write retries
		// without having counted anything.
		let mut add = false;
		let mut reverse = false;
		match snapshot.status {
			OrderStatus::Completed if !accrual_applied => {
				accrual_applied = true;
				add = true;
			}
			OrderStatus::Refunded => {
				if accrual_applied && !accrual_reversed {
					accrual_reversed = true;
					reverse = true;
				} else if !accrual_applied {
					// Mirror never observed the completion; the two
					// movements cancel, so mark both without touching
					// the counters.
					accrual_applied = true;
					accrual_reversed = true;
				}
			}
			_ => {}
		}

		self.mirror
			.put(MirrorRecord {
				order: snapshot.clone(),
				applied_version: snapshot.version,
				accrual_applied,
				accrual_reversed,
				as_of: Utc::now(),
			})
			.map_err(|e| SettleError::Mirror {
				order_id: snapshot.order_id,
				reason: e.to_string(),
			})?;

		if add {
			self.mirror
				.add_accrual(&snapshot.vendor_ref, snapshot.vendor_amount);
		}
		if reverse {
			self.mirror
				.reverse_accrual(&snapshot.vendor_ref, snapshot.vendor_amount);
		}

		debug!(
			"Mirrored order {} at version {} ({})",
			snapshot.order_id, snapshot.version, snapshot.status
		);
		Ok(())
	}

	/// Compare a sample of ledger records against the mirror and re-apply
	/// any that drifted. Returns how many records were healed.
	///
	/// The sample window rotates from sweep to sweep, so a ledger larger
	/// than one window is still covered in full over successive sweeps.
	pub async fn sweep(&self) -> Result<usize> {
		let ids = self.ledger.order_ids();
		if ids.is_empty() {
			return Ok(0);
		}

		let window = self.config.sweep_sample_size.min(ids.len());
		let start = self.sweep_cursor.fetch_add(window, Ordering::Relaxed) % ids.len();
		let mut healed = 0;

		for offset in 0..window {
			let order_id = ids[(start + offset) % ids.len()];
			let snapshot = self.ledger.get(&order_id).await?;
			let drifted = match self.mirror.get(&order_id) {
				Some(record) => {
					record.applied_version < snapshot.version
						|| record.order.status != snapshot.status
				}
				None => true,
			};

			if drifted {
				warn!("Consistency sweep found drift for order {}", order_id);
				self.apply(&order_id).await?;
				healed += 1;
			}
		}

		if healed > 0 {
			info!("Consistency sweep healed {} mirror records", healed);
		}
		Ok(healed)
	}

	/// Spawn the periodic consistency sweep.
	pub fn start_sweep_task(self: Arc<Self>) -> JoinHandle<()> {
		info!(
			"Starting consistency sweep every {:?} (sample size {})",
			self.config.sweep_interval, self.config.sweep_sample_size
		);

		tokio::spawn(async move {
			let mut interval = tokio::time::interval(self.config.sweep_interval);
			loop {
				interval.tick().await;
				if let Err(e) = self.sweep().await {
					warn!("Consistency sweep error: {}", e);
				}
			}
		})
	}

	fn is_reachable(from: OrderStatus, to: OrderStatus) -> bool {
		if from == to {
			return true;
		}
		match (from, to) {
			// Pending reaches everything; Failed reaches everything via
			// re-open.
			(OrderStatus::Pending, _) | (OrderStatus::Failed, _) => true,
			(OrderStatus::Completed, OrderStatus::Refunded) => true,
			_ => false,
		}
	}
}

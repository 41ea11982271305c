//! Off-chain mirror of the order ledger.
//!
//! Derived, queryable state: one mirror record per order plus denormalized
//! vendor accruals, with secondary indexes for low-latency reads. The
//! mirror is never the source of truth; the reconciler writes it strictly
//! after the ledger accepts a transition, and it is rebuildable from the
//! ledger alone.

pub mod accrual;
pub mod store;

pub use accrual::VendorAccrual;
pub use store::{MirrorError, MirrorRecord, MirrorStore};

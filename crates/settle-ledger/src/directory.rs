//! Vendor directory interface.
//!
//! Vendor onboarding and standing are external concerns; the ledger only
//! asks one question at order creation.

use async_trait::async_trait;
use dashmap::DashMap;

/// Predicate over vendor standing.
#[async_trait]
pub trait VendorDirectory: Send + Sync {
	async fn is_vendor_active(&self, vendor_ref: &str) -> bool;
}

/// Allow-list directory driven by configuration.
pub struct StaticVendorDirectory {
	vendors: DashMap<String, bool>,
}

impl StaticVendorDirectory {
	pub fn new() -> Self {
		Self {
			vendors: DashMap::new(),
		}
	}

	pub fn with_active(self, vendor_ref: impl Into<String>) -> Self {
		self.set_active(vendor_ref, true);
		self
	}

	pub fn set_active(&self, vendor_ref: impl Into<String>, active: bool) {
		self.vendors.insert(vendor_ref.into(), active);
	}
}

impl Default for StaticVendorDirectory {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl VendorDirectory for StaticVendorDirectory {
	async fn is_vendor_active(&self, vendor_ref: &str) -> bool {
		self.vendors
			.get(vendor_ref)
			.map(|entry| *entry)
			.unwrap_or(false)
	}
}

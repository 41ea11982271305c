//! Actor identity used for transition authorization.
//!
//! Authentication is an external collaborator concern; by the time a
//! request reaches the engine it carries a resolved [`Actor`]. Each ledger
//! transition checks the actor before checking transition validity, so an
//! unauthorized caller learns nothing about order state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of the caller attempting an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Buyer,
	Vendor,
	Admin,
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Role::Buyer => "buyer",
			Role::Vendor => "vendor",
			Role::Admin => "admin",
		};
		f.write_str(s)
	}
}

/// A resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
	pub role: Role,
	/// Party reference; must match the order's `buyer_ref`/`vendor_ref`
	/// for buyer/vendor roles. Admins act by role alone.
	pub actor_ref: String,
}

impl Actor {
	pub fn buyer(actor_ref: impl Into<String>) -> Self {
		Self {
			role: Role::Buyer,
			actor_ref: actor_ref.into(),
		}
	}

	pub fn vendor(actor_ref: impl Into<String>) -> Self {
		Self {
			role: Role::Vendor,
			actor_ref: actor_ref.into(),
		}
	}

	pub fn admin(actor_ref: impl Into<String>) -> Self {
		Self {
			role: Role::Admin,
			actor_ref: actor_ref.into(),
		}
	}
}

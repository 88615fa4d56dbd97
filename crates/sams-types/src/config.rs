//! Per-session acquisition configuration.
//!
//! A [`SessionConfig`] is supplied once per `configure` call and stays
//! immutable for the lifetime of the session it creates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Payment channel used when the order is committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayMethod {
	#[default]
	Wechat,
	Alipay,
}

impl PayMethod {
	/// Maps the numeric code used by the web form (1 = wechat, 2 = alipay).
	///
	/// Unknown codes fall back to wechat, the platform default.
	pub fn from_code(code: i64) -> Self {
		match code {
			2 => Self::Alipay,
			_ => Self::Wechat,
		}
	}

	pub fn channel(&self) -> &'static str {
		match self {
			Self::Wechat => "wechat",
			Self::Alipay => "alipay",
		}
	}
}

/// Configuration for one acquisition session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
	/// Vendor auth credential. Must not be empty.
	pub auth_token: String,
	/// Cart floor to buy from (ambient, cold-chain, ...).
	pub floor_id: i64,
	/// Delivery type selector matched against the floor and stores.
	pub delivery_type: i64,
	#[serde(default)]
	pub longitude: String,
	#[serde(default)]
	pub latitude: String,
	#[serde(default)]
	pub device_id: String,
	#[serde(default)]
	pub track_info: String,
	/// Coupons applied on commit.
	#[serde(default)]
	pub promotion_ids: Vec<String>,
	/// Address to deliver to; the vendor default is used when absent.
	#[serde(default)]
	pub address_id: Option<String>,
	#[serde(default)]
	pub pay_method: PayMethod,
	/// Only proceed when the settlement reports a zero delivery fee.
	#[serde(default)]
	pub require_free_delivery: bool,
	/// Restrict the purchase to items already ticked in the cart.
	#[serde(default)]
	pub only_selected: bool,
	/// Optional JSON file of stores merged into the store map on every pass.
	#[serde(default)]
	pub store_preload: Option<PathBuf>,
	/// Push-notification id used to announce a successful order.
	#[serde(default)]
	pub push_id: Option<String>,
}

impl SessionConfig {
	pub fn new(auth_token: impl Into<String>, floor_id: i64, delivery_type: i64) -> Self {
		Self {
			auth_token: auth_token.into(),
			floor_id,
			delivery_type,
			..Default::default()
		}
	}

	/// Checks the fields that must be present before talking to the vendor.
	pub fn validate(&self) -> Result<(), String> {
		if self.auth_token.trim().is_empty() {
			return Err("auth token must not be empty".to_string());
		}
		Ok(())
	}

	/// Splits a comma-separated promotion list, skipping empty entries.
	pub fn parse_promotion_ids(raw: &str) -> Vec<String> {
		raw.split(',')
			.map(str::trim)
			.filter(|id| !id.is_empty())
			.map(str::to_string)
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validate_rejects_empty_token() {
		let config = SessionConfig::new("  ", 1, 2);
		assert!(config.validate().is_err());

		let config = SessionConfig::new("token", 1, 2);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_parse_promotion_ids() {
		assert_eq!(
			SessionConfig::parse_promotion_ids("coupon-001,,coupon-002, "),
			vec!["coupon-001".to_string(), "coupon-002".to_string()]
		);
		assert!(SessionConfig::parse_promotion_ids("").is_empty());
	}

	#[test]
	fn test_pay_method_codes() {
		assert_eq!(PayMethod::from_code(1), PayMethod::Wechat);
		assert_eq!(PayMethod::from_code(2), PayMethod::Alipay);
		assert_eq!(PayMethod::from_code(9), PayMethod::Wechat);
		assert_eq!(PayMethod::Alipay.channel(), "alipay");
	}
}

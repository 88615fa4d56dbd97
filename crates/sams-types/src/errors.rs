//! Error taxonomy reported by the vendor platform.

use thiserror::Error;

/// Failure kinds a vendor operation can report.
///
/// The taxonomy is flat: every remote call answers with one of these kinds
/// and the acquisition engine decides where to restart from the kind alone.
/// The message is the vendor's own text, kept for the log stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VendorError {
	#[error("rate limited: {0}")]
	RateLimited(String),

	#[error("order exceeds delivery weight cap: {0}")]
	WeightExceeded(String),

	#[error("out of stock: {0}")]
	OutOfStock(String),

	#[error("presale not started: {0}")]
	PresaleNotStarted(String),

	#[error("cart changed: {0}")]
	CartChanged(String),

	#[error("quantity exceeds purchase limit: {0}")]
	QuantityExceedsLimit(String),

	#[error("store closed: {0}")]
	StoreClosed(String),

	#[error("delivery info unavailable: {0}")]
	DeliveryInfoUnavailable(String),

	#[error("delivery slot closed: {0}")]
	SlotClosed(String),

	#[error("capacity decrement failed: {0}")]
	CapacityDecrementFailed(String),

	#[error("slot not deliverable: {0}")]
	SlotNotDeliverable(String),

	#[error("capacity unavailable: {0}")]
	CapacityUnavailable(String),

	#[error("no matching delivery mode: {0}")]
	NoMatchingDeliveryMode(String),

	#[error("{0}")]
	Other(String),
}

impl VendorError {
	/// Short, stable name of the kind, used in structured logs.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::RateLimited(_) => "rate_limited",
			Self::WeightExceeded(_) => "weight_exceeded",
			Self::OutOfStock(_) => "out_of_stock",
			Self::PresaleNotStarted(_) => "presale_not_started",
			Self::CartChanged(_) => "cart_changed",
			Self::QuantityExceedsLimit(_) => "quantity_exceeds_limit",
			Self::StoreClosed(_) => "store_closed",
			Self::DeliveryInfoUnavailable(_) => "delivery_info_unavailable",
			Self::SlotClosed(_) => "slot_closed",
			Self::CapacityDecrementFailed(_) => "capacity_decrement_failed",
			Self::SlotNotDeliverable(_) => "slot_not_deliverable",
			Self::CapacityUnavailable(_) => "capacity_unavailable",
			Self::NoMatchingDeliveryMode(_) => "no_matching_delivery_mode",
			Self::Other(_) => "other",
		}
	}

	pub fn is_rate_limited(&self) -> bool {
		matches!(self, Self::RateLimited(_))
	}
}

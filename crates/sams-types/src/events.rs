//! Messages published through the status hub.
//!
//! Two message classes travel through the hub: log entries and status
//! snapshots. Observers additionally receive a synthetic heartbeat when the
//! hub has been silent for a while. The JSON shape matches what the web UI
//! expects: log and status objects are sent untagged, the heartbeat is
//! `{"type":"ping"}`.

use serde::{Deserialize, Serialize};

use crate::{Address, DeliverySlot, Goods, Order, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Info,
	Success,
	Warning,
	Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
	/// Wall-clock time, `HH:MM:SS`.
	pub time: String,
	pub level: LogLevel,
	pub message: String,
}

impl LogEntry {
	pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
		Self {
			time: chrono::Local::now().format("%H:%M:%S").to_string(),
			level,
			message: message.into(),
		}
	}
}

/// Pipeline position reported in status snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
	Idle,
	Configured,
	Starting,
	SavingAddress,
	AddressSaved,
	CheckingStores,
	StoresLoaded,
	CheckingCart,
	CartLoaded,
	CheckingGoods,
	CheckingSettle,
	SettleChecked,
	CheckingCapacity,
	CapacityLoaded,
	SubmittingOrder,
	OrderSuccess,
	Stopped,
}

/// Lifecycle state of the run as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
	Running,
	Success,
	Error,
	Stopped,
}

/// Status snapshot carrying the session fields relevant to the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
	pub step: Step,
	pub status: RunStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<Address>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stores: Option<Vec<Store>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub goods_list: Option<Vec<Goods>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delivery_fee: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time_slots: Option<Vec<DeliverySlot>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub order: Option<Order>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl StatusUpdate {
	pub fn new(step: Step, status: RunStatus) -> Self {
		Self {
			step,
			status,
			address: None,
			stores: None,
			goods_list: None,
			delivery_fee: None,
			time_slots: None,
			order: None,
			error: None,
		}
	}

	pub fn running(step: Step) -> Self {
		Self::new(step, RunStatus::Running)
	}

	pub fn with_address(mut self, address: Address) -> Self {
		self.address = Some(address);
		self
	}

	pub fn with_stores(mut self, stores: Vec<Store>) -> Self {
		self.stores = Some(stores);
		self
	}

	pub fn with_goods(mut self, goods: Vec<Goods>) -> Self {
		self.goods_list = Some(goods);
		self
	}

	pub fn with_delivery_fee(mut self, fee: impl Into<String>) -> Self {
		self.delivery_fee = Some(fee.into());
		self
	}

	pub fn with_time_slots(mut self, slots: Vec<DeliverySlot>) -> Self {
		self.time_slots = Some(slots);
		self
	}

	pub fn with_order(mut self, order: Order) -> Self {
		self.order = Some(order);
		self
	}

	pub fn with_error(mut self, error: impl Into<String>) -> Self {
		self.error = Some(error.into());
		self
	}
}

/// Keep-alive frame sent to an observer after a quiet period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
	#[serde(rename = "type")]
	pub kind: &'static str,
}

impl Default for Heartbeat {
	fn default() -> Self {
		Self { kind: "ping" }
	}
}

/// Anything an observer can receive from the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HubMessage {
	Log(LogEntry),
	Status(StatusUpdate),
	Heartbeat(Heartbeat),
}

impl HubMessage {
	pub fn heartbeat() -> Self {
		Self::Heartbeat(Heartbeat::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_skips_empty_fields() {
		let status = StatusUpdate::running(Step::CheckingCart);
		let json = serde_json::to_value(HubMessage::Status(status)).unwrap();
		assert_eq!(
			json,
			serde_json::json!({"step": "checking_cart", "status": "running"})
		);
	}

	#[test]
	fn test_status_carries_fee_and_slots() {
		let status = StatusUpdate::running(Step::SettleChecked)
			.with_delivery_fee("5")
			.with_time_slots(vec![DeliverySlot::default()]);
		let json = serde_json::to_value(&status).unwrap();
		assert_eq!(json["deliveryFee"], "5");
		assert_eq!(json["timeSlots"].as_array().map(Vec::len), Some(1));
	}

	#[test]
	fn test_heartbeat_and_log_shapes() {
		let json = serde_json::to_value(HubMessage::heartbeat()).unwrap();
		assert_eq!(json, serde_json::json!({"type": "ping"}));

		let entry = LogEntry::new(LogLevel::Warning, "cart empty");
		assert_eq!(entry.time.len(), 8);
		let json = serde_json::to_value(HubMessage::Log(entry)).unwrap();
		assert_eq!(json["level"], "warning");
		assert_eq!(json["message"], "cart empty");
	}
}

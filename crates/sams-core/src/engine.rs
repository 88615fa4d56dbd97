// sams-core/src/engine.rs

//! The acquisition engine.
//!
//! A driver loop runs one stage at a time, reduces its result to a
//! [`StageOutcome`] and follows [`transitions::next`]. The session lock is
//! only held for short reads and writes, never across a vendor call.

use crate::hub::Hub;
use crate::policy::{self, Reduction};
use crate::run::{RunControl, RunTicket};
use crate::transitions::{self, Stage, StageOutcome, SubmitAction};
use sams_config::EngineConfig;
use sams_types::{Order, RunStatus, Session, SlotKey, StatusUpdate, Step, Store, VendorError};
use sams_vendor::{CommitPayRequest, SettleRequest, VendorService};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Timing of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
	/// Pause before a stage retry that asks for one.
	pub backoff: Duration,
	/// Pause between push-notification attempts.
	pub push_backoff: Duration,
}

impl Default for EngineSettings {
	fn default() -> Self {
		Self::from(&EngineConfig::default())
	}
}

impl From<&EngineConfig> for EngineSettings {
	fn from(config: &EngineConfig) -> Self {
		Self {
			backoff: config.backoff(),
			push_backoff: config.push_backoff(),
		}
	}
}

/// What to do after a rejected submission.
enum Verdict {
	Retry,
	NextSlot,
	Leave(StageOutcome),
}

/// One acquisition run over a configured session.
pub struct Engine {
	session: Arc<RwLock<Session>>,
	vendor: VendorService,
	hub: Hub,
	run: RunControl,
	ticket: RunTicket,
	settings: EngineSettings,
}

impl Engine {
	pub fn new(
		session: Arc<RwLock<Session>>,
		vendor: VendorService,
		hub: Hub,
		run: RunControl,
		ticket: RunTicket,
		settings: EngineSettings,
	) -> Self {
		Self {
			session,
			vendor,
			hub,
			run,
			ticket,
			settings,
		}
	}

	/// Drives the pipeline until an order is placed or the run is stopped.
	///
	/// Returns the terminal stage.
	#[instrument(skip_all, fields(generation = self.ticket.generation()))]
	pub async fn run(self) -> Stage {
		let mut stage = Stage::SavingAddress;

		while !stage.is_terminal() {
			// Stop is honoured before every stage
			let outcome = if self.is_current().await {
				self.execute(stage).await
			} else {
				StageOutcome::Stopped
			};

			if let StageOutcome::Failed(e) = &outcome {
				self.hub
					.publish_status(StatusUpdate::running(stage.step()).with_error(e.to_string()));
			}

			let transition = transitions::next(stage, &outcome);
			debug!(from = %stage, to = %transition.to, backoff = transition.backoff, "transition");

			if transition.backoff && !transition.to.is_terminal() {
				tokio::time::sleep(self.settings.backoff).await;
			} else {
				// Immediate retries still give the scheduler a turn.
				tokio::task::yield_now().await;
			}
			stage = transition.to;
		}

		// Release the run flag unless a newer run owns it
		self.run.finish(&self.ticket).await;
		info!(terminal = %stage, "acquisition run ended");
		stage
	}

	async fn is_current(&self) -> bool {
		self.run.is_current(&self.ticket).await
	}

	async fn execute(&self, stage: Stage) -> StageOutcome {
		self.hub.publish_status(StatusUpdate::running(stage.step()));

		match stage {
			Stage::SavingAddress => self.save_address().await,
			Stage::CheckingStores => self.check_stores().await,
			Stage::CheckingCart => self.check_cart().await,
			Stage::CheckingGoods => self.check_goods().await,
			Stage::CheckingSettle => self.check_settle().await,
			Stage::CheckingCapacity => self.check_capacity().await,
			Stage::SubmittingOrder => self.submit_order().await,
			Stage::Success | Stage::Stopped => StageOutcome::Stopped,
		}
	}

	async fn save_address(&self) -> StageOutcome {
		let address = self.session.read().await.address.clone();

		if let Err(e) = self.vendor.save_delivery_address(&address).await {
			self.hub
				.error(format!("Saving delivery address failed ({}): {}, retrying", e.kind(), e));
			return StageOutcome::Failed(e);
		}

		self.hub.success(format!("Delivery address set to {}", address));
		self.hub
			.publish_status(StatusUpdate::running(Step::AddressSaved).with_address(address));
		self.merge_preloaded_stores().await;
		StageOutcome::Done
	}

	async fn merge_preloaded_stores(&self) {
		let path = match self.session.read().await.config.store_preload.clone() {
			Some(path) => path,
			None => return,
		};

		let stores = match load_store_preload(&path).await {
			Ok(Some(stores)) => stores,
			Ok(None) => return,
			Err(message) => {
				self.hub.warning(message);
				return;
			}
		};

		let mut session = self.session.write().await;
		let merged = stores
			.into_iter()
			.filter(|store| session.merge_store(store.clone()))
			.count();
		drop(session);

		if merged > 0 {
			self.hub.info(format!("Merged {} preloaded stores", merged));
		}
	}

	async fn check_stores(&self) -> StageOutcome {
		let address = self.session.read().await.address.clone();

		let stores = match self.vendor.check_store(&address).await {
			Ok(stores) => stores,
			Err(e) => {
				self.hub
					.error(format!("Loading stores failed ({}): {}, retrying", e.kind(), e));
				return StageOutcome::Failed(e);
			}
		};

		// Only new stores or routing changes are announced
		let total = stores.len();
		let mut session = self.session.write().await;
		let changed: Vec<Store> = stores
			.into_iter()
			.filter(|store| session.upsert_store(store.clone()))
			.collect();
		drop(session);

		self.hub.info(format!(
			"Loaded {} stores, {} new or rerouted",
			total,
			changed.len()
		));
		let mut status = StatusUpdate::running(Step::StoresLoaded);
		if !changed.is_empty() {
			status = status.with_stores(changed);
		}
		self.hub.publish_status(status);
		StageOutcome::Done
	}

	async fn check_cart(&self) -> StageOutcome {
		let (stores, floor_id, delivery_type, only_selected) = {
			let session = self.session.read().await;
			(
				session.store_list(),
				session.config.floor_id,
				session.config.delivery_type,
				session.config.only_selected,
			)
		};

		let cart = match self.vendor.check_cart(&stores).await {
			Ok(cart) => cart,
			Err(e) => {
				self.hub
					.error(format!("Loading cart failed ({}): {}, retrying", e.kind(), e));
				return StageOutcome::Failed(e);
			}
		};

		let floor = match cart.find_floor(floor_id, delivery_type) {
			Some(floor) => floor.clone(),
			None => {
				self.clear_cart().await;
				self.hub.warning(format!(
					"No cart floor {} with delivery type {}, retrying",
					floor_id, delivery_type
				));
				return StageOutcome::CartEmpty;
			}
		};

		let goods = policy::select_goods(&floor, only_selected);
		if goods.is_empty() {
			self.clear_cart().await;
			self.hub.warning("Cart has no purchasable goods, retrying");
			return StageOutcome::CartEmpty;
		}

		self.hub.info(format!(
			"Cart loaded: {} goods, {} units",
			goods.len(),
			policy::total_units(&goods)
		));
		{
			let mut session = self.session.write().await;
			session.floor = Some(floor);
			session.goods = goods.clone();
		}
		self.hub
			.publish_status(StatusUpdate::running(Step::CartLoaded).with_goods(goods));
		StageOutcome::Done
	}

	/// Forgets the previous pass's floor and goods.
	async fn clear_cart(&self) {
		let mut session = self.session.write().await;
		session.floor = None;
		session.goods.clear();
	}

	async fn check_goods(&self) -> StageOutcome {
		let (floor, goods) = {
			let session = self.session.read().await;
			(session.floor.clone().unwrap_or_default(), session.goods.clone())
		};

		match self.vendor.check_goods(&floor, &goods).await {
			Ok(()) => {
				self.hub.info("Goods validated");
				StageOutcome::Done
			}
			Err(e) => {
				self.hub.error(format!(
					"Goods check failed ({}): {}, reloading cart",
					e.kind(),
					e
				));
				StageOutcome::Failed(e)
			}
		}
	}

	async fn check_settle(&self) -> StageOutcome {
		let request = {
			let session = self.session.read().await;
			SettleRequest {
				address: session.address.clone(),
				store: session.floor_store().cloned(),
				floor: session.floor.clone().unwrap_or_default(),
				goods: session.goods.clone(),
				delivery_type: session.config.delivery_type,
			}
		};

		let settle = match self.vendor.check_settle_info(&request).await {
			Ok(settle) => settle,
			Err(e) => {
				self.hub
					.error(format!("Settlement failed ({}): {}", e.kind(), e));
				return StageOutcome::Failed(e);
			}
		};

		let fee_ok = {
			// Settlement may move the floor store to another template or block
			let mut session = self.session.write().await;
			let routing = &settle.settle_delivery;
			if !routing.store_delivery_template_id.is_empty() {
				let mut store = session.floor_store().cloned().unwrap_or_else(|| Store {
					store_id: request.floor.store_id.clone(),
					delivery_type: request.delivery_type,
					..Default::default()
				});
				store.store_delivery_template_id = routing.store_delivery_template_id.clone();
				store.area_block_id = routing.area_block_id.clone();
				if session.upsert_store(store) {
					debug!(
						template = %routing.store_delivery_template_id,
						"settlement moved the floor store"
					);
				}
			}
			session.delivery_fee = Some(settle.delivery_fee.clone());
			policy::fee_satisfied(&session.config, &settle)
		};

		self.hub.publish_status(
			StatusUpdate::running(Step::SettleChecked).with_delivery_fee(settle.delivery_fee.clone()),
		);

		if !fee_ok {
			self.hub.warning(format!(
				"Delivery fee is {}, waiting for free delivery",
				settle.delivery_fee
			));
			return StageOutcome::FeeRejected;
		}

		self.hub
			.info(format!("Settlement ok, delivery fee {}", settle.delivery_fee));
		StageOutcome::Done
	}

	async fn check_capacity(&self) -> StageOutcome {
		let (template_id, delivery_type) = {
			let session = self.session.read().await;
			(
				session
					.floor_store()
					.map(|store| store.store_delivery_template_id.clone())
					.unwrap_or_default(),
				session.config.delivery_type,
			)
		};

		let capacity = match self.vendor.get_capacity(&template_id).await {
			Ok(capacity) => capacity,
			Err(e) => {
				self.hub
					.error(format!("Capacity check failed ({}): {}", e.kind(), e));
				return StageOutcome::Failed(e);
			}
		};

		// Replace the slot set wholesale, nothing survives a new poll
		let slots = policy::available_slots(&capacity, delivery_type);
		let available = slots.clone();
		let generation = {
			let mut session = self.session.write().await;
			session.slots.rebuild(slots);
			session.slots.generation()
		};
		debug!(generation, slots = available.len(), "capacity rebuilt");

		self.hub.publish_status(
			StatusUpdate::running(Step::CapacityLoaded).with_time_slots(available.clone()),
		);

		if available.is_empty() {
			self.hub.warning("No delivery slot available, polling again");
			return StageOutcome::NoSlots;
		}

		self.hub
			.success(format!("{} delivery slots available", available.len()));
		StageOutcome::Done
	}

	/// Tries every slot of the current generation in order.
	async fn submit_order(&self) -> StageOutcome {
		loop {
			let key = match self.session.read().await.slots.keys().into_iter().next() {
				Some(key) => key,
				None => {
					self.hub
						.warning("Every delivery slot was rejected, polling capacity again");
					return StageOutcome::SlotsExhausted;
				}
			};

			match self.submit_slot(&key).await {
				Some(outcome) => return outcome,
				None => continue,
			}
		}
	}

	/// Submits one slot until it succeeds, is dropped or the stage is left.
	///
	/// `None` means the slot is gone and the next one should be tried.
	async fn submit_slot(&self, key: &SlotKey) -> Option<StageOutcome> {
		loop {
			if !self.is_current().await {
				return Some(StageOutcome::Stopped);
			}

			// A dropped slot ends this attempt
			let request = {
				let session = self.session.read().await;
				let slot = session.slots.get(key)?.clone();
				CommitPayRequest {
					address: session.address.clone(),
					store: session.floor_store().cloned(),
					floor_id: session.config.floor_id,
					goods: session.goods.clone(),
					slot,
					pay_method: session.config.pay_method,
					promotion_ids: session.config.promotion_ids.clone(),
				}
			};

			self.hub.info(format!(
				"Submitting order for {}",
				request.slot.arrival_time_str
			));

			let error = match self.vendor.commit_pay(&request).await {
				Ok(order) => {
					self.complete(order, &request.slot.arrival_time_str).await;
					return Some(StageOutcome::OrderPlaced);
				}
				Err(e) => e,
			};

			match self.handle_rejection(key, &request, error).await {
				Verdict::Retry => tokio::task::yield_now().await,
				Verdict::NextSlot => return None,
				Verdict::Leave(outcome) => return Some(outcome),
			}
		}
	}

	async fn handle_rejection(
		&self,
		key: &SlotKey,
		request: &CommitPayRequest,
		error: VendorError,
	) -> Verdict {
		match transitions::route_submission(&error) {
			SubmitAction::RetrySlot => {
				self.hub
					.warning(format!("Submission rate limited ({}), retrying", error));
				Verdict::Retry
			}
			SubmitAction::ReduceWeight => {
				let mut session = self.session.write().await;
				let reduction = policy::reduce_heaviest(&mut session.goods);
				let remaining = session.goods.clone();
				drop(session);

				match reduction {
					Some(Reduction::Decremented {
						goods_name,
						quantity,
					}) => self.hub.warning(format!(
						"Order overweight, {} reduced to {}",
						goods_name, quantity
					)),
					Some(Reduction::Removed { goods_name }) => self
						.hub
						.warning(format!("Order overweight, {} removed", goods_name)),
					None => {}
				}

				if remaining.is_empty() {
					self.hub
						.error("Nothing left to order after weight reduction, reloading cart");
					return Verdict::Leave(StageOutcome::GoodsExhausted);
				}
				self.hub.publish_status(
					StatusUpdate::running(Step::SubmittingOrder).with_goods(remaining),
				);
				Verdict::Retry
			}
			SubmitAction::DropSlot => {
				let mut session = self.session.write().await;
				session.slots.remove(key);
				let left = session.slots.to_vec();
				drop(session);

				self.hub.warning(format!(
					"Slot {} rejected: {}",
					request.slot.arrival_time_str, error
				));
				self.hub.publish_status(
					StatusUpdate::running(Step::SubmittingOrder).with_time_slots(left),
				);
				Verdict::NextSlot
			}
			SubmitAction::Restart(target) => {
				self.hub.error(format!(
					"Submission failed ({}): {}, restarting at {}",
					error.kind(),
					error,
					target
				));
				Verdict::Leave(StageOutcome::Rerouted(target))
			}
		}
	}

	/// Records the order and announces it. The push retry ignores stop.
	async fn complete(&self, order: Order, slot_label: &str) {
		let push_id = {
			let mut session = self.session.write().await;
			session.order = Some(order.clone());
			session.config.push_id.clone()
		};

		self.hub.success(format!(
			"Order {} placed, amount {}",
			order.order_no, order.pay_amount
		));
		self.hub.publish_status(
			StatusUpdate::new(Step::OrderSuccess, RunStatus::Success).with_order(order.clone()),
		);

		if push_id.is_none() {
			return;
		}

		// Retry the push until it goes through

		let text = format!(
			"Delivery slot secured: order {} ({}) {}",
			order.order_no, order.pay_amount, slot_label
		);
		let mut attempts = 0u32;
		loop {
			attempts += 1;
			match self.vendor.push_notification(&text).await {
				Ok(()) => {
					self.hub.info("Push notification sent");
					return;
				}
				Err(e) => {
					warn!(attempts, "push notification failed: {}", e);
					self.hub
						.warning(format!("Push notification failed: {}, retrying", e));
					tokio::time::sleep(self.settings.push_backoff).await;
				}
			}
		}
	}
}

/// Reads the store preload file.
///
/// `Ok(None)` when the file does not exist; an error message when it cannot
/// be read or is not a JSON list of stores.
async fn load_store_preload(path: &Path) -> Result<Option<Vec<Store>>, String> {
	let content = match tokio::fs::read_to_string(path).await {
		Ok(content) => content,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
		Err(e) => {
			return Err(format!(
				"Store preload {} unreadable: {}",
				path.display(),
				e
			))
		}
	};

	serde_json::from_str(&content)
		.map(Some)
		.map_err(|e| format!("Store preload {} invalid: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[tokio::test]
	async fn test_preload_missing_file_is_skipped() {
		let result = load_store_preload(Path::new("/no/such/stores.json")).await;
		assert_eq!(result, Ok(None));
	}

	#[tokio::test]
	async fn test_preload_reads_store_list() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(
			br#"[{"storeId":"s9","storeName":"Preloaded","storeDeliveryTemplateId":"t9","areaBlockId":"b9","deliveryType":2}]"#,
		)
		.unwrap();

		let stores = load_store_preload(file.path()).await.unwrap().unwrap();
		assert_eq!(stores.len(), 1);
		assert_eq!(stores[0].store_delivery_template_id, "t9");
	}

	#[tokio::test]
	async fn test_preload_invalid_content_is_reported() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(b"{not json").unwrap();

		let err = load_store_preload(file.path()).await.unwrap_err();
		assert!(err.contains("invalid"));
	}
}

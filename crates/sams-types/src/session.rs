//! Session model for one acquisition attempt.
//!
//! The [`Session`] aggregate owns everything the engine learns while walking
//! the pipeline: the chosen address, the known stores, the matched cart floor,
//! the derived purchase list and the delivery slots of the current capacity
//! generation. Vendor payload types (cart, settlement, capacity, order) are
//! defined here as well so that vendor implementations and the engine agree
//! on one shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::SessionConfig;

/// Delivery address of the account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
	pub address_id: String,
	pub name: String,
	pub mobile: String,
	pub province_name: String,
	pub city_name: String,
	pub district_name: String,
	pub receiver_address: String,
	pub detail_address: String,
	pub latitude: String,
	pub longitude: String,
	pub is_default: bool,
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} {} {}",
			self.district_name, self.receiver_address, self.detail_address
		)
	}
}

/// A store able to deliver to the session address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Store {
	pub store_id: String,
	pub store_name: String,
	pub store_delivery_template_id: String,
	pub area_block_id: String,
	pub delivery_type: i64,
}

impl Store {
	/// True when the delivery template or area block moved.
	pub fn routing_differs(&self, other: &Store) -> bool {
		self.store_delivery_template_id != other.store_delivery_template_id
			|| self.area_block_id != other.area_block_id
	}
}

/// One item as it sits in the vendor cart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CartGoods {
	pub spu_id: String,
	pub store_id: String,
	pub goods_name: String,
	/// Unit price in the vendor's minor unit.
	pub price: i64,
	/// Requested quantity.
	pub quantity: u32,
	pub stock_quantity: u32,
	pub stock_status: bool,
	pub is_put_on_sale: bool,
	pub is_available: bool,
	/// Per-user purchase limit; zero means unlimited.
	pub limit_num: u32,
	/// How many units the user may still buy under the limit.
	pub residue_purchase_num: u32,
	pub is_selected: bool,
	/// Unit weight in kilograms.
	pub weight: f64,
}

impl CartGoods {
	pub fn is_eligible(&self) -> bool {
		self.stock_quantity > 0 && self.stock_status && self.is_put_on_sale && self.is_available
	}

	pub fn to_goods(&self, quantity: u32) -> Goods {
		Goods {
			spu_id: self.spu_id.clone(),
			store_id: self.store_id.clone(),
			goods_name: self.goods_name.clone(),
			price: self.price,
			quantity,
			weight: self.weight,
			is_selected: self.is_selected,
		}
	}
}

/// Cart floor: goods grouped by fulfilment category and delivery type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FloorInfo {
	pub floor_id: i64,
	pub delivery_type: i64,
	pub store_id: String,
	pub normal_goods_list: Vec<CartGoods>,
	pub shortage_stock_goods_list: Vec<CartGoods>,
	pub all_out_of_stock_goods_list: Vec<CartGoods>,
}

impl FloorInfo {
	pub fn matches(&self, floor_id: i64, delivery_type: i64) -> bool {
		self.floor_id == floor_id && self.delivery_type == delivery_type
	}

	/// Normal, low-stock and out-of-stock lists, in that order.
	pub fn all_goods(&self) -> impl Iterator<Item = &CartGoods> {
		self.normal_goods_list
			.iter()
			.chain(self.shortage_stock_goods_list.iter())
			.chain(self.all_out_of_stock_goods_list.iter())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cart {
	pub floor_info_list: Vec<FloorInfo>,
}

impl Cart {
	pub fn find_floor(&self, floor_id: i64, delivery_type: i64) -> Option<&FloorInfo> {
		self.floor_info_list
			.iter()
			.find(|floor| floor.matches(floor_id, delivery_type))
	}
}

/// An entry of the derived purchase list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Goods {
	pub spu_id: String,
	pub store_id: String,
	pub goods_name: String,
	pub price: i64,
	pub quantity: u32,
	pub weight: f64,
	pub is_selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettleDelivery {
	pub store_delivery_template_id: String,
	pub area_block_id: String,
}

/// Settlement (price and fee computation) result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettleInfo {
	/// Delivery fee as reported, e.g. `"0"` or `"5"`.
	pub delivery_fee: String,
	pub settle_delivery: SettleDelivery,
}

impl SettleInfo {
	pub fn is_free_delivery(&self) -> bool {
		self.delivery_fee == "0"
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapacityWindow {
	pub start_time: String,
	pub end_time: String,
	#[serde(rename = "timeISFull")]
	pub time_is_full: bool,
	pub disabled: bool,
	pub start_real_time: String,
	pub end_real_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapacityDay {
	pub str_date: String,
	pub list: Vec<CapacityWindow>,
}

/// Delivery capacity response for one template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capacity {
	#[serde(rename = "capcityResponseList")]
	pub days: Vec<CapacityDay>,
}

/// Natural key of a delivery slot: its machine start and end timestamps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
	pub start: String,
	pub end: String,
}

impl fmt::Display for SlotKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}-{}", self.start, self.end)
	}
}

/// One bookable delivery window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySlot {
	/// Human-readable label, `"<date> <start> - <end>"`.
	pub arrival_time_str: String,
	pub expect_arrival_time: String,
	pub expect_arrival_end_time: String,
	pub delivery_type: i64,
}

impl DeliverySlot {
	pub fn key(&self) -> SlotKey {
		SlotKey {
			start: self.expect_arrival_time.clone(),
			end: self.expect_arrival_end_time.clone(),
		}
	}
}

/// Slots of the current capacity generation.
///
/// Rebuilt wholesale on every capacity poll; individual slots are removed
/// when the vendor rejects them during submission. Keys are the slots' own
/// timestamps so nothing can be confused across generations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliverySlots {
	generation: u64,
	slots: Vec<DeliverySlot>,
}

impl DeliverySlots {
	/// Replaces the whole set and starts a new generation.
	///
	/// Duplicate keys keep their first occurrence.
	pub fn rebuild(&mut self, slots: Vec<DeliverySlot>) {
		self.generation += 1;
		self.slots.clear();
		for slot in slots {
			if self.get(&slot.key()).is_none() {
				self.slots.push(slot);
			}
		}
	}

	pub fn remove(&mut self, key: &SlotKey) -> Option<DeliverySlot> {
		let index = self.slots.iter().position(|slot| &slot.key() == key)?;
		Some(self.slots.remove(index))
	}

	pub fn get(&self, key: &SlotKey) -> Option<&DeliverySlot> {
		self.slots.iter().find(|slot| &slot.key() == key)
	}

	pub fn keys(&self) -> Vec<SlotKey> {
		self.slots.iter().map(DeliverySlot::key).collect()
	}

	pub fn to_vec(&self) -> Vec<DeliverySlot> {
		self.slots.clone()
	}

	pub fn len(&self) -> usize {
		self.slots.len()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PayInfo {
	pub pay_info: String,
	pub out_trade_no: String,
	pub total_amt: i64,
}

/// Terminal artifact of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Order {
	pub is_success: bool,
	pub order_no: String,
	pub pay_amount: String,
	pub channel: String,
	pub pay_info: PayInfo,
}

/// Aggregate root of one configure-to-terminal cycle.
#[derive(Debug, Clone)]
pub struct Session {
	pub id: Uuid,
	pub config: SessionConfig,
	pub address: Address,
	/// Known stores keyed by store id.
	pub stores: BTreeMap<String, Store>,
	/// Cart floor matched on the last cart check.
	pub floor: Option<FloorInfo>,
	pub goods: Vec<Goods>,
	pub slots: DeliverySlots,
	pub delivery_fee: Option<String>,
	pub order: Option<Order>,
}

impl Session {
	pub fn new(config: SessionConfig, address: Address) -> Self {
		Self {
			id: Uuid::new_v4(),
			config,
			address,
			stores: BTreeMap::new(),
			floor: None,
			goods: Vec::new(),
			slots: DeliverySlots::default(),
			delivery_fee: None,
			order: None,
		}
	}

	/// Inserts a new store or replaces one whose routing changed.
	///
	/// Returns true when the map was modified.
	pub fn upsert_store(&mut self, store: Store) -> bool {
		match self.stores.get(&store.store_id) {
			Some(known) if !known.routing_differs(&store) => false,
			_ => {
				self.stores.insert(store.store_id.clone(), store);
				true
			}
		}
	}

	/// Inserts a store only if its id is unknown.
	pub fn merge_store(&mut self, store: Store) -> bool {
		if self.stores.contains_key(&store.store_id) {
			return false;
		}
		self.stores.insert(store.store_id.clone(), store);
		true
	}

	/// Store serving the matched cart floor.
	pub fn floor_store(&self) -> Option<&Store> {
		let floor = self.floor.as_ref()?;
		self.stores.get(&floor.store_id)
	}

	pub fn store_list(&self) -> Vec<Store> {
		self.stores.values().cloned().collect()
	}
}

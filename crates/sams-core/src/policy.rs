//! Purchase policies applied by the engine.
//!
//! Everything here is pure: the engine feeds vendor payloads in and stores
//! the results in the session.

use sams_types::{Capacity, CartGoods, DeliverySlot, FloorInfo, Goods, SessionConfig, SettleInfo};

/// Clamps a requested quantity to what the vendor will accept.
///
/// The stock bound always applies. When a per-user limit is set (non-zero),
/// the quantity is clamped to the limit and then, separately, to the
/// remaining purchasable count, which can be stricter than the limit.
pub fn clamp_quantity(requested: u32, stock: u32, limit: u32, remaining: u32) -> u32 {
	let mut quantity = requested.min(stock);
	if limit > 0 {
		quantity = quantity.min(limit);
		quantity = quantity.min(remaining);
	}
	quantity
}

fn clamp_item(item: &CartGoods) -> u32 {
	clamp_quantity(
		item.quantity,
		item.stock_quantity,
		item.limit_num,
		item.residue_purchase_num,
	)
}

/// Builds the purchase list from a cart floor.
///
/// Lists are walked normal, low-stock, out-of-stock. Ineligible items and
/// items clamped to zero are skipped.
pub fn select_goods(floor: &FloorInfo, only_selected: bool) -> Vec<Goods> {
	floor
		.all_goods()
		.filter(|item| item.is_eligible())
		.filter_map(|item| match clamp_item(item) {
			0 => None,
			quantity => Some(item.to_goods(quantity)),
		})
		.filter(|goods| !only_selected || goods.is_selected)
		.collect()
}

/// Whether a settlement may proceed to the capacity check.
pub fn fee_satisfied(config: &SessionConfig, settle: &SettleInfo) -> bool {
	!config.require_free_delivery || settle.is_free_delivery()
}

/// What [`reduce_heaviest`] did to the purchase list.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction {
	Decremented { goods_name: String, quantity: u32 },
	Removed { goods_name: String },
}

/// Lowers the order weight by one unit of the heaviest reducible item.
///
/// The candidate starts at the last entry; a scan replaces it with any item
/// of quantity above one that weighs at least as much, so among equal
/// weights the later position wins. The candidate loses one unit, or is
/// removed when it only had one. Returns `None` on an empty list.
pub fn reduce_heaviest(goods: &mut Vec<Goods>) -> Option<Reduction> {
	let mut candidate = goods.len().checked_sub(1)?;
	for (index, item) in goods.iter().enumerate() {
		if item.quantity > 1 && item.weight >= goods[candidate].weight {
			candidate = index;
		}
	}

	if goods[candidate].quantity > 1 {
		let item = &mut goods[candidate];
		item.quantity -= 1;
		Some(Reduction::Decremented {
			goods_name: item.goods_name.clone(),
			quantity: item.quantity,
		})
	} else {
		let item = goods.remove(candidate);
		Some(Reduction::Removed {
			goods_name: item.goods_name,
		})
	}
}

/// Delivery slots of one capacity response: every window that is neither
/// full nor disabled, labelled `"<date> <start> - <end>"`.
pub fn available_slots(capacity: &Capacity, delivery_type: i64) -> Vec<DeliverySlot> {
	capacity
		.days
		.iter()
		.flat_map(|day| {
			day.list
				.iter()
				.filter(|window| !window.time_is_full && !window.disabled)
				.map(move |window| DeliverySlot {
					arrival_time_str: format!(
						"{} {} - {}",
						day.str_date, window.start_time, window.end_time
					),
					expect_arrival_time: window.start_real_time.clone(),
					expect_arrival_end_time: window.end_real_time.clone(),
					delivery_type,
				})
		})
		.collect()
}

pub fn total_units(goods: &[Goods]) -> u32 {
	goods.iter().map(|g| g.quantity).sum()
}

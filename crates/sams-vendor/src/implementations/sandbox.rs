//! In-process sandbox vendor.
//!
//! Serves a fixed platform snapshot (addresses, stores, cart, settlement,
//! capacity, order) and lets callers queue failures per operation. It backs
//! rehearsal runs of the service and the engine tests, and keeps a journal
//! of every call it received.

use crate::{CommitPayRequest, Operation, SessionSeed, SettleRequest, VendorInterface};
use async_trait::async_trait;
use sams_types::{
	Address, Capacity, CapacityDay, CapacityWindow, Cart, CartGoods, FloorInfo, Goods, Order,
	PayInfo, SessionConfig, SettleDelivery, SettleInfo, Store, VendorError,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Platform snapshot served by the sandbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxFixture {
	pub addresses: Vec<Address>,
	pub stores: Vec<Store>,
	pub cart: Cart,
	pub settle: SettleInfo,
	pub capacity: Capacity,
	pub order: Order,
}

impl SandboxFixture {
	pub fn from_file(path: &Path) -> Result<Self, VendorError> {
		let content = std::fs::read_to_string(path).map_err(|e| {
			VendorError::Other(format!("failed to read fixture {}: {}", path.display(), e))
		})?;
		serde_json::from_str(&content)
			.map_err(|e| VendorError::Other(format!("invalid fixture {}: {}", path.display(), e)))
	}

	/// A small but complete platform: one address, one store, a two-item
	/// cart on floor 1 / delivery type 2, a free settlement and two open
	/// windows.
	pub fn demo() -> Self {
		let store = Store {
			store_id: "store-001".to_string(),
			store_name: "Sandbox Waigaoqiao".to_string(),
			store_delivery_template_id: "template-001".to_string(),
			area_block_id: "block-001".to_string(),
			delivery_type: 2,
		};

		let goods = |spu: &str, name: &str, weight: f64| CartGoods {
			spu_id: spu.to_string(),
			store_id: store.store_id.clone(),
			goods_name: name.to_string(),
			price: 5900,
			quantity: 2,
			stock_quantity: 10,
			stock_status: true,
			is_put_on_sale: true,
			is_available: true,
			limit_num: 5,
			residue_purchase_num: 3,
			is_selected: true,
			weight,
		};

		let window = |start: &str, end: &str, start_real: &str, end_real: &str| CapacityWindow {
			start_time: start.to_string(),
			end_time: end.to_string(),
			time_is_full: false,
			disabled: false,
			start_real_time: start_real.to_string(),
			end_real_time: end_real.to_string(),
		};

		Self {
			addresses: vec![Address {
				address_id: "address-001".to_string(),
				name: "Sandbox User".to_string(),
				mobile: "13800138000".to_string(),
				province_name: "Shanghai".to_string(),
				city_name: "Shanghai".to_string(),
				district_name: "Pudong".to_string(),
				receiver_address: "Century Avenue".to_string(),
				detail_address: "100".to_string(),
				latitude: "31.2304".to_string(),
				longitude: "121.4737".to_string(),
				is_default: true,
			}],
			cart: Cart {
				floor_info_list: vec![FloorInfo {
					floor_id: 1,
					delivery_type: 2,
					store_id: store.store_id.clone(),
					normal_goods_list: vec![goods("spu-001", "Milk", 1.0)],
					shortage_stock_goods_list: vec![goods("spu-002", "Rice", 5.0)],
					all_out_of_stock_goods_list: Vec::new(),
				}],
			},
			settle: SettleInfo {
				delivery_fee: "0".to_string(),
				settle_delivery: SettleDelivery {
					store_delivery_template_id: store.store_delivery_template_id.clone(),
					area_block_id: store.area_block_id.clone(),
				},
			},
			capacity: Capacity {
				days: vec![CapacityDay {
					str_date: "2024-01-15".to_string(),
					list: vec![
						window("09:00", "11:00", "1705280400000", "1705287600000"),
						window("11:00", "13:00", "1705287600000", "1705294800000"),
					],
				}],
			},
			order: Order {
				is_success: true,
				order_no: "SANDBOX-0001".to_string(),
				pay_amount: "236.00".to_string(),
				channel: String::new(),
				pay_info: PayInfo::default(),
			},
			stores: vec![store],
		}
	}
}

/// Record of everything the sandbox was asked to do.
#[derive(Debug, Clone, Default)]
pub struct Journal {
	pub calls: Vec<Operation>,
	pub commits: Vec<CommitPayRequest>,
	pub pushes: Vec<String>,
	pub session: Option<SessionConfig>,
}

impl Journal {
	pub fn count(&self, operation: Operation) -> usize {
		self.calls.iter().filter(|op| **op == operation).count()
	}
}

#[derive(Default)]
struct SandboxState {
	fixture: Mutex<SandboxFixture>,
	failures: Mutex<HashMap<Operation, VecDeque<VendorError>>>,
	journal: Mutex<Journal>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scriptable in-process vendor. Clones share state.
#[derive(Clone, Default)]
pub struct SandboxVendor {
	state: Arc<SandboxState>,
}

impl SandboxVendor {
	pub fn new(fixture: SandboxFixture) -> Self {
		let vendor = Self::default();
		*lock(&vendor.state.fixture) = fixture;
		vendor
	}

	/// Queues one failure for the next call of `operation`.
	pub fn fail(&self, operation: Operation, error: VendorError) -> &Self {
		lock(&self.state.failures)
			.entry(operation)
			.or_default()
			.push_back(error);
		self
	}

	/// Queues the same failure `times` times.
	pub fn fail_times(&self, operation: Operation, error: VendorError, times: usize) -> &Self {
		for _ in 0..times {
			self.fail(operation, error.clone());
		}
		self
	}

	/// Mutates the served snapshot, e.g. to open capacity mid-run.
	pub fn update_fixture(&self, update: impl FnOnce(&mut SandboxFixture)) {
		update(&mut lock(&self.state.fixture));
	}

	pub fn journal(&self) -> Journal {
		lock(&self.state.journal).clone()
	}

	fn fixture(&self) -> SandboxFixture {
		lock(&self.state.fixture).clone()
	}

	fn begin(&self, operation: Operation) -> Result<(), VendorError> {
		lock(&self.state.journal).calls.push(operation);
		match lock(&self.state.failures)
			.get_mut(&operation)
			.and_then(VecDeque::pop_front)
		{
			Some(error) => Err(error),
			None => Ok(()),
		}
	}
}

#[async_trait]
impl VendorInterface for SandboxVendor {
	async fn init_session(&self, config: &SessionConfig) -> Result<SessionSeed, VendorError> {
		self.begin(Operation::InitSession)?;
		lock(&self.state.journal).session = Some(config.clone());

		let addresses = self.fixture().addresses;
		let address = match &config.address_id {
			Some(id) => addresses.iter().find(|a| &a.address_id == id),
			None => addresses
				.iter()
				.find(|a| a.is_default)
				.or_else(|| addresses.first()),
		}
		.cloned()
		.ok_or_else(|| VendorError::Other("no matching delivery address".to_string()))?;

		Ok(SessionSeed { address })
	}

	async fn get_address(&self) -> Result<Vec<Address>, VendorError> {
		self.begin(Operation::GetAddress)?;
		Ok(self.fixture().addresses)
	}

	async fn save_delivery_address(&self, _address: &Address) -> Result<(), VendorError> {
		self.begin(Operation::SaveDeliveryAddress)
	}

	async fn check_store(&self, _address: &Address) -> Result<Vec<Store>, VendorError> {
		self.begin(Operation::CheckStore)?;
		Ok(self.fixture().stores)
	}

	async fn check_cart(&self, _stores: &[Store]) -> Result<Cart, VendorError> {
		self.begin(Operation::CheckCart)?;
		Ok(self.fixture().cart)
	}

	async fn check_goods(&self, _floor: &FloorInfo, _goods: &[Goods]) -> Result<(), VendorError> {
		self.begin(Operation::CheckGoods)
	}

	async fn check_settle_info(&self, _request: &SettleRequest) -> Result<SettleInfo, VendorError> {
		self.begin(Operation::CheckSettleInfo)?;
		Ok(self.fixture().settle)
	}

	async fn get_capacity(&self, _template_id: &str) -> Result<Capacity, VendorError> {
		self.begin(Operation::GetCapacity)?;
		Ok(self.fixture().capacity)
	}

	async fn commit_pay(&self, request: &CommitPayRequest) -> Result<Order, VendorError> {
		lock(&self.state.journal).commits.push(request.clone());
		self.begin(Operation::CommitPay)?;

		let mut order = self.fixture().order;
		order.is_success = true;
		order.channel = request.pay_method.channel().to_string();
		info!(order_no = %order.order_no, slot = %request.slot.arrival_time_str, "sandbox order accepted");
		Ok(order)
	}

	async fn push_notification(&self, text: &str) -> Result<(), VendorError> {
		self.begin(Operation::PushNotification)?;
		lock(&self.state.journal).pushes.push(text.to_string());
		Ok(())
	}
}

/// Factory function to create the sandbox backend from configuration.
///
/// Configuration parameters:
/// - `fixture`: path to a JSON [`SandboxFixture`] (default: built-in demo data)
pub fn create_vendor(config: &toml::Value) -> Result<Box<dyn VendorInterface>, VendorError> {
	let fixture = match config.get("fixture").and_then(|v| v.as_str()) {
		Some(path) => SandboxFixture::from_file(Path::new(path))?,
		None => SandboxFixture::demo(),
	};

	Ok(Box::new(SandboxVendor::new(fixture)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use sams_types::{DeliverySlot, PayMethod};
	use std::io::Write;

	#[tokio::test]
	async fn test_init_session_selects_address() {
		let mut fixture = SandboxFixture::demo();
		let mut second = fixture.addresses[0].clone();
		second.address_id = "address-002".to_string();
		second.is_default = false;
		fixture.addresses.push(second);
		let vendor = SandboxVendor::new(fixture);

		let seed = vendor
			.init_session(&SessionConfig::new("token", 1, 2))
			.await
			.unwrap();
		assert_eq!(seed.address.address_id, "address-001");

		let mut config = SessionConfig::new("token", 1, 2);
		config.address_id = Some("address-002".to_string());
		let seed = vendor.init_session(&config).await.unwrap();
		assert_eq!(seed.address.address_id, "address-002");

		config.address_id = Some("missing".to_string());
		assert!(vendor.init_session(&config).await.is_err());
	}

	#[tokio::test]
	async fn test_scripted_failures_are_consumed_in_order() {
		let vendor = SandboxVendor::new(SandboxFixture::demo());
		vendor
			.fail(Operation::GetCapacity, VendorError::CapacityUnavailable("full".into()))
			.fail(Operation::GetCapacity, VendorError::Other("boom".into()));

		assert!(matches!(
			vendor.get_capacity("template-001").await,
			Err(VendorError::CapacityUnavailable(_))
		));
		assert!(matches!(
			vendor.get_capacity("template-001").await,
			Err(VendorError::Other(_))
		));
		assert!(vendor.get_capacity("template-001").await.is_ok());
		assert_eq!(vendor.journal().count(Operation::GetCapacity), 3);
	}

	#[tokio::test]
	async fn test_commit_pay_records_request_and_channel() {
		let vendor = SandboxVendor::new(SandboxFixture::demo());
		let request = CommitPayRequest {
			address: Address::default(),
			store: None,
			floor_id: 1,
			goods: Vec::new(),
			slot: DeliverySlot::default(),
			pay_method: PayMethod::Alipay,
			promotion_ids: Vec::new(),
		};

		let order = vendor.commit_pay(&request).await.unwrap();
		assert_eq!(order.channel, "alipay");
		assert_eq!(order.order_no, "SANDBOX-0001");
		assert_eq!(vendor.journal().commits.len(), 1);
	}

	#[test]
	fn test_create_vendor_from_fixture_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		let json = serde_json::to_string(&SandboxFixture::demo()).unwrap();
		file.write_all(json.as_bytes()).unwrap();

		let mut table = toml::map::Map::new();
		table.insert(
			"fixture".to_string(),
			toml::Value::String(file.path().to_string_lossy().to_string()),
		);
		assert!(create_vendor(&toml::Value::Table(table)).is_ok());

		let mut table = toml::map::Map::new();
		table.insert(
			"fixture".to_string(),
			toml::Value::String("/no/such/fixture.json".to_string()),
		);
		assert!(create_vendor(&toml::Value::Table(table)).is_err());
	}
}

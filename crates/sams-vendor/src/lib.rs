//! Vendor client abstraction for the sams acquisition service.
//!
//! The vendor platform is an external collaborator: every pipeline stage of
//! the acquisition engine performs exactly one remote operation through the
//! [`VendorInterface`] trait and gets back either a typed payload or a
//! [`VendorError`] kind. Network clients, wire decoding and authentication
//! live behind the trait; this crate only defines the contract, a traced
//! [`VendorService`] wrapper used by the engine, and an in-process sandbox
//! implementation.

use async_trait::async_trait;
use sams_types::{
	Address, Capacity, Cart, DeliverySlot, FloorInfo, Goods, Order, PayMethod, SessionConfig,
	SettleInfo, Store, VendorError,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Re-export implementations
pub mod implementations {
	pub mod sandbox;
}

/// What a successful session initialisation yields.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSeed {
	/// Address selected for delivery.
	pub address: Address,
}

/// Input of the settlement check.
#[derive(Debug, Clone)]
pub struct SettleRequest {
	pub address: Address,
	pub store: Option<Store>,
	pub floor: FloorInfo,
	pub goods: Vec<Goods>,
	pub delivery_type: i64,
}

/// Input of the final order submission for one slot.
#[derive(Debug, Clone)]
pub struct CommitPayRequest {
	pub address: Address,
	pub store: Option<Store>,
	pub floor_id: i64,
	pub goods: Vec<Goods>,
	pub slot: DeliverySlot,
	pub pay_method: PayMethod,
	pub promotion_ids: Vec<String>,
}

/// Operations of the vendor contract, used for logging and scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	InitSession,
	GetAddress,
	SaveDeliveryAddress,
	CheckStore,
	CheckCart,
	CheckGoods,
	CheckSettleInfo,
	GetCapacity,
	CommitPay,
	PushNotification,
}

impl Operation {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::InitSession => "init_session",
			Self::GetAddress => "get_address",
			Self::SaveDeliveryAddress => "save_delivery_address",
			Self::CheckStore => "check_store",
			Self::CheckCart => "check_cart",
			Self::CheckGoods => "check_goods",
			Self::CheckSettleInfo => "check_settle_info",
			Self::GetCapacity => "get_capacity",
			Self::CommitPay => "commit_pay",
			Self::PushNotification => "push_notification",
		}
	}
}

/// Trait defining the interface to the commerce platform.
///
/// One implementation instance serves one session: `init_session` is called
/// once with the session configuration and the implementation keeps whatever
/// credentials it needs for the later calls. Implementations must not retry
/// internally; retry policy belongs to the engine.
#[async_trait]
pub trait VendorInterface: Send + Sync {
	async fn init_session(&self, config: &SessionConfig) -> Result<SessionSeed, VendorError>;

	async fn get_address(&self) -> Result<Vec<Address>, VendorError>;

	async fn save_delivery_address(&self, address: &Address) -> Result<(), VendorError>;

	async fn check_store(&self, address: &Address) -> Result<Vec<Store>, VendorError>;

	async fn check_cart(&self, stores: &[Store]) -> Result<Cart, VendorError>;

	async fn check_goods(&self, floor: &FloorInfo, goods: &[Goods]) -> Result<(), VendorError>;

	async fn check_settle_info(&self, request: &SettleRequest) -> Result<SettleInfo, VendorError>;

	async fn get_capacity(&self, template_id: &str) -> Result<Capacity, VendorError>;

	async fn commit_pay(&self, request: &CommitPayRequest) -> Result<Order, VendorError>;

	async fn push_notification(&self, text: &str) -> Result<(), VendorError>;
}

/// Factory building a vendor backend from its configuration table.
pub type VendorFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn VendorInterface>, VendorError> + Send + Sync>;

/// Vendor service used by the engine.
///
/// Wraps a backend and traces every call with its duration and, on failure,
/// the error kind.
#[derive(Clone)]
pub struct VendorService {
	backend: Arc<dyn VendorInterface>,
}

impl VendorService {
	pub fn new(backend: Box<dyn VendorInterface>) -> Self {
		Self {
			backend: Arc::from(backend),
		}
	}

	fn trace<T>(operation: Operation, started: Instant, result: &Result<T, VendorError>) {
		let elapsed_ms = started.elapsed().as_millis() as u64;
		match result {
			Ok(_) => debug!(operation = operation.as_str(), elapsed_ms, "vendor call succeeded"),
			Err(e) => warn!(
				operation = operation.as_str(),
				kind = e.kind(),
				elapsed_ms,
				"vendor call failed: {}",
				e
			),
		}
	}

	pub async fn init_session(&self, config: &SessionConfig) -> Result<SessionSeed, VendorError> {
		let started = Instant::now();
		let result = self.backend.init_session(config).await;
		Self::trace(Operation::InitSession, started, &result);
		result
	}

	pub async fn get_address(&self) -> Result<Vec<Address>, VendorError> {
		let started = Instant::now();
		let result = self.backend.get_address().await;
		Self::trace(Operation::GetAddress, started, &result);
		result
	}

	pub async fn save_delivery_address(&self, address: &Address) -> Result<(), VendorError> {
		let started = Instant::now();
		let result = self.backend.save_delivery_address(address).await;
		Self::trace(Operation::SaveDeliveryAddress, started, &result);
		result
	}

	pub async fn check_store(&self, address: &Address) -> Result<Vec<Store>, VendorError> {
		let started = Instant::now();
		let result = self.backend.check_store(address).await;
		Self::trace(Operation::CheckStore, started, &result);
		result
	}

	pub async fn check_cart(&self, stores: &[Store]) -> Result<Cart, VendorError> {
		let started = Instant::now();
		let result = self.backend.check_cart(stores).await;
		Self::trace(Operation::CheckCart, started, &result);
		result
	}

	pub async fn check_goods(&self, floor: &FloorInfo, goods: &[Goods]) -> Result<(), VendorError> {
		let started = Instant::now();
		let result = self.backend.check_goods(floor, goods).await;
		Self::trace(Operation::CheckGoods, started, &result);
		result
	}

	pub async fn check_settle_info(
		&self,
		request: &SettleRequest,
	) -> Result<SettleInfo, VendorError> {
		let started = Instant::now();
		let result = self.backend.check_settle_info(request).await;
		Self::trace(Operation::CheckSettleInfo, started, &result);
		result
	}

	pub async fn get_capacity(&self, template_id: &str) -> Result<Capacity, VendorError> {
		let started = Instant::now();
		let result = self.backend.get_capacity(template_id).await;
		Self::trace(Operation::GetCapacity, started, &result);
		result
	}

	pub async fn commit_pay(&self, request: &CommitPayRequest) -> Result<Order, VendorError> {
		let started = Instant::now();
		let result = self.backend.commit_pay(request).await;
		Self::trace(Operation::CommitPay, started, &result);
		result
	}

	pub async fn push_notification(&self, text: &str) -> Result<(), VendorError> {
		let started = Instant::now();
		let result = self.backend.push_notification(text).await;
		Self::trace(Operation::PushNotification, started, &result);
		result
	}
}

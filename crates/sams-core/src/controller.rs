//! Control surface of the acquisition service.
//!
//! The [`Controller`] is the run context: it owns the configured session,
//! the run guard, the hub and the vendor factory, and launches the engine.

use crate::engine::{Engine, EngineSettings};
use crate::error::CoreError;
use crate::hub::{Hub, Subscription};
use crate::run::RunControl;
use crate::transitions::Stage;
use sams_config::ServiceConfig;
use sams_types::{
	Address, HubMessage, RunStatus, Session, SessionConfig, StatusUpdate, Step, VendorError,
};
use sams_vendor::{implementations, VendorFactory, VendorService};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A configured session together with the vendor client bound to it.
#[derive(Clone)]
struct ActiveSession {
	state: Arc<RwLock<Session>>,
	vendor: VendorService,
}

/// Picks the vendor factory for a configured backend name.
pub fn vendor_factory(backend: &str) -> Result<VendorFactory, CoreError> {
	match backend {
		"sandbox" => {
			let factory: VendorFactory = Box::new(implementations::sandbox::create_vendor);
			Ok(factory)
		}
		other => Err(CoreError::InvalidConfig(format!(
			"unknown vendor backend: {}",
			other
		))),
	}
}

pub struct Controller {
	hub: Hub,
	run: RunControl,
	session: RwLock<Option<ActiveSession>>,
	factory: VendorFactory,
	vendor_config: toml::Value,
	settings: EngineSettings,
	task: Mutex<Option<JoinHandle<Stage>>>,
}

impl Controller {
	pub fn new(
		factory: VendorFactory,
		vendor_config: toml::Value,
		hub: Hub,
		settings: EngineSettings,
	) -> Self {
		Self {
			hub,
			run: RunControl::new(),
			session: RwLock::new(None),
			factory,
			vendor_config,
			settings,
			task: Mutex::new(None),
		}
	}

	pub fn from_config(config: &ServiceConfig) -> Result<Self, CoreError> {
		let factory = vendor_factory(&config.vendor.backend)?;
		Ok(Self::new(
			factory,
			config.vendor.config.clone(),
			Hub::new(&config.hub),
			EngineSettings::from(&config.engine),
		))
	}

	pub fn hub(&self) -> &Hub {
		&self.hub
	}

	/// Establishes a new session, replacing any previous one.
	///
	/// A run still active on the previous session is stopped first. Returns
	/// the selected address and every address of the account.
	pub async fn configure(
		&self,
		config: SessionConfig,
	) -> Result<(Address, Vec<Address>), CoreError> {
		config.validate().map_err(CoreError::InvalidConfig)?;

		if self.run.stop().await {
			warn!("configuration replaced while running");
			self.hub
				.warning("New configuration received, stopping the current run");
		}

		// Bind a fresh vendor client and load the account's addresses
		let vendor = VendorService::new((self.factory)(&self.vendor_config)?);
		let seed = match vendor.init_session(&config).await {
			Ok(seed) => seed,
			Err(e) => return Err(self.configure_failed("Session initialisation failed", e)),
		};
		let addresses = match vendor.get_address().await {
			Ok(addresses) => addresses,
			Err(e) => return Err(self.configure_failed("Loading addresses failed", e)),
		};

		let address = seed.address;
		let session = Session::new(config, address.clone());
		info!(session_id = %session.id, "session configured");

		*self.session.write().await = Some(ActiveSession {
			state: Arc::new(RwLock::new(session)),
			vendor,
		});

		self.hub
			.success(format!("Configured, delivering to {}", address));
		self.hub.publish_status(
			StatusUpdate::new(Step::Configured, RunStatus::Stopped).with_address(address.clone()),
		);

		Ok((address, addresses))
	}

	fn configure_failed(&self, context: &str, error: VendorError) -> CoreError {
		self.hub.error(format!("{}: {}", context, error));
		self.hub.publish_status(
			StatusUpdate::new(Step::Idle, RunStatus::Error).with_error(error.to_string()),
		);
		CoreError::Vendor(error)
	}

	/// Launches the engine on the configured session.
	pub async fn start(&self) -> Result<(), CoreError> {
		let active = self
			.session
			.read()
			.await
			.clone()
			.ok_or(CoreError::NotConfigured)?;
		let ticket = self.run.begin().await?;

		self.hub.info("Starting acquisition");
		self.hub
			.publish_status(StatusUpdate::running(Step::Starting));

		let engine = Engine::new(
			active.state,
			active.vendor,
			self.hub.clone(),
			self.run.clone(),
			ticket,
			self.settings,
		);
		*self.task.lock().await = Some(tokio::spawn(engine.run()));
		Ok(())
	}

	/// Asks the running engine to stop at its next check point.
	pub async fn stop(&self) {
		self.run.stop().await;
		self.hub.warning("Acquisition stopped");
		self.hub
			.publish_status(StatusUpdate::new(Step::Stopped, RunStatus::Stopped));
	}

	pub async fn is_running(&self) -> bool {
		self.run.is_active().await
	}

	/// Snapshot of the current step and the configured session.
	pub async fn status(&self) -> StatusUpdate {
		let running = self.run.is_active().await;
		let latest = self.hub.latest_status();

		// Step and error come from the last published snapshot
		let step = latest.as_ref().map_or(Step::Idle, |status| status.step);
		let state = match (&latest, running) {
			(_, true) => RunStatus::Running,
			(Some(status), false) if status.status != RunStatus::Running => status.status,
			_ => RunStatus::Stopped,
		};
		let mut status = StatusUpdate::new(step, state);
		if let Some(error) = latest.and_then(|status| status.error) {
			status = status.with_error(error);
		}

		let active = match self.session.read().await.clone() {
			Some(active) => active,
			None => return status,
		};

		let session = active.state.read().await;
		status = status
			.with_address(session.address.clone())
			.with_stores(session.store_list())
			.with_goods(session.goods.clone())
			.with_time_slots(session.slots.to_vec());

		if let Some(fee) = &session.delivery_fee {
			status = status.with_delivery_fee(fee.clone());
		}
		if let Some(order) = &session.order {
			status = status.with_order(order.clone());
		}
		status
	}

	/// Opens an observer stream, primed with the current status when a
	/// session is configured.
	pub async fn subscribe(&self) -> Subscription {
		let subscription = self.hub.subscribe();
		if self.session.read().await.is_none() {
			return subscription;
		}
		subscription.with_initial(HubMessage::Status(self.status().await))
	}

	/// Waits for the last launched engine to end. `None` if none was launched
	/// or it panicked.
	pub async fn wait(&self) -> Option<Stage> {
		let handle = self.task.lock().await.take()?;
		handle.await.ok()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sams_config::HubConfig;
	use sams_vendor::implementations::sandbox::{SandboxFixture, SandboxVendor};
	use sams_vendor::{Operation, VendorInterface};

	fn controller() -> Controller {
		Controller::new(
			vendor_factory("sandbox").unwrap(),
			toml::Value::Table(toml::map::Map::new()),
			Hub::new(&HubConfig::default()),
			EngineSettings::default(),
		)
	}

	#[test]
	fn test_unknown_backend_is_rejected() {
		assert!(matches!(
			vendor_factory("nope"),
			Err(CoreError::InvalidConfig(_))
		));
	}

	#[tokio::test]
	async fn test_start_before_configure() {
		let controller = controller();
		assert_eq!(controller.start().await, Err(CoreError::NotConfigured));
		assert!(!controller.is_running().await);
	}

	#[tokio::test]
	async fn test_configure_rejects_empty_token() {
		let controller = controller();
		let err = controller
			.configure(SessionConfig::new("", 1, 2))
			.await
			.unwrap_err();
		assert!(matches!(err, CoreError::InvalidConfig(_)));
		assert_eq!(controller.start().await, Err(CoreError::NotConfigured));
	}

	#[tokio::test]
	async fn test_status_before_and_after_configure() {
		let controller = controller();
		let status = controller.status().await;
		assert_eq!(status.step, Step::Idle);
		assert_eq!(status.status, RunStatus::Stopped);
		assert!(status.address.is_none());

		let (address, addresses) = controller
			.configure(SessionConfig::new("token", 1, 2))
			.await
			.unwrap();
		assert_eq!(addresses.len(), 1);

		let status = controller.status().await;
		assert_eq!(status.step, Step::Configured);
		assert_eq!(status.address, Some(address));
		assert_eq!(status.status, RunStatus::Stopped);

		controller.stop().await;
		assert_eq!(controller.status().await.step, Step::Stopped);
	}

	#[tokio::test]
	async fn test_failed_configure_reports_error_status() {
		let vendor = SandboxVendor::new(SandboxFixture::demo());
		vendor.fail(
			Operation::InitSession,
			VendorError::Other("token expired".into()),
		);
		let backend = vendor.clone();
		let factory: VendorFactory = Box::new(move |_: &toml::Value| {
			Ok(Box::new(backend.clone()) as Box<dyn VendorInterface>)
		});
		let controller = Controller::new(
			factory,
			toml::Value::Table(toml::map::Map::new()),
			Hub::new(&HubConfig::default()),
			EngineSettings::default(),
		);

		let err = controller
			.configure(SessionConfig::new("token", 1, 2))
			.await
			.unwrap_err();
		assert!(matches!(err, CoreError::Vendor(VendorError::Other(_))));

		let status = controller.status().await;
		assert_eq!(status.step, Step::Idle);
		assert_eq!(status.status, RunStatus::Error);
		assert!(status.error.unwrap().contains("token expired"));
		assert!(status.address.is_none());
	}

	#[tokio::test]
	async fn test_subscribe_primes_current_status() {
		let controller = controller();
		controller
			.configure(SessionConfig::new("token", 1, 2))
			.await
			.unwrap();

		let mut subscription = controller.subscribe().await;
		match subscription.next().await {
			Some(HubMessage::Status(status)) => {
				assert_eq!(status.step, Step::Configured);
				assert!(status.address.is_some());
			}
			other => panic!("expected status, got {:?}", other),
		}
	}
}

//! Status hub fanning out logs and status snapshots.
//!
//! Live delivery goes through a tokio broadcast channel: publishing never
//! blocks, and each observer owns a bounded window in which a slow reader
//! loses its oldest messages. Alongside, the hub keeps two bounded history
//! queues (log entries, status snapshots) for consumers that poll instead of
//! subscribing; when a queue is full the newest entry is dropped. The most
//! recent status snapshot is always kept, whatever the history holds.

use sams_config::HubConfig;
use sams_types::{HubMessage, LogEntry, LogLevel, StatusUpdate};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

struct HubInner {
	sender: broadcast::Sender<HubMessage>,
	logs: Mutex<VecDeque<LogEntry>>,
	statuses: Mutex<VecDeque<StatusUpdate>>,
	latest: Mutex<Option<StatusUpdate>>,
	log_capacity: usize,
	status_capacity: usize,
	heartbeat: Duration,
}

/// Cheaply cloneable handle to the hub.
#[derive(Clone)]
pub struct Hub {
	inner: Arc<HubInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Appends unless full; returns false when the entry was dropped.
fn push_bounded<T>(queue: &Mutex<VecDeque<T>>, capacity: usize, item: T) -> bool {
	let mut queue = lock(queue);
	if queue.len() >= capacity {
		return false;
	}
	queue.push_back(item);
	true
}

impl Hub {
	pub fn new(config: &HubConfig) -> Self {
		let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
		Self {
			inner: Arc::new(HubInner {
				sender,
				logs: Mutex::new(VecDeque::with_capacity(config.log_history)),
				statuses: Mutex::new(VecDeque::with_capacity(config.status_history)),
				latest: Mutex::new(None),
				log_capacity: config.log_history,
				status_capacity: config.status_history,
				heartbeat: config.heartbeat(),
			}),
		}
	}

	/// Publishes a log entry and mirrors it to tracing.
	pub fn log(&self, level: LogLevel, message: impl Into<String>) {
		let entry = LogEntry::new(level, message);
		match level {
			LogLevel::Info | LogLevel::Success => info!(target: "sams::hub", "{}", entry.message),
			LogLevel::Warning => warn!(target: "sams::hub", "{}", entry.message),
			LogLevel::Error => error!(target: "sams::hub", "{}", entry.message),
		}

		if !push_bounded(&self.inner.logs, self.inner.log_capacity, entry.clone()) {
			debug!("log history full, entry dropped");
		}
		self.broadcast(HubMessage::Log(entry));
	}

	pub fn info(&self, message: impl Into<String>) {
		self.log(LogLevel::Info, message);
	}

	pub fn success(&self, message: impl Into<String>) {
		self.log(LogLevel::Success, message);
	}

	pub fn warning(&self, message: impl Into<String>) {
		self.log(LogLevel::Warning, message);
	}

	pub fn error(&self, message: impl Into<String>) {
		self.log(LogLevel::Error, message);
	}

	pub fn publish_status(&self, status: StatusUpdate) {
		*lock(&self.inner.latest) = Some(status.clone());
		if !push_bounded(
			&self.inner.statuses,
			self.inner.status_capacity,
			status.clone(),
		) {
			debug!("status history full, snapshot dropped");
		}
		self.broadcast(HubMessage::Status(status));
	}

	fn broadcast(&self, message: HubMessage) {
		// An error only means nobody is listening right now.
		let _ = self.inner.sender.send(message);
	}

	pub fn subscribe(&self) -> Subscription {
		Subscription {
			receiver: self.inner.sender.subscribe(),
			pending: None,
			heartbeat: self.inner.heartbeat,
		}
	}

	pub fn observer_count(&self) -> usize {
		self.inner.sender.receiver_count()
	}

	/// The last status published, independent of the history queue.
	pub fn latest_status(&self) -> Option<StatusUpdate> {
		lock(&self.inner.latest).clone()
	}

	/// Takes the buffered log history, oldest first.
	pub fn drain_logs(&self) -> Vec<LogEntry> {
		lock(&self.inner.logs).drain(..).collect()
	}

	/// Takes the buffered status history, oldest first.
	pub fn drain_statuses(&self) -> Vec<StatusUpdate> {
		lock(&self.inner.statuses).drain(..).collect()
	}
}

/// One observer's view of the hub.
pub struct Subscription {
	receiver: broadcast::Receiver<HubMessage>,
	pending: Option<HubMessage>,
	heartbeat: Duration,
}

impl Subscription {
	/// Queues a message delivered before anything published later.
	pub fn with_initial(mut self, message: HubMessage) -> Self {
		self.pending = Some(message);
		self
	}

	/// Waits for the next message.
	///
	/// Yields a heartbeat when nothing arrives within the heartbeat interval.
	/// Messages lost to lag are skipped. Returns `None` once the hub is gone.
	pub async fn next(&mut self) -> Option<HubMessage> {
		if let Some(message) = self.pending.take() {
			return Some(message);
		}

		loop {
			match tokio::time::timeout(self.heartbeat, self.receiver.recv()).await {
				Err(_) => return Some(HubMessage::heartbeat()),
				Ok(Ok(message)) => return Some(message),
				Ok(Err(RecvError::Lagged(skipped))) => {
					warn!(skipped, "observer lagging, oldest messages dropped");
				}
				Ok(Err(RecvError::Closed)) => return None,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sams_types::{RunStatus, Step};

	fn hub(channel_capacity: usize, log_history: usize, status_history: usize) -> Hub {
		Hub::new(&HubConfig {
			channel_capacity,
			log_history,
			status_history,
			heartbeat_secs: 30,
		})
	}

	#[test]
	fn test_publish_without_observers() {
		let hub = hub(4, 100, 10);
		for i in 0..50 {
			hub.info(format!("message {}", i));
			hub.publish_status(StatusUpdate::running(Step::CheckingCart));
		}
		assert_eq!(hub.observer_count(), 0);
		assert_eq!(hub.drain_logs().len(), 50);
		assert_eq!(hub.drain_statuses().len(), 10);
	}

	#[test]
	fn test_history_drops_newest_when_full() {
		let hub = hub(4, 3, 2);
		for i in 0..5 {
			hub.info(format!("message {}", i));
		}
		let messages: Vec<_> = hub.drain_logs().into_iter().map(|e| e.message).collect();
		assert_eq!(messages, vec!["message 0", "message 1", "message 2"]);

		hub.warning("after drain");
		assert_eq!(hub.drain_logs()[0].message, "after drain");

		hub.publish_status(StatusUpdate::running(Step::CheckingCart));
		hub.publish_status(StatusUpdate::running(Step::CheckingGoods));
		hub.publish_status(StatusUpdate::running(Step::CheckingSettle));
		let steps: Vec<_> = hub.drain_statuses().into_iter().map(|s| s.step).collect();
		assert_eq!(steps, vec![Step::CheckingCart, Step::CheckingGoods]);
	}

	#[test]
	fn test_latest_status_survives_full_history() {
		let hub = hub(4, 100, 1);
		assert_eq!(hub.latest_status(), None);

		hub.publish_status(StatusUpdate::running(Step::CheckingCart));
		hub.publish_status(StatusUpdate::running(Step::CheckingCapacity).with_error("busy"));

		let latest = hub.latest_status().unwrap();
		assert_eq!(latest.step, Step::CheckingCapacity);
		assert_eq!(latest.error.as_deref(), Some("busy"));
		assert_eq!(hub.drain_statuses().len(), 1);
		assert!(hub.latest_status().is_some());
	}

	#[tokio::test]
	async fn test_observers_receive_in_publish_order() {
		let hub = hub(16, 100, 10);
		let mut first = hub.subscribe();
		let mut second = hub.subscribe();

		hub.info("one");
		hub.publish_status(StatusUpdate::new(Step::Stopped, RunStatus::Stopped));

		for sub in [&mut first, &mut second] {
			match sub.next().await {
				Some(HubMessage::Log(entry)) => assert_eq!(entry.message, "one"),
				other => panic!("expected log, got {:?}", other),
			}
			match sub.next().await {
				Some(HubMessage::Status(status)) => assert_eq!(status.step, Step::Stopped),
				other => panic!("expected status, got {:?}", other),
			}
		}
	}

	#[tokio::test]
	async fn test_lagging_observer_skips_oldest() {
		let hub = hub(2, 100, 10);
		let mut sub = hub.subscribe();

		for i in 0..5 {
			hub.info(format!("message {}", i));
		}

		match sub.next().await {
			Some(HubMessage::Log(entry)) => assert_eq!(entry.message, "message 3"),
			other => panic!("expected log, got {:?}", other),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_heartbeat_after_silence() {
		let hub = hub(16, 100, 10);
		let mut sub = hub.subscribe();

		let started = tokio::time::Instant::now();
		assert_eq!(sub.next().await, Some(HubMessage::heartbeat()));
		assert!(started.elapsed() >= Duration::from_secs(30));
	}

	#[tokio::test]
	async fn test_initial_message_comes_first() {
		let hub = hub(16, 100, 10);
		let initial = HubMessage::Status(StatusUpdate::new(Step::Idle, RunStatus::Stopped));
		let mut sub = hub.subscribe().with_initial(initial.clone());

		hub.info("later");
		assert_eq!(sub.next().await, Some(initial));
		assert!(matches!(sub.next().await, Some(HubMessage::Log(_))));
	}

	#[tokio::test]
	async fn test_closed_hub_ends_subscription() {
		let hub = hub(16, 100, 10);
		let mut sub = hub.subscribe();
		drop(hub);
		assert_eq!(sub.next().await, None);
	}
}

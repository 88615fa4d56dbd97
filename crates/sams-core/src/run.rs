// sams-core/src/run.rs

use crate::error::CoreError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Default)]
struct RunSlot {
	active: bool,
	generation: u64,
}

/// Proof that the holder started a particular run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
	generation: u64,
}

impl RunTicket {
	pub fn generation(&self) -> u64 {
		self.generation
	}
}

/// Single-run guard with cooperative stop.
///
/// Every start bumps a generation counter and hands out a [`RunTicket`]. An
/// engine only treats the run as live while the flag is set and its ticket
/// is current, so an engine that outlives its run can neither keep going nor
/// clear the flag of a newer one.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
	slot: Arc<Mutex<RunSlot>>,
}

impl RunControl {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn begin(&self) -> Result<RunTicket, CoreError> {
		let mut slot = self.slot.lock().await;
		if slot.active {
			return Err(CoreError::AlreadyRunning);
		}
		slot.active = true;
		slot.generation += 1;
		info!(generation = slot.generation, "run started");
		Ok(RunTicket {
			generation: slot.generation,
		})
	}

	/// Clears the flag. Returns whether a run was active.
	pub async fn stop(&self) -> bool {
		let mut slot = self.slot.lock().await;
		let was_active = slot.active;
		slot.active = false;
		if was_active {
			info!(generation = slot.generation, "run stop requested");
		}
		was_active
	}

	pub async fn is_active(&self) -> bool {
		self.slot.lock().await.active
	}

	pub async fn is_current(&self, ticket: &RunTicket) -> bool {
		let slot = self.slot.lock().await;
		slot.active && slot.generation == ticket.generation
	}

	/// Ends the ticket's run if it is still the live one.
	pub async fn finish(&self, ticket: &RunTicket) -> bool {
		let mut slot = self.slot.lock().await;
		if slot.active && slot.generation == ticket.generation {
			slot.active = false;
			info!(generation = slot.generation, "run finished");
			return true;
		}
		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_second_begin_is_rejected() {
		let run = RunControl::new();
		let ticket = run.begin().await.unwrap();
		assert_eq!(run.begin().await, Err(CoreError::AlreadyRunning));
		assert!(run.is_current(&ticket).await);
	}

	#[tokio::test]
	async fn test_stop_is_idempotent() {
		let run = RunControl::new();
		assert!(!run.stop().await);

		let ticket = run.begin().await.unwrap();
		assert!(run.stop().await);
		assert!(!run.stop().await);
		assert!(!run.is_current(&ticket).await);
		assert!(!run.is_active().await);
	}

	#[tokio::test]
	async fn test_stale_ticket_cannot_finish_newer_run() {
		let run = RunControl::new();
		let old = run.begin().await.unwrap();
		run.stop().await;

		let new = run.begin().await.unwrap();
		assert_ne!(old, new);
		assert!(!run.is_current(&old).await);
		assert!(!run.finish(&old).await);
		assert!(run.is_active().await);

		assert!(run.finish(&new).await);
		assert!(!run.is_active().await);
	}
}

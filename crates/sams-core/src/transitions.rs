//! Transition tables of the acquisition pipeline.
//!
//! The engine reduces the result of each stage to a [`StageOutcome`] and asks
//! [`next`] where to go. Submission failures are routed separately by
//! [`route_submission`] because most of them are handled inside the
//! submission stage itself.

use sams_types::{Step, VendorError};
use std::fmt;

/// Pipeline stage of one acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
	SavingAddress,
	CheckingStores,
	CheckingCart,
	CheckingGoods,
	CheckingSettle,
	CheckingCapacity,
	SubmittingOrder,
	Success,
	Stopped,
}

impl Stage {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Success | Self::Stopped)
	}

	/// Step reported to observers while the stage runs.
	pub fn step(&self) -> Step {
		match self {
			Self::SavingAddress => Step::SavingAddress,
			Self::CheckingStores => Step::CheckingStores,
			Self::CheckingCart => Step::CheckingCart,
			Self::CheckingGoods => Step::CheckingGoods,
			Self::CheckingSettle => Step::CheckingSettle,
			Self::CheckingCapacity => Step::CheckingCapacity,
			Self::SubmittingOrder => Step::SubmittingOrder,
			Self::Success => Step::OrderSuccess,
			Self::Stopped => Step::Stopped,
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::SavingAddress => "saving address",
			Self::CheckingStores => "checking stores",
			Self::CheckingCart => "checking cart",
			Self::CheckingGoods => "checking goods",
			Self::CheckingSettle => "checking settlement",
			Self::CheckingCapacity => "checking capacity",
			Self::SubmittingOrder => "submitting order",
			Self::Success => "success",
			Self::Stopped => "stopped",
		};
		f.write_str(name)
	}
}

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
	/// The stage finished and its postcondition holds.
	Done,
	/// The cart yielded no purchasable goods.
	CartEmpty,
	/// Settlement succeeded but the delivery fee is not acceptable.
	FeeRejected,
	/// Capacity poll found no open window.
	NoSlots,
	/// The vendor call failed.
	Failed(VendorError),
	OrderPlaced,
	/// Every slot of the current capacity generation was rejected.
	SlotsExhausted,
	/// Overweight mitigation removed the last item.
	GoodsExhausted,
	/// A submission failure asked for a restart further up the pipeline.
	Rerouted(Stage),
	/// Run control asked the engine to stop.
	Stopped,
}

/// Where to go next and whether to wait the backoff first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
	pub to: Stage,
	pub backoff: bool,
}

impl Transition {
	pub fn now(to: Stage) -> Self {
		Self { to, backoff: false }
	}

	pub fn after_backoff(to: Stage) -> Self {
		Self { to, backoff: true }
	}
}

/// Transition function of the pipeline.
pub fn next(stage: Stage, outcome: &StageOutcome) -> Transition {
	use Stage::*;
	use StageOutcome as O;

	if *outcome == O::Stopped {
		return Transition::now(Stopped);
	}

	match (stage, outcome) {
		(Success, _) | (Stopped, _) => Transition::now(stage),

		(SavingAddress, O::Done) => Transition::now(CheckingStores),
		(CheckingStores, O::Done) => Transition::now(CheckingCart),

		(CheckingCart, O::Done) => Transition::now(CheckingGoods),
		(CheckingCart, O::Failed(e)) if e.is_rate_limited() => Transition::after_backoff(CheckingCart),
		(CheckingCart, O::Failed(_)) | (CheckingCart, O::CartEmpty) => Transition::now(CheckingCart),

		(CheckingGoods, O::Done) => Transition::now(CheckingSettle),
		(CheckingGoods, _) => Transition::after_backoff(CheckingCart),

		(CheckingSettle, O::Done) => Transition::now(CheckingCapacity),
		(CheckingSettle, O::FeeRejected) => Transition::after_backoff(CheckingCart),
		(CheckingSettle, O::Failed(VendorError::CartChanged(_))) => {
			Transition::after_backoff(CheckingCart)
		}
		(CheckingSettle, O::Failed(VendorError::NoMatchingDeliveryMode(_))) => {
			Transition::after_backoff(SavingAddress)
		}
		(CheckingSettle, _) => Transition::after_backoff(CheckingGoods),

		(CheckingCapacity, O::Done) => Transition::now(SubmittingOrder),
		(CheckingCapacity, O::Failed(VendorError::CapacityUnavailable(_))) => {
			Transition::now(CheckingStores)
		}
		(CheckingCapacity, _) => Transition::after_backoff(CheckingCapacity),

		(SubmittingOrder, O::OrderPlaced) => Transition::now(Success),
		(SubmittingOrder, O::SlotsExhausted) => Transition::now(CheckingCapacity),
		(SubmittingOrder, O::GoodsExhausted) => Transition::now(CheckingCart),
		(SubmittingOrder, O::Rerouted(target)) => Transition::now(*target),

		// Any other failure retries the same stage.
		(stage, _) => Transition::after_backoff(stage),
	}
}

/// Reaction to a failed order submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitAction {
	/// Resubmit the same slot immediately.
	RetrySlot,
	/// Drop one unit of the heaviest item, then resubmit the same slot.
	ReduceWeight,
	/// Forget the slot and move on to the next one of this generation.
	DropSlot,
	/// Leave the submission stage.
	Restart(Stage),
}

pub fn route_submission(error: &VendorError) -> SubmitAction {
	use VendorError::*;

	match error {
		RateLimited(_) => SubmitAction::RetrySlot,
		WeightExceeded(_) => SubmitAction::ReduceWeight,
		OutOfStock(_) | PresaleNotStarted(_) | CartChanged(_) | QuantityExceedsLimit(_) => {
			SubmitAction::Restart(Stage::CheckingCart)
		}
		StoreClosed(_) | DeliveryInfoUnavailable(_) => SubmitAction::Restart(Stage::CheckingStores),
		SlotClosed(_) | CapacityDecrementFailed(_) | SlotNotDeliverable(_) => SubmitAction::DropSlot,
		_ => SubmitAction::Restart(Stage::CheckingCapacity),
	}
}

//! Acquisition core: the delivery-slot state machine, its policies, the
//! status hub and run control.

pub mod controller;
pub mod engine;
pub mod error;
pub mod hub;
pub mod policy;
pub mod run;
pub mod transitions;

pub use controller::{vendor_factory, Controller};
pub use engine::{Engine, EngineSettings};
pub use error::CoreError;
pub use hub::{Hub, Subscription};
pub use run::{RunControl, RunTicket};
pub use transitions::{Stage, StageOutcome, SubmitAction, Transition};

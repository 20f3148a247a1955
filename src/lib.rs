//! Delayed proprioceptive feedback for muscle-driven simulations.
//!
//! Sensors ([`channel`]) read muscle state through [`host::Process`], keep a
//! [`history::SignalHistory`] of accepted samples and report them after a
//! transmission delay. A [`controller::ReflexController`] sums rectified,
//! normalized sensor readings into per-muscle excitations.

#[path = "core/error.rs"]
pub mod error;

#[path = "core/history.rs"]
pub mod history;

#[path = "core/host.rs"]
pub mod host;

#[path = "core/channel.rs"]
pub mod channel;

#[path = "core/registry.rs"]
pub mod registry;

#[path = "core/controller.rs"]
pub mod controller;

pub mod observer;

pub use channel::{ChannelArena, ChannelId, PendingSample};
pub use controller::{Evaluation, ReflexConfig, ReflexController};
pub use error::{ReflexError, ReflexResult};
pub use host::{Controls, Process, ProcessId, SimState};

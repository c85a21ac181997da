//! # tickstate-core
//!
//! Tick-driven behavior runtime.
//!
//! This crate provides:
//! - A reentrant transition protocol with a per-track depth guard
//! - Lazy per-type caching of state instances
//! - Side-tracks running in parallel with the main state
//! - Popups with explicit start and end
//! - Type-exact event routing and declarative capability delivery
//! - Observer subscriptions and an optional formatted trace sink

mod cache;
pub mod capability;
pub mod completion;
pub mod config;
pub mod declaration;
pub mod error;
pub mod event;
pub mod machine;
pub mod observer;
pub mod parameter;
pub mod popup;
pub mod side_track;
pub mod state;
pub mod trace;

pub use capability::{Capability, CapabilityDemand, CapabilityKey, CapabilityMap};
pub use completion::{AwaitCompletion, Completion, CompletionStatus};
pub use config::{CapabilityDelivery, ConfigError, MachineConfig};
pub use declaration::Declaration;
pub use error::MachineError;
pub use event::{
    MachineSignal, MainStateChanged, PopupEnded, PopupStarted, SideTrackChanged, StateEvent,
};
pub use machine::StateMachine;
pub use observer::{Notification, NotificationFilter, NotificationKind, SubscriptionId};
pub use parameter::Parameter;
pub use popup::PopupHandle;
pub use side_track::SideTrack;
pub use state::{NoOpState, PopupRef, PopupState, ReceiveEvent, State, StateRef};

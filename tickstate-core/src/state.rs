//! Behavior traits.
//!
//! Hooks take `&self`: a machine keeps every instance alive in its cache and
//! a hook may re-enter the machine (and therefore the same instance) before
//! it returns. Private per-instance data lives in `Cell`/`RefCell` fields.

use crate::capability::Capability;
use crate::declaration::Declaration;
use crate::error::MachineError;
use crate::machine::StateMachine;
use crate::parameter::Parameter;
use crate::trace::short_type_name;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a main or side-track state.
pub type StateRef<T> = Rc<dyn State<T>>;

/// Shared handle to a popup.
pub type PopupRef<T> = Rc<dyn PopupState<T>>;

/// Object-safe access to the concrete type behind a trait object.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<S: Any> AsAny for S {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A mutually-exclusive behavior occupying a track.
pub trait State<T: 'static>: AsAny {
    /// Declares the capabilities and events this state type takes. Evaluated
    /// once per type.
    fn declare(_declaration: &mut Declaration<T, Self>)
    where
        Self: Sized,
    {
    }

    fn on_entered(
        &self,
        _machine: &mut StateMachine<T>,
        _previous: Option<&StateRef<T>>,
        _subject: &RefCell<T>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        Ok(())
    }

    /// Called once per tick while this state is current. Not guaranteed to
    /// run between `on_entered` and `on_leaving`, since either of those may
    /// change state again.
    fn update(
        &self,
        machine: &mut StateMachine<T>,
        subject: &RefCell<T>,
    ) -> Result<(), MachineError>;

    fn on_leaving(
        &self,
        _machine: &mut StateMachine<T>,
        _next: &StateRef<T>,
        _subject: &RefCell<T>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        Ok(())
    }

    /// Receives one declared capability during activation.
    fn on_capability_supplied(&self, _capability: &Capability) {}

    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

impl<T: 'static> dyn State<T> {
    /// Returns true if this state is an `S`.
    pub fn is<S: State<T>>(&self) -> bool {
        self.as_any().is::<S>()
    }

    pub fn downcast_ref<S: State<T>>(&self) -> Option<&S> {
        self.as_any().downcast_ref::<S>()
    }
}

/// An ephemeral overlay behavior with an explicit start and end.
///
/// Popups never end themselves implicitly and are never cached; the owner
/// (or any hook) ends them through [`StateMachine::end_popup`].
pub trait PopupState<T: 'static>: AsAny {
    fn declare(_declaration: &mut Declaration<T, Self>)
    where
        Self: Sized,
    {
    }

    fn on_starting(
        &self,
        _machine: &mut StateMachine<T>,
        _subject: &RefCell<T>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        Ok(())
    }

    fn update(
        &self,
        machine: &mut StateMachine<T>,
        subject: &RefCell<T>,
    ) -> Result<(), MachineError>;

    fn on_ending(
        &self,
        _machine: &mut StateMachine<T>,
        _subject: &RefCell<T>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        Ok(())
    }

    fn on_capability_supplied(&self, _capability: &Capability) {}

    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

impl<T: 'static> dyn PopupState<T> {
    pub fn is<P: PopupState<T>>(&self) -> bool {
        self.as_any().is::<P>()
    }

    pub fn downcast_ref<P: PopupState<T>>(&self) -> Option<&P> {
        self.as_any().downcast_ref::<P>()
    }
}

/// Receives events of exactly type `E`. Registered with
/// [`Declaration::on_event`].
pub trait ReceiveEvent<T: 'static, E> {
    fn receive_event(
        &self,
        machine: &mut StateMachine<T>,
        subject: &RefCell<T>,
        event: &E,
    ) -> Result<(), MachineError>;
}

/// Sentinel occupying side-track slots that were never set.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpState;

impl<T: 'static> State<T> for NoOpState {
    fn update(
        &self,
        _machine: &mut StateMachine<T>,
        _subject: &RefCell<T>,
    ) -> Result<(), MachineError> {
        Ok(())
    }
}

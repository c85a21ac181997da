//! Transition on external completion.
//!
//! [`AwaitCompletion`] is a ready-made state for work that finishes outside
//! the machine (a loader, a network call polled by the host). The host keeps
//! an `Rc<Completion>` and marks it; the state polls it once per tick and
//! moves on to its configured target.

use crate::error::MachineError;
use crate::machine::StateMachine;
use crate::parameter::Parameter;
use crate::state::{State, StateRef};
use crate::trace::short_type_name;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CompletionStatus {
    #[default]
    Pending,
    Completed,
    Failed(String),
}

/// Completion flag shared between the host and an [`AwaitCompletion`] state.
#[derive(Debug, Default)]
pub struct Completion {
    status: RefCell<CompletionStatus>,
}

impl Completion {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn complete(&self) {
        *self.status.borrow_mut() = CompletionStatus::Completed;
    }

    pub fn fail(&self, reason: impl Into<String>) {
        *self.status.borrow_mut() = CompletionStatus::Failed(reason.into());
    }

    pub fn reset(&self) {
        *self.status.borrow_mut() = CompletionStatus::Pending;
    }

    pub fn status(&self) -> CompletionStatus {
        self.status.borrow().clone()
    }

    pub fn is_completed(&self) -> bool {
        matches!(*self.status.borrow(), CompletionStatus::Completed)
    }
}

/// Waits for a [`Completion`] and then changes the main state to `S`.
///
/// With no explicit target instance the cached instance of `S` is used. A
/// failed completion is logged once and the state stays current until the
/// completion is reset. An expected source, when set, is checked on entry.
pub struct AwaitCompletion<S> {
    completion: Rc<Completion>,
    target: Option<Rc<S>>,
    parameter: Option<Parameter>,
    source: Option<(TypeId, &'static str)>,
    reported: Cell<bool>,
}

impl<S> AwaitCompletion<S> {
    pub fn new(completion: Rc<Completion>) -> Self {
        Self {
            completion,
            target: None,
            parameter: None,
            source: None,
            reported: Cell::new(false),
        }
    }

    /// Transitions to this instance instead of the cached one.
    pub fn with_instance(mut self, target: Rc<S>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameter = Some(parameter);
        self
    }

    /// Only accept entry from a state of type `P`; any other source fails
    /// the transition with `UnexpectedSource`.
    pub fn expecting_source<P: 'static>(mut self) -> Self {
        self.source = Some((
            TypeId::of::<P>(),
            short_type_name(std::any::type_name::<P>()),
        ));
        self
    }

    pub fn completion(&self) -> &Rc<Completion> {
        &self.completion
    }
}

impl<T: 'static, S: State<T> + Default> State<T> for AwaitCompletion<S> {
    fn on_entered(
        &self,
        _machine: &mut StateMachine<T>,
        previous: Option<&StateRef<T>>,
        _subject: &RefCell<T>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        if let Some((expected_id, expected)) = self.source {
            let actual = previous.map(|state| (**state).as_any().type_id());
            if actual != Some(expected_id) {
                return Err(MachineError::UnexpectedSource {
                    state: State::<T>::name(self),
                    expected,
                    actual: previous.map(|state| state.name()).unwrap_or("None"),
                });
            }
        }
        self.reported.set(false);
        Ok(())
    }

    fn update(
        &self,
        machine: &mut StateMachine<T>,
        _subject: &RefCell<T>,
    ) -> Result<(), MachineError> {
        match self.completion.status() {
            CompletionStatus::Pending => Ok(()),
            CompletionStatus::Completed => {
                let parameter = self.parameter.clone();
                match &self.target {
                    Some(target) => machine.change_state_to(target.clone(), parameter),
                    None => machine.change_state::<S>(parameter),
                }
            }
            CompletionStatus::Failed(reason) => {
                if !self.reported.replace(true) {
                    tracing::warn!(
                        state = State::<T>::name(self),
                        reason = %reason,
                        "awaited completion failed"
                    );
                }
                Ok(())
            }
        }
    }

    fn on_leaving(
        &self,
        _machine: &mut StateMachine<T>,
        _next: &StateRef<T>,
        _subject: &RefCell<T>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        self.reported.set(false);
        Ok(())
    }
}

//! Static per-type declarations.
//!
//! A state or popup type describes, once, which capabilities it takes and
//! which event types it receives. The machine turns that into a
//! [`ReceiverInfo`]: a capability demand plus a dispatch table keyed by the
//! exact `TypeId` of each event type, resolved to a monomorphized handler.

use crate::capability::{CapabilityDemand, CapabilityKey};
use crate::error::MachineError;
use crate::machine::StateMachine;
use crate::state::{PopupState, ReceiveEvent, State};
use crate::trace::short_type_name;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

/// Type-erased event handler: `(receiver, machine, subject, event)`.
pub(crate) type EventHandler<T> =
    fn(&dyn Any, &mut StateMachine<T>, &RefCell<T>, &dyn Any) -> Result<(), MachineError>;

/// Builder handed to [`State::declare`] and [`PopupState::declare`].
pub struct Declaration<T: 'static, R> {
    demand: CapabilityDemand,
    handlers: HashMap<TypeId, EventHandler<T>>,
    _receiver: PhantomData<fn(&R)>,
}

impl<T: 'static, R: 'static> Declaration<T, R> {
    fn new() -> Self {
        Self {
            demand: CapabilityDemand::Nothing,
            handlers: HashMap::new(),
            _receiver: PhantomData,
        }
    }

    /// Asks for the capability bound as `C`.
    pub fn needs<C: ?Sized + 'static>(&mut self) -> &mut Self {
        let key = CapabilityKey::of::<C>();
        match &mut self.demand {
            CapabilityDemand::Nothing => self.demand = CapabilityDemand::Selective(vec![key]),
            CapabilityDemand::Selective(keys) => {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            CapabilityDemand::All => {}
        }
        self
    }

    /// Asks for every bound capability, whatever its key.
    pub fn all_capabilities(&mut self) -> &mut Self {
        self.demand = CapabilityDemand::All;
        self
    }

    /// Registers interest in events of exactly type `E`.
    pub fn on_event<E: 'static>(&mut self) -> &mut Self
    where
        R: ReceiveEvent<T, E>,
    {
        self.handlers
            .insert(TypeId::of::<E>(), dispatch::<T, E, R> as EventHandler<T>);
        self
    }
}

fn dispatch<T: 'static, E: 'static, R: ReceiveEvent<T, E> + 'static>(
    receiver: &dyn Any,
    machine: &mut StateMachine<T>,
    subject: &RefCell<T>,
    event: &dyn Any,
) -> Result<(), MachineError> {
    match (receiver.downcast_ref::<R>(), event.downcast_ref::<E>()) {
        (Some(receiver), Some(event)) => receiver.receive_event(machine, subject, event),
        _ => Ok(()),
    }
}

/// Resolved declaration of one receiver type.
pub(crate) struct ReceiverInfo<T: 'static> {
    pub(crate) name: &'static str,
    pub(crate) demand: CapabilityDemand,
    handlers: HashMap<TypeId, EventHandler<T>>,
}

impl<T: 'static> ReceiverInfo<T> {
    fn from_declaration<R: 'static>(declaration: Declaration<T, R>) -> Self {
        Self {
            name: short_type_name(std::any::type_name::<R>()),
            demand: declaration.demand,
            handlers: declaration.handlers,
        }
    }

    fn registered<R: 'static>(declaration: Declaration<T, R>) -> Rc<Self> {
        let info = Self::from_declaration(declaration);
        tracing::trace!(
            receiver = info.name,
            events = info.event_count(),
            demand = ?info.demand,
            "receiver declared"
        );
        Rc::new(info)
    }

    pub(crate) fn handler(&self, event: TypeId) -> Option<EventHandler<T>> {
        self.handlers.get(&event).copied()
    }

    pub(crate) fn event_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Declarations cached per receiver type for the lifetime of a machine.
pub(crate) struct DeclarationRegistry<T: 'static> {
    entries: HashMap<TypeId, Rc<ReceiverInfo<T>>>,
}

impl<T: 'static> Default for DeclarationRegistry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: 'static> DeclarationRegistry<T> {
    pub(crate) fn state<S: State<T>>(&mut self) -> Rc<ReceiverInfo<T>> {
        self.entries
            .entry(TypeId::of::<S>())
            .or_insert_with(|| {
                let mut declaration = Declaration::<T, S>::new();
                S::declare(&mut declaration);
                ReceiverInfo::registered(declaration)
            })
            .clone()
    }

    pub(crate) fn popup<P: PopupState<T>>(&mut self) -> Rc<ReceiverInfo<T>> {
        self.entries
            .entry(TypeId::of::<P>())
            .or_insert_with(|| {
                let mut declaration = Declaration::<T, P>::new();
                P::declare(&mut declaration);
                ReceiverInfo::registered(declaration)
            })
            .clone()
    }

    pub(crate) fn get(&self, receiver: TypeId) -> Option<Rc<ReceiverInfo<T>>> {
        self.entries.get(&receiver).cloned()
    }

    /// Looks up the handler a receiver type registered for an event type.
    pub(crate) fn handler(&self, receiver: TypeId, event: TypeId) -> Option<EventHandler<T>> {
        self.entries.get(&receiver).and_then(|info| info.handler(event))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

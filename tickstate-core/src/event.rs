//! Event routing.
//!
//! Events are plain values. A receiver gets an event only if its type
//! declared a handler for exactly that event type; there is no subtype or
//! trait-object matching.

use crate::error::MachineError;
use crate::machine::StateMachine;
use crate::popup::PopupHandle;
use crate::state::{PopupRef, State, StateRef};
use crate::trace::short_type_name;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;

/// Emitted after every main-track transition.
pub struct MainStateChanged<T: 'static> {
    /// `None` for the first transition of a machine.
    pub from: Option<StateRef<T>>,
    /// The state this transition entered.
    pub to: StateRef<T>,
}

/// Emitted after every side-track transition.
pub struct SideTrackChanged<T: 'static> {
    pub track: usize,
    pub from: StateRef<T>,
    pub to: StateRef<T>,
}

pub struct PopupStarted<T: 'static> {
    pub handle: PopupHandle,
    pub popup: PopupRef<T>,
}

pub struct PopupEnded<T: 'static> {
    pub handle: PopupHandle,
    pub popup: PopupRef<T>,
}

/// Machine-wide lifecycle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineSignal {
    Paused,
    Resumed,
}

impl<T: 'static> Clone for MainStateChanged<T> {
    fn clone(&self) -> Self {
        Self {
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

impl<T: 'static> Clone for SideTrackChanged<T> {
    fn clone(&self) -> Self {
        Self {
            track: self.track,
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

impl<T: 'static> Clone for PopupStarted<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            popup: self.popup.clone(),
        }
    }
}

impl<T: 'static> Clone for PopupEnded<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            popup: self.popup.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for MainStateChanged<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainStateChanged")
            .field("from", &self.from.as_ref().map(|s| s.name()))
            .field("to", &self.to.name())
            .finish()
    }
}

impl<T: 'static> fmt::Debug for SideTrackChanged<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideTrackChanged")
            .field("track", &self.track)
            .field("from", &self.from.name())
            .field("to", &self.to.name())
            .finish()
    }
}

impl<T: 'static> fmt::Debug for PopupStarted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupStarted")
            .field("handle", &self.handle)
            .field("popup", &self.popup.name())
            .finish()
    }
}

impl<T: 'static> fmt::Debug for PopupEnded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupEnded")
            .field("handle", &self.handle)
            .field("popup", &self.popup.name())
            .finish()
    }
}

/// An event delivered through [`StateMachine::invoke_event`], which checks
/// the predicate against the current main state first.
pub trait StateEvent<T: 'static> {
    fn can_invoke(&self, current: &dyn State<T>) -> bool;
}

impl<T: 'static> StateMachine<T> {
    /// Broadcasts `event` to the main state, then side-track states in index
    /// order, then popups in list order. Returns the number of deliveries.
    ///
    /// The side-track and popup lists are snapshotted before delivery; a
    /// popup ended by an earlier receiver is skipped.
    pub fn send_event<E: 'static>(&mut self, event: E) -> Result<usize, MachineError> {
        let subject = self.subject()?;
        let event_type = TypeId::of::<E>();
        let event_name = short_type_name(std::any::type_name::<E>());
        let mut delivered = 0;

        if let Some(current) = self.current_state().cloned() {
            if self.deliver(
                (*current).as_any(),
                current.name(),
                &subject,
                &event,
                event_type,
                event_name,
            )? {
                delivered += 1;
            }
        }

        let side_tracks: Vec<StateRef<T>> =
            self.side_tracks.iter().map(|slot| slot.current.clone()).collect();
        for state in side_tracks {
            if self.deliver(
                (*state).as_any(),
                state.name(),
                &subject,
                &event,
                event_type,
                event_name,
            )? {
                delivered += 1;
            }
        }

        for (handle, popup) in self.popups.snapshot() {
            if !self.popups.contains(handle) {
                continue;
            }
            if self.deliver(
                (*popup).as_any(),
                popup.name(),
                &subject,
                &event,
                event_type,
                event_name,
            )? {
                delivered += 1;
            }
        }

        Ok(delivered)
    }

    /// Delivers `event` to the main state only, and only if the event's
    /// predicate accepts the current state and the state receives `E`.
    /// Returns whether the event was delivered.
    pub fn invoke_event<E: StateEvent<T> + 'static>(
        &mut self,
        event: E,
    ) -> Result<bool, MachineError> {
        let subject = self.subject()?;
        let Some(current) = self.current_state().cloned() else {
            return Ok(false);
        };
        if !event.can_invoke(&*current) {
            tracing::trace!(
                state = current.name(),
                event = short_type_name(std::any::type_name::<E>()),
                "event predicate rejected current state"
            );
            return Ok(false);
        }
        self.deliver(
            (*current).as_any(),
            current.name(),
            &subject,
            &event,
            TypeId::of::<E>(),
            short_type_name(std::any::type_name::<E>()),
        )
    }

    fn deliver(
        &mut self,
        receiver: &dyn Any,
        receiver_name: &'static str,
        subject: &RefCell<T>,
        event: &dyn Any,
        event_type: TypeId,
        event_name: &'static str,
    ) -> Result<bool, MachineError> {
        let Some(handler) = self.declarations.handler(receiver.type_id(), event_type) else {
            return Ok(false);
        };
        tracing::trace!(receiver = receiver_name, event = event_name, "event delivered");
        if self.trace.is_enabled() {
            self.trace
                .emit(format_args!("{} receives {}.", receiver_name, event_name));
        }
        handler(receiver, self, subject, event)?;
        Ok(true)
    }
}

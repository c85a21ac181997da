//! Popup/overlay registry.
//!
//! Popups run alongside the main state and side-tracks with an explicit
//! start and end. Insertion order is update order.

use crate::error::MachineError;
use crate::event::{PopupEnded, PopupStarted};
use crate::machine::StateMachine;
use crate::observer::Notification;
use crate::parameter::Parameter;
use crate::state::{PopupRef, PopupState};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Identifies a started popup until it is ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PopupHandle(Uuid);

impl PopupHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PopupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "popup-{}", self.0)
    }
}

pub(crate) struct PopupRegistry<T: 'static> {
    entries: Vec<(PopupHandle, PopupRef<T>)>,
}

impl<T: 'static> Default for PopupRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: 'static> PopupRegistry<T> {
    fn push(&mut self, popup: PopupRef<T>) -> PopupHandle {
        let handle = PopupHandle::new();
        self.entries.push((handle, popup));
        handle
    }

    fn get(&self, handle: PopupHandle) -> Option<&PopupRef<T>> {
        self.entries
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, popup)| popup)
    }

    fn remove(&mut self, handle: PopupHandle) -> Option<PopupRef<T>> {
        let pos = self.entries.iter().position(|(h, _)| *h == handle)?;
        Some(self.entries.remove(pos).1)
    }

    pub(crate) fn contains(&self, handle: PopupHandle) -> bool {
        self.entries.iter().any(|(h, _)| *h == handle)
    }

    /// Copy of the current list, for iteration that may start or end popups.
    pub(crate) fn snapshot(&self) -> Vec<(PopupHandle, PopupRef<T>)> {
        self.entries.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T: 'static> StateMachine<T> {
    /// Starts a popup instance and returns its handle.
    pub fn popup<P: PopupState<T>>(
        &mut self,
        popup: Rc<P>,
        parameter: Option<Parameter>,
    ) -> Result<PopupHandle, MachineError> {
        let subject = self.subject()?;
        self.declarations.popup::<P>();

        let popup: PopupRef<T> = popup;
        let handle = self.popups.push(popup.clone());
        tracing::debug!(popup = popup.name(), %handle, "popup starting");

        self.supply_capabilities((*popup).as_any().type_id(), |c| popup.on_capability_supplied(c));
        popup.on_starting(self, &subject, parameter.as_ref())?;

        self.send_event(PopupStarted {
            handle,
            popup: popup.clone(),
        })?;
        self.observers
            .notify(&Notification::PopupStarted { handle, popup: &popup });
        Ok(handle)
    }

    /// Starts a freshly constructed popup of type `P`.
    pub fn popup_new<P: PopupState<T> + Default>(
        &mut self,
        parameter: Option<Parameter>,
    ) -> Result<(PopupHandle, Rc<P>), MachineError> {
        let popup = Rc::new(P::default());
        let handle = self.popup(popup.clone(), parameter)?;
        Ok((handle, popup))
    }

    /// Ends a started popup. Ending a handle that is not registered, including
    /// one already ended, is an error.
    pub fn end_popup(
        &mut self,
        handle: PopupHandle,
        parameter: Option<Parameter>,
    ) -> Result<(), MachineError> {
        let subject = self.subject()?;
        let popup = self
            .popups
            .get(handle)
            .cloned()
            .ok_or(MachineError::UnknownPopupHandle { handle })?;
        tracing::debug!(popup = popup.name(), %handle, "popup ending");

        popup.on_ending(self, &subject, parameter.as_ref())?;
        // The ending hook may have ended the popup itself.
        self.popups.remove(handle);

        self.send_event(PopupEnded {
            handle,
            popup: popup.clone(),
        })?;
        self.observers
            .notify(&Notification::PopupEnded { handle, popup: &popup });
        Ok(())
    }

    /// Active popups in update order.
    pub fn popups(&self) -> impl Iterator<Item = (PopupHandle, &PopupRef<T>)> + '_ {
        self.popups.entries.iter().map(|(handle, popup)| (*handle, popup))
    }

    pub fn popup_count(&self) -> usize {
        self.popups.len()
    }

    pub fn popup_state(&self, handle: PopupHandle) -> Option<&PopupRef<T>> {
        self.popups.get(handle)
    }

    /// Updates every popup present when the phase begins, skipping those
    /// ended earlier in the same phase.
    pub(crate) fn update_popups(&mut self, subject: &RefCell<T>) -> Result<(), MachineError> {
        for (handle, popup) in self.popups.snapshot() {
            if !self.popups.contains(handle) {
                continue;
            }
            popup.update(self, subject)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::declaration::Declaration;
    use crate::observer::{NotificationFilter, NotificationKind};
    use crate::parameter;
    use crate::state::{ReceiveEvent, State};
    use std::cell::Cell;

    #[derive(Default)]
    struct Hud {
        log: Vec<String>,
    }

    fn log(subject: &RefCell<Hud>, line: impl Into<String>) {
        subject.borrow_mut().log.push(line.into());
    }

    #[derive(Default)]
    struct Idle;

    impl State<Hud> for Idle {
        fn update(&self, _: &mut StateMachine<Hud>, _: &RefCell<Hud>) -> Result<(), MachineError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Toast {
        ticks: Cell<u32>,
    }

    impl PopupState<Hud> for Toast {
        fn on_starting(
            &self,
            _machine: &mut StateMachine<Hud>,
            subject: &RefCell<Hud>,
            parameter: Option<&Parameter>,
        ) -> Result<(), MachineError> {
            let text = parameter::optional::<&str>(parameter, "Toast")?.copied().unwrap_or("");
            log(subject, format!("Toast.starting {text}"));
            Ok(())
        }

        fn update(
            &self,
            _: &mut StateMachine<Hud>,
            subject: &RefCell<Hud>,
        ) -> Result<(), MachineError> {
            self.ticks.set(self.ticks.get() + 1);
            log(subject, "Toast.update");
            Ok(())
        }

        fn on_ending(
            &self,
            _machine: &mut StateMachine<Hud>,
            subject: &RefCell<Hud>,
            _parameter: Option<&Parameter>,
        ) -> Result<(), MachineError> {
            log(subject, "Toast.ending");
            Ok(())
        }
    }

    fn machine() -> (Rc<RefCell<Hud>>, StateMachine<Hud>) {
        let subject = Rc::new(RefCell::new(Hud::default()));
        let mut machine = StateMachine::new(&subject);
        machine.change_state::<Idle>(None).unwrap();
        (subject, machine)
    }

    #[test]
    fn test_start_update_end() {
        let (subject, mut machine) = machine();

        let (handle, toast) = machine
            .popup_new::<Toast>(Some(Parameter::new("saved")))
            .unwrap();
        assert!(handle.to_string().starts_with("popup-"));
        assert_eq!(machine.popup_count(), 1);

        machine.update().unwrap();
        machine.update().unwrap();
        assert_eq!(toast.ticks.get(), 2);

        machine.end_popup(handle, None).unwrap();
        assert_eq!(machine.popup_count(), 0);
        machine.update().unwrap();
        assert_eq!(toast.ticks.get(), 2);

        assert_eq!(
            subject.borrow().log,
            vec![
                "Toast.starting saved",
                "Toast.update",
                "Toast.update",
                "Toast.ending"
            ]
        );

        let err = machine.end_popup(handle, None).unwrap_err();
        assert!(matches!(err, MachineError::UnknownPopupHandle { handle: h } if h == handle));
    }

    #[test]
    fn test_popups_are_not_cached() {
        let (_subject, mut machine) = machine();
        let (first, a) = machine.popup_new::<Toast>(None).unwrap();
        let (second, b) = machine.popup_new::<Toast>(None).unwrap();

        assert_ne!(first, second);
        assert!(!Rc::ptr_eq(&a, &b));
        let order: Vec<PopupHandle> = machine.popups().map(|(h, _)| h).collect();
        assert_eq!(order, vec![first, second]);
        assert!(machine.popup_state(second).unwrap().is::<Toast>());
    }

    /// Ends the popup listed after it, and starts another one.
    struct Closer {
        target: Cell<Option<PopupHandle>>,
    }

    impl PopupState<Hud> for Closer {
        fn update(
            &self,
            machine: &mut StateMachine<Hud>,
            _: &RefCell<Hud>,
        ) -> Result<(), MachineError> {
            if let Some(target) = self.target.take() {
                machine.end_popup(target, None)?;
                machine.popup_new::<Toast>(None)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_phase_skips_ended_and_defers_started() {
        let (_subject, mut machine) = machine();
        let closer = Rc::new(Closer {
            target: Cell::new(None),
        });
        machine.popup(closer.clone(), None).unwrap();
        let (victim, victim_state) = machine.popup_new::<Toast>(None).unwrap();
        closer.target.set(Some(victim));

        machine.update().unwrap();
        assert_eq!(victim_state.ticks.get(), 0);
        assert_eq!(machine.popup_count(), 2);

        let (_, started) = machine.popups().nth(1).unwrap();
        let started = started.clone();
        assert_eq!(started.downcast_ref::<Toast>().unwrap().ticks.get(), 0);
        machine.update().unwrap();
        assert_eq!(started.downcast_ref::<Toast>().unwrap().ticks.get(), 1);
    }

    trait Clock {
        fn now(&self) -> u64;
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    /// Reads the clock capability and listens for popup lifecycle events.
    #[derive(Default)]
    struct Banner {
        started_at: Cell<u64>,
        seen_started: Cell<u32>,
    }

    impl PopupState<Hud> for Banner {
        fn declare(declaration: &mut Declaration<Hud, Self>) {
            declaration.needs::<dyn Clock>();
            declaration.on_event::<PopupStarted<Hud>>();
        }

        fn update(&self, _: &mut StateMachine<Hud>, _: &RefCell<Hud>) -> Result<(), MachineError> {
            Ok(())
        }

        fn on_capability_supplied(&self, capability: &Capability) {
            if let Some(clock) = capability.get::<dyn Clock>() {
                self.started_at.set(clock.now());
            }
        }
    }

    impl ReceiveEvent<Hud, PopupStarted<Hud>> for Banner {
        fn receive_event(
            &self,
            _: &mut StateMachine<Hud>,
            _: &RefCell<Hud>,
            _: &PopupStarted<Hud>,
        ) -> Result<(), MachineError> {
            self.seen_started.set(self.seen_started.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_capabilities_events_and_observers() {
        let (_subject, mut machine) = machine();
        machine.set_component::<dyn Clock>(Rc::new(FixedClock(77)));

        let kinds = Rc::new(RefCell::new(Vec::new()));
        let captured = kinds.clone();
        machine.subscribe(
            NotificationFilter::only([
                NotificationKind::PopupStarted,
                NotificationKind::PopupEnded,
            ]),
            move |n| captured.borrow_mut().push(n.kind()),
        );

        let (banner_handle, banner) = machine.popup_new::<Banner>(None).unwrap();
        assert_eq!(banner.started_at.get(), 77);
        // A popup sees its own start event.
        assert_eq!(banner.seen_started.get(), 1);

        let (toast, _) = machine.popup_new::<Toast>(None).unwrap();
        assert_eq!(banner.seen_started.get(), 2);

        machine.end_popup(toast, None).unwrap();
        machine.end_popup(banner_handle, None).unwrap();
        assert_eq!(
            *kinds.borrow(),
            vec![
                NotificationKind::PopupStarted,
                NotificationKind::PopupStarted,
                NotificationKind::PopupEnded,
                NotificationKind::PopupEnded
            ]
        );
    }
}

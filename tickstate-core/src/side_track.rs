//! Side-track extension.
//!
//! A machine built with [`StateMachine::with_side_tracks`] gets one
//! additional track per value of a bounded ordinal type. Each track runs its
//! own copy of the transition protocol with its own depth guard and cache.

use crate::config::CapabilityDelivery;
use crate::error::MachineError;
use crate::event::SideTrackChanged;
use crate::machine::StateMachine;
use crate::observer::Notification;
use crate::parameter::Parameter;
use crate::state::{NoOpState, State, StateRef};
use std::any::TypeId;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

/// A bounded ordinal naming the side-tracks of a machine.
///
/// ```
/// use tickstate_core::SideTrack;
///
/// #[derive(Debug, Clone, Copy)]
/// enum Layer {
///     Audio,
///     Camera,
/// }
///
/// impl SideTrack for Layer {
///     const COUNT: usize = 2;
///
///     fn index(self) -> usize {
///         self as usize
///     }
/// }
///
/// assert_eq!(Layer::Camera.index(), 1);
/// ```
pub trait SideTrack: Copy + Debug + 'static {
    /// Number of slots; every `index()` must be below this.
    const COUNT: usize;

    fn index(self) -> usize;
}

/// Plain indices address side-tracks directly. Out-of-range values are
/// rejected with `UnknownSideTrack` at use.
impl SideTrack for usize {
    const COUNT: usize = 0;

    fn index(self) -> usize {
        self
    }
}

pub(crate) struct SideTrackSlot<T: 'static> {
    pub(crate) current: StateRef<T>,
    pub(crate) depth: usize,
}

impl<T: 'static> SideTrackSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            current: Rc::new(NoOpState),
            depth: 0,
        }
    }
}

impl<T: 'static> StateMachine<T> {
    /// Changes the state of one side-track to the cached instance of `S` for
    /// that track, creating it on first use.
    pub fn change_side_track_state<S: State<T> + Default>(
        &mut self,
        track: impl SideTrack,
        parameter: Option<Parameter>,
    ) -> Result<(), MachineError> {
        let index = self.side_track_index(track)?;
        self.declarations.state::<S>();
        let (state, created) = self
            .side_cache
            .get_or_create((index, TypeId::of::<S>()), S::default);
        let deliver = match self.config().capability_delivery {
            CapabilityDelivery::EveryEntry => true,
            CapabilityDelivery::FirstCreation => created,
        };
        self.side_track_transition(index, state, parameter.as_ref(), deliver)
    }

    /// Changes the state of one side-track to a caller-supplied instance.
    pub fn change_side_track_state_to<S: State<T>>(
        &mut self,
        track: impl SideTrack,
        state: Rc<S>,
        parameter: Option<Parameter>,
    ) -> Result<(), MachineError> {
        let index = self.side_track_index(track)?;
        self.declarations.state::<S>();
        self.side_track_transition(index, state, parameter.as_ref(), true)
    }

    /// Returns the current state of a side-track; `NoOpState` if never set.
    pub fn side_track_state(&self, track: impl SideTrack) -> Result<&StateRef<T>, MachineError> {
        let index = self.side_track_index(track)?;
        Ok(&self.side_tracks[index].current)
    }

    /// Returns the cached instance of `S` on one side-track.
    pub fn cached_side_track_state<S: State<T>>(&self, track: impl SideTrack) -> Option<Rc<S>> {
        self.side_cache.get::<S>(&(track.index(), TypeId::of::<S>()))
    }

    pub fn side_track_count(&self) -> usize {
        self.side_tracks.len()
    }

    fn side_track_index(&self, track: impl SideTrack) -> Result<usize, MachineError> {
        let index = track.index();
        if index >= self.side_tracks.len() {
            return Err(MachineError::UnknownSideTrack {
                index,
                count: self.side_tracks.len(),
            });
        }
        Ok(index)
    }

    fn side_track_transition(
        &mut self,
        index: usize,
        next: StateRef<T>,
        parameter: Option<&Parameter>,
        deliver: bool,
    ) -> Result<(), MachineError> {
        let subject = self.subject()?;
        let previous = self.side_tracks[index].current.clone();
        let from = previous.name();
        let to = next.name();

        self.side_tracks[index].depth += 1;
        tracing::debug!(
            subject = self.subject_type(),
            track = index,
            from,
            to,
            depth = self.side_tracks[index].depth,
            "side-track changing"
        );
        if self.trace.is_enabled() {
            let subject_type = self.subject_type();
            self.trace.emit(format_args!(
                "A StateMachine<{}> side-track #{} is switching from {} to {}.",
                subject_type, index, from, to
            ));
        }
        previous.on_leaving(self, &next, &subject, parameter)?;
        self.observers.notify(&Notification::SideTrackChanging {
            track: index,
            from: &previous,
            to: &next,
        });

        self.side_tracks[index].current = next.clone();

        if deliver {
            let receiver = (*next).as_any().type_id();
            self.supply_capabilities(receiver, |c| next.on_capability_supplied(c));
        }

        next.on_entered(self, Some(&previous), &subject, parameter)?;

        if self.trace.is_enabled() {
            let subject_type = self.subject_type();
            self.trace.emit(format_args!(
                "A StateMachine<{}> side-track #{} has switched from {} to {}.",
                subject_type, index, from, to
            ));
        }
        self.side_tracks[index].depth -= 1;
        let current = self.side_tracks[index].current.clone();
        self.send_event(SideTrackChanged {
            track: index,
            from: previous.clone(),
            to: current.clone(),
        })?;
        self.observers.notify(&Notification::SideTrackChanged {
            track: index,
            from: &previous,
            to: &current,
        });
        Ok(())
    }

    /// Updates every side-track in index order. Each slot's state is read
    /// when its turn comes, so a change made earlier in the tick is seen.
    pub(crate) fn update_side_tracks(&mut self, subject: &RefCell<T>) -> Result<(), MachineError> {
        for index in 0..self.side_tracks.len() {
            let state = self.side_tracks[index].current.clone();
            state.update(self, subject)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::config::MachineConfig;
    use crate::declaration::Declaration;
    use crate::observer::{NotificationFilter, NotificationKind};
    use crate::state::{PopupState, ReceiveEvent};
    use std::cell::Cell;

    #[derive(Debug, Clone, Copy)]
    enum Layer {
        Audio,
        Camera,
        Effects,
    }

    impl SideTrack for Layer {
        const COUNT: usize = 3;

        fn index(self) -> usize {
            self as usize
        }
    }

    #[derive(Default)]
    struct Scene {
        log: Vec<String>,
    }

    fn log(subject: &RefCell<Scene>, line: impl Into<String>) {
        subject.borrow_mut().log.push(line.into());
    }

    /// Switches the effects track on its first update.
    #[derive(Default)]
    struct Playing {
        switched: Cell<bool>,
    }

    impl State<Scene> for Playing {
        fn update(
            &self,
            machine: &mut StateMachine<Scene>,
            subject: &RefCell<Scene>,
        ) -> Result<(), MachineError> {
            log(subject, "Playing.update");
            if !self.switched.replace(true) {
                machine.change_side_track_state::<Sparks>(Layer::Effects, None)?;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Sparks;

    impl State<Scene> for Sparks {
        fn update(
            &self,
            _: &mut StateMachine<Scene>,
            subject: &RefCell<Scene>,
        ) -> Result<(), MachineError> {
            log(subject, "Sparks.update");
            Ok(())
        }
    }

    /// Records side-track changes and logs on update.
    #[derive(Default)]
    struct Monitor {
        changes: RefCell<Vec<usize>>,
    }

    impl PopupState<Scene> for Monitor {
        fn declare(declaration: &mut Declaration<Scene, Self>) {
            declaration.on_event::<SideTrackChanged<Scene>>();
        }

        fn update(
            &self,
            _: &mut StateMachine<Scene>,
            subject: &RefCell<Scene>,
        ) -> Result<(), MachineError> {
            log(subject, format!("Monitor.update saw {:?}", self.changes.borrow()));
            Ok(())
        }
    }

    impl ReceiveEvent<Scene, SideTrackChanged<Scene>> for Monitor {
        fn receive_event(
            &self,
            _: &mut StateMachine<Scene>,
            subject: &RefCell<Scene>,
            event: &SideTrackChanged<Scene>,
        ) -> Result<(), MachineError> {
            log(subject, format!("Monitor.event #{}", event.track));
            self.changes.borrow_mut().push(event.track);
            Ok(())
        }
    }

    fn machine() -> (Rc<RefCell<Scene>>, StateMachine<Scene>) {
        let subject = Rc::new(RefCell::new(Scene::default()));
        let mut machine = StateMachine::with_side_tracks::<Layer>(&subject);
        machine.change_state::<Playing>(None).unwrap();
        (subject, machine)
    }

    #[test]
    fn test_slots_start_as_noop() {
        let (_subject, machine) = machine();
        assert_eq!(machine.side_track_count(), 3);
        assert!(machine.side_track_state(Layer::Audio).unwrap().is::<NoOpState>());
        assert!(StateMachine::new(&Rc::new(RefCell::new(Scene::default())))
            .side_track_state(0usize)
            .is_err());
    }

    #[test]
    fn test_popup_sees_side_track_change_before_update() {
        let (subject, mut machine) = machine();
        machine.popup_new::<Monitor>(None).unwrap();

        machine.update().unwrap();
        assert!(machine.side_track_state(Layer::Effects).unwrap().is::<Sparks>());
        assert_eq!(
            subject.borrow().log,
            vec![
                "Playing.update",
                "Monitor.event #2",
                "Sparks.update",
                "Monitor.update saw [2]"
            ]
        );
    }

    #[test]
    fn test_side_track_caches_are_per_track() {
        let (_subject, mut machine) = machine();
        machine.change_side_track_state::<Sparks>(Layer::Audio, None).unwrap();
        machine.change_side_track_state::<Sparks>(Layer::Camera, None).unwrap();
        machine.change_side_track_state::<NoOpState>(Layer::Audio, None).unwrap();
        machine.change_side_track_state::<Sparks>(Layer::Audio, None).unwrap();

        let audio = machine.cached_side_track_state::<Sparks>(Layer::Audio).unwrap();
        let camera = machine.cached_side_track_state::<Sparks>(Layer::Camera).unwrap();
        assert!(!Rc::ptr_eq(&audio, &camera));
        assert!(machine.cached_state::<Sparks>().is_none());

        let current = machine.side_track_state(Layer::Audio).unwrap().clone();
        let current_sparks = current.downcast_ref::<Sparks>().unwrap() as *const Sparks;
        assert_eq!(current_sparks, Rc::as_ptr(&audio));
    }

    #[test]
    fn test_unknown_side_track() {
        let (_subject, mut machine) = machine();
        let err = machine
            .change_side_track_state::<Sparks>(7usize, None)
            .unwrap_err();
        assert!(matches!(err, MachineError::UnknownSideTrack { index: 7, count: 3 }));
    }

    #[test]
    fn test_observers_see_track_index() {
        let (_subject, mut machine) = machine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let captured = seen.clone();
        machine.subscribe(
            NotificationFilter::only([
                NotificationKind::SideTrackChanging,
                NotificationKind::SideTrackChanged,
            ]),
            move |n| captured.borrow_mut().push(format!("{n:?}")),
        );

        machine.change_side_track_state::<Sparks>(Layer::Camera, None).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![
                "SideTrackChanging(#1: NoOpState -> Sparks)",
                "SideTrackChanged(#1: NoOpState -> Sparks)"
            ]
        );
    }

    /// Hands the track over to `Sparks` from its entry hook.
    #[derive(Default)]
    struct Ignite;

    impl State<Scene> for Ignite {
        fn on_entered(
            &self,
            machine: &mut StateMachine<Scene>,
            _previous: Option<&StateRef<Scene>>,
            _subject: &RefCell<Scene>,
            _parameter: Option<&Parameter>,
        ) -> Result<(), MachineError> {
            machine.change_side_track_state::<Sparks>(Layer::Effects, None)
        }

        fn update(
            &self,
            _: &mut StateMachine<Scene>,
            _: &RefCell<Scene>,
        ) -> Result<(), MachineError> {
            Ok(())
        }
    }

    /// Logs the target named by every side-track change it receives.
    #[derive(Default)]
    struct TargetLog;

    impl PopupState<Scene> for TargetLog {
        fn declare(declaration: &mut Declaration<Scene, Self>) {
            declaration.on_event::<SideTrackChanged<Scene>>();
        }

        fn update(
            &self,
            _: &mut StateMachine<Scene>,
            _: &RefCell<Scene>,
        ) -> Result<(), MachineError> {
            Ok(())
        }
    }

    impl ReceiveEvent<Scene, SideTrackChanged<Scene>> for TargetLog {
        fn receive_event(
            &self,
            _: &mut StateMachine<Scene>,
            subject: &RefCell<Scene>,
            event: &SideTrackChanged<Scene>,
        ) -> Result<(), MachineError> {
            log(subject, event.to.name());
            Ok(())
        }
    }

    #[test]
    fn test_forwarded_side_track_change_reports_current_state() {
        let (subject, mut machine) = machine();
        machine.popup_new::<TargetLog>(None).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let captured = seen.clone();
        machine.subscribe(
            NotificationFilter::only([NotificationKind::SideTrackChanged]),
            move |n| captured.borrow_mut().push(format!("{n:?}")),
        );

        machine
            .change_side_track_state::<Ignite>(Layer::Effects, None)
            .unwrap();

        let current = machine.side_track_state(Layer::Effects).unwrap();
        assert!(current.is::<Sparks>());
        assert_eq!(subject.borrow().log, vec!["Sparks", "Sparks"]);
        assert_eq!(
            *seen.borrow(),
            vec![
                "SideTrackChanged(#2: Ignite -> Sparks)",
                "SideTrackChanged(#2: NoOpState -> Sparks)"
            ]
        );
    }

    struct Volume(u8);

    #[derive(Default)]
    struct Mixer {
        volume: Cell<u8>,
        deliveries: Cell<u32>,
    }

    impl State<Scene> for Mixer {
        fn declare(declaration: &mut Declaration<Scene, Self>) {
            declaration.needs::<Volume>();
        }

        fn update(
            &self,
            _: &mut StateMachine<Scene>,
            _: &RefCell<Scene>,
        ) -> Result<(), MachineError> {
            Ok(())
        }

        fn on_capability_supplied(&self, capability: &Capability) {
            if let Some(volume) = capability.get::<Volume>() {
                self.volume.set(volume.0);
                self.deliveries.set(self.deliveries.get() + 1);
            }
        }
    }

    #[test]
    fn test_capability_delivery_modes() {
        let subject = Rc::new(RefCell::new(Scene::default()));

        let mut every = StateMachine::with_side_tracks::<Layer>(&subject);
        every.set_component(Rc::new(Volume(3)));
        every.change_side_track_state::<Mixer>(Layer::Audio, None).unwrap();
        every.set_component(Rc::new(Volume(9)));
        every.change_side_track_state::<NoOpState>(Layer::Audio, None).unwrap();
        every.change_side_track_state::<Mixer>(Layer::Audio, None).unwrap();
        let mixer = every.cached_side_track_state::<Mixer>(Layer::Audio).unwrap();
        assert_eq!(mixer.volume.get(), 9);
        assert_eq!(mixer.deliveries.get(), 2);

        let config =
            MachineConfig::default().with_capability_delivery(CapabilityDelivery::FirstCreation);
        let mut once = StateMachine::with_side_tracks_and_config::<Layer>(&subject, config);
        once.set_component(Rc::new(Volume(3)));
        once.change_side_track_state::<Mixer>(Layer::Audio, None).unwrap();
        once.set_component(Rc::new(Volume(9)));
        once.change_side_track_state::<NoOpState>(Layer::Audio, None).unwrap();
        once.change_side_track_state::<Mixer>(Layer::Audio, None).unwrap();
        let mixer = once.cached_side_track_state::<Mixer>(Layer::Audio).unwrap();
        assert_eq!(mixer.volume.get(), 3);
        assert_eq!(mixer.deliveries.get(), 1);
    }
}

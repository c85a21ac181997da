//! Primary track and transition protocol.
//!
//! A [`StateMachine`] drives one subject. It owns the current main state,
//! the side-track slots, the popup registry, the capability map and the
//! per-track caches; everything is mutated only from the thread calling
//! [`StateMachine::update`].

use crate::cache::StateCache;
use crate::capability::{Capability, CapabilityMap};
use crate::config::{CapabilityDelivery, MachineConfig};
use crate::declaration::DeclarationRegistry;
use crate::error::MachineError;
use crate::event::{MachineSignal, MainStateChanged};
use crate::observer::{Notification, NotificationFilter, Observers, SubscriptionId};
use crate::parameter::Parameter;
use crate::popup::PopupRegistry;
use crate::side_track::{SideTrack, SideTrackSlot};
use crate::state::{State, StateRef};
use crate::trace::{short_type_name, TraceSink};
use std::any::TypeId;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Behavior runtime bound to one subject.
pub struct StateMachine<T: 'static> {
    /// Non-owning handle to the subject.
    subject: Weak<RefCell<T>>,
    subject_type: &'static str,
    config: MachineConfig,

    /// Current main state; `None` until the first transition.
    current: Option<StateRef<T>>,
    /// Reentrancy depth of the main track.
    depth: usize,
    cache: StateCache<TypeId, T>,

    pub(crate) side_tracks: Vec<SideTrackSlot<T>>,
    pub(crate) side_cache: StateCache<(usize, TypeId), T>,
    pub(crate) popups: PopupRegistry<T>,

    capabilities: CapabilityMap,
    pub(crate) declarations: DeclarationRegistry<T>,
    pub(crate) observers: Observers<T>,
    pub(crate) trace: TraceSink,

    paused: bool,
    updating: bool,
}

impl<T: 'static> StateMachine<T> {
    /// Creates a machine with no side-tracks and no active state.
    pub fn new(subject: &Rc<RefCell<T>>) -> Self {
        Self::build(subject, MachineConfig::default(), 0)
    }

    pub fn with_config(subject: &Rc<RefCell<T>>, config: MachineConfig) -> Self {
        Self::build(subject, config, 0)
    }

    /// Creates a machine with one side-track slot per value of `K`.
    pub fn with_side_tracks<K: SideTrack>(subject: &Rc<RefCell<T>>) -> Self {
        Self::build(subject, MachineConfig::default(), K::COUNT)
    }

    pub fn with_side_tracks_and_config<K: SideTrack>(
        subject: &Rc<RefCell<T>>,
        config: MachineConfig,
    ) -> Self {
        Self::build(subject, config, K::COUNT)
    }

    fn build(subject: &Rc<RefCell<T>>, config: MachineConfig, side_tracks: usize) -> Self {
        let subject_type = short_type_name(std::any::type_name::<T>());
        if side_tracks > config.side_track_warn_threshold {
            tracing::warn!(
                subject = subject_type,
                side_tracks,
                threshold = config.side_track_warn_threshold,
                "large side-track domain: one slot is allocated per index"
            );
        }

        Self {
            subject: Rc::downgrade(subject),
            subject_type,
            paused: config.start_paused,
            config,
            current: None,
            depth: 0,
            cache: StateCache::default(),
            side_tracks: (0..side_tracks).map(|_| SideTrackSlot::new()).collect(),
            side_cache: StateCache::default(),
            popups: PopupRegistry::default(),
            capabilities: CapabilityMap::new(),
            declarations: DeclarationRegistry::default(),
            observers: Observers::default(),
            trace: TraceSink::default(),
            updating: false,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the subject, or `NullSubject` if its owner dropped it.
    pub fn subject(&self) -> Result<Rc<RefCell<T>>, MachineError> {
        self.subject.upgrade().ok_or(MachineError::NullSubject)
    }

    pub fn subject_type(&self) -> &'static str {
        self.subject_type
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn current_state(&self) -> Option<&StateRef<T>> {
        self.current.as_ref()
    }

    /// Returns true if the current main state is an `S`.
    pub fn is_current<S: State<T>>(&self) -> bool {
        self.current.as_ref().map(|s| s.is::<S>()).unwrap_or(false)
    }

    /// Returns the cached main-track instance of `S`, if one was created.
    pub fn cached_state<S: State<T>>(&self) -> Option<Rc<S>> {
        self.cache.get::<S>(&TypeId::of::<S>())
    }

    /// Number of instances in the main-track cache.
    pub fn cached_state_count(&self) -> usize {
        self.cache.len()
    }

    pub fn transition_depth(&self) -> usize {
        self.depth
    }

    /// True while any track is between the pre- and post-phase of a transition.
    pub fn is_changing_state(&self) -> bool {
        self.depth > 0 || self.side_tracks.iter().any(|slot| slot.depth > 0)
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Binds `value` as capability `C`, replacing any previous binding.
    pub fn set_component<C: ?Sized + 'static>(&mut self, value: Rc<C>) {
        if let Some(previous) = self.capabilities.set(value) {
            tracing::trace!(capability = previous.key().name(), "capability rebound");
        }
    }

    pub fn component<C: ?Sized + 'static>(&self) -> Option<Rc<C>> {
        self.capabilities.get::<C>()
    }

    /// Delivers the capabilities `state` declared, one callback each.
    pub(crate) fn supply_capabilities<F>(&self, receiver: TypeId, mut supply: F) -> usize
    where
        F: FnMut(&Capability),
    {
        let Some(info) = self.declarations.get(receiver) else {
            return 0;
        };
        let resolved = self.capabilities.resolve(&info.demand);
        for capability in &resolved {
            supply(capability);
        }
        if !resolved.is_empty() {
            tracing::trace!(
                receiver = info.name,
                delivered = resolved.len(),
                "capabilities supplied"
            );
        }
        resolved.len()
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Subscribes to transition and popup notifications.
    pub fn subscribe<F>(&mut self, filter: NotificationFilter, callback: F) -> SubscriptionId
    where
        F: FnMut(&Notification<'_, T>) + 'static,
    {
        self.observers.subscribe(filter, callback)
    }

    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Installs a formatted trace sink. Lines are formatted only while a sink
    /// is installed.
    pub fn set_trace_sink<F>(&mut self, sink: F)
    where
        F: FnMut(&str) + 'static,
    {
        self.trace.set(Box::new(sink));
    }

    pub fn clear_trace_sink(&mut self) {
        self.trace.clear();
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Changes the main state to the cached instance of `S`, creating and
    /// caching it on first use.
    pub fn change_state<S: State<T> + Default>(
        &mut self,
        parameter: Option<Parameter>,
    ) -> Result<(), MachineError> {
        self.declarations.state::<S>();
        let (state, created) = self.cache.get_or_create(TypeId::of::<S>(), S::default);
        let deliver = match self.config.capability_delivery {
            CapabilityDelivery::EveryEntry => true,
            CapabilityDelivery::FirstCreation => created,
        };
        self.transition(state, parameter.as_ref(), deliver)
    }

    /// Changes the main state to a caller-supplied instance. Capabilities are
    /// always delivered on this path.
    pub fn change_state_to<S: State<T>>(
        &mut self,
        state: Rc<S>,
        parameter: Option<Parameter>,
    ) -> Result<(), MachineError> {
        self.declarations.state::<S>();
        self.transition(state, parameter.as_ref(), true)
    }

    /// Places a caller-built instance in the main-track cache so later
    /// `change_state::<S>()` calls reuse it.
    pub fn cache_state<S: State<T>>(&mut self, state: Rc<S>) {
        self.declarations.state::<S>();
        if self.config.capability_delivery == CapabilityDelivery::FirstCreation {
            self.supply_capabilities(TypeId::of::<S>(), |c| state.on_capability_supplied(c));
        }
        self.cache.insert(TypeId::of::<S>(), state);
    }

    fn transition(
        &mut self,
        next: StateRef<T>,
        parameter: Option<&Parameter>,
        deliver: bool,
    ) -> Result<(), MachineError> {
        let subject = self.subject()?;
        let previous = self.current.clone();
        let from = previous.as_ref().map(|s| s.name()).unwrap_or("None");
        let to = next.name();

        // Pre-phase
        self.depth += 1;
        tracing::debug!(
            subject = self.subject_type,
            from,
            to,
            depth = self.depth,
            "state changing"
        );
        if self.trace.is_enabled() {
            self.trace.emit(format_args!(
                "A StateMachine<{}> is switching from {} to {}.",
                self.subject_type, from, to
            ));
        }
        if let Some(previous) = &previous {
            previous.on_leaving(self, &next, &subject, parameter)?;
        }
        self.observers.notify(&Notification::StateChanging {
            from: previous.as_ref(),
            to: &next,
        });

        // Swap
        self.current = Some(next.clone());

        if deliver {
            let receiver = (*next).as_any().type_id();
            self.supply_capabilities(receiver, |c| next.on_capability_supplied(c));
        }

        next.on_entered(self, previous.as_ref(), &subject, parameter)?;

        // Post-phase
        if self.trace.is_enabled() {
            self.trace.emit(format_args!(
                "A StateMachine<{}> has switched from {} to {}.",
                self.subject_type, from, to
            ));
        }
        self.depth -= 1;
        // A nested change may have replaced `next` already.
        let current = self.current.clone().unwrap_or(next);
        self.send_event(MainStateChanged {
            from: previous.clone(),
            to: current.clone(),
        })?;
        self.observers.notify(&Notification::StateChanged {
            from: previous.as_ref(),
            to: &current,
        });
        Ok(())
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advances one tick: main state, then side-tracks in index order, then
    /// popups in list order.
    pub fn update(&mut self) -> Result<(), MachineError> {
        self.check_transitions_settled()?;
        if self.paused {
            return Ok(());
        }

        let subject = self.subject()?;
        let current = self.current.clone().ok_or(MachineError::InvalidState)?;

        self.updating = true;
        let result = self.update_tracks(&current, &subject);
        self.updating = false;
        result
    }

    fn update_tracks(
        &mut self,
        current: &StateRef<T>,
        subject: &RefCell<T>,
    ) -> Result<(), MachineError> {
        current.update(self, subject)?;
        self.update_side_tracks(subject)?;
        self.update_popups(subject)
    }

    fn check_transitions_settled(&self) -> Result<(), MachineError> {
        let depth = self.depth + self.side_tracks.iter().map(|slot| slot.depth).sum::<usize>();
        if depth > 0 {
            tracing::error!(
                subject = self.subject_type,
                depth,
                "update entered with an unfinished state change"
            );
            return Err(MachineError::UnterminatedTransition { depth });
        }
        Ok(())
    }

    /// Pauses or resumes updates. A change of the flag is broadcast as a
    /// [`MachineSignal`].
    pub fn set_paused(&mut self, paused: bool) -> Result<(), MachineError> {
        if self.paused == paused {
            return Ok(());
        }
        self.paused = paused;
        tracing::debug!(subject = self.subject_type, paused, "update pause toggled");
        let signal = if paused {
            MachineSignal::Paused
        } else {
            MachineSignal::Resumed
        };
        self.send_event(signal).map(|_| ())
    }
}

impl<T: 'static> std::fmt::Debug for StateMachine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("subject", &self.subject_type)
            .field("current", &self.current.as_ref().map(|s| s.name()))
            .field("depth", &self.depth)
            .field("side_tracks", &self.side_tracks.len())
            .field("popups", &self.popups.len())
            .field("capabilities", &self.capabilities)
            .field("declared_types", &self.declarations.len())
            .field("observers", &self.observers.len())
            .field("paused", &self.paused)
            .finish()
    }
}

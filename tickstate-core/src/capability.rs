//! Capability registry.
//!
//! The owner of a machine binds dependency objects by the type identity of
//! the interface they implement (usually a `dyn Trait`). When a state is
//! entered, the machine delivers the capabilities that state declared
//! through [`Declaration`](crate::Declaration).

use crate::trace::short_type_name;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Type identity of a capability interface.
#[derive(Clone, Copy)]
pub struct CapabilityKey {
    id: TypeId,
    name: &'static str,
}

impl CapabilityKey {
    /// Key for the capability interface `C`.
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: short_type_name(std::any::type_name::<C>()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if this key identifies `C`.
    pub fn is<C: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<C>()
    }
}

impl PartialEq for CapabilityKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CapabilityKey {}

impl Hash for CapabilityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A bound capability: a key plus the shared implementation object.
#[derive(Clone)]
pub struct Capability {
    key: CapabilityKey,
    // Holds an `Rc<C>` so unsized interfaces survive type erasure.
    value: Rc<dyn Any>,
}

impl Capability {
    pub fn new<C: ?Sized + 'static>(value: Rc<C>) -> Self {
        Self {
            key: CapabilityKey::of::<C>(),
            value: Rc::new(value),
        }
    }

    pub fn key(&self) -> CapabilityKey {
        self.key
    }

    /// Returns the implementation if this capability is bound as `C`.
    pub fn get<C: ?Sized + 'static>(&self) -> Option<Rc<C>> {
        self.value.downcast_ref::<Rc<C>>().cloned()
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability").field("key", &self.key).finish()
    }
}

/// Which capabilities a state type asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CapabilityDemand {
    /// The state does not take capabilities.
    #[default]
    Nothing,
    /// Only these keys, in declaration order.
    Selective(Vec<CapabilityKey>),
    /// Every capability currently bound.
    All,
}

/// Capability bindings owned by one machine.
#[derive(Default)]
pub struct CapabilityMap {
    entries: HashMap<CapabilityKey, Capability>,
}

impl CapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` as `C`, returning the previous binding if any.
    pub fn set<C: ?Sized + 'static>(&mut self, value: Rc<C>) -> Option<Capability> {
        let capability = Capability::new(value);
        self.entries.insert(capability.key, capability)
    }

    pub fn get<C: ?Sized + 'static>(&self) -> Option<Rc<C>> {
        self.entries
            .get(&CapabilityKey::of::<C>())
            .and_then(|capability| capability.get::<C>())
    }

    pub fn remove<C: ?Sized + 'static>(&mut self) -> Option<Capability> {
        self.entries.remove(&CapabilityKey::of::<C>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a demand against the current bindings. Selective keys with
    /// no binding are skipped.
    pub fn resolve(&self, demand: &CapabilityDemand) -> Vec<Capability> {
        match demand {
            CapabilityDemand::Nothing => Vec::new(),
            CapabilityDemand::Selective(keys) => keys
                .iter()
                .filter_map(|key| self.entries.get(key).cloned())
                .collect(),
            CapabilityDemand::All => self.entries.values().cloned().collect(),
        }
    }
}

impl fmt::Debug for CapabilityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

//! Observer subscriptions for transitions and popup lifecycle.
//!
//! Observers are plain callbacks; unlike event receivers they cannot touch
//! the machine, so notifying them never re-enters the protocol.

use crate::popup::PopupHandle;
use crate::state::{PopupRef, StateRef};
use std::fmt;
use uuid::Uuid;

/// Identifies one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Kind of notification, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    StateChanging,
    StateChanged,
    SideTrackChanging,
    SideTrackChanged,
    PopupStarted,
    PopupEnded,
}

/// A notification delivered to observers.
pub enum Notification<'a, T: 'static> {
    StateChanging {
        from: Option<&'a StateRef<T>>,
        to: &'a StateRef<T>,
    },
    StateChanged {
        from: Option<&'a StateRef<T>>,
        to: &'a StateRef<T>,
    },
    SideTrackChanging {
        track: usize,
        from: &'a StateRef<T>,
        to: &'a StateRef<T>,
    },
    SideTrackChanged {
        track: usize,
        from: &'a StateRef<T>,
        to: &'a StateRef<T>,
    },
    PopupStarted {
        handle: PopupHandle,
        popup: &'a PopupRef<T>,
    },
    PopupEnded {
        handle: PopupHandle,
        popup: &'a PopupRef<T>,
    },
}

impl<T: 'static> Notification<'_, T> {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::StateChanging { .. } => NotificationKind::StateChanging,
            Notification::StateChanged { .. } => NotificationKind::StateChanged,
            Notification::SideTrackChanging { .. } => NotificationKind::SideTrackChanging,
            Notification::SideTrackChanged { .. } => NotificationKind::SideTrackChanged,
            Notification::PopupStarted { .. } => NotificationKind::PopupStarted,
            Notification::PopupEnded { .. } => NotificationKind::PopupEnded,
        }
    }
}

impl<T: 'static> fmt::Debug for Notification<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |state: Option<&StateRef<T>>| state.map(|s| s.name()).unwrap_or("None");
        match self {
            Notification::StateChanging { from, to } | Notification::StateChanged { from, to } => {
                write!(f, "{:?}({} -> {})", self.kind(), name(*from), to.name())
            }
            Notification::SideTrackChanging { track, from, to }
            | Notification::SideTrackChanged { track, from, to } => write!(
                f,
                "{:?}(#{}: {} -> {})",
                self.kind(),
                track,
                from.name(),
                to.name()
            ),
            Notification::PopupStarted { handle, popup }
            | Notification::PopupEnded { handle, popup } => {
                write!(f, "{:?}({} {})", self.kind(), popup.name(), handle)
            }
        }
    }
}

/// Filter for subscriptions.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    /// Only these kinds (empty = all).
    pub kinds: Vec<NotificationKind>,
}

impl NotificationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(kinds: impl IntoIterator<Item = NotificationKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Returns true if a notification of `kind` passes this filter.
    pub fn matches(&self, kind: NotificationKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

type Callback<T> = Box<dyn FnMut(&Notification<'_, T>)>;

struct Subscription<T: 'static> {
    id: SubscriptionId,
    filter: NotificationFilter,
    callback: Callback<T>,
}

/// Subscriptions of one machine, notified in subscription order.
pub(crate) struct Observers<T: 'static> {
    subscriptions: Vec<Subscription<T>>,
}

impl<T: 'static> Default for Observers<T> {
    fn default() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }
}

impl<T: 'static> Observers<T> {
    pub(crate) fn subscribe<F>(&mut self, filter: NotificationFilter, callback: F) -> SubscriptionId
    where
        F: FnMut(&Notification<'_, T>) + 'static,
    {
        let id = SubscriptionId::new();
        self.subscriptions.push(Subscription {
            id,
            filter,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns true if the subscription was found and removed.
    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub(crate) fn notify(&mut self, notification: &Notification<'_, T>) {
        let kind = notification.kind();
        for subscription in &mut self.subscriptions {
            if subscription.filter.matches(kind) {
                (subscription.callback)(notification);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NoOpState;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_filter_matches() {
        let filter = NotificationFilter::only([NotificationKind::PopupStarted]);
        assert!(filter.matches(NotificationKind::PopupStarted));
        assert!(!filter.matches(NotificationKind::StateChanged));
        assert!(NotificationFilter::all().matches(NotificationKind::SideTrackChanged));
    }

    #[test]
    fn test_notify_respects_filter_and_unsubscribe() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::<()>::default();

        let captured = seen.clone();
        let id = observers.subscribe(
            NotificationFilter::only([NotificationKind::StateChanged]),
            move |n| captured.borrow_mut().push(n.kind()),
        );
        assert!(id.to_string().starts_with("sub-"));

        let to: StateRef<()> = Rc::new(NoOpState);
        observers.notify(&Notification::StateChanging { from: None, to: &to });
        observers.notify(&Notification::StateChanged { from: None, to: &to });
        assert_eq!(*seen.borrow(), vec![NotificationKind::StateChanged]);

        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        observers.notify(&Notification::StateChanged { from: None, to: &to });
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(observers.len(), 0);
    }

    #[test]
    fn test_debug_format() {
        let to: StateRef<()> = Rc::new(NoOpState);
        let notification = Notification::SideTrackChanged {
            track: 2,
            from: &to,
            to: &to,
        };
        assert_eq!(
            format!("{notification:?}"),
            "SideTrackChanged(#2: NoOpState -> NoOpState)"
        );
    }
}

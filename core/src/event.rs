//! Type-keyed, two-phase, cancelable, bubbling event dispatch.
//!
//! An [`EventTarget`] owns per-type subscriber lists and an optional
//! definition per published type. [`EventTarget::fire`] runs the main
//! phase locally, lets the event bubble through the target graph, and then
//! either invokes the default action followed by the after phase, or the
//! cancelled action. Cancellation gates the default/after behavior only;
//! it does not stop propagation.
//!
//! Dispatch is fully synchronous and reentrant: a listener may subscribe,
//! unsubscribe, or fire further events on any target, including the one
//! currently dispatching. Subscriber lists are snapshotted before
//! iteration and entries are tombstoned on removal, so structural changes
//! mid-dispatch neither skip nor double-invoke anyone.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::{Rc, Weak};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::value::Value;

/// Prefix that turns a main-phase type into its after-phase counterpart.
pub const AFTER: &str = "after:";

/// Returns the after-phase event type for `ty`.
#[must_use]
pub fn after_type(ty: &str) -> String {
    format!("{AFTER}{ty}")
}

/// Named payload entries carried by a [`CustomEvent`].
pub type EventData = BTreeMap<String, Value>;

/// The mutable value threaded through one `fire()` call.
///
/// Listeners receive `&mut CustomEvent` and may cancel it, stop its
/// bubbling, or rewrite payload entries for listeners (and default
/// actions) that run later. An event is created fresh per `fire()` and
/// never reused.
pub struct CustomEvent {
    ty: String,
    cancelable: bool,
    bubbles: bool,
    cancelled: bool,
    bubbling_stopped: bool,
    original_target: Option<EventTarget>,
    data: EventData,
}

impl CustomEvent {
    pub(crate) fn new(
        ty: String,
        cancelable: bool,
        bubbles: bool,
        data: EventData,
        original_target: Option<EventTarget>,
    ) -> Self {
        Self {
            ty,
            cancelable,
            bubbles,
            cancelled: false,
            bubbling_stopped: false,
            original_target,
            data,
        }
    }

    /// The event type this event was fired as.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.ty
    }

    /// Whether listeners may cancel this event.
    #[must_use]
    pub const fn cancelable(&self) -> bool {
        self.cancelable
    }

    /// Whether this event propagates to bubble targets.
    #[must_use]
    pub const fn bubbles(&self) -> bool {
        self.bubbles
    }

    /// Whether a listener has cancelled this event.
    #[must_use]
    pub const fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether a listener has stopped this event from bubbling further.
    #[must_use]
    pub const fn bubbling_stopped(&self) -> bool {
        self.bubbling_stopped
    }

    /// The target the event was originally fired on, regardless of which
    /// target in the bubble graph is currently dispatching it.
    #[must_use]
    pub const fn original_target(&self) -> Option<&EventTarget> {
        self.original_target.as_ref()
    }

    /// Cancels the event. A no-op if the event is not cancelable.
    pub const fn cancel(&mut self) {
        if self.cancelable {
            self.cancelled = true;
        }
    }

    /// Stops the event from reaching any further bubble targets.
    pub const fn stop_bubbling(&mut self) {
        self.bubbling_stopped = true;
    }

    /// Reads a payload entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Writes a payload entry, visible to everything that runs after the
    /// current listener.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.data.insert(key.to_string(), value.into());
    }

    /// Borrows the full payload map.
    #[must_use]
    pub const fn data(&self) -> &EventData {
        &self.data
    }

    pub(crate) fn take_data(&mut self) -> EventData {
        core::mem::take(&mut self.data)
    }
}

impl fmt::Debug for CustomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomEvent")
            .field("ty", &self.ty)
            .field("cancelable", &self.cancelable)
            .field("bubbles", &self.bubbles)
            .field("cancelled", &self.cancelled)
            .field("bubbling_stopped", &self.bubbling_stopped)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// A cheap-clone handle to an event listener.
///
/// Subscriptions are deduplicated by listener identity: subscribing a
/// clone of an already-subscribed `Listener` to the same type returns the
/// existing subscription. Two closures are always distinct listeners,
/// even if textually identical.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&mut CustomEvent)>);

impl Listener {
    /// Wraps a callback.
    pub fn new(callback: impl Fn(&mut CustomEvent) + 'static) -> Self {
        Self(Rc::new(callback))
    }

    /// Whether two handles refer to the same callback.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn call(&self, event: &mut CustomEvent) {
        (self.0)(event);
    }
}

impl<F: Fn(&mut CustomEvent) + 'static> From<F> for Listener {
    fn from(callback: F) -> Self {
        Self::new(callback)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Listener")
    }
}

type ActionFn = Rc<dyn Fn(&mut CustomEvent)>;

/// Per-type event metadata registered with [`EventTarget::publish`].
///
/// Types that are fired without ever being published behave as
/// `EventConfig::new()`: cancelable, bubbling, no default or cancelled
/// action.
#[derive(Clone)]
pub struct EventConfig {
    cancelable: bool,
    bubbles: bool,
    default_fn: Option<ActionFn>,
    cancelled_fn: Option<ActionFn>,
}

impl EventConfig {
    /// Creates the default configuration: cancelable and bubbling.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cancelable: true,
            bubbles: true,
            default_fn: None,
            cancelled_fn: None,
        }
    }

    /// Sets whether listeners may cancel events of this type.
    #[must_use]
    pub fn cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }

    /// Sets whether events of this type reach bubble targets.
    #[must_use]
    pub fn bubbles(mut self, bubbles: bool) -> Self {
        self.bubbles = bubbles;
        self
    }

    /// Action to run after the main phase when the event was not
    /// cancelled, before the after phase is dispatched.
    #[must_use]
    pub fn default_fn(mut self, action: impl Fn(&mut CustomEvent) + 'static) -> Self {
        self.default_fn = Some(Rc::new(action));
        self
    }

    /// Action to run when the event was cancelled. The after phase is
    /// skipped entirely in that case.
    #[must_use]
    pub fn cancelled_fn(mut self, action: impl Fn(&mut CustomEvent) + 'static) -> Self {
        self.cancelled_fn = Some(Rc::new(action));
        self
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventConfig")
            .field("cancelable", &self.cancelable)
            .field("bubbles", &self.bubbles)
            .field("default_fn", &self.default_fn.is_some())
            .field("cancelled_fn", &self.cancelled_fn.is_some())
            .finish()
    }
}

struct SubEntry {
    ty: String,
    listener: Listener,
    once: bool,
    active: Cell<bool>,
}

/// A handle to one `(type, listener)` registration.
///
/// Dropping the handle does not unsubscribe; call
/// [`Subscription::unsubscribe`]. Unsubscribing removes both the main-
/// and after-phase registrations of the listener for the subscribed type.
#[derive(Clone)]
pub struct Subscription {
    target: Weak<TargetInner>,
    entry: Rc<SubEntry>,
}

impl Subscription {
    /// The event type this subscription listens for.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.entry.ty
    }

    /// Whether the subscription is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.entry.active.get()
    }

    /// Removes the subscription. Safe to call during dispatch; a removed
    /// listener is not invoked even if the current snapshot still holds
    /// it.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.target.upgrade() {
            inner.unsubscribe(&self.entry.ty, &self.entry.listener);
        } else {
            self.entry.active.set(false);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("ty", &self.entry.ty)
            .field("once", &self.entry.once)
            .field("active", &self.entry.active.get())
            .finish()
    }
}

#[derive(Default)]
struct TargetInner {
    definitions: RefCell<BTreeMap<String, EventConfig>>,
    subscriptions: RefCell<BTreeMap<String, Vec<Rc<SubEntry>>>>,
    bubble_targets: RefCell<Vec<Weak<TargetInner>>>,
}

impl TargetInner {
    /// Removes every subscription of `listener` for `ty` and its
    /// after-phase counterpart, tombstoning the entries so an in-flight
    /// dispatch skips them.
    fn unsubscribe(&self, ty: &str, listener: &Listener) {
        let mut subs = self.subscriptions.borrow_mut();
        for key in [ty.to_string(), after_type(ty)] {
            if let Some(list) = subs.get_mut(&key) {
                list.retain(|entry| {
                    if entry.listener.ptr_eq(listener) {
                        entry.active.set(false);
                        false
                    } else {
                        true
                    }
                });
            }
        }
    }

    fn remove_entry(&self, entry: &Rc<SubEntry>) {
        entry.active.set(false);
        if let Some(list) = self.subscriptions.borrow_mut().get_mut(&entry.ty) {
            list.retain(|candidate| !Rc::ptr_eq(candidate, entry));
        }
    }
}

/// An event dispatcher: the publish/subscribe half of the component model.
///
/// `EventTarget` is a cheap-clone handle; clones share subscriber lists,
/// definitions, and bubble links. Bubble links hold the other target
/// weakly, so linking never keeps a dispatcher alive.
#[derive(Clone, Default)]
pub struct EventTarget {
    inner: Rc<TargetInner>,
}

impl EventTarget {
    /// Creates a dispatcher with no subscriptions or definitions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether two handles refer to the same dispatcher.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers the definition used by subsequent [`fire`](Self::fire)
    /// calls for `ty`.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateEventDefinition`] if `ty` was already published
    /// on this target.
    pub fn publish(&self, ty: &str, config: EventConfig) -> Result<()> {
        let mut definitions = self.inner.definitions.borrow_mut();
        if definitions.contains_key(ty) {
            return Err(Error::DuplicateEventDefinition(ty.to_string()));
        }
        definitions.insert(ty.to_string(), config);
        Ok(())
    }

    /// Subscribes a main-phase listener. Re-subscribing the same
    /// `Listener` handle to the same type returns the existing
    /// subscription.
    pub fn on(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.subscribe(ty, listener.into(), false)
    }

    /// Subscribes a main-phase listener that unsubscribes itself after
    /// its first invocation.
    pub fn once(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.subscribe(ty, listener.into(), true)
    }

    /// Subscribes an after-phase listener: it runs only when the main
    /// phase completed without cancellation.
    pub fn after(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.subscribe(&after_type(ty), listener.into(), false)
    }

    /// After-phase counterpart of [`once`](Self::once).
    pub fn once_after(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.subscribe(&after_type(ty), listener.into(), true)
    }

    /// Removes the main- and after-phase subscriptions of `listener` for
    /// `ty`.
    pub fn detach(&self, ty: &str, listener: &Listener) {
        self.inner.unsubscribe(ty, listener);
    }

    /// Registers `target` to re-receive events fired on this dispatcher
    /// after local dispatch. Adding a target twice is a no-op.
    pub fn add_bubble_target(&self, target: &Self) {
        let mut targets = self.inner.bubble_targets.borrow_mut();
        let present = targets
            .iter()
            .any(|candidate| candidate.as_ptr() == Rc::as_ptr(&target.inner));
        if !present {
            targets.push(Rc::downgrade(&target.inner));
        }
    }

    /// Unregisters a bubble target, dropping dead links along the way.
    pub fn remove_bubble_target(&self, target: &Self) {
        self.inner.bubble_targets.borrow_mut().retain(|candidate| {
            candidate.strong_count() > 0 && candidate.as_ptr() != Rc::as_ptr(&target.inner)
        });
    }

    /// Fires an event with an empty payload. See
    /// [`fire_with`](Self::fire_with).
    pub fn fire(&self, ty: &str) -> bool {
        self.fire_with(ty, EventData::new())
    }

    /// Fires an event of type `ty` carrying `data`.
    ///
    /// Main-phase listeners run on this target in registration order,
    /// then on every bubble target (even if a listener cancelled the
    /// event locally). If the event survives the main phase, the
    /// definition's default action runs and the after phase is
    /// dispatched; otherwise the cancelled action runs and the after
    /// phase is skipped.
    ///
    /// Firing a type that was never published is not an error; it uses
    /// the default definition.
    ///
    /// Returns `true` if the event was not cancelled.
    pub fn fire_with(&self, ty: &str, data: EventData) -> bool {
        let definition = self.definition(ty);
        let mut event = CustomEvent::new(
            ty.to_string(),
            definition.cancelable,
            definition.bubbles,
            data,
            Some(self.clone()),
        );

        trace!(event = ty, "dispatching");
        self.fire_event(&mut event);

        if event.cancelled() {
            if let Some(action) = &definition.cancelled_fn {
                action(&mut event);
            }
            return false;
        }

        if let Some(action) = &definition.default_fn {
            action(&mut event);
        }

        let mut after = CustomEvent::new(
            after_type(ty),
            false,
            definition.bubbles,
            event.take_data(),
            Some(self.clone()),
        );
        self.fire_event(&mut after);
        true
    }

    /// Dispatches an already-built event: local main-phase listeners,
    /// then the bubble graph. Used by [`fire_with`](Self::fire_with) and
    /// by the attribute layer, which crafts change events directly.
    pub(crate) fn fire_event(&self, event: &mut CustomEvent) {
        let mut visited = Vec::new();
        self.dispatch_into(event, &mut visited);
    }

    fn dispatch_into(&self, event: &mut CustomEvent, visited: &mut Vec<*const TargetInner>) {
        let key = Rc::as_ptr(&self.inner);
        if visited.contains(&key) {
            // A cycle in the bubble graph; each target dispatches at most
            // once per phase.
            debug!(event = event.event_type(), "bubble cycle suppressed");
            return;
        }
        visited.push(key);

        let snapshot: Vec<Rc<SubEntry>> = self
            .inner
            .subscriptions
            .borrow()
            .get(event.event_type())
            .cloned()
            .unwrap_or_default();

        for entry in snapshot {
            if !entry.active.get() {
                continue;
            }
            entry.listener.call(event);
            if entry.once {
                self.inner.unsubscribe(&entry.ty, &entry.listener);
            }
        }

        // Bubbling proceeds even when the event was cancelled locally;
        // cancellation gates the default action and after phase only.
        if event.bubbles() && !event.bubbling_stopped() {
            let targets: Vec<Rc<TargetInner>> = self
                .inner
                .bubble_targets
                .borrow()
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            for inner in targets {
                Self { inner }.dispatch_into(event, visited);
            }
        }
    }

    fn subscribe(&self, ty: &str, listener: Listener, once: bool) -> Subscription {
        let mut subs = self.inner.subscriptions.borrow_mut();
        let list = subs.entry(ty.to_string()).or_default();

        if let Some(existing) = list.iter().find(|entry| entry.listener.ptr_eq(&listener)) {
            return Subscription {
                target: Rc::downgrade(&self.inner),
                entry: existing.clone(),
            };
        }

        let entry = Rc::new(SubEntry {
            ty: ty.to_string(),
            listener,
            once,
            active: Cell::new(true),
        });
        list.push(entry.clone());

        Subscription {
            target: Rc::downgrade(&self.inner),
            entry,
        }
    }

    fn definition(&self, ty: &str) -> EventConfig {
        self.inner
            .definitions
            .borrow()
            .get(ty)
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget").finish_non_exhaustive()
    }
}

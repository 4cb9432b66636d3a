//! Observable attributes: the attribute store composed with event
//! dispatch.
//!
//! Every write through [`Observable::set`] fires a `change:<name>` event
//! *before* validation. Main-phase listeners may cancel the change or
//! overwrite the proposed value; whatever survives is pushed through the
//! normal attribute pipeline, and an actual commit is announced with a
//! non-cancelable `after:change:<name>` carrying the final, post-setter
//! value. Readonly attributes announce their (privileged) writes with a
//! non-cancelable change event whose proposed value listeners cannot
//! redirect.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;

use crate::attribute::{AttributeDescriptor, Attributes};
use crate::error::Result;
use crate::event::{
    CustomEvent, EventConfig, EventData, EventTarget, Listener, Subscription, after_type,
};
use crate::value::Value;

/// Payload key holding the value before the change.
pub const PREV_VAL: &str = "prev_val";
/// Payload key holding the proposed (then committed) value.
pub const NEW_VAL: &str = "new_val";
/// Payload key holding the name of the changing attribute.
pub const ATTR_NAME: &str = "attr_name";

/// Returns the change-event type fired when `name` is written.
///
/// The after-phase counterpart is `after_type(&change_event(name))`, i.e.
/// what [`EventTarget::after`] subscribes to when handed this type.
#[must_use]
pub fn change_event(name: &str) -> String {
    format!("change:{name}")
}

/// An attribute store whose writes are observable as cancelable change
/// events.
///
/// Cheap-clone handle composing [`Attributes`] and [`EventTarget`]; both
/// halves are exposed, and their surfaces are re-exported as methods so
/// consumers rarely need to reach inside.
#[derive(Clone, Default, Debug)]
pub struct Observable {
    attributes: Attributes,
    events: EventTarget,
}

impl Observable {
    /// Creates an empty observable store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The attribute half of the composition.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// The event half of the composition. Change events are fired here,
    /// and this is the handle that participates in bubble graphs.
    #[must_use]
    pub const fn events(&self) -> &EventTarget {
        &self.events
    }

    /// Whether two handles refer to the same store.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.attributes.ptr_eq(&other.attributes)
    }

    /// Registers an attribute. See [`Attributes::add_attribute`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::AttributeAlreadyAdded`] on re-registration.
    pub fn add_attribute(&self, name: &str, descriptor: AttributeDescriptor) -> Result<()> {
        self.attributes.add_attribute(name, descriptor)
    }

    /// Whether `name` has been registered.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.has_attribute(name)
    }

    /// Reads an attribute. See [`Attributes::get`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::AttributeNotFound`] if `name` is not registered.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.attributes.get(name)
    }

    /// Writes an attribute, announcing the change to listeners first.
    /// Returns whether a change was committed.
    ///
    /// # Errors
    ///
    /// [`crate::Error::AttributeNotFound`] if `name` is not registered.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.apply(name, value.into(), false)
    }

    /// The privileged write path: ignores the readonly flag but still
    /// announces the change (non-cancelably, for readonly attributes).
    ///
    /// # Errors
    ///
    /// [`crate::Error::AttributeNotFound`] if `name` is not registered.
    pub fn force_set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.apply(name, value.into(), true)
    }

    pub(crate) fn apply(&self, name: &str, value: Value, override_read_only: bool) -> Result<bool> {
        let current = self.attributes.get(name)?;
        let read_only = self.attributes.is_read_only(name)?;

        let mut event = CustomEvent::new(
            change_event(name),
            !read_only,
            true,
            EventData::from([
                (String::from(PREV_VAL), current.clone()),
                (String::from(NEW_VAL), value.clone()),
                (String::from(ATTR_NAME), Value::from(name)),
            ]),
            Some(self.events.clone()),
        );
        self.events.fire_event(&mut event);

        if event.cancelled() {
            return Ok(false);
        }

        // Listeners may have redirected the proposed value, unless the
        // attribute is readonly.
        let value = if read_only {
            value
        } else {
            event.get(NEW_VAL).cloned().unwrap_or(value)
        };

        let changed = self.attributes.apply(name, value, override_read_only)?;

        if changed {
            let mut after = CustomEvent::new(
                after_type(&change_event(name)),
                false,
                true,
                EventData::from([
                    (String::from(PREV_VAL), current),
                    (String::from(NEW_VAL), self.attributes.get(name)?),
                    (String::from(ATTR_NAME), Value::from(name)),
                ]),
                Some(self.events.clone()),
            );
            self.events.fire_event(&mut after);
        }

        Ok(changed)
    }

    /// Invokes `callback` once, as soon as `name` reads as `value`:
    /// immediately if it already does, otherwise from the first
    /// after-change dispatch where it does. Returns the pending
    /// subscription, or `None` if the callback already ran.
    ///
    /// # Errors
    ///
    /// [`crate::Error::AttributeNotFound`] if `name` is not registered.
    pub fn once_value(
        &self,
        name: &str,
        value: impl Into<Value>,
        callback: impl Fn() + 'static,
    ) -> Result<Option<Subscription>> {
        let value = value.into();
        if self.get(name)? == value {
            callback();
            return Ok(None);
        }

        let pending: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let listener = Listener::new({
            let pending = Rc::clone(&pending);
            let observable = self.clone();
            let name = String::from(name);
            move |_: &mut CustomEvent| {
                let matched = observable.get(&name).is_ok_and(|current| current == value);
                if matched {
                    callback();
                    if let Some(subscription) = pending.borrow_mut().take() {
                        subscription.unsubscribe();
                    }
                }
            }
        });
        let subscription = self.events.after(&change_event(name), listener);
        *pending.borrow_mut() = Some(subscription.clone());
        Ok(Some(subscription))
    }

    // The event surface, delegated so an `Observable` can be used as a
    // dispatcher directly.

    /// See [`EventTarget::publish`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::DuplicateEventDefinition`] on re-publication.
    pub fn publish(&self, ty: &str, config: EventConfig) -> Result<()> {
        self.events.publish(ty, config)
    }

    /// See [`EventTarget::on`].
    pub fn on(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.events.on(ty, listener)
    }

    /// See [`EventTarget::once`].
    pub fn once(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.events.once(ty, listener)
    }

    /// See [`EventTarget::after`].
    pub fn after(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.events.after(ty, listener)
    }

    /// See [`EventTarget::once_after`].
    pub fn once_after(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.events.once_after(ty, listener)
    }

    /// See [`EventTarget::detach`].
    pub fn detach(&self, ty: &str, listener: &Listener) {
        self.events.detach(ty, listener);
    }

    /// See [`EventTarget::fire`].
    pub fn fire(&self, ty: &str) -> bool {
        self.events.fire(ty)
    }

    /// See [`EventTarget::fire_with`].
    pub fn fire_with(&self, ty: &str, data: EventData) -> bool {
        self.events.fire_with(ty, data)
    }

    /// Links another dispatcher into this store's bubble graph. Accepts
    /// anything holding an [`EventTarget`].
    pub fn add_bubble_target(&self, target: &EventTarget) {
        self.events.add_bubble_target(target);
    }

    /// See [`EventTarget::remove_bubble_target`].
    pub fn remove_bubble_target(&self, target: &EventTarget) {
        self.events.remove_bubble_target(target);
    }
}

//! Composable object factories: prototypes, mixins, and initializer
//! chains.
//!
//! A [`Factory`] produces [`Instance`]s that share its [`Prototype`] (and,
//! through the base chain, every ancestor's prototype). Prototypes merge
//! deterministically: within one prototype, the first registration of a
//! name wins and mixins never overwrite it; across the chain, the most
//! derived level shadows its bases. Attribute descriptors are the
//! exception — they are collected at construction from base to derived,
//! then mixins, with later definitions fully replacing earlier ones for
//! the same name.
//!
//! Initializers chain by continuation: the most derived initializer runs
//! first and receives a [`SuperInit`] it may invoke before, after, or
//! between its own work — or not at all. The chain bottoms out in an
//! implicit step that applies the construction config through the
//! privileged set path.
//!
//! Extending anything other than a [`Factory`] produced by this module is
//! unrepresentable, so there is no "invalid base" failure to check for at
//! runtime.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use tracing::trace;

use crate::attribute::{AttributeDescriptor, Attributes};
use crate::error::{Error, Result};
use crate::event::{EventConfig, EventData, EventTarget, Listener, Subscription};
use crate::observable::Observable;
use crate::value::{Config, Value};

/// A named member of a prototype.
#[derive(Clone, Debug)]
pub enum Slot {
    /// A data property shared by every instance until shadowed.
    Value(Value),
    /// A callable member.
    Method(Method),
}

/// A method stored in a prototype slot, invoked with the instance it was
/// looked up on.
#[derive(Clone)]
pub struct Method(Rc<dyn Fn(&Instance, &[Value]) -> Value>);

impl Method {
    /// Wraps a callable.
    pub fn new(body: impl Fn(&Instance, &[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(body))
    }

    /// Whether two handles refer to the same callable.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Invokes the method.
    pub fn call(&self, instance: &Instance, args: &[Value]) -> Value {
        (self.0)(instance, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Method")
    }
}

/// The shared shape of a factory's instances: named slots, attribute
/// descriptors, and the mixins merged in.
#[derive(Clone, Debug, Default)]
pub struct Prototype {
    slots: BTreeMap<String, Slot>,
    attrs: BTreeMap<String, AttributeDescriptor>,
    mixins: Vec<Mixin>,
}

impl Prototype {
    /// Creates an empty prototype.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a data slot.
    #[must_use]
    pub fn value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.slots
            .insert(name.to_string(), Slot::Value(value.into()));
        self
    }

    /// Adds a method slot.
    #[must_use]
    pub fn method(mut self, name: &str, body: impl Fn(&Instance, &[Value]) -> Value + 'static) -> Self {
        self.slots
            .insert(name.to_string(), Slot::Method(Method::new(body)));
        self
    }

    /// Registers an attribute descriptor, collected into every instance
    /// of a factory using this prototype.
    #[must_use]
    pub fn attr(mut self, name: &str, descriptor: AttributeDescriptor) -> Self {
        self.attrs.insert(name.to_string(), descriptor);
        self
    }

    /// Merges a mixin into this prototype. See [`mix`].
    #[must_use]
    pub fn mix(mut self, mixin: &Mixin) -> Self {
        mix(&mut self, core::slice::from_ref(mixin));
        self
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    fn collect_attrs(&self, into: &mut BTreeMap<String, AttributeDescriptor>) {
        for (name, descriptor) in &self.attrs {
            into.insert(name.clone(), descriptor.clone());
        }
        for mixin in &self.mixins {
            mixin.prototype().collect_attrs(into);
        }
    }
}

/// A sealed prototype that can be merged into others by reference.
#[derive(Clone, Debug)]
pub struct Mixin {
    proto: Rc<Prototype>,
}

impl Mixin {
    /// Seals a prototype for mixing.
    #[must_use]
    pub fn new(prototype: Prototype) -> Self {
        Self {
            proto: Rc::new(prototype),
        }
    }

    /// The sealed prototype.
    #[must_use]
    pub fn prototype(&self) -> &Prototype {
        &self.proto
    }

    /// Whether two handles refer to the same sealed prototype.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.proto, &other.proto)
    }
}

/// Merges each mixin's slots into `target`, skipping names `target`
/// already defines (first registration wins). A mixin that was already
/// applied to `target` is skipped entirely, so mixing is idempotent per
/// mixin reference. Applied mixins are remembered for construction-time
/// descriptor collection.
pub fn mix(target: &mut Prototype, mixins: &[Mixin]) {
    for mixin in mixins {
        if target.mixins.iter().any(|applied| applied.ptr_eq(mixin)) {
            continue;
        }
        for (name, slot) in &mixin.proto.slots {
            if !target.slots.contains_key(name) {
                target.slots.insert(name.clone(), slot.clone());
            }
        }
        target.mixins.push(mixin.clone());
    }
}

/// The initializer signature: the instance under construction, the
/// continuation for the next level up, and the construction config.
pub type InitFn = Rc<dyn Fn(&Instance, SuperInit, &Config)>;

/// The continuation handed to an initializer.
///
/// Invoking it runs the nearest ancestor initializer; at the top of the
/// chain it applies the construction config instead. Each initializer
/// body decides whether and when to delegate — work can run before,
/// after, or interleaved with the base levels. Consuming `self` means a
/// level can delegate at most once.
pub struct SuperInit {
    instance: Instance,
    chain: Rc<[InitFn]>,
    index: usize,
    config: Rc<Config>,
}

impl SuperInit {
    /// Runs the rest of the initializer chain.
    pub fn invoke(self) {
        if let Some(next) = self.chain.get(self.index) {
            let next = next.clone();
            let continuation = Self {
                instance: self.instance.clone(),
                chain: Rc::clone(&self.chain),
                index: self.index + 1,
                config: Rc::clone(&self.config),
            };
            next(&self.instance, continuation, &self.config);
        } else {
            self.instance.apply_config(&self.config);
        }
    }
}

impl fmt::Debug for SuperInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuperInit")
            .field("index", &self.index)
            .field("levels", &self.chain.len())
            .finish_non_exhaustive()
    }
}

struct FactoryInner {
    base: Option<Factory>,
    proto: Prototype,
    init: Option<InitFn>,
}

/// A callable producing instances that share a prototype chain.
///
/// Cheap-clone handle; factory identity (for
/// [`Instance::is_instance_of`]) is handle identity.
#[derive(Clone)]
pub struct Factory {
    inner: Rc<FactoryInner>,
}

impl Factory {
    /// Creates a root factory.
    #[must_use]
    pub fn new(prototype: Prototype) -> Self {
        Self {
            inner: Rc::new(FactoryInner {
                base: None,
                proto: prototype,
                init: None,
            }),
        }
    }

    /// Creates a root factory with an initializer.
    #[must_use]
    pub fn with_init(
        prototype: Prototype,
        init: impl Fn(&Instance, SuperInit, &Config) + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(FactoryInner {
                base: None,
                proto: prototype,
                init: Some(Rc::new(init)),
            }),
        }
    }

    /// Derives a factory whose instances shadow this factory's prototype
    /// with `prototype` and inherit its initializer chain.
    #[must_use]
    pub fn extend(&self, prototype: Prototype) -> Self {
        Self {
            inner: Rc::new(FactoryInner {
                base: Some(self.clone()),
                proto: prototype,
                init: None,
            }),
        }
    }

    /// Like [`extend`](Self::extend), adding a level initializer.
    #[must_use]
    pub fn extend_with_init(
        &self,
        prototype: Prototype,
        init: impl Fn(&Instance, SuperInit, &Config) + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(FactoryInner {
                base: Some(self.clone()),
                proto: prototype,
                init: Some(Rc::new(init)),
            }),
        }
    }

    /// The factory this one extends, if any.
    #[must_use]
    pub fn base(&self) -> Option<&Self> {
        self.inner.base.as_ref()
    }

    /// Whether two handles refer to the same factory.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Creates an instance with an empty config. See
    /// [`create_with`](Self::create_with).
    ///
    /// # Errors
    ///
    /// Propagates attribute registration failures; see
    /// [`create_with`](Self::create_with).
    pub fn create(&self) -> Result<Instance> {
        self.create_with(Config::new())
    }

    /// Creates an instance: collects attribute descriptors from the whole
    /// ancestry, registers them, and runs the initializer chain with
    /// `config`. Config keys that match an attribute are applied through
    /// the privileged set path (so readonly attributes accept their
    /// construction value, and change events fire normally); other keys
    /// are ignored.
    ///
    /// # Errors
    ///
    /// [`Error::AttributeAlreadyAdded`] if an initializer registered an
    /// attribute name that the ancestry also defines.
    pub fn create_with(&self, config: Config) -> Result<Instance> {
        let instance = Instance {
            inner: Rc::new(InstanceInner {
                factory: self.clone(),
                own: RefCell::new(BTreeMap::new()),
                core: Observable::new(),
            }),
        };

        let mut merged = BTreeMap::new();
        self.collect_attrs(&mut merged);
        for (name, descriptor) in merged {
            instance.inner.core.add_attribute(&name, descriptor)?;
        }

        let chain: Rc<[InitFn]> = self.init_chain().into();
        trace!(levels = chain.len(), "creating instance");
        SuperInit {
            instance: instance.clone(),
            chain,
            index: 0,
            config: Rc::new(config),
        }
        .invoke();

        Ok(instance)
    }

    fn collect_attrs(&self, into: &mut BTreeMap<String, AttributeDescriptor>) {
        if let Some(base) = &self.inner.base {
            base.collect_attrs(into);
        }
        self.inner.proto.collect_attrs(into);
    }

    /// The initializers from this factory up to the root, most derived
    /// first.
    fn init_chain(&self) -> Vec<InitFn> {
        let mut chain = Vec::new();
        let mut current = Some(self.clone());
        while let Some(factory) = current {
            if let Some(init) = &factory.inner.init {
                chain.push(init.clone());
            }
            current = factory.inner.base.clone();
        }
        chain
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("has_base", &self.inner.base.is_some())
            .field("has_init", &self.inner.init.is_some())
            .finish_non_exhaustive()
    }
}

struct InstanceInner {
    factory: Factory,
    own: RefCell<BTreeMap<String, Slot>>,
    core: Observable,
}

/// An object produced by a [`Factory`].
///
/// Slot lookup goes through the instance's own slots, then up the factory
/// chain. The observable attribute store and event dispatcher are part of
/// every instance; their surfaces are delegated below.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

impl Instance {
    /// The factory that produced this instance.
    #[must_use]
    pub fn factory(&self) -> &Factory {
        &self.inner.factory
    }

    /// The observable attribute core.
    #[must_use]
    pub fn observable(&self) -> &Observable {
        &self.inner.core
    }

    /// The instance's event dispatcher — the handle to use in bubble
    /// graphs and `original_target` comparisons.
    #[must_use]
    pub fn events(&self) -> &EventTarget {
        self.inner.core.events()
    }

    /// The instance's attribute store.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        self.inner.core.attributes()
    }

    /// Whether two handles refer to the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether `factory` appears in this instance's factory chain.
    #[must_use]
    pub fn is_instance_of(&self, factory: &Factory) -> bool {
        let mut current = Some(self.inner.factory.clone());
        while let Some(candidate) = current {
            if candidate.ptr_eq(factory) {
                return true;
            }
            current = candidate.inner.base.clone();
        }
        false
    }

    /// Looks up a slot: own slots first, then the factory chain, most
    /// derived level first.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<Slot> {
        if let Some(slot) = self.inner.own.borrow().get(name) {
            return Some(slot.clone());
        }
        let mut current = Some(self.inner.factory.clone());
        while let Some(factory) = current {
            if let Some(slot) = factory.inner.proto.slot(name) {
                return Some(slot.clone());
            }
            current = factory.inner.base.clone();
        }
        None
    }

    /// Reads a data slot.
    #[must_use]
    pub fn prop(&self, name: &str) -> Option<Value> {
        match self.slot(name) {
            Some(Slot::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Writes an own data slot, shadowing the prototype chain for this
    /// instance only.
    pub fn set_prop(&self, name: &str, value: impl Into<Value>) {
        self.inner
            .own
            .borrow_mut()
            .insert(name.to_string(), Slot::Value(value.into()));
    }

    /// Looks up a method slot.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<Method> {
        match self.slot(name) {
            Some(Slot::Method(method)) => Some(method),
            _ => None,
        }
    }

    /// Invokes a method slot.
    ///
    /// # Errors
    ///
    /// [`Error::MethodNotFound`] if nothing in the chain defines `name`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .method(name)
            .ok_or_else(|| Error::MethodNotFound(name.to_string()))?;
        Ok(method.call(self, args))
    }

    fn apply_config(&self, config: &Config) {
        for (name, value) in config {
            if self.inner.core.has_attribute(name) {
                // Cannot fail: the attribute exists, and rejected values
                // are ordinary `Ok(false)` outcomes.
                let _ = self.inner.core.force_set(name, value.clone());
            }
        }
    }

    // The observable surface, delegated.

    /// See [`Observable::add_attribute`].
    ///
    /// # Errors
    ///
    /// [`Error::AttributeAlreadyAdded`] on re-registration.
    pub fn add_attribute(&self, name: &str, descriptor: AttributeDescriptor) -> Result<()> {
        self.inner.core.add_attribute(name, descriptor)
    }

    /// See [`Observable::has_attribute`].
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.core.has_attribute(name)
    }

    /// See [`Observable::get`].
    ///
    /// # Errors
    ///
    /// [`Error::AttributeNotFound`] if `name` is not registered.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.inner.core.get(name)
    }

    /// See [`Observable::set`].
    ///
    /// # Errors
    ///
    /// [`Error::AttributeNotFound`] if `name` is not registered.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.inner.core.set(name, value)
    }

    /// See [`Observable::force_set`].
    ///
    /// # Errors
    ///
    /// [`Error::AttributeNotFound`] if `name` is not registered.
    pub fn force_set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.inner.core.force_set(name, value)
    }

    /// See [`Observable::once_value`].
    ///
    /// # Errors
    ///
    /// [`Error::AttributeNotFound`] if `name` is not registered.
    pub fn once_value(
        &self,
        name: &str,
        value: impl Into<Value>,
        callback: impl Fn() + 'static,
    ) -> Result<Option<Subscription>> {
        self.inner.core.once_value(name, value, callback)
    }

    /// See [`EventTarget::publish`].
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateEventDefinition`] on re-publication.
    pub fn publish(&self, ty: &str, config: EventConfig) -> Result<()> {
        self.inner.core.publish(ty, config)
    }

    /// See [`EventTarget::on`].
    pub fn on(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.inner.core.on(ty, listener)
    }

    /// See [`EventTarget::once`].
    pub fn once(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.inner.core.once(ty, listener)
    }

    /// See [`EventTarget::after`].
    pub fn after(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.inner.core.after(ty, listener)
    }

    /// See [`EventTarget::once_after`].
    pub fn once_after(&self, ty: &str, listener: impl Into<Listener>) -> Subscription {
        self.inner.core.once_after(ty, listener)
    }

    /// See [`EventTarget::detach`].
    pub fn detach(&self, ty: &str, listener: &Listener) {
        self.inner.core.detach(ty, listener);
    }

    /// See [`EventTarget::fire`].
    pub fn fire(&self, ty: &str) -> bool {
        self.inner.core.fire(ty)
    }

    /// See [`EventTarget::fire_with`].
    pub fn fire_with(&self, ty: &str, data: EventData) -> bool {
        self.inner.core.fire_with(ty, data)
    }

    /// Links `target` to re-receive events fired on this instance.
    pub fn add_bubble_target(&self, target: &EventTarget) {
        self.inner.core.add_bubble_target(target);
    }

    /// See [`EventTarget::remove_bubble_target`].
    pub fn remove_bubble_target(&self, target: &EventTarget) {
        self.inner.core.remove_bubble_target(target);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("own_slots", &self.inner.own.borrow().len())
            .finish_non_exhaustive()
    }
}

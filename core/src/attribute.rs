//! Named, validated, per-instance properties.
//!
//! An [`Attributes`] store holds one [`AttributeDescriptor`] per name:
//! the current value plus optional validator, getter, setter, and a
//! readonly flag. Writes run the readonly/validator/setter/no-change
//! pipeline in that order and report through their `bool` result whether
//! a change was committed; a declined value is ordinary control flow,
//! never an error.
//!
//! Values are cloned on every read and write, so two instances can never
//! alias container state through one descriptor, and getter output is
//! never written back into storage.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use core::cell::RefCell;
use core::fmt;

use tracing::trace;

use crate::error::{Error, Result};
use crate::value::Value;

type ValidatorFn = Rc<dyn Fn(&Value, &str) -> bool>;
type GetterFn = Rc<dyn Fn(Value, &str) -> Value>;
type SetterFn = Rc<dyn Fn(Value, &str) -> Option<Value>>;

/// Metadata registered for one attribute.
///
/// Built fluently:
///
/// ```
/// use keelui_core::attribute::AttributeDescriptor;
///
/// let descriptor = AttributeDescriptor::new()
///     .value(0)
///     .validator(|value, _| value.as_int().is_some());
/// ```
#[derive(Clone, Default)]
pub struct AttributeDescriptor {
    value: Value,
    validator: Option<ValidatorFn>,
    getter: Option<GetterFn>,
    setter: Option<SetterFn>,
    read_only: bool,
}

impl AttributeDescriptor {
    /// Creates an empty descriptor: `Null` default, no callbacks,
    /// writable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default value.
    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    /// Rejects writes for which the callback returns `false`. The
    /// validator sees the incoming value before the setter transforms it.
    #[must_use]
    pub fn validator(mut self, validator: impl Fn(&Value, &str) -> bool + 'static) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    /// Transforms values on read. The getter receives a copy of the
    /// stored value; its output is returned to the caller and never
    /// written back.
    #[must_use]
    pub fn getter(mut self, getter: impl Fn(Value, &str) -> Value + 'static) -> Self {
        self.getter = Some(Rc::new(getter));
        self
    }

    /// Transforms values on write, after validation. Returning `None`
    /// rejects the write.
    #[must_use]
    pub fn setter(mut self, setter: impl Fn(Value, &str) -> Option<Value> + 'static) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }

    /// Rejects external writes. Readonly attributes are still writable
    /// through [`Attributes::force_set`], which construction-time config
    /// application uses.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub(crate) const fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("value", &self.value)
            .field("validator", &self.validator.is_some())
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// A per-instance attribute store.
///
/// Cheap-clone handle; clones share the underlying descriptors. All
/// operations take `&self` and keep no borrow alive across user
/// callbacks, so validators and getters may re-enter the store.
#[derive(Clone, Default)]
pub struct Attributes {
    inner: Rc<RefCell<BTreeMap<String, AttributeDescriptor>>>,
}

impl Attributes {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether two handles refer to the same store.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers an attribute.
    ///
    /// # Errors
    ///
    /// [`Error::AttributeAlreadyAdded`] if `name` is already registered
    /// on this store.
    pub fn add_attribute(&self, name: &str, descriptor: AttributeDescriptor) -> Result<()> {
        let mut map = self.inner.borrow_mut();
        if map.contains_key(name) {
            return Err(Error::AttributeAlreadyAdded(name.to_string()));
        }
        map.insert(name.to_string(), descriptor);
        Ok(())
    }

    /// Whether `name` has been registered.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.borrow().contains_key(name)
    }

    /// Reads an attribute: a copy of the stored value, passed through the
    /// getter if one is registered.
    ///
    /// # Errors
    ///
    /// [`Error::AttributeNotFound`] if `name` is not registered.
    pub fn get(&self, name: &str) -> Result<Value> {
        let (value, getter) = {
            let map = self.inner.borrow();
            let descriptor = map
                .get(name)
                .ok_or_else(|| Error::AttributeNotFound(name.to_string()))?;
            (descriptor.value.clone(), descriptor.getter.clone())
        };
        Ok(match getter {
            Some(getter) => getter(value, name),
            None => value,
        })
    }

    /// Writes an attribute through the full pipeline. Returns whether a
    /// change was committed; readonly, validator, setter, and no-change
    /// rejections all report `Ok(false)`.
    ///
    /// # Errors
    ///
    /// [`Error::AttributeNotFound`] if `name` is not registered.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.apply(name, value.into(), false)
    }

    /// The privileged write path: like [`set`](Self::set) but ignores the
    /// readonly flag. Validator, setter, and no-change checks still
    /// apply.
    ///
    /// # Errors
    ///
    /// [`Error::AttributeNotFound`] if `name` is not registered.
    pub fn force_set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.apply(name, value.into(), true)
    }

    pub(crate) fn apply(
        &self,
        name: &str,
        mut value: Value,
        override_read_only: bool,
    ) -> Result<bool> {
        let current = self.get(name)?;
        let (read_only, validator, setter) = {
            let map = self.inner.borrow();
            let descriptor = map
                .get(name)
                .ok_or_else(|| Error::AttributeNotFound(name.to_string()))?;
            (
                descriptor.read_only,
                descriptor.validator.clone(),
                descriptor.setter.clone(),
            )
        };

        if read_only && !override_read_only {
            return Ok(false);
        }

        if let Some(validator) = validator {
            if !validator(&value, name) {
                return Ok(false);
            }
        }

        if let Some(setter) = setter {
            match setter(value, name) {
                Some(transformed) => value = transformed,
                None => return Ok(false),
            }
        }

        // No redundant writes: the committed value must differ from what
        // get() currently reports.
        if value == current {
            return Ok(false);
        }

        let mut map = self.inner.borrow_mut();
        let descriptor = map
            .get_mut(name)
            .ok_or_else(|| Error::AttributeNotFound(name.to_string()))?;
        descriptor.value = value;
        trace!(attribute = name, "committed");
        Ok(true)
    }

    pub(crate) fn is_read_only(&self, name: &str) -> Result<bool> {
        self.inner
            .borrow()
            .get(name)
            .map(AttributeDescriptor::is_read_only)
            .ok_or_else(|| Error::AttributeNotFound(name.to_string()))
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attributes")
            .field("len", &self.inner.borrow().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::rc::Rc;
    use core::cell::Cell;

    #[test]
    fn add_set_get() {
        let attrs = Attributes::new();
        attrs.add_attribute("k", AttributeDescriptor::new()).unwrap();

        assert!(attrs.has_attribute("k"));
        assert!(!attrs.has_attribute("nope"));

        assert_eq!(attrs.get("k").unwrap(), Value::Null);
        assert!(attrs.set("k", "v").unwrap());
        assert_eq!(attrs.get("k").unwrap(), Value::from("v"));
    }

    #[test]
    fn unregistered_names_are_errors() {
        let attrs = Attributes::new();
        assert_eq!(attrs.get("k"), Err(Error::AttributeNotFound("k".into())));
        assert_eq!(
            attrs.set("k", 1),
            Err(Error::AttributeNotFound("k".into()))
        );
    }

    #[test]
    fn double_registration_is_an_error() {
        let attrs = Attributes::new();
        attrs.add_attribute("k", AttributeDescriptor::new()).unwrap();
        assert_eq!(
            attrs.add_attribute("k", AttributeDescriptor::new()),
            Err(Error::AttributeAlreadyAdded("k".into()))
        );
    }

    #[test]
    fn validator_rejects_without_error() {
        let attrs = Attributes::new();
        let calls = Rc::new(Cell::new(0));
        attrs
            .add_attribute(
                "k",
                AttributeDescriptor::new().validator({
                    let calls = Rc::clone(&calls);
                    move |value, _| {
                        calls.set(calls.get() + 1);
                        value.as_int().is_some_and(|i| i >= 1337)
                    }
                }),
            )
            .unwrap();

        assert!(!attrs.set("k", 1).unwrap());
        assert_eq!(calls.get(), 1);
        assert_eq!(attrs.get("k").unwrap(), Value::Null);

        assert!(attrs.set("k", 1337).unwrap());
        assert_eq!(attrs.get("k").unwrap(), Value::from(1337));
    }

    #[test]
    fn setter_transforms_and_getter_projects() {
        let attrs = Attributes::new();
        attrs
            .add_attribute(
                "k",
                AttributeDescriptor::new()
                    .setter(|value, name| {
                        value
                            .as_int()
                            .filter(|i| *i != 0)
                            .map(|i| Value::from(format!("{name}={i}")))
                    })
                    .getter(|value, _| match value.as_str() {
                        Some(s) => Value::from(s.len() as i64),
                        None => value,
                    }),
            )
            .unwrap();

        assert!(attrs.set("k", 1337).unwrap());
        // Stored as "k=1337", read through the getter as its length.
        assert_eq!(attrs.get("k").unwrap(), Value::from(6));

        // The setter's sentinel rejects the write and keeps the old value.
        assert!(!attrs.set("k", 0).unwrap());
        assert_eq!(attrs.get("k").unwrap(), Value::from(6));
    }

    #[test]
    fn redundant_writes_are_reported_as_no_change() {
        let attrs = Attributes::new();
        attrs
            .add_attribute("k", AttributeDescriptor::new().value(10))
            .unwrap();

        assert!(!attrs.set("k", 10).unwrap());
        assert!(attrs.set("k", 11).unwrap());
        assert!(!attrs.set("k", 11).unwrap());
    }

    #[test]
    fn read_only_rejects_public_writes() {
        let attrs = Attributes::new();
        attrs
            .add_attribute("k", AttributeDescriptor::new().value(true).read_only())
            .unwrap();

        assert!(!attrs.set("k", false).unwrap());
        assert_eq!(attrs.get("k").unwrap(), Value::from(true));

        assert!(attrs.force_set("k", false).unwrap());
        assert_eq!(attrs.get("k").unwrap(), Value::from(false));
    }

    #[test]
    fn container_values_do_not_alias_storage() {
        let attrs = Attributes::new();
        attrs
            .add_attribute(
                "items",
                AttributeDescriptor::new().value(alloc::vec![Value::from(1)]),
            )
            .unwrap();

        let Value::List(mut copy) = attrs.get("items").unwrap() else {
            panic!("expected a list");
        };
        copy.push(Value::from(2));

        assert_eq!(
            attrs.get("items").unwrap(),
            Value::from(alloc::vec![Value::from(1)])
        );
    }
}

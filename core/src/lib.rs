//! Core component model for the `keelui` toolkit.
//!
//! Three layers, each consuming the previous:
//!
//! 1. [`factory`] — composable object factories with a base chain, mixin
//!    merging, and continuation-style initializer chaining.
//! 2. [`event`] — type-keyed, cancelable, bubbling two-phase dispatch.
//! 3. [`attribute`] / [`observable`] — validated named properties, and
//!    their composition with event dispatch into observable stores.
//!
//! Everything is synchronous and single-threaded. Handles (`EventTarget`,
//! `Attributes`, `Observable`, `Factory`, `Instance`) are cheap `Rc`
//! clones sharing their state; none of them is `Send`.

#![no_std]

extern crate alloc;

pub mod attribute;
pub mod error;
pub mod event;
pub mod factory;
pub mod observable;
pub mod value;

#[doc(inline)]
pub use attribute::{AttributeDescriptor, Attributes};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use event::{
    AFTER, CustomEvent, EventConfig, EventData, EventTarget, Listener, Subscription, after_type,
};
#[doc(inline)]
pub use factory::{Factory, Instance, Method, Mixin, Prototype, Slot, SuperInit, mix};
#[doc(inline)]
pub use observable::{ATTR_NAME, NEW_VAL, Observable, PREV_VAL, change_event};
#[doc(inline)]
pub use value::{Config, Object, Value};

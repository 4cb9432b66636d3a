#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]

#[doc(inline)]
pub use keelui_core::{attribute, error, event, factory, observable, value};

#[doc(inline)]
pub use keelui_core::{
    AFTER, ATTR_NAME, AttributeDescriptor, Attributes, Config, CustomEvent, Error, EventConfig,
    EventData, EventTarget, Factory, Instance, Listener, Method, Mixin, NEW_VAL, Object,
    Observable, PREV_VAL, Prototype, Result, Slot, Subscription, SuperInit, Value, after_type,
    change_event, mix,
};

pub mod prelude {
    //! The types most consumers need, importable with one `use`.
    //!
    //! # Example
    //!
    //! ```rust
    //! use keelui::prelude::*;
    //!
    //! let store = Observable::new();
    //! store
    //!     .add_attribute("label", AttributeDescriptor::new().value(""))
    //!     .unwrap();
    //! store.set("label", "hello").unwrap();
    //! ```

    pub use keelui_core::{
        AttributeDescriptor, Attributes, Config, CustomEvent, Error, EventConfig, EventData,
        EventTarget, Factory, Instance, Listener, Mixin, NEW_VAL, Observable, PREV_VAL, Prototype,
        Subscription, Value, change_event, mix,
    };
}

pub use tracing as log;

//! Cross-layer integration: factories, mixins, observable attributes and
//! event dispatch working together the way a widget library consumes
//! them.

use keelui::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

/// A miniature widget hierarchy: a base with common attributes, a button
/// level on top of it, and a toggle level with a `toggle` method.
fn widget_factory() -> Factory {
    Factory::with_init(
        Prototype::new()
            .attr("visible", AttributeDescriptor::new().value(true))
            .method("id", |instance, _| {
                instance.prop("widget_id").unwrap_or(Value::Null)
            }),
        |instance, sup, _| {
            sup.invoke();
            instance
                .publish("render", EventConfig::new().bubbles(false))
                .unwrap();
        },
    )
}

fn button_factory(widget: &Factory) -> Factory {
    widget.extend(
        Prototype::new()
            .attr(
                "label",
                AttributeDescriptor::new()
                    .value("")
                    .validator(|value, _| value.as_str().is_some()),
            )
            .attr(
                "disabled",
                AttributeDescriptor::new()
                    .value(false)
                    .setter(|value, _| Some(Value::from(value.as_bool().unwrap_or(true)))),
            ),
    )
}

fn toggle_factory(button: &Factory) -> Factory {
    button.extend(
        Prototype::new()
            .attr("pressed", AttributeDescriptor::new().value(false))
            .method("toggle", |instance, args| {
                let target = match args.first() {
                    Some(Value::Bool(explicit)) => *explicit,
                    _ => instance.get("pressed").unwrap() != Value::from(true),
                };
                Value::from(instance.set("pressed", target).unwrap())
            }),
    )
}

#[test]
fn layered_factories_compose() {
    let widget = widget_factory();
    let button = button_factory(&widget);
    let toggle = toggle_factory(&button);

    let instance = toggle
        .create_with(Config::from([
            (String::from("label"), Value::from("play")),
            (String::from("widget_id"), Value::from("ignored")),
        ]))
        .unwrap();

    // Attributes from every level are present.
    assert_eq!(instance.get("visible").unwrap(), Value::from(true));
    assert_eq!(instance.get("label").unwrap(), Value::from("play"));
    assert_eq!(instance.get("pressed").unwrap(), Value::from(false));

    // The chain is visible through is_instance_of.
    assert!(instance.is_instance_of(&toggle));
    assert!(instance.is_instance_of(&button));
    assert!(instance.is_instance_of(&widget));

    // Methods defined on any level are callable.
    assert_eq!(instance.call("id", &[]).unwrap(), Value::Null);
    assert_eq!(instance.call("toggle", &[]).unwrap(), Value::from(true));
    assert_eq!(instance.get("pressed").unwrap(), Value::from(true));
    assert_eq!(
        instance.call("toggle", &[Value::from(true)]).unwrap(),
        // Already pressed: an explicit toggle(true) is a no-change write.
        Value::from(false)
    );

    // The base initializer published its event on every descendant.
    assert_eq!(
        instance.publish("render", EventConfig::new()),
        Err(Error::DuplicateEventDefinition("render".into()))
    );
}

#[test]
fn attribute_writes_fire_one_change_per_actual_change() {
    let store = Observable::new();
    store
        .add_attribute("k", AttributeDescriptor::new().value(10))
        .unwrap();

    let changes = Rc::new(RefCell::new(Vec::new()));
    store.after(&change_event("k"), {
        let changes = Rc::clone(&changes);
        move |e: &mut CustomEvent| {
            changes
                .borrow_mut()
                .push((e.get(PREV_VAL).cloned(), e.get(NEW_VAL).cloned()));
        }
    });

    // Writing the current value is a no-change write and fires nothing.
    assert!(!store.set("k", 10).unwrap());
    assert!(changes.borrow().is_empty());

    assert!(store.set("k", 11).unwrap());
    assert_eq!(store.get("k").unwrap(), Value::from(11));
    assert_eq!(
        &*changes.borrow(),
        &[(Some(Value::from(10)), Some(Value::from(11)))]
    );

    // Idempotence: repeating the write changes nothing further.
    assert!(!store.set("k", 11).unwrap());
    assert_eq!(changes.borrow().len(), 1);
}

#[test]
fn changes_bubble_from_instances_to_linked_targets() {
    let widget = widget_factory();
    let instance = widget.create().unwrap();
    let parent = EventTarget::new();
    instance.add_bubble_target(&parent);

    let seen = Rc::new(RefCell::new(Vec::new()));
    parent.on(&change_event("visible"), {
        let seen = Rc::clone(&seen);
        let origin = instance.events().clone();
        move |e: &mut CustomEvent| {
            assert!(e.original_target().is_some_and(|t| t.ptr_eq(&origin)));
            seen.borrow_mut().push(e.get(NEW_VAL).cloned());
        }
    });

    instance.set("visible", false).unwrap();
    assert_eq!(&*seen.borrow(), &[Some(Value::from(false))]);

    // The non-bubbling render event stays local.
    let (render_seen, listener) = {
        let seen = Rc::new(RefCell::new(0));
        let listener = Listener::new({
            let seen = Rc::clone(&seen);
            move |_: &mut CustomEvent| *seen.borrow_mut() += 1
        });
        (seen, listener)
    };
    parent.on("render", listener);
    instance.fire("render");
    assert_eq!(*render_seen.borrow(), 0);
}

#[test]
fn a_parent_can_veto_a_child_change() {
    let widget = widget_factory();
    let instance = widget.create().unwrap();
    let parent = EventTarget::new();
    instance.add_bubble_target(&parent);

    parent.on(&change_event("visible"), |e: &mut CustomEvent| e.cancel());

    assert!(!instance.set("visible", false).unwrap());
    assert_eq!(instance.get("visible").unwrap(), Value::from(true));
}

#[test]
fn once_value_waits_for_an_attribute_state() {
    let widget = widget_factory();
    let instance = widget.create().unwrap();

    let hits = Rc::new(RefCell::new(0));
    let pending = instance
        .once_value("visible", false, {
            let hits = Rc::clone(&hits);
            move || *hits.borrow_mut() += 1
        })
        .unwrap();
    assert!(pending.is_some());

    instance.set("visible", false).unwrap();
    instance.set("visible", true).unwrap();
    instance.set("visible", false).unwrap();
    assert_eq!(*hits.borrow(), 1);
}

#[test]
fn mixins_contribute_behavior_and_attributes_to_factories() {
    let closable = Mixin::new(
        Prototype::new()
            .attr("closed", AttributeDescriptor::new().value(false))
            .method("close", |instance, _| {
                Value::from(instance.set("closed", true).unwrap())
            }),
    );

    let widget = widget_factory();
    let overlay = widget.extend(
        Prototype::new()
            .attr("z_index", AttributeDescriptor::new().value(0))
            .mix(&closable),
    );
    let panel = overlay.extend(
        // The panel redefines the descriptor inherited from the mixin;
        // the derived definition wins.
        Prototype::new().attr("closed", AttributeDescriptor::new().value(true)),
    );

    let overlay_instance = overlay.create().unwrap();
    assert_eq!(overlay_instance.get("closed").unwrap(), Value::from(false));
    assert_eq!(
        overlay_instance.call("close", &[]).unwrap(),
        Value::from(true)
    );
    assert_eq!(overlay_instance.get("closed").unwrap(), Value::from(true));

    let panel_instance = panel.create().unwrap();
    assert_eq!(panel_instance.get("closed").unwrap(), Value::from(true));
    // close() is a no-change write now.
    assert_eq!(panel_instance.call("close", &[]).unwrap(), Value::from(false));
}

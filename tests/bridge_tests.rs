// Integration tests for the command pipeline, resolver and event hooks
// driven from the host side, without a Lua state

mod common;

use common::{bridge, Recorder};
use luarecord::value::{attrs, Value};
use luarecord::{command, without_hooks, Error, EventTag, HooksDisabled, Sequence};
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn map(json: serde_json::Value) -> Value {
    Value::Map(attrs(json))
}

/// create then find returns the sanitized attributes
#[test]
fn test_create_then_find() {
    let bridge = bridge();
    let created = bridge
        .invoke("create", vec!["Widget".into(), map(json!({"name": "gear", "color": "red"}))])
        .unwrap();
    let id = created.as_entity().unwrap().id().unwrap();

    let found = bridge.invoke("find", vec!["Widget".into(), Value::Int(id)]).unwrap();
    let found = found.as_entity().unwrap();
    assert_eq!(found.get("name"), Some(Value::from("gear")));
    assert_eq!(found.get("color"), Some(Value::from("red")));
    assert!(found.same_record(created.as_entity().unwrap()));
}

/// create fails hard on validation errors
#[test]
fn test_create_validation_failure() {
    let bridge = bridge();
    let err = bridge.invoke("create", vec!["Widget".into(), map(json!({}))]).unwrap_err();
    assert_eq!(err, Error::HostOperationFailed("Validation failed: name can't be blank".into()));
}

/// Every verb on a class without the capability flag is refused and
/// nothing is written
#[test]
fn test_non_bridge_class_is_refused() {
    let bridge = bridge();
    let secrets = bridge.registry().find("Secret").unwrap();
    let secret = secrets.create(attrs(json!({"name": "s"}))).unwrap();

    for verb in ["create", "build", "find-or-create"] {
        let err = bridge.invoke(verb, vec!["Secret".into(), map(json!({"name": "x"}))]).unwrap_err();
        assert_eq!(err, Error::not_allowed(verb, "Secret"));
    }
    for verb in ["update", "assign-attributes", "destroy", "save"] {
        let err = bridge
            .invoke(verb, vec![Value::Entity(Arc::clone(&secret)), map(json!({"name": "x"}))])
            .unwrap_err();
        assert_eq!(err.to_string(), format!("{} Secret : not allowed", verb));
    }

    assert_eq!(secrets.all().len().unwrap(), 1);
    assert_eq!(secrets.find(secret.id().unwrap()).unwrap().get("name"), Some(Value::from("s")));
}

#[test]
fn test_update_example() {
    let bridge = bridge();
    let widget = bridge
        .invoke("create", vec!["Widget".into(), map(json!({"name": "old"}))])
        .unwrap();

    let updated = bridge.invoke("update", vec![widget.clone(), map(json!({"name": "x"}))]).unwrap();
    assert_eq!(updated, widget);

    let id = widget.as_entity().unwrap().id().unwrap();
    let fresh = bridge.invoke("find", vec!["Widget".into(), Value::Int(id)]).unwrap();
    assert_eq!(bridge.resolve(fresh.as_entity().unwrap(), "name").unwrap(), Value::from("x"));
}

#[test]
fn test_assign_attributes_example() {
    let bridge = bridge();
    let widget = bridge
        .invoke("create", vec!["Widget".into(), map(json!({"name": "old"}))])
        .unwrap();
    bridge
        .invoke("assign-attributes", vec![widget.clone(), map(json!({"name": "x", "ghost_field": 1}))])
        .unwrap();

    let entity = widget.as_entity().unwrap();
    assert_eq!(entity.get("name"), Some(Value::from("x")));
    assert_eq!(entity.get("ghost_field"), None);
}

#[test]
fn test_find_missing_record() {
    let bridge = bridge();
    let err = bridge.invoke("find", vec!["Widget".into(), "12".into()]).unwrap_err();
    assert_eq!(err, Error::RecordNotFound { class: "Widget".into(), id: 12 });
    assert_eq!(err.to_string(), "Couldn't find Widget with 'id'=12");
}

#[test]
fn test_unknown_entity_type() {
    let bridge = bridge();
    let err = bridge.invoke("all-instances", vec!["Gizmo".into()]).unwrap_err();
    assert_eq!(err, Error::UnknownEntityType("Gizmo".into()));
}

#[test]
fn test_verbs_are_exact() {
    for verb in command::VERBS {
        assert_eq!(command::lookup(verb).unwrap().action_name(), *verb);
    }
    let bridge = bridge();
    assert!(matches!(
        bridge.invoke("find_or_create", vec!["Widget".into(), map(json!({"name": "a"}))]),
        Err(Error::InvalidArgument(_))
    ));
}

/// all-instances yields a sequence that walks every record and is wrapped
/// only once
#[test]
fn test_all_instances_sequence() {
    let bridge = bridge();
    for name in ["a", "b", "c"] {
        bridge.invoke("create", vec!["Widget".into(), map(json!({"name": name}))]).unwrap();
    }

    let Value::Relation(relation) = bridge.invoke("all-instances", vec!["Widget".into()]).unwrap()
    else {
        panic!("expected a relation")
    };
    let sequence = relation.to_sequence().unwrap();
    assert!(sequence.same(&relation.to_sequence().unwrap()));

    let names: Vec<Value> = sequence
        .iter()
        .map(|widget| bridge.resolve(widget.as_entity().unwrap(), "name").unwrap())
        .collect();
    assert_eq!(names, vec![Value::from("a"), Value::from("b"), Value::from("c")]);

    let mut cursor = sequence;
    for _ in 0..3 {
        cursor = cursor.tail();
    }
    assert!(cursor.is_empty());
    assert!(cursor.tail().same(&Sequence::Empty));
}

#[test]
fn test_pagination_metadata() {
    let bridge = bridge();
    for i in 0..7 {
        bridge
            .invoke("create", vec!["Widget".into(), map(json!({"name": format!("w{}", i)}))])
            .unwrap();
    }
    let widgets = bridge.registry().find("Widget").unwrap();

    let page = widgets.all().paginate(2, 3).unwrap();
    let sequence = page.to_sequence().unwrap();
    assert_eq!(sequence.size(), 3);
    let meta = sequence.pagination().unwrap();
    assert_eq!((meta.current_page, meta.per_page, meta.total_entries), (2, 3, 7));
    assert_eq!(meta.total_pages(), 3);

    let last = widgets.all().paginate(3, 3).unwrap().to_sequence().unwrap();
    assert_eq!(last.size(), 1);
    assert!(widgets.all().paginate(9, 3).unwrap().to_sequence().unwrap().is_empty());
}

#[test]
fn test_associations_through_resolver() {
    let bridge = bridge();
    let user = bridge.invoke("create", vec!["User".into(), map(json!({"name": "ann"}))]).unwrap();
    let uid = user.as_entity().unwrap().id().unwrap();
    let widget = bridge
        .invoke("create", vec!["Widget".into(), map(json!({"name": "gear", "user_id": uid}))])
        .unwrap();

    let owner = bridge.resolve(widget.as_entity().unwrap(), "user").unwrap();
    assert_eq!(owner, user);

    let Value::Relation(owned) = bridge.resolve(user.as_entity().unwrap(), "widgets").unwrap() else {
        panic!("expected a relation")
    };
    assert_eq!(owned.len().unwrap(), 1);
}

#[test]
fn test_guarded_dispatch_and_procedures() {
    let bridge = bridge();
    let user = bridge.invoke("create", vec!["User".into(), map(json!({"name": "ann"}))]).unwrap();
    let user = user.as_entity().unwrap();

    assert_eq!(
        bridge.resolve(user, "wipe").unwrap_err().to_string(),
        "call wipe on User : not allowed"
    );
    let Value::Procedure(greet) = bridge.resolve(user, "greet").unwrap() else {
        panic!("expected a procedure")
    };
    assert_eq!(greet.call(&[Value::from("bob")]).unwrap(), Value::from("ann greets bob"));
}

#[test]
fn test_inspect_is_stable() {
    let bridge = bridge();
    let user = bridge
        .invoke("create", vec!["User".into(), map(json!({"name": "ann", "password": "hunter2"}))])
        .unwrap();
    let user = user.as_entity().unwrap();
    let first = bridge.inspect(user);
    assert_eq!(first, format!("(User#{} {{ name \"ann\" }})", user.id().unwrap()));
    assert_eq!(bridge.inspect(user), first);
}

#[test]
fn test_event_order_and_reentrancy() {
    let bridge = bridge();
    let recorder = Arc::new(Recorder::default());
    bridge.registry().set_event_sink(Some(recorder.clone()));

    let widget = bridge
        .invoke("create", vec!["Widget".into(), map(json!({"name": "gear"}))])
        .unwrap();
    assert_eq!(
        recorder.tags(),
        vec![EventTag::AfterCreate, EventTag::AfterSave, EventTag::AfterCreateCommit]
    );

    bridge.invoke("save", vec![widget.clone()]).unwrap();
    widget.as_entity().unwrap().touch().unwrap();
    assert_eq!(recorder.tags()[3..], [EventTag::AfterSave, EventTag::AfterTouch]);

    // non-bridge classes never forward
    bridge.registry().find("Secret").unwrap().create(attrs(json!({"name": "s"}))).unwrap();
    assert_eq!(recorder.tags().len(), 5);
}

#[test]
fn test_disablement_scope() {
    let bridge = bridge();
    let recorder = Arc::new(Recorder::default());
    bridge.registry().set_event_sink(Some(recorder.clone()));

    without_hooks(|| {
        for i in 0..5 {
            bridge
                .invoke("create", vec!["Widget".into(), map(json!({"name": format!("w{}", i)}))])
                .unwrap();
        }
    });
    assert!(recorder.tags().is_empty());

    let guard = HooksDisabled::new();
    let other = Arc::clone(&bridge);
    thread::spawn(move || {
        other.invoke("create", vec!["Widget".into(), map(json!({"name": "elsewhere"}))]).unwrap();
    })
    .join()
    .unwrap();
    drop(guard);
    assert_eq!(recorder.tags().len(), 3);
}

// Shared fixtures for the integration tests

#![allow(dead_code)]

use luarecord::value::Value;
use luarecord::{Bridge, ClassBuilder, EventRecord, EventSink, EventTag, Options, Registry};
use parking_lot::Mutex;
use std::sync::Arc;

/// Registry with:
/// - `User` (bridge-enabled, has many widgets, a `greet` procedure)
/// - `Widget` (bridge-enabled, belongs to a user, name required)
/// - `Secret` (not bridge-enabled)
pub fn registry() -> Arc<Registry> {
    let _ = env_logger::builder().is_test(true).try_init();

    let registry = Registry::in_memory();
    registry
        .register(
            ClassBuilder::new("User")
                .uses_bridge()
                .columns(&["name", "password"])
                .has_many("widgets", "Widget", "user_id")
                .method("wipe", |_, _| Ok(Value::from("wiped")))
                .procedure("greet", |user, args| {
                    let name = user.get("name").unwrap_or_default();
                    let whom = args.first().cloned().unwrap_or_default();
                    Ok(Value::from(format!("{} greets {}", name, whom)))
                }),
        )
        .unwrap();
    registry
        .register(
            ClassBuilder::new("Widget")
                .uses_bridge()
                .columns(&["name"])
                .column("color", "grey")
                .tag_type("tags")
                .belongs_to("user", "User", "user_id")
                .require("name"),
        )
        .unwrap();
    registry.register(ClassBuilder::new("Secret").columns(&["name"])).unwrap();
    registry
}

pub fn bridge() -> Arc<Bridge> {
    Bridge::new(registry(), Options::default()).unwrap()
}

/// Records every forwarded event.
#[derive(Default)]
pub struct Recorder {
    pub seen: Mutex<Vec<(EventTag, String)>>,
}

impl Recorder {
    pub fn tags(&self) -> Vec<EventTag> {
        self.seen.lock().iter().map(|(tag, _)| *tag).collect()
    }
}

impl EventSink for Recorder {
    fn dispatch(&self, record: &EventRecord) -> luarecord::Result<()> {
        self.seen.lock().push((record.tag, record.entity.label()));
        Ok(())
    }
}

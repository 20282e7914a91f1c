//! Lifecycle event forwarding with a reentrancy guard.
//!
//! Host persistence calls `fire` after each lifecycle transition. An event
//! reaches the installed `EventSink` only if:
//!
//! - hooks are not disabled on the current thread,
//! - the entity's class uses the bridge,
//! - no other event for the same instance is being forwarded.
//!
//! ```text
//! idle --fire--> in_progress --sink returns (or fails)--> idle
//!                    |
//!                    +-- nested fire on the same instance: dropped
//! ```

use crate::entity::{Entity, EntityRef};
use crate::Result;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

thread_local! {
    static DISABLED_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Lifecycle events forwarded to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    /// Any successful save, create included.
    AfterSave,
    /// The first save of a new instance.
    AfterCreate,
    /// The write that created the instance was committed.
    AfterCreateCommit,
    /// `Entity::touch`.
    AfterTouch,
}

impl EventTag {
    /// The tag as passed to the runtime entry point.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::AfterSave => "after-save",
            EventTag::AfterCreate => "after-create",
            EventTag::AfterCreateCommit => "after-create-commit",
            EventTag::AfterTouch => "after-touch",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forwarded event.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// What happened.
    pub tag: EventTag,
    /// The instance it happened to.
    pub entity: EntityRef,
}

/// Receiver of forwarded lifecycle events.
pub trait EventSink: Send + Sync {
    /// Handles one event. An error propagates to the persistence call that
    /// triggered the event.
    fn dispatch(&self, record: &EventRecord) -> Result<()>;
}

/// Returns true while hooks are disabled on the current thread.
pub fn hooks_disabled() -> bool {
    DISABLED_DEPTH.with(|depth| depth.get() > 0)
}

/// Disables hook forwarding on the current thread until dropped.
///
/// Guards nest; hooks come back when the outermost guard is dropped. Other
/// threads are unaffected.
#[must_use = "hooks are re-enabled as soon as the guard is dropped"]
pub struct HooksDisabled {
    // thread-scoped state must be released on the thread that took it
    _not_send: PhantomData<*const ()>,
}

impl HooksDisabled {
    /// Disables hooks on the current thread.
    pub fn new() -> Self {
        DISABLED_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self { _not_send: PhantomData }
    }
}

impl Default for HooksDisabled {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HooksDisabled {
    fn drop(&mut self) {
        DISABLED_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Runs `f` with hooks disabled on the current thread.
pub fn without_hooks<T>(f: impl FnOnce() -> T) -> T {
    let _guard = HooksDisabled::new();
    f()
}

/// Clears the in-progress flag on every exit path, unwinding included.
struct InProgress<'a>(&'a Entity);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.leave_hook();
    }
}

/// Forwards `tag` for `entity` to the registry's sink, at most once per
/// outermost firing.
pub(crate) fn fire(entity: &EntityRef, tag: EventTag) -> Result<()> {
    if hooks_disabled() {
        log::trace!("Hooks disabled; dropping {} for {}", tag, entity.label());
        return Ok(());
    }
    let class = entity.class();
    if !class.uses_bridge() {
        return Ok(());
    }
    let Some(sink) = class.registry().and_then(|registry| registry.event_sink()) else {
        return Ok(());
    };
    if !entity.enter_hook() {
        log::debug!("Hook already running for {}; dropping {}", entity.label(), tag);
        return Ok(());
    }
    let _in_progress = InProgress(entity);

    log::debug!("Forwarding {} for {}", tag, entity.label());
    sink.dispatch(&EventRecord { tag, entity: std::sync::Arc::clone(entity) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ClassBuilder, EntityClass, Registry};
    use crate::value::attrs;
    use crate::Error;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(EventTag, Option<i64>)>>,
    }

    impl EventSink for Recorder {
        fn dispatch(&self, record: &EventRecord) -> Result<()> {
            self.seen.lock().push((record.tag, record.entity.id()));
            Ok(())
        }
    }

    fn setup(bridge: bool) -> (Arc<Registry>, Arc<EntityClass>, Arc<Recorder>) {
        let registry = Registry::in_memory();
        let mut builder = ClassBuilder::new("Widget").columns(&["name"]);
        if bridge {
            builder = builder.uses_bridge();
        }
        let class = registry.register(builder).unwrap();
        let recorder = Arc::new(Recorder::default());
        registry.set_event_sink(Some(recorder.clone()));
        (registry, class, recorder)
    }

    fn tags(recorder: &Recorder) -> Vec<EventTag> {
        recorder.seen.lock().iter().map(|(tag, _)| *tag).collect()
    }

    #[test]
    fn test_create_then_save_events() {
        let (_registry, class, recorder) = setup(true);
        let widget = class.create(attrs(json!({"name": "a"}))).unwrap();
        assert_eq!(
            tags(&recorder),
            vec![EventTag::AfterCreate, EventTag::AfterSave, EventTag::AfterCreateCommit]
        );

        widget.save().unwrap();
        widget.touch().unwrap();
        assert_eq!(
            tags(&recorder)[3..],
            [EventTag::AfterSave, EventTag::AfterTouch]
        );
        assert!(recorder.seen.lock().iter().all(|(_, id)| *id == widget.id()));
    }

    #[test]
    fn test_non_bridge_class_never_forwards() {
        let (_registry, class, recorder) = setup(false);
        class.create(attrs(json!({"name": "a"}))).unwrap();
        assert!(tags(&recorder).is_empty());
    }

    #[test]
    fn test_disabled_scope() {
        let (_registry, class, recorder) = setup(true);
        without_hooks(|| {
            let widget = class.create(attrs(json!({"name": "a"}))).unwrap();
            {
                let _nested = HooksDisabled::new();
                widget.save().unwrap();
            }
            widget.touch().unwrap();
        });
        assert!(tags(&recorder).is_empty());
        assert!(!hooks_disabled());

        class.create(attrs(json!({"name": "b"}))).unwrap();
        assert_eq!(tags(&recorder).len(), 3);
    }

    #[test]
    fn test_disablement_is_per_thread() {
        let (_registry, class, recorder) = setup(true);
        let _guard = HooksDisabled::new();
        let other = Arc::clone(&class);
        std::thread::spawn(move || {
            other.create(attrs(json!({"name": "elsewhere"}))).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(tags(&recorder).len(), 3);
    }

    struct Reentrant {
        calls: Mutex<usize>,
    }

    impl EventSink for Reentrant {
        fn dispatch(&self, record: &EventRecord) -> Result<()> {
            *self.calls.lock() += 1;
            record.entity.save()
        }
    }

    #[test]
    fn test_nested_event_is_dropped() {
        let (registry, class, _recorder) = setup(true);
        let sink = Arc::new(Reentrant { calls: Mutex::new(0) });
        registry.set_event_sink(Some(sink.clone()));

        let widget = class.create(attrs(json!({"name": "a"}))).unwrap();
        assert_eq!(*sink.calls.lock(), 3);

        widget.save().unwrap();
        assert_eq!(*sink.calls.lock(), 4);
        assert!(!widget.hook_in_progress());
    }

    struct Failing;

    impl EventSink for Failing {
        fn dispatch(&self, _record: &EventRecord) -> Result<()> {
            Err(Error::script("handler blew up"))
        }
    }

    #[test]
    fn test_failure_returns_to_idle() {
        let (registry, class, _recorder) = setup(true);
        registry.set_event_sink(Some(Arc::new(Failing)));

        let err = class.create(attrs(json!({"name": "a"}))).unwrap_err();
        assert_eq!(err, Error::script("handler blew up"));

        assert!(class.all().entities().unwrap().is_empty());

        let widget = class.build(attrs(json!({"name": "b"}))).unwrap();
        assert!(widget.save().is_err());
        assert!(!widget.hook_in_progress());
        assert_eq!(widget.id(), None);
        assert!(class.all().entities().unwrap().is_empty());
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(EventTag::AfterCreateCommit.to_string(), "after-create-commit");
        assert_eq!(EventTag::AfterTouch.as_str(), "after-touch");
    }
}

// Property tests for sequence traversal, wrapping identity and hook forwarding

mod common;

use common::{registry, Recorder};
use luarecord::value::{attrs, Value};
use luarecord::{without_hooks, Collection, Sequence, SequenceCache};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

proptest! {
    /// Walking n tails reaches the empty sequence exactly once and stays there
    #[test]
    fn prop_traversal_reaches_empty_once(items in prop::collection::vec(any::<i64>(), 0..64), extra in 0usize..8) {
        let values: Vec<Value> = items.iter().copied().map(Value::Int).collect();
        let mut cursor = Sequence::from_values(values.clone());
        let mut empties = usize::from(cursor.is_empty());

        for expected in &values {
            prop_assert_eq!(&cursor.head(), expected);
            cursor = cursor.tail();
            if cursor.is_empty() {
                empties += 1;
            }
        }
        prop_assert_eq!(empties, 1);

        for _ in 0..extra {
            cursor = cursor.tail();
            prop_assert!(cursor.same(&Sequence::Empty));
        }
    }

    /// size() counts the remaining elements at every position
    #[test]
    fn prop_size_is_remaining(len in 0usize..64) {
        let mut cursor = Sequence::from_values((0..len as i64).map(Value::Int).collect());
        for remaining in (0..=len).rev() {
            prop_assert_eq!(cursor.size(), remaining);
            cursor = cursor.tail();
        }
    }

    /// Wrapping the same backing collection twice yields the same node
    #[test]
    fn prop_wrapping_is_idempotent(len in 0usize..32, rewraps in 1usize..5) {
        let cache = SequenceCache::new();
        let backing: Arc<dyn Collection> = Arc::new((0..len as i64).map(Value::Int).collect::<Vec<_>>());
        let first = cache.wrap(Arc::clone(&backing));
        for _ in 0..rewraps {
            prop_assert!(cache.wrap(Arc::clone(&backing)).same(&first));
        }
    }

    /// No event reaches the sink inside a disabled scope, whatever the
    /// number of transitions
    #[test]
    fn prop_disabled_scope_forwards_nothing(creates in 1usize..6, saves in 0usize..6) {
        let registry = registry();
        let recorder = Arc::new(Recorder::default());
        registry.set_event_sink(Some(recorder.clone()));
        let widgets = registry.find("Widget").unwrap();

        without_hooks(|| {
            for i in 0..creates {
                let widget = widgets.create(attrs(json!({"name": format!("w{}", i)}))).unwrap();
                for _ in 0..saves {
                    widget.save().unwrap();
                }
                widget.touch().unwrap();
            }
        });
        prop_assert!(recorder.tags().is_empty());
    }

    /// Outside a disabled scope each transition forwards exactly once
    #[test]
    fn prop_each_transition_forwards_once(saves in 0usize..8) {
        let registry = registry();
        let recorder = Arc::new(Recorder::default());
        registry.set_event_sink(Some(recorder.clone()));
        let widget = registry.find("Widget").unwrap().create(attrs(json!({"name": "w"}))).unwrap();
        for _ in 0..saves {
            widget.save().unwrap();
        }
        prop_assert_eq!(recorder.tags().len(), 3 + saves);
    }
}

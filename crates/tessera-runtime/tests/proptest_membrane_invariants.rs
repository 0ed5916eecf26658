//! Property-based invariants for the reactive membrane.
//!
//! 1. Wrapping is idempotent: `wrap(x)` is the same proxy every time while a
//!    handle to it lives, and wrapping a proxy returns it unchanged.
//! 2. Primitives pass through `wrap` untouched.
//! 3. A proxy is deep-equal to the raw value it wraps and never identical.
//! 4. Writes through a proxy land in the raw container, and reads reflect the
//!    last write.
//! 5. However many writes hit keys an observer read, it is queued once.

use std::rc::Rc;

use proptest::prelude::*;
use tessera_runtime::{Key, Membrane, ObserverId, RenderBridge, RuntimeConfig, Scheduler, Value};

fn membrane() -> (Rc<Scheduler>, Membrane) {
    let scheduler = Rc::new(Scheduler::new());
    let bridge: Rc<dyn RenderBridge> = scheduler.clone();
    (scheduler, Membrane::new(bridge, &RuntimeConfig::default()))
}

fn primitive() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Undefined),
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
    ]
}

fn plain() -> impl Strategy<Value = Value> {
    primitive().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::array),
            proptest::collection::btree_map("[a-d]", inner, 0..4).prop_map(Value::object),
        ]
    })
}

fn object_with_keys() -> impl Strategy<Value = (Vec<String>, Vec<(usize, i32)>)> {
    proptest::collection::btree_set("[a-f]", 1..6)
        .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
        .prop_flat_map(|keys| {
            let n = keys.len();
            (
                Just(keys),
                proptest::collection::vec((0..n, any::<i32>()), 0..12),
            )
        })
}

proptest! {
    #[test]
    fn wrap_is_idempotent(value in plain()) {
        let (_, membrane) = membrane();
        let first = membrane.wrap(value.clone());
        let second = membrane.wrap(value.clone());
        prop_assert!(first.is_same(&second));
        prop_assert!(membrane.wrap(first.clone()).is_same(&first));
        prop_assert!(membrane.unwrap(first.clone()).is_same(&value));
        prop_assert_eq!(membrane.untrackable_total(), 0);
    }

    #[test]
    fn primitives_are_never_wrapped(value in primitive()) {
        let (_, membrane) = membrane();
        let wrapped = membrane.wrap(value.clone());
        prop_assert!(wrapped.as_proxy().is_none());
        prop_assert!(wrapped.is_same(&value) || value.as_number().is_some_and(f64::is_nan));
    }

    #[test]
    fn proxy_equals_but_is_not_raw(value in plain()) {
        prop_assume!(value.container().is_some());
        let (_, membrane) = membrane();
        let wrapped = membrane.wrap(value.clone());
        prop_assert_eq!(&wrapped, &value);
        prop_assert!(!wrapped.is_same(&value));
    }

    #[test]
    fn writes_reach_raw_container((keys, writes) in object_with_keys()) {
        let (_, membrane) = membrane();
        let raw = Value::object(keys.iter().map(|k| (k.as_str(), Value::Null)));
        let wrapped = membrane.wrap(raw.clone());
        let proxy = wrapped.as_proxy().expect("objects wrap");
        let mut model: std::collections::BTreeMap<String, Value> =
            keys.iter().map(|k| (k.clone(), Value::Null)).collect();
        for (index, n) in &writes {
            let key = &keys[*index];
            proxy.set(key.as_str(), Value::from(*n)).expect("write outside render");
            model.insert(key.clone(), Value::from(*n));
        }
        let container = raw.container().expect("object");
        for (key, expected) in &model {
            prop_assert_eq!(&container.get(&Key::from(key.as_str())), expected);
            prop_assert_eq!(&proxy.get(key.as_str()), expected);
        }
    }

    #[test]
    fn observer_is_queued_once((keys, writes) in object_with_keys()) {
        let (scheduler, membrane) = membrane();
        let observer = ObserverId::new(u64::MAX);
        let wrapped = membrane.wrap(Value::object(keys.iter().map(|k| (k.as_str(), Value::Null))));
        let proxy = wrapped.as_proxy().expect("objects wrap");
        {
            let _render = scheduler.enter(observer, "x-reader");
            for key in &keys {
                proxy.get(key.as_str());
            }
        }
        for (index, n) in &writes {
            proxy.set(keys[*index].as_str(), Value::from(*n)).expect("write");
        }
        let expected = if writes.is_empty() { vec![] } else { vec![observer] };
        prop_assert_eq!(scheduler.take_queue(), expected);
    }
}

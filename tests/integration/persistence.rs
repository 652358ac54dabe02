//! Objects owned by the persistence layer

use crate::support::{builder, counter_value};
use taskbind::{BindingError, CallArgs, Obj, Returned, StorageBackend};

#[test]
fn test_result_made_persistent_in_task() {
    let mut s = builder().storage().start();
    let future = s
        .binding
        .call(&s.extra.make_counter, CallArgs::new().arg(7))
        .unwrap()
        .and_then(Returned::into_one)
        .unwrap();
    s.binding.wait_on_one(&future).unwrap();

    let id = future.persistent_id().expect("persisted counter");
    assert_eq!(counter_value(&future), Some(7));
    let storage = s.storage.as_ref().unwrap();
    assert_eq!(counter_value(&storage.get_by_id(&id).unwrap()), Some(7));
}

#[test]
fn test_persistent_argument_round_trip() {
    let mut s = builder().storage().start();
    let counter = s
        .binding
        .call(&s.extra.make_counter, CallArgs::new().arg(1))
        .unwrap()
        .and_then(Returned::into_one)
        .unwrap();
    s.binding.wait_on_one(&counter).unwrap();

    for _ in 0..2 {
        s.binding
            .call(&s.extra.bump, CallArgs::new().arg(counter.clone()))
            .unwrap();
        assert!(s.binding.is_pending(&counter));
        s.binding.wait_on_one(&counter).unwrap();
    }
    assert_eq!(counter_value(&counter), Some(3));
    assert_eq!(s.stats.failures(), 0);
}

#[test]
fn test_persistent_object_from_main() {
    let mut s = builder().storage().start();
    let storage = s.storage.clone().unwrap();
    let counter = Obj::new(taskbind::Record::new("Counter").with_field("value", 40));
    storage.make_persistent(&counter).unwrap();

    s.binding
        .call(&s.extra.bump, CallArgs::new().arg(counter.clone()))
        .unwrap();
    s.binding.wait_on_one(&counter).unwrap();
    assert_eq!(counter_value(&counter), Some(41));
}

#[test]
fn test_persistent_target_of_modifier() {
    let mut s = builder().storage().start();
    let storage = s.storage.clone().unwrap();
    let counter = Obj::new(taskbind::Record::new("Counter").with_field("value", 10));
    let id = storage.make_persistent(&counter).unwrap();

    s.binding
        .call(
            &s.tasks.counter_add,
            CallArgs::new().target(counter.clone()).arg(5),
        )
        .unwrap();
    assert!(s.binding.is_pending(&counter));
    s.binding.wait_on_one(&counter).unwrap();

    assert_eq!(s.stats.failures(), 0);
    assert_eq!(counter_value(&counter), Some(15));
    assert_eq!(counter_value(&storage.get_by_id(&id).unwrap()), Some(15));
}

#[test]
fn test_persistent_result_needs_storage() {
    let mut s = builder().worker_storage_only().start();
    let future = s
        .binding
        .call(&s.extra.make_counter, CallArgs::new().arg(1))
        .unwrap()
        .and_then(Returned::into_one)
        .unwrap();
    let err = s.binding.wait_on_one(&future).unwrap_err();
    assert!(matches!(err, BindingError::StorageDisabled(_)));
}

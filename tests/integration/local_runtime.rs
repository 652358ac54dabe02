//! End-to-end calls through the in-process runtime

use crate::support::{builder, counter_value, session};
use std::fs;
use std::io::Read;
use taskbind::binding::TEMP_OBJ_PREFIX;
use taskbind::{BindingError, CallArgs, InlinePolicy, Obj, Record, Resolved, Returned, Value};

fn one(returned: Option<Returned>) -> Obj {
    returned.and_then(Returned::into_one).expect("one future")
}

#[test]
fn test_scalar_task() {
    let mut s = session();
    let future = one(s
        .binding
        .call(&s.tasks.increment, CallArgs::new().arg(5))
        .unwrap());
    let value = s.binding.wait_on_one(&future).unwrap();
    assert_eq!(value.as_int(), Some(6));
    assert!(value.ptr_eq(&future));
    assert!(!s.binding.is_pending(&future));
    assert_eq!(s.stats.submissions(), 1);
    assert_eq!(s.stats.failures(), 0);
}

#[test]
fn test_inout_list() {
    let mut s = session();
    let a = Obj::list([1]);
    let b = Obj::list([10]);
    s.binding
        .call(&s.tasks.accumulate, CallArgs::new().arg(a.clone()).arg(b.clone()))
        .unwrap();
    assert!(s.binding.is_pending(&b));

    s.binding.wait_on_one(&b).unwrap();
    assert_eq!(b, Obj::list([11]));
    s.binding.wait_on_one(&a).unwrap();
    assert_eq!(a, Obj::list([1]));
}

#[test]
fn test_same_list_twice() {
    let mut s = session();
    let list = Obj::list([1]);
    s.binding
        .call(
            &s.tasks.accumulate,
            CallArgs::new().arg(list.clone()).arg(list.clone()),
        )
        .unwrap();
    s.binding.wait_on_one(&list).unwrap();
    assert_eq!(list, Obj::list([2]));
}

#[test]
fn test_main_writes_travel_to_next_task() {
    let mut s = session();
    let a = Obj::list([1]);
    let b = Obj::list([10]);
    s.binding
        .call(&s.tasks.accumulate, CallArgs::new().arg(a.clone()).arg(b.clone()))
        .unwrap();
    s.binding.wait_on_one(&b).unwrap();
    b.item(0).unwrap().set(100);

    s.binding
        .call(&s.tasks.accumulate, CallArgs::new().arg(a.clone()).arg(b.clone()))
        .unwrap();
    s.binding.wait_on_one(&b).unwrap();
    assert_eq!(b, Obj::list([101]));
    assert_eq!(s.stats.registrations(), 1);
}

#[test]
fn test_synced_list_written_again_after_read() {
    let mut s = session();
    let list = Obj::list([1]);
    s.binding
        .call(&s.tasks.accumulate, CallArgs::new().arg(Obj::list([10])).arg(list.clone()))
        .unwrap();
    s.binding.wait_on_one(&list).unwrap();
    assert_eq!(list, Obj::list([11]));

    // Reading re-serializes the synchronized version; the write that follows
    // reuses the same file
    s.binding
        .call(&s.tasks.accumulate, CallArgs::new().arg(list.clone()).arg(Obj::list([0])))
        .unwrap();
    s.binding
        .call(&s.tasks.accumulate, CallArgs::new().arg(Obj::list([5])).arg(list.clone()))
        .unwrap();
    assert!(s.binding.is_pending(&list));

    s.binding.wait_on_one(&list).unwrap();
    assert_eq!(list, Obj::list([16]));
    assert_eq!(s.stats.failures(), 0);
}

#[test]
fn test_multiple_returns() {
    let mut s = session();
    let futures = s
        .binding
        .call(&s.tasks.divmod, CallArgs::new().arg(17).arg(5))
        .unwrap()
        .map(Returned::into_vec)
        .unwrap();
    assert_eq!(futures.len(), 2);

    // Each return resolves on its own
    let remainder = s.binding.wait_on_one(&futures[1]).unwrap();
    assert_eq!(remainder.as_int(), Some(2));
    assert!(s.binding.is_pending(&futures[0]));

    match s.binding.wait_on(&futures).unwrap() {
        Resolved::Many(values) => {
            let ints: Vec<_> = values.iter().map(Obj::as_int).collect();
            assert_eq!(ints, vec![Some(3), Some(2)]);
        }
        other => panic!("expected two values, got {:?}", other),
    }
}

#[test]
fn test_future_feeds_next_task() {
    let mut s = session();
    let first = one(s
        .binding
        .call(&s.tasks.increment, CallArgs::new().arg(1))
        .unwrap());
    let second = one(s
        .binding
        .call(&s.tasks.increment, CallArgs::new().arg(first.clone()))
        .unwrap());
    assert_eq!(s.binding.wait_on_one(&second).unwrap().as_int(), Some(3));
    assert_eq!(s.binding.wait_on_one(&first).unwrap().as_int(), Some(2));
}

#[test]
fn test_wait_is_idempotent() {
    let mut s = session();
    let future = one(s
        .binding
        .call(&s.tasks.increment, CallArgs::new().arg(41))
        .unwrap());
    s.binding.wait_on_one(&future).unwrap();
    let requests = s.stats.file_requests();

    let again = s.binding.wait_on_one(&future).unwrap();
    assert_eq!(again.as_int(), Some(42));
    assert_eq!(s.stats.file_requests(), requests);
}

#[test]
fn test_empty_markers_filtered() {
    let mut s = session();
    let future = one(s
        .binding
        .call(&s.tasks.increment, CallArgs::new().arg(5))
        .unwrap());
    let resolved = s.binding.wait_on(&[future, Obj::empty()]).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved.into_one().and_then(|o| o.as_int()), Some(6));
}

#[test]
fn test_instance_method_updates_target() {
    let mut s = session();
    let counter = Obj::new(Record::new("Counter").with_field("value", 10));
    s.binding
        .call(
            &s.tasks.counter_add,
            CallArgs::new().target(counter.clone()).arg(5),
        )
        .unwrap();
    s.binding.wait_on_one(&counter).unwrap();
    assert_eq!(counter_value(&counter), Some(15));
}

#[test]
fn test_inlined_arguments() {
    for policy in [InlinePolicy::ObjectSize, InlinePolicy::SerializedSize] {
        let mut s = builder()
            .config(|c| c.with_object_conversion(policy))
            .start();
        let a = Obj::list([1]);
        let b = Obj::list([10]);
        s.binding
            .call(&s.tasks.accumulate, CallArgs::new().arg(a.clone()).arg(b.clone()))
            .unwrap();
        assert_eq!(s.binding.file_of(&a), None, "{:?}", policy);
        s.binding.wait_on_one(&b).unwrap();
        assert_eq!(b, Obj::list([11]), "{:?}", policy);
    }
}

#[test]
fn test_varargs_both_conventions() {
    for as_tuple in [false, true] {
        let mut s = builder()
            .config(|c| c.with_args_as_tuple(as_tuple))
            .start();
        let future = one(s
            .binding
            .call(&s.extra.sum, CallArgs::new().args([1, 2, 3]))
            .unwrap());
        assert_eq!(
            s.binding.wait_on_one(&future).unwrap().as_int(),
            Some(6),
            "args_as_tuple = {}",
            as_tuple
        );
    }
}

#[test]
fn test_declared_file_output() {
    let mut s = session();
    let path = s.dir.path().join("out.txt");
    s.binding
        .call(
            &s.extra.write_text,
            CallArgs::new()
                .arg(path.display().to_string())
                .arg("hello there"),
        )
        .unwrap();
    let mut text = String::new();
    s.binding
        .open_file(&path, "r")
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "hello there");
    assert!(s.binding.delete_file(&path).unwrap());
    assert!(!path.exists());
}

#[test]
fn test_failed_task_is_counted() {
    let mut s = session();
    let future = one(s.binding.call(&s.extra.fail, CallArgs::new()).unwrap());
    assert_eq!(s.stats.failures(), 1);
    // Nothing was written for the return
    assert!(s.binding.wait_on_one(&future).is_err());
}

#[test]
fn test_stop_removes_staged_objects() {
    let mut s = session();
    let future = one(s
        .binding
        .call(&s.tasks.increment, CallArgs::new().arg(1))
        .unwrap());
    s.binding
        .call(&s.tasks.accumulate, CallArgs::new().arg(Obj::list([1])).arg(Obj::list([2])))
        .unwrap();
    s.binding.wait_on_one(&future).unwrap();
    let staging = s.binding.temp_dir().to_path_buf();
    s.binding.barrier(true).unwrap();
    s.binding.stop().unwrap();

    let leftovers = fs::read_dir(&staging)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_OBJ_PREFIX))
        .count();
    assert_eq!(leftovers, 0);

    let err = s
        .binding
        .call(&s.tasks.increment, CallArgs::new().arg(1))
        .unwrap_err();
    assert!(matches!(err, BindingError::NotStarted));
    assert!(matches!(future.get(), Value::Int(2)));
}

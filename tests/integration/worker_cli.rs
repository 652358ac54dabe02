//! The `worker` subcommand as the runtime launches it

use std::path::Path;
use std::process::{Command, Output};
use taskbind::value::serializer::{deserialize_from_file, serialize_to_file};
use taskbind::Obj;
use tempfile::TempDir;

fn run_worker(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskbind"))
        .arg("worker")
        .args(args)
        .output()
        .expect("Failed to spawn worker")
}

fn show(output: &Output) -> String {
    format!(
        "status: {:?}\nstdout: {}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn test_worker_runs_scalar_task() {
    let dir = TempDir::new().unwrap();
    let ret = dir.path().join("ret");
    let ret_arg = ret.display().to_string();
    let output = run_worker(&[
        "false", "1", "false", "null", "METHOD", "demo", "increment", "0", "1", "false", "9",
        "2", "4", "3", "null", "5", "9", "3", "#", &ret_arg,
    ]);
    assert!(output.status.success(), "{}", show(&output));
    assert_eq!(deserialize_from_file(&ret).unwrap().as_int(), Some(6));
}

#[test]
fn test_worker_updates_inout_object() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    serialize_to_file(&Obj::list([3]), &a).unwrap();
    serialize_to_file(&Obj::list([4]), &b).unwrap();
    let (a_arg, b_arg) = (a.display().to_string(), b.display().to_string());
    let output = run_worker(&[
        "false", "2", "false", "null", "METHOD", "demo", "accumulate", "0", "1", "false",
        "null", "2", "9", "3", "null", &a_arg, "9", "3", "null", &b_arg,
    ]);
    assert!(output.status.success(), "{}", show(&output));
    assert_eq!(deserialize_from_file(&b).unwrap(), Obj::list([7]));
}

#[test]
fn test_worker_exit_codes() {
    let missing = run_worker(&[
        "false", "3", "false", "null", "METHOD", "demo", "missing", "0", "1", "false", "null",
        "0",
    ]);
    assert_eq!(missing.status.code(), Some(3), "{}", show(&missing));

    let malformed = run_worker(&[
        "false", "4", "false", "null", "METHOD", "demo", "increment", "0", "1", "false", "9",
        "2", "77", "3", "null", "5",
    ]);
    assert_eq!(malformed.status.code(), Some(2), "{}", show(&malformed));

    let failed = run_worker(&[
        "false", "5", "false", "null", "METHOD", "demo", "divmod", "0", "1", "false", "9", "4",
        "4", "3", "null", "1", "4", "3", "null", "0", "9", "3", "#", "/nonexistent/r0", "9",
        "3", "#", "/nonexistent/r1",
    ]);
    assert_eq!(failed.status.code(), Some(1), "{}", show(&failed));
    assert!(!Path::new("/nonexistent/r0").exists());
}

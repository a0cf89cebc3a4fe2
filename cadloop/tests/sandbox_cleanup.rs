//! Sandbox lifecycle: every execution leaves its scratch root empty.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use cadloop::core::types::ExecutionStatus;
use cadloop::io::sandbox::{Interpreter, ProcessSandbox, Sandbox, TIMEOUT_MESSAGE};

fn shell_sandbox(root: &Path) -> ProcessSandbox {
    ProcessSandbox::new(Interpreter::new("sh"))
        .with_entry_file("script.sh")
        .with_scratch_root(root)
}

fn assert_empty(root: &Path) {
    let leftovers: Vec<_> = fs::read_dir(root)
        .expect("read scratch root")
        .map(|entry| entry.expect("entry").path())
        .collect();
    assert!(leftovers.is_empty(), "scratch dirs left behind: {leftovers:?}");
}

#[test]
fn success_keeps_produced_files_and_removes_scratch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sandbox = shell_sandbox(temp.path());

    let result = sandbox.execute(
        "mkdir -p out\nprintf solid > out/model.stl\necho done\n",
        Duration::from_secs(5),
    );

    assert_eq!(result.status, ExecutionStatus::Success, "{}", result.message);
    assert_eq!(result.stdout, "done\n");
    assert_eq!(
        result.produced_files.keys().collect::<Vec<_>>(),
        vec!["out/model.stl"]
    );
    assert_eq!(result.produced_files["out/model.stl"], b"solid");
    assert_empty(temp.path());
}

#[test]
fn runtime_error_removes_scratch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sandbox = shell_sandbox(temp.path());

    let result = sandbox.execute(
        "touch partial.stl\necho boom >&2\nexit 3\n",
        Duration::from_secs(5),
    );

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert_eq!(result.message, "boom");
    assert!(result.produced_files.is_empty());
    assert_empty(temp.path());
}

#[test]
fn timeout_kills_candidate_and_returns_promptly() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sandbox = shell_sandbox(temp.path());
    let timeout = Duration::from_secs(1);

    let started = Instant::now();
    let result = sandbox.execute("touch started\nsleep 10\n", timeout);
    let elapsed = started.elapsed();

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.message, TIMEOUT_MESSAGE);
    assert!(
        elapsed < timeout + Duration::from_secs(2),
        "execute took {elapsed:?}"
    );
    assert_empty(temp.path());
}

#[test]
fn timeout_also_kills_background_children() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sandbox = shell_sandbox(temp.path());
    let timeout = Duration::from_secs(1);

    let started = Instant::now();
    let result = sandbox.execute("sleep 10 &\nsleep 10\n", timeout);

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(started.elapsed() < timeout + Duration::from_secs(2));
    assert_empty(temp.path());
}

#[test]
fn success_keeps_stdout_and_kills_lingering_background_children() {
    let temp = tempfile::tempdir().expect("tempdir");
    let scratch_root = temp.path().join("scratch");
    let marker = temp.path().join("late.txt");
    let sandbox = shell_sandbox(&scratch_root);

    let script = format!(
        "echo ok\n(sleep 1; echo late > '{}') &\n",
        marker.display()
    );
    let started = Instant::now();
    let result = sandbox.execute(&script, Duration::from_secs(5));

    assert_eq!(result.status, ExecutionStatus::Success, "{}", result.message);
    assert_eq!(result.stdout, "ok\n");
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_empty(&scratch_root);

    thread::sleep(Duration::from_secs(2));
    assert!(!marker.exists(), "background child outlived the execution");
}

#[test]
fn parallel_executions_use_independent_scratch_dirs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sandbox = shell_sandbox(temp.path());

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sandbox = &sandbox;
                scope.spawn(move || {
                    let script = format!("ls > listing.txt\necho {i}\n");
                    sandbox.execute(&script, Duration::from_secs(5))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect()
    });

    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.status, ExecutionStatus::Success, "{}", result.message);
        assert_eq!(result.stdout, format!("{i}\n"));
        let listing = String::from_utf8_lossy(&result.produced_files["listing.txt"]).to_string();
        let names: Vec<_> = listing.lines().collect();
        assert!(
            names.iter().all(|n| *n == "listing.txt" || *n == "script.sh"),
            "foreign files visible: {names:?}"
        );
    }
    assert_empty(temp.path());
}

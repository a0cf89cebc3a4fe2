//! Coding loop escalation and the validate-then-execute path against real collaborators.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use cadloop::coding::{CodingLoop, CodingRequest};
use cadloop::core::types::{ExecutionResult, ExecutionStatus, Tier};
use cadloop::io::modules::ModuleIndex;
use cadloop::io::sandbox::{Interpreter, ProcessSandbox, Sandbox};
use cadloop::test_support::{FixedSandbox, ScriptedGenerator};
use cadloop::validate::{ValidationPipeline, Validator};

fn failing_sandbox() -> FixedSandbox {
    FixedSandbox::new(ExecutionResult::runtime_error("ZeroDivisionError: division by zero"))
}

fn pipeline() -> ValidationPipeline {
    ValidationPipeline::new(ModuleIndex::stdlib_only())
}

#[test]
fn last_third_of_attempts_go_to_master() {
    let standard = ScriptedGenerator::new(&["x = 1 / 0\n"; 9]);
    let master = ScriptedGenerator::new(&["x = 2 / 0\n"; 9]);
    let sandbox = failing_sandbox();
    let coding = CodingLoop::builder()
        .generator(standard.clone())
        .master(master.clone())
        .validator(pipeline())
        .sandbox(Arc::new(sandbox.clone()))
        .build()
        .expect("build");

    let outcome = coding.generate(&CodingRequest::new("a bracket", 9));

    assert!(outcome.candidate.is_none());
    assert_eq!(outcome.attempts, 9);
    assert_eq!(standard.calls().len(), 6);
    assert_eq!(master.calls().len(), 3);
    assert_eq!(sandbox.calls().len(), 9);
    // The master continues from the standard tier's last candidate.
    assert_eq!(master.calls()[0].code.as_deref(), Some("x = 1 / 0\n"));
    assert_eq!(
        outcome.last_feedback.as_deref(),
        Some("ZeroDivisionError: division by zero")
    );
}

#[test]
fn master_success_is_tagged() {
    let standard = ScriptedGenerator::new(&["x = 1 / 0\n"; 2]);
    let master = ScriptedGenerator::new(&["x = 1\n"]);
    let sandbox = FixedSandbox::sequence(vec![
        ExecutionResult::runtime_error("ZeroDivisionError"),
        ExecutionResult::runtime_error("ZeroDivisionError"),
        ExecutionResult::success(String::new(), BTreeMap::new()),
    ]);
    let coding = CodingLoop::builder()
        .generator(standard)
        .master(master)
        .validator(pipeline())
        .sandbox(Arc::new(sandbox))
        .build()
        .expect("build");

    let candidate = coding
        .generate(&CodingRequest::new("a bracket", 3))
        .candidate
        .expect("candidate");

    assert_eq!(candidate.tier, Tier::Master);
    assert_eq!(candidate.attempt, 2);
}

#[test]
fn without_master_standard_generator_makes_every_attempt() {
    let standard = ScriptedGenerator::new(&["x = 1 / 0\n"; 9]);
    let coding = CodingLoop::builder()
        .generator(standard.clone())
        .validator(pipeline())
        .sandbox(Arc::new(failing_sandbox()))
        .build()
        .expect("build");

    let outcome = coding.generate(&CodingRequest::new("a bracket", 9));

    assert!(outcome.candidate.is_none());
    assert_eq!(outcome.attempts, 9);
    assert_eq!(standard.calls().len(), 9);
}

#[test]
fn accepted_candidate_passes_validation_again() {
    let pipeline = pipeline();
    let generator = ScriptedGenerator::new(&["import os\nresult = os.sep\n"]);
    let coding = CodingLoop::builder()
        .generator(generator)
        .validator(pipeline.clone())
        .sandbox(Arc::new(FixedSandbox::new(ExecutionResult::success(
            String::new(),
            BTreeMap::new(),
        ))))
        .build()
        .expect("build");

    let candidate = coding
        .generate(&CodingRequest::new("a bracket", 1))
        .candidate
        .expect("candidate");

    let first = pipeline.validate(&candidate.text);
    let second = pipeline.validate(&candidate.text);
    assert!(first.ok);
    assert_eq!(first, second);
}

fn python3_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[test]
fn missing_import_is_fixed_then_runs_in_python() {
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");
    let interpreter = Interpreter::new("python3");
    let sandbox = Arc::new(ProcessSandbox::new(interpreter.clone()).with_scratch_root(temp.path()));
    let generator = ScriptedGenerator::new(&[
        "import definitely_missing_mod\nprint('never')\n",
        "print(\"ok\")\n",
    ]);
    let coding = CodingLoop::builder()
        .generator(generator.clone())
        .validator(ValidationPipeline::new(ModuleIndex::discover(&interpreter)))
        .sandbox(sandbox.clone())
        .test_timeout(Duration::from_secs(10))
        .build()
        .expect("build");

    let outcome = coding.generate(&CodingRequest::new("print ok", 5));

    let candidate = outcome.candidate.expect("candidate");
    assert_eq!(candidate.text, "print(\"ok\")\n");
    assert_eq!(outcome.attempts, 2);
    let calls = generator.calls();
    assert_eq!(
        calls[1].feedback.as_deref(),
        Some("missing modules: definitely_missing_mod")
    );

    let rerun = sandbox.execute(&candidate.text, Duration::from_secs(10));
    assert_eq!(rerun.status, ExecutionStatus::Success, "{}", rerun.message);
    assert_eq!(rerun.stdout, "ok\n");
    assert_eq!(
        std::fs::read_dir(temp.path()).expect("read").count(),
        0,
        "scratch dirs left behind"
    );
}

//! CLI tests: spawn the cadloop binary and check exit codes and JSON output.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use cadloop::exit_codes;
use cadloop::io::agent::AgentCommand;
use cadloop::io::config::{CadloopConfig, load_config, write_config};
use serde_json::{Value, json};

const OFFLINE_CONFIG: &str = "[validation]\ndiscover_modules = false\n\n\
[sandbox]\ninterpreter = [\"sh\"]\nentry_file = \"script.sh\"\n";

fn cadloop(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cadloop"))
        .current_dir(dir)
        .env("RUST_LOG", "error")
        .args(args)
        .output()
        .expect("spawn cadloop")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

#[test]
fn validate_reports_missing_modules() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("cadloop.toml"), OFFLINE_CONFIG).expect("config");
    fs::write(
        temp.path().join("part.py"),
        "import nope_one\nimport os, nope_two\n",
    )
    .expect("program");

    let output = cadloop(temp.path(), &["validate", "part.py"]);

    assert_eq!(output.status.code(), Some(exit_codes::NOT_ACHIEVED));
    let json = stdout_json(&output);
    assert_eq!(json["ok"], false);
    assert_eq!(json["kind"], "dependency_error");
    assert_eq!(json["message"], "missing modules: nope_one, nope_two");
}

#[test]
fn validate_accepts_valid_program() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("cadloop.toml"), OFFLINE_CONFIG).expect("config");
    fs::write(temp.path().join("part.py"), "import math\nresult = math.pi\n").expect("program");

    let output = cadloop(temp.path(), &["validate", "part.py"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout_json(&output)["kind"], "none");
}

#[cfg(unix)]
#[test]
fn exec_runs_program_in_sandbox() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("cadloop.toml"), OFFLINE_CONFIG).expect("config");
    fs::write(temp.path().join("job.sh"), "echo hi\nprintf x > model.stl\n").expect("program");

    let output = cadloop(temp.path(), &["exec", "job.sh", "--timeout", "5"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let json = stdout_json(&output);
    assert_eq!(json["status"], "success");
    assert_eq!(json["stdout"], "hi\n");
    assert_eq!(json["produced_files"], serde_json::json!(["model.stl"]));
}

#[cfg(unix)]
#[test]
fn exec_reports_timeout() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("cadloop.toml"), OFFLINE_CONFIG).expect("config");
    fs::write(temp.path().join("job.sh"), "sleep 10\n").expect("program");

    let output = cadloop(temp.path(), &["exec", "job.sh", "--timeout", "1"]);

    assert_eq!(output.status.code(), Some(exit_codes::NOT_ACHIEVED));
    assert_eq!(stdout_json(&output)["status"], "timeout");
}

#[test]
fn run_without_agents_is_a_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("cadloop.toml"), OFFLINE_CONFIG).expect("config");

    let output = cadloop(temp.path(), &["run", "a 40mm cube"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("agents.generator"), "stderr: {stderr}");
}

#[test]
fn run_rejects_out_of_range_threshold() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("cadloop.toml"), OFFLINE_CONFIG).expect("config");

    let output = cadloop(temp.path(), &["run", "a cube", "--stop-threshold", "2"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[cfg(unix)]
/// Agent that ignores its prompt and prints `reply`.
fn canned_agent(reply: &str) -> AgentCommand {
    let script = format!("cat > /dev/null; printf '%s\\n' '{reply}'");
    let mut agent = AgentCommand::new(["sh", "-c", script.as_str()]);
    agent.timeout_secs = 10;
    agent
}

#[cfg(unix)]
/// Config whose candidates are shell scripts that are also valid Python
/// (`true`), exported by a shell snippet instead of build123d.
fn shell_run_config(judge_reply: &str) -> CadloopConfig {
    let mut cfg = CadloopConfig::default();
    cfg.validation.discover_modules = false;
    cfg.sandbox.interpreter = vec!["sh".to_string()];
    cfg.sandbox.entry_file = "script.sh".to_string();
    cfg.coding.max_iterations = 2;
    cfg.coding.test_timeout_secs = 5;
    cfg.render.timeout_secs = 5;
    cfg.render.export_template = "printf solid > ./{{ file_name }}".to_string();

    let mut generator = AgentCommand::new([
        "sh",
        "-c",
        "cat > /dev/null; printf '```python\\ntrue\\n```\\n'",
    ]);
    generator.timeout_secs = 10;
    cfg.agents.generator = generator;
    cfg.agents.feedback = canned_agent("The cube matches.");
    cfg.agents.judge = canned_agent(judge_reply);
    cfg
}

#[cfg(unix)]
fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
    serde_json::from_str(&text).expect("valid json")
}

#[cfg(unix)]
#[test]
fn run_writes_iteration_records_and_summary_when_goal_is_achieved() {
    let temp = tempfile::tempdir().expect("tempdir");
    let cfg = shell_run_config(r#"{"better": true, "achieved": true, "score": 0.9}"#);
    write_config(&temp.path().join("cadloop.toml"), &cfg).expect("config");

    let output = cadloop(
        temp.path(),
        &["run", "a 40mm cube", "--output-dir", "out", "--max-iterations", "3"],
    );

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary = stdout_json(&output);
    assert_eq!(summary["completed"], true);
    assert_eq!(summary["iterations"], 1);
    assert_eq!(summary["best_iteration"], 1);
    assert_eq!(summary["best_dir"], "out/iteration_1");
    assert_eq!(summary["best_score"], 0.9);
    assert_eq!(summary["best_feedback"], "The cube matches.");
    assert_eq!(
        summary["adoptions"],
        json!([{ "iteration": 1, "reason": "first" }])
    );

    let out = temp.path().join("out");
    assert_eq!(read_json(&out.join("summary.json")), summary);
    assert_eq!(
        read_json(&out.join("initial_design_goal.json"))["text"],
        "a 40mm cube"
    );
    assert!(out.join("refined_design_goal.json").is_file());

    let iteration = out.join("iteration_1");
    assert_eq!(
        fs::read_to_string(iteration.join("code.py")).expect("code"),
        "true"
    );
    assert!(
        fs::read_to_string(iteration.join("code_with_export.py"))
            .expect("patched code")
            .contains("printf solid > ./exported_model.stl")
    );
    assert_eq!(
        fs::read(iteration.join("exported_model.stl")).expect("model"),
        b"solid"
    );
    assert_eq!(
        fs::read_to_string(iteration.join("feedback.txt")).expect("feedback"),
        "The cube matches."
    );
    let record = read_json(&iteration.join("record.json"));
    assert_eq!(record["iteration"], 1);
    assert_eq!(record["stage"], "judged");
    assert_eq!(record["score"], 0.9);
    assert_eq!(record["adopted"], true);
    assert!(!out.join("iteration_2").exists());
}

#[cfg(unix)]
#[test]
fn run_exhausts_iterations_below_threshold() {
    let temp = tempfile::tempdir().expect("tempdir");
    let cfg = shell_run_config(r#"{"better": true, "achieved": false, "score": 0.3}"#);
    write_config(&temp.path().join("cadloop.toml"), &cfg).expect("config");

    let output = cadloop(
        temp.path(),
        &["run", "a 40mm cube", "--output-dir", "out", "--max-iterations", "2"],
    );

    assert_eq!(
        output.status.code(),
        Some(exit_codes::NOT_ACHIEVED),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary = stdout_json(&output);
    assert_eq!(summary["completed"], false);
    assert_eq!(summary["iterations"], 2);
    assert_eq!(summary["best_iteration"], 2);
    assert_eq!(summary["best_score"], 0.3);
    assert_eq!(
        summary["adoptions"],
        json!([
            { "iteration": 1, "reason": "first" },
            { "iteration": 2, "reason": "improved" },
        ])
    );

    let out = temp.path().join("out");
    assert_eq!(read_json(&out.join("summary.json")), summary);
    for n in 1..=2 {
        let iteration = out.join(format!("iteration_{n}"));
        assert!(iteration.join("exported_model.stl").is_file(), "{n}");
        assert_eq!(read_json(&iteration.join("record.json"))["score"], 0.3);
    }
}

#[test]
fn init_config_writes_defaults_once() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = cadloop(temp.path(), &["init-config"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("cadloop.toml")).expect("load");
    assert_eq!(cfg, CadloopConfig::default());

    let again = cadloop(temp.path(), &["init-config"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));

    let forced = cadloop(temp.path(), &["--config", "alt.toml", "init-config", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join("alt.toml").exists());
}

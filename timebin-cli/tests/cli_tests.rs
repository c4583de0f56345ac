//! End-to-end tests that run the `timebin` binary on small FSDB files.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn timebin(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_timebin"))
        .current_dir(dir)
        .env("RUST_LOG", "error")
        .arg("--config")
        .arg(dir.join("timebin.toml"))
        .args(args)
        .output()
        .expect("should spawn timebin")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("each line is a JSON object"))
        .collect()
}

#[test]
fn count_with_index_flags_emits_tuples_per_bin() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(
        dir.path().join("queries.fsdb"),
        "#fsdb -F t time qname\n\
         10\ta.example\n\
         20\ta.example\n\
         30\tb.example\n\
         70\ta.example\n",
    )
    .expect("write input");

    let output = timebin(
        dir.path(),
        &["--output", "json", "count", "-s", "names:identity:qname", "queries.fsdb"],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let rows = json_lines(&output);
    let summary: Vec<_> = rows
        .iter()
        .map(|r| {
            (
                r["timebin"].as_i64().expect("timebin"),
                r["key"].as_str().expect("key").to_owned(),
                r["value"].as_f64().expect("value"),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, "a.example".to_owned(), 2.0),
            (0, "b.example".to_owned(), 1.0),
            (60, "a.example".to_owned(), 1.0),
        ]
    );
    assert!(rows.iter().all(|r| r["index"] == "names"));
}

#[test]
fn count_writes_fsdb_header_and_trailer() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("in.fsdb"), "#fsdb -F t time qname\n5\tx.example\n")
        .expect("write input");

    let output = timebin(dir.path(), &["count", "-s", "q:identity:qname", "in.fsdb", "out.fsdb"]);
    assert!(output.status.success());

    let written = fs::read_to_string(dir.path().join("out.fsdb")).expect("output file");
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("#fsdb -F t timebin index key subkey value")
    );
    assert!(lines.next().is_some_and(|l| l.starts_with("0\tq\tx.example\t-\t")));
    assert!(written.contains("#  | timebin count"));
}

#[test]
fn aggregate_rejects_time_going_backwards() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(
        dir.path().join("tuples.fsdb"),
        "#fsdb -F t timebin index key subkey value\n\
         120\ti\tk\t-\t1\n\
         60\ti\tk\t-\t1\n",
    )
    .expect("write input");

    let output = timebin(dir.path(), &["aggregate", "tuples.fsdb"]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("aggregator"), "stderr: {stderr}");
}

#[test]
fn count_without_indices_is_a_config_error() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("in.fsdb"), "#fsdb -F t time qname\n").expect("write input");

    let output = timebin(dir.path(), &["count", "in.fsdb"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn unknown_function_in_index_is_a_config_error() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("in.fsdb"), "#fsdb -F t time qname\n1\ta\n").expect("write input");

    let output = timebin(dir.path(), &["count", "-s", "q:no_such_extractor", "in.fsdb"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no_such_extractor"));
}

#[test]
fn run_chains_counter_and_aggregator() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(
        dir.path().join("spec.yaml"),
        "timeColumn: time\n\
         binSize: 60\n\
         featureCounter:\n\
         \x20 outputs:\n\
         \x20   names:\n\
         \x20     function: identity\n\
         \x20     arguments: [col(qname)]\n\
         aggregator:\n\
         \x20 aggregators: [sum]\n",
    )
    .expect("write spec");
    fs::write(
        dir.path().join("in.fsdb"),
        "#fsdb -F t time qname\n1\ta\n2\ta\n61\tb\n",
    )
    .expect("write input");

    let output = timebin(
        dir.path(),
        &["--output", "json", "run", "-y", "spec.yaml", "in.fsdb"],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let rows = json_lines(&output);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["key"], "a");
    assert_eq!(rows[0]["value"].as_f64(), Some(2.0));
    assert_eq!(rows[1]["timebin"], 60);
}

#[test]
fn functions_lists_builtins_and_rejects_unknown_kind() {
    let dir = TempDir::new().expect("temp dir");

    let output = timebin(dir.path(), &["--output", "json", "functions", "--kind", "filter"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["kinds"][0]["kind"], "filter");

    let output = timebin(dir.path(), &["functions", "--kind", "magic"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn config_validate_reports_missing_file() {
    let dir = TempDir::new().expect("temp dir");

    let output = timebin(dir.path(), &["config", "validate"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stdout).contains("INVALID"));

    fs::write(dir.path().join("timebin.toml"), "[defaults]\nbin_size = 300\n")
        .expect("write config");
    let output = timebin(dir.path(), &["config", "validate"]);
    assert!(output.status.success());

    let output = timebin(dir.path(), &["--output", "json", "config", "show", "--section", "defaults"]);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["values"]["bin_size"], 300);
}

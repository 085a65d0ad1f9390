//! Destination handling and output shape.

use predicates::prelude::*;
use serde_json::json;

use super::common::TestEnv;

#[test]
fn writes_destination_file() {
  let env = TestEnv::new();
  env.write_file("main.json", r#"{"pipeline": {"stages": [{"type": "a", "options": {"n": {"mpp-eval": "1+2"}}}]}}"#);

  env
    .mpp()
    .arg(env.path("main.json"))
    .arg(env.path("out.json"))
    .assert()
    .success()
    .stdout(predicate::str::is_empty());

  let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(env.path("out.json")).unwrap()).unwrap();
  assert_eq!(written["pipeline"]["stages"][0]["options"]["n"], json!(3));
}

#[test]
fn failure_leaves_destination_untouched() {
  let env = TestEnv::new();
  env.write_file("main.json", r#"{"pipeline": {"stages": [{"options": {"n": {"mpp-eval": "missing + 1"}}}]}}"#);

  env
    .mpp()
    .arg(env.path("main.json"))
    .arg(env.path("out.json"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("main.json"))
    .stderr(predicate::str::contains("mpp-eval"));

  assert!(!env.path("out.json").exists());
}

#[test]
fn sort_keys_orders_every_object() {
  let env = TestEnv::new();
  env.write_file("main.json", r#"{"version": "2", "pipelines": [{"stages": [], "name": "os"}]}"#);

  let output = env
    .mpp()
    .arg(env.path("main.json"))
    .arg("-")
    .arg("--sort-keys")
    .output()
    .unwrap();
  let text = String::from_utf8(output.stdout).unwrap();
  assert!(text.find("\"pipelines\"").unwrap() < text.find("\"version\"").unwrap());
  assert!(text.find("\"name\"").unwrap() < text.find("\"stages\"").unwrap());
}

#[test]
fn unsupported_version_is_reported() {
  let env = TestEnv::new();
  env.write_file("main.json", r#"{"version": "3"}"#);

  env
    .mpp()
    .arg(env.path("main.json"))
    .arg("-")
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported manifest version"));
}

#[test]
fn directive_free_manifest_is_unchanged() {
  let env = TestEnv::new();
  let source = json!({"version": "2", "pipelines": [{"name": "os", "stages": [{"type": "x", "options": {"b": 1, "a": [true, null]}}]}]});
  env.write_file("main.json", &source.to_string());

  assert_eq!(env.expand("main.json", &[]), source);
}

//! Whole-document properties of preprocessing.

use serde_json::{Value, json};

use mpp_lib::consts::DIRECTIVE_PREFIX;
use mpp_lib::preprocess::{PreprocessConfig, PreprocessError};

use super::common::{TableSolver, Workspace, object, run, run_with};

fn has_directive(value: &Value) -> bool {
  match value {
    Value::Object(map) => map
      .iter()
      .any(|(key, child)| key.starts_with(DIRECTIVE_PREFIX) || has_directive(child)),
    Value::Array(items) => items.iter().any(has_directive),
    _ => false,
  }
}

#[test]
fn directive_free_documents_are_unchanged() {
  let ws = Workspace::new();
  let source = json!({
    "version": "2",
    "pipelines": [{"name": "os", "stages": [{"type": "org.osbuild.locale", "options": {"language": "$lang"}}]}],
    "sources": {"org.osbuild.curl": {"items": {"sha256:bb": "https://b", "sha256:aa": "https://a"}}}
  });
  let path = ws.write("plain.json", &source);

  let once = run(&path).unwrap();
  assert_eq!(once["pipelines"], source["pipelines"]);

  let again = ws.write("again.json", &once);
  assert_eq!(run(&again).unwrap(), once);
}

#[test]
fn no_directive_survives() {
  let ws = Workspace::new();
  let path = ws.write(
    "main.json",
    &json!({
      "version": "2",
      "mpp-vars": {"size": {"mpp-eval": "4 * 1024"}, "packages": ["a", "b"]},
      "pipelines": [{"name": "os", "stages": [{"type": "x", "options": {
        "nested": [{"mpp-join": [{"mpp-eval": "packages"}, ["c"]]}],
        "size": {"mpp-format-int": "{size}"}
      }}]}]
    }),
  );

  let out = run(&path).unwrap();
  assert!(!has_directive(&out));
  assert_eq!(out["pipelines"][0]["stages"][0]["options"]["nested"], json!([["a", "b", "c"]]));
  assert_eq!(out["pipelines"][0]["stages"][0]["options"]["size"], json!(4096));
}

#[test]
fn overrides_win_over_declarations() {
  let ws = Workspace::new();
  let path = ws.write(
    "main.json",
    &json!({
      "mpp-vars": {"release": 9, "label": "el$release"},
      "pipeline": {"stages": [{"name": "x", "options": {"label": "$label", "release": {"mpp-eval": "release"}}}]}
    }),
  );
  let config = PreprocessConfig {
    overrides: object(json!({"release": 10})),
    ..Default::default()
  };

  let out = run_with(&path, &config, TableSolver::default()).unwrap();
  let options = &out["pipeline"]["stages"][0]["options"];
  assert_eq!(options["release"], json!(10));
  assert_eq!(options["label"], json!("el10"));
}

#[test]
fn undefined_template_names_are_left_alone() {
  let ws = Workspace::new();
  let path = ws.write(
    "main.json",
    &json!({"mpp-vars": {"a": "$nope/$also_nope"}, "pipeline": {"stages": [{"options": {"v": {"mpp-eval": "a"}}}]}}),
  );

  let out = run(&path).unwrap();
  assert_eq!(out["pipeline"]["stages"][0]["options"]["v"], json!("$nope/$also_nope"));
}

#[test]
fn join_and_eval_produce_typed_values() {
  let ws = Workspace::new();
  let path = ws.write(
    "main.json",
    &json!({"pipeline": {"stages": [{"options": {
      "joined": {"mpp-join": [["a"], ["b", "c"]]},
      "sum": {"mpp-eval": "1+2"}
    }}]}}),
  );

  let out = run(&path).unwrap();
  let options = &out["pipeline"]["stages"][0]["options"];
  assert_eq!(options["joined"], json!(["a", "b", "c"]));
  assert_eq!(options["sum"], json!(3));
}

#[test]
fn format_sees_resolved_packages() {
  let ws = Workspace::new();
  let path = ws.write(
    "main.json",
    &json!({
      "version": "2",
      "pipelines": [{"name": "os", "stages": [
        {"type": "org.osbuild.rpm", "inputs": {"packages": {"type": "org.osbuild.files", "mpp-depsolve": {
          "architecture": "x86_64",
          "module-platform-id": "platform:el9",
          "repos": [{"id": "baseos", "baseurl": "https://repo/"}],
          "packages": ["kernel"]
        }}}},
        {"type": "org.osbuild.grub2", "options": {"kernel": {"mpp-format-string": "vmlinuz-{rpms['os']['kernel'].evr}.{arch}"}}}
      ]}]
    }),
  );
  let config = PreprocessConfig {
    defaults: object(json!({"arch": "x86_64"})),
    ..Default::default()
  };

  let out = run_with(&path, &config, TableSolver::default().package("kernel", "https://repo/kernel.rpm")).unwrap();
  assert_eq!(out["pipelines"][0]["stages"][1]["options"]["kernel"], json!("vmlinuz-1.0-1.x86_64"));
}

#[test]
fn malformed_expression_names_the_manifest() {
  let ws = Workspace::new();
  let path = ws.write("broken.json", &json!({"pipeline": {"stages": [{"options": {"v": {"mpp-eval": "1 +"}}}]}}));

  let err = run(&path).unwrap_err();
  assert!(matches!(err, PreprocessError::Eval { .. }));
  let message = err.to_string();
  assert!(message.contains("broken.json"), "{message}");
  assert!(message.contains("mpp-eval"), "{message}");
}

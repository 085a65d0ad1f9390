//! Package resolution and the URL source registry.

use serde_json::{Value, json};

use mpp_lib::preprocess::{PreprocessConfig, PreprocessError};

use super::common::{TableSolver, Workspace, run_with};

fn depsolve(packages: &[&str]) -> Value {
  json!({
    "architecture": "x86_64",
    "module-platform-id": "platform:el9",
    "repos": [{"id": "baseos", "baseurl": "https://repo/"}],
    "packages": packages
  })
}

fn solver() -> TableSolver {
  TableSolver::default()
    .package("bash", "https://repo/b/bash.rpm")
    .package("zsh", "https://repo/a/zsh.rpm")
    .package("vim", "https://repo/c/vim.rpm")
}

#[test]
fn shared_packages_are_registered_once_and_sorted_by_url() {
  let ws = Workspace::new();
  let path = ws.write(
    "main.json",
    &json!({
      "version": "2",
      "pipelines": [
        {"name": "build", "stages": [{"type": "org.osbuild.rpm", "inputs": {"packages": {
          "type": "org.osbuild.files", "mpp-depsolve": depsolve(&["bash", "vim"])
        }}}]},
        {"name": "os", "stages": [{"type": "org.osbuild.rpm", "inputs": {"packages": {
          "type": "org.osbuild.files", "mpp-depsolve": depsolve(&["bash", "zsh"])
        }}}]}
      ]
    }),
  );

  let out = run_with(&path, &PreprocessConfig::default(), solver()).unwrap();

  let items = out["sources"]["org.osbuild.curl"]["items"].as_object().unwrap();
  let urls: Vec<&str> = items.values().filter_map(Value::as_str).collect();
  assert_eq!(
    urls,
    ["https://repo/a/zsh.rpm", "https://repo/b/bash.rpm", "https://repo/c/vim.rpm"]
  );

  let os_refs = out["pipelines"][1]["stages"][0]["inputs"]["packages"]["references"]
    .as_object()
    .unwrap();
  let keys: Vec<&String> = os_refs.keys().collect();
  assert_eq!(keys, [&TableSolver::checksum("bash"), &TableSolver::checksum("zsh")]);
}

#[test]
fn version1_lists_checksums_in_stage_options() {
  let ws = Workspace::new();
  let path = ws.write(
    "main.json",
    &json!({
      "pipeline": {
        "build": {"pipeline": {"stages": [{"name": "org.osbuild.rpm", "options": {"mpp-depsolve": depsolve(&["bash"])}}]}},
        "stages": [{"name": "org.osbuild.rpm", "options": {"mpp-depsolve": depsolve(&["vim"])}}]
      },
      "sources": {"org.osbuild.files": {"urls": {"sha256:existing": "https://repo/0/first.rpm"}}}
    }),
  );

  let out = run_with(&path, &PreprocessConfig::default(), solver()).unwrap();

  assert_eq!(
    out["pipeline"]["stages"][0]["options"]["packages"],
    json!([TableSolver::checksum("vim")])
  );
  assert_eq!(
    out["pipeline"]["build"]["pipeline"]["stages"][0]["options"]["packages"],
    json!([TableSolver::checksum("bash")])
  );
  let urls = out["sources"]["org.osbuild.files"]["urls"].as_object().unwrap();
  assert_eq!(urls.len(), 3);
  assert_eq!(urls.keys().next().map(String::as_str), Some("sha256:existing"));
}

#[test]
fn resolver_failure_is_fatal() {
  let ws = Workspace::new();
  let path = ws.write(
    "main.json",
    &json!({"version": "2", "pipelines": [{"name": "os", "stages": [{"type": "org.osbuild.rpm", "inputs": {
      "packages": {"mpp-depsolve": depsolve(&["missing"])}
    }}]}]}),
  );

  let err = run_with(&path, &PreprocessConfig::default(), solver()).unwrap_err();
  assert!(matches!(err, PreprocessError::Depsolve { ref pipeline, .. } if pipeline == "os"));
}

#[test]
fn repo_without_url_is_rejected() {
  let ws = Workspace::new();
  let path = ws.write(
    "main.json",
    &json!({"version": "2", "pipelines": [{"name": "os", "stages": [{"type": "org.osbuild.rpm", "inputs": {
      "packages": {"mpp-depsolve": {
        "architecture": "x86_64", "module-platform-id": "p", "repos": [{"id": "nourl"}], "packages": ["bash"]
      }}
    }}]}]}),
  );

  let err = run_with(&path, &PreprocessConfig::default(), solver()).unwrap_err();
  assert!(err.to_string().contains("nourl"), "{err}");
}

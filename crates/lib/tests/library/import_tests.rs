//! Imports, run through the full preprocessor.

use serde_json::json;

use mpp_lib::import::ImportError;
use mpp_lib::preprocess::{PreprocessConfig, PreprocessError};

use super::common::{TableSolver, Workspace, run, run_with};

#[test]
fn version1_import_with_extra_keys_is_rejected() {
  let ws = Workspace::new();
  ws.write("build.json", &json!({"pipeline": {"stages": []}, "runner": "org.osbuild.fedora38"}));
  let main = ws.write("main.json", &json!({"pipeline": {"build": {"mpp-import-pipeline": {"path": "build.json"}}}}));

  let err = run(&main).unwrap_err();
  assert!(matches!(
    err,
    PreprocessError::Import { source: ImportError::UnexpectedKey { ref key, .. }, .. } if key == "runner"
  ));
}

#[test]
fn version2_import_merges_source_items() {
  let ws = Workspace::new();
  ws.write(
    "build.json",
    &json!({
      "version": "2",
      "pipelines": [{"name": "build", "stages": []}],
      "sources": {"org.osbuild.curl": {"items": {"sha256:11": "https://repo/z.rpm"}}}
    }),
  );
  let main = ws.write(
    "main.json",
    &json!({
      "version": "2",
      "pipelines": [{"mpp-import-pipeline": {"path": "build.json", "id": "build"}}, {"name": "os", "stages": []}],
      "sources": {"org.osbuild.curl": {"items": {"sha256:22": "https://repo/a.rpm"}}}
    }),
  );

  let out = run(&main).unwrap();
  assert_eq!(
    out["sources"],
    json!({"org.osbuild.curl": {"items": {"sha256:22": "https://repo/a.rpm", "sha256:11": "https://repo/z.rpm"}}})
  );
  assert_eq!(out["pipelines"][0]["name"], json!("build"));
  assert_eq!(out["pipelines"][1]["name"], json!("os"));
}

#[test]
fn imported_pipeline_resolves_with_importer_variables() {
  let ws = Workspace::new();
  ws.write(
    "lib/build.json",
    &json!({
      "version": "2",
      "pipelines": [{"name": "build", "stages": [{"type": "org.osbuild.rpm", "inputs": {"packages": {
        "type": "org.osbuild.files",
        "mpp-depsolve": {
          "architecture": "$arch",
          "module-platform-id": "platform:el9",
          "repos": [{"id": "baseos", "baseurl": "https://repo/"}],
          "packages": ["bash"]
        }
      }}}]}]
    }),
  );
  let main = ws.write(
    "main.json",
    &json!({
      "version": "2",
      "pipelines": [
        {"mpp-import-pipeline": {"path": "build.json", "id": "build"}},
        {"name": "os", "stages": [{"type": "x", "options": {"shell": {"mpp-eval": "rpms['build']['bash'].name"}}}]}
      ]
    }),
  );
  let config = PreprocessConfig {
    search_dirs: vec![ws.path().join("lib")],
    defaults: super::common::object(json!({"arch": "aarch64"})),
    ..Default::default()
  };

  let out = run_with(&main, &config, TableSolver::default().package("bash", "https://repo/bash.rpm")).unwrap();
  assert_eq!(out["pipelines"][1]["stages"][0]["options"]["shell"], json!("bash"));
  assert!(out["pipelines"][0]["stages"][0]["inputs"]["packages"].get("mpp-depsolve").is_none());
}

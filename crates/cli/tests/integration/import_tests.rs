//! Imports through the command line search path.

use predicates::prelude::*;
use serde_json::json;

use super::common::TestEnv;

#[test]
fn import_dir_is_searched() {
  let env = TestEnv::new();
  env.write_file(
    "lib/build.ipp.json",
    r#"{"version": "2", "pipelines": [{"name": "build", "stages": [{"type": "org.osbuild.noop"}]}]}"#,
  );
  env.write_file(
    "main.json",
    r#"{"version": "2", "pipelines": [{"mpp-import-pipeline": {"path": "build.ipp.json", "id": "build"}}]}"#,
  );

  let lib = env.path("lib");
  let out = env.expand("main.json", &["-I", lib.to_str().unwrap()]);
  assert_eq!(
    out["pipelines"],
    json!([{"name": "build", "stages": [{"type": "org.osbuild.noop"}]}])
  );
}

#[test]
fn missing_import_fails() {
  let env = TestEnv::new();
  env.write_file(
    "main.json",
    r#"{"version": "2", "pipelines": [{"mpp-import-pipeline": {"path": "nope.json", "id": "x"}}]}"#,
  );

  env
    .mpp()
    .arg(env.path("main.json"))
    .arg("-")
    .assert()
    .failure()
    .stderr(predicate::str::contains("mpp-import-pipeline"))
    .stderr(predicate::str::contains("nope.json"));
}

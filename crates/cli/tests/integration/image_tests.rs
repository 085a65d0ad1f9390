//! `mpp-define-image` with the builtin partition layout.

use serde_json::json;

use super::common::TestEnv;

#[test]
fn partition_offsets_are_bound() {
  let env = TestEnv::new();
  env.write_file(
    "main.json",
    r#"{
      "version": "2",
      "mpp-define-image": {
        "size": "2147483648",
        "table": {"uuid": "D209C89E-EA5E-4FBD-B161-B461CCE297E0", "label": "gpt", "partitions": [
          {"id": "bios-boot", "size": 2048, "bootable": true},
          {"id": "efi", "size": 204800},
          {"id": "root"}
        ]}
      },
      "pipelines": [{"name": "image", "stages": [{"type": "org.osbuild.truncate", "options": {
        "size": {"mpp-format-string": "{image.size}"},
        "root": {"mpp-eval": "image.layout.partitions[2].start"}
      }}]}]
    }"#,
  );

  let out = env.expand("main.json", &["--partition-tool", "builtin"]);
  let options = &out["pipelines"][0]["stages"][0]["options"];
  assert_eq!(options["size"], json!("2147483648"));
  assert_eq!(options["root"], json!(2048 + 2048 + 204800));
}

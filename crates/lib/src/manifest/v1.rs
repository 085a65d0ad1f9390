//! Version 1 layout: one `pipeline`, nested build pipelines under `build.pipeline`.

use serde_json::{Map, Value};

use super::{Adapter, Stage, Version, is_rpm_stage};
use crate::consts::{DEPSOLVE, FILES_SOURCE};

#[derive(Debug, Clone, Copy)]
pub struct V1;

/// Variable bucket for a pipeline at `depth` in the build chain.
fn bucket(depth: usize) -> String {
  match depth {
    0 => "stages".to_string(),
    1 => "build".to_string(),
    n => format!("build{n}"),
  }
}

fn collect<'a>(pipeline: &'a mut Map<String, Value>, depth: usize, out: &mut Vec<Stage<'a>>) {
  let mut nested = None;
  for (key, value) in pipeline.iter_mut() {
    match (key.as_str(), value) {
      ("stages", Value::Array(stages)) => {
        out.extend(stages.iter_mut().filter_map(Value::as_object_mut).map(|node| Stage {
          pipeline: bucket(depth),
          node,
        }));
      }
      ("build", Value::Object(build)) => nested = build.get_mut("pipeline").and_then(Value::as_object_mut),
      _ => {}
    }
  }
  if let Some(inner) = nested {
    collect(inner, depth + 1, out);
  }
}

impl Adapter for V1 {
  fn version(&self) -> Version {
    Version::V1
  }

  fn url_source(&self) -> (&'static str, &'static str) {
    (FILES_SOURCE, "urls")
  }

  fn stages_mut<'a>(&self, root: &'a mut Map<String, Value>) -> Vec<Stage<'a>> {
    let mut out = Vec::new();
    if let Some(Value::Object(pipeline)) = root.get_mut("pipeline") {
      collect(pipeline, 0, &mut out);
    }
    out
  }

  fn depsolve_site<'a>(&self, stage: &'a mut Map<String, Value>) -> Option<&'a mut Map<String, Value>> {
    if !is_rpm_stage(stage) {
      return None;
    }
    stage
      .get_mut("options")
      .and_then(Value::as_object_mut)
      .filter(|options| options.contains_key(DEPSOLVE))
  }

  fn add_package_refs(&self, site: &mut Map<String, Value>, checksums: &[String]) {
    let packages = site
      .entry("packages")
      .or_insert_with(|| Value::Array(Vec::new()));
    if !packages.is_array() {
      *packages = Value::Array(Vec::new());
    }
    if let Value::Array(packages) = packages {
      packages.extend(checksums.iter().cloned().map(Value::String));
    }
  }

  fn is_depsolve_stage(&self, stage: &Map<String, Value>) -> bool {
    is_rpm_stage(stage)
      && stage
        .get("options")
        .and_then(Value::as_object)
        .is_some_and(|options| options.contains_key(DEPSOLVE))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn root(value: Value) -> Map<String, Value> {
    match value {
      Value::Object(map) => map,
      _ => panic!("not an object"),
    }
  }

  #[test]
  fn stages_walk_the_build_chain() {
    let mut doc = root(json!({
      "pipeline": {
        "build": {"pipeline": {
          "build": {"pipeline": {"stages": [{"type": "a"}]}},
          "stages": [{"type": "b"}]
        }},
        "stages": [{"type": "c"}, {"type": "d"}]
      }
    }));
    let stages = V1.stages_mut(&mut doc);
    let seen: Vec<(String, String)> = stages
      .iter()
      .map(|s| (s.pipeline.clone(), s.node["type"].as_str().unwrap().to_string()))
      .collect();
    assert_eq!(
      seen,
      [
        ("stages".to_string(), "c".to_string()),
        ("stages".to_string(), "d".to_string()),
        ("build".to_string(), "b".to_string()),
        ("build2".to_string(), "a".to_string()),
      ]
    );
  }

  #[test]
  fn depsolve_site_is_rpm_options() {
    let mut stage = root(json!({"type": "org.osbuild.rpm", "options": {"mpp-depsolve": {}, "gpgkeys": []}}));
    assert!(V1.is_depsolve_stage(&stage));
    let site = V1.depsolve_site(&mut stage).unwrap();
    assert!(site.contains_key("gpgkeys"));

    let mut other = root(json!({"type": "org.osbuild.dnf", "options": {"mpp-depsolve": {}}}));
    assert!(!V1.is_depsolve_stage(&other));
    assert!(V1.depsolve_site(&mut other).is_none());
  }

  #[test]
  fn package_refs_append_to_packages() {
    let mut site = root(json!({"packages": ["sha256:00"]}));
    V1.add_package_refs(&mut site, &["sha256:aa".to_string(), "sha256:bb".to_string()]);
    assert_eq!(site["packages"], json!(["sha256:00", "sha256:aa", "sha256:bb"]));
  }
}

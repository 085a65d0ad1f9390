//! Version 2 layout: a list of named `pipelines`, each with its own `stages`.

use serde_json::{Map, Value};

use super::{Adapter, Stage, Version, is_rpm_stage};
use crate::consts::{CURL_SOURCE, DEPSOLVE};

#[derive(Debug, Clone, Copy)]
pub struct V2;

fn packages_input(stage: &Map<String, Value>) -> Option<&Map<String, Value>> {
  stage.get("inputs")?.get("packages")?.as_object()
}

impl Adapter for V2 {
  fn version(&self) -> Version {
    Version::V2
  }

  fn url_source(&self) -> (&'static str, &'static str) {
    (CURL_SOURCE, "items")
  }

  fn stages_mut<'a>(&self, root: &'a mut Map<String, Value>) -> Vec<Stage<'a>> {
    let mut out = Vec::new();
    let Some(Value::Array(pipelines)) = root.get_mut("pipelines") else {
      return out;
    };
    for (index, pipeline) in pipelines.iter_mut().enumerate() {
      let Value::Object(pipeline) = pipeline else {
        continue;
      };
      let name = pipeline
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| index.to_string());
      if let Some(Value::Array(stages)) = pipeline.get_mut("stages") {
        out.extend(stages.iter_mut().filter_map(Value::as_object_mut).map(|node| Stage {
          pipeline: name.clone(),
          node,
        }));
      }
    }
    out
  }

  fn depsolve_site<'a>(&self, stage: &'a mut Map<String, Value>) -> Option<&'a mut Map<String, Value>> {
    if !is_rpm_stage(stage) {
      return None;
    }
    stage
      .get_mut("inputs")?
      .get_mut("packages")?
      .as_object_mut()
      .filter(|input| input.contains_key(DEPSOLVE))
  }

  fn add_package_refs(&self, site: &mut Map<String, Value>, checksums: &[String]) {
    let references = site
      .entry("references")
      .or_insert_with(|| Value::Object(Map::new()));
    match references {
      Value::Array(list) => list.extend(checksums.iter().cloned().map(Value::String)),
      Value::Object(map) => {
        for checksum in checksums {
          map.insert(checksum.clone(), Value::Object(Map::new()));
        }
      }
      other => {
        *other = Value::Object(
          checksums
            .iter()
            .map(|checksum| (checksum.clone(), Value::Object(Map::new())))
            .collect(),
        );
      }
    }
  }

  fn is_depsolve_stage(&self, stage: &Map<String, Value>) -> bool {
    is_rpm_stage(stage) && packages_input(stage).is_some_and(|input| input.contains_key(DEPSOLVE))
  }
}

//! Partition synthesis by `sfdisk` against a sparse scratch file.

use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info};

use super::{ImageError, Label, Partition, PartitionSynthesizer, PartitionTable, TableSpec};

/// Runs `sfdisk` to place partitions exactly as it would on a real disk.
#[derive(Debug, Clone)]
pub struct SfdiskSynthesizer {
  program: PathBuf,
}

impl Default for SfdiskSynthesizer {
  fn default() -> Self {
    Self {
      program: PathBuf::from("sfdisk"),
    }
  }
}

#[derive(Deserialize)]
struct Dump {
  partitiontable: DumpTable,
}

#[derive(Deserialize)]
struct DumpTable {
  #[serde(default)]
  partitions: Vec<DumpPartition>,
}

#[derive(Deserialize)]
struct DumpPartition {
  start: u64,
  size: u64,
}

impl SfdiskSynthesizer {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  fn tool(&self) -> String {
    self.program.display().to_string()
  }

  /// The sfdisk script describing `table`.
  fn script(table: &TableSpec) -> Result<String, ImageError> {
    let mut script = format!("label: {}\n", table.label);
    if let Some(uuid) = &table.uuid {
      script.push_str(&format!("label-id: {uuid}\n"));
    }
    for spec in &table.partitions {
      let mut fields = Vec::new();
      if let Some(start) = spec.start()? {
        fields.push(format!("start={start}"));
      }
      if let Some(size) = spec.size()? {
        fields.push(format!("size={size}"));
      }
      if let Some(kind) = &spec.kind {
        fields.push(format!("type={kind}"));
      }
      if table.label == Label::Gpt {
        if let Some(uuid) = &spec.uuid {
          fields.push(format!("uuid={uuid}"));
        }
        if let Some(name) = &spec.name {
          fields.push(format!("name=\"{name}\""));
        }
      }
      if spec.bootable {
        fields.push("bootable".to_string());
      }
      // a lone comma asks for all defaults
      if fields.is_empty() {
        script.push(',');
      } else {
        script.push_str(&fields.join(", "));
      }
      script.push('\n');
    }
    Ok(script)
  }

  fn run(&self, args: &[&OsStr], stdin: Option<&str>) -> Result<String, ImageError> {
    let mut child = Command::new(&self.program)
      .args(args)
      .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(ImageError::Io)?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
      pipe.write_all(input.as_bytes()).map_err(ImageError::Io)?;
    }

    let output = child.wait_with_output().map_err(ImageError::Io)?;
    if !output.status.success() {
      return Err(ImageError::ToolFailed {
        tool: self.tool(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

impl PartitionSynthesizer for SfdiskSynthesizer {
  fn synthesize(&self, size_bytes: u64, table: &TableSpec) -> Result<PartitionTable, ImageError> {
    let disk = tempfile::NamedTempFile::new().map_err(ImageError::Io)?;
    disk.as_file().set_len(size_bytes).map_err(ImageError::Io)?;

    let script = Self::script(table)?;
    info!(tool = %self.tool(), size = size_bytes, "partitioning scratch disk");
    debug!(script = %script, "sfdisk script");

    self.run(&[disk.path().as_os_str()], Some(&script))?;
    let dump = self.run(&[OsStr::new("--json"), disk.path().as_os_str()], None)?;
    let dump: Dump = serde_json::from_str(&dump).map_err(|e| ImageError::ToolOutput {
      tool: self.tool(),
      message: e.to_string(),
    })?;

    if dump.partitiontable.partitions.len() != table.partitions.len() {
      return Err(ImageError::ToolOutput {
        tool: self.tool(),
        message: format!(
          "expected {} partitions, found {}",
          table.partitions.len(),
          dump.partitiontable.partitions.len()
        ),
      });
    }

    let partitions = table
      .partitions
      .iter()
      .zip(&dump.partitiontable.partitions)
      .map(|(spec, placed)| Partition::resolved(spec, placed.start, placed.size))
      .collect();

    Ok(PartitionTable {
      label: table.label,
      uuid: table.uuid.clone(),
      partitions,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn script_lists_partitions() {
    let table: TableSpec = serde_json::from_value(json!({
      "uuid": "D209C89E-EA5E-4FBD-B161-B461CCE297E0",
      "partitions": [
        {"size": 2048, "type": "21686148-6449-6E6F-744E-656564454649", "bootable": true},
        {"id": "root", "name": "root", "uuid": "6264D520-3FB9-423F-8AB8-7A0A8E3D3562"}
      ]
    }))
    .unwrap();

    assert_eq!(
      SfdiskSynthesizer::script(&table).unwrap(),
      "label: gpt\n\
       label-id: D209C89E-EA5E-4FBD-B161-B461CCE297E0\n\
       size=2048, type=21686148-6449-6E6F-744E-656564454649, bootable\n\
       uuid=6264D520-3FB9-423F-8AB8-7A0A8E3D3562, name=\"root\"\n"
    );
  }

  #[test]
  fn dos_script_omits_gpt_fields() {
    let table: TableSpec =
      serde_json::from_value(json!({"label": "dos", "partitions": [{"type": "83", "name": "x", "start": 2048}]}))
        .unwrap();
    assert_eq!(SfdiskSynthesizer::script(&table).unwrap(), "label: dos\nstart=2048, type=83\n");
  }

  #[test]
  fn missing_tool_is_an_io_error() {
    let synth = SfdiskSynthesizer::new("/nonexistent/sfdisk");
    let err = synth.synthesize(1 << 30, &TableSpec::default()).unwrap_err();
    assert!(matches!(err, ImageError::Io(_)));
  }
}

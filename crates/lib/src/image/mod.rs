//! The `mpp-define-image` directive: partition tables with computed offsets.
//!
//! The directive declares a disk size and a partition table in which any
//! partition may leave out its `start` or `size`. A [`PartitionSynthesizer`]
//! fills those in. The resolved table is bound as a variable so directives
//! elsewhere can refer to partition offsets:
//!
//! ```json
//! { "mpp-format-int": "{image.layout.partitions['root'].start}" }
//! ```
//!
//! # Bound value
//!
//! `{ size, layout: { label, uuid, partitions: [ { id, type, start, size,
//! bootable, name, uuid, start_in_bytes, size_in_bytes } ] } }` with
//! `start`/`size` in 512-byte sectors.

mod layout;
mod sfdisk;

use std::fmt;
use std::io;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

pub use layout::AlignedLayout;
pub use sfdisk::SfdiskSynthesizer;

use crate::consts::{DEFAULT_IMAGE_VAR, SECTOR_SIZE};

/// Errors raised while defining an image.
#[derive(Debug, Error)]
pub enum ImageError {
  #[error("invalid parameters: {0}")]
  InvalidParameters(#[source] serde_json::Error),

  #[error("invalid {field} '{value}': expected a non-negative integer")]
  InvalidNumber { field: &'static str, value: String },

  #[error("image size {0} bytes is too small for a partition table")]
  TooSmall(u64),

  #[error("{partition} starts at sector {start}, before the first usable sector {first}")]
  BeforeFirstUsable { partition: String, start: u64, first: u64 },

  #[error("{partition} starts at sector {start}, overlapping the previous partition ending at {previous_end}")]
  Overlap {
    partition: String,
    start: u64,
    previous_end: u64,
  },

  #[error("{partition} ends at sector {end}, past the last usable sector {last}")]
  OutOfRange { partition: String, end: u64, last: u64 },

  #[error("failed to prepare scratch disk: {0}")]
  Io(#[source] io::Error),

  #[error("{tool} failed with exit code {code:?}: {stderr}")]
  ToolFailed {
    tool: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("unexpected output from {tool}: {message}")]
  ToolOutput { tool: String, message: String },
}

/// Partition table flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
  #[default]
  Gpt,
  Dos,
}

impl Label {
  pub fn as_str(&self) -> &'static str {
    match self {
      Label::Gpt => "gpt",
      Label::Dos => "dos",
    }
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// A number written either as JSON number or as a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Count {
  Number(u64),
  Text(String),
}

impl Count {
  fn get(&self, field: &'static str) -> Result<u64, ImageError> {
    match self {
      Count::Number(n) => Ok(*n),
      Count::Text(text) => text.trim().parse().map_err(|_| ImageError::InvalidNumber {
        field,
        value: text.clone(),
      }),
    }
  }
}

/// A partition as declared; offsets may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartitionSpec {
  #[serde(default)]
  pub id: Option<String>,
  #[serde(default, rename = "type")]
  pub kind: Option<String>,
  #[serde(default)]
  pub start: Option<Count>,
  #[serde(default)]
  pub size: Option<Count>,
  #[serde(default)]
  pub bootable: bool,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub uuid: Option<String>,
}

impl PartitionSpec {
  /// How the partition is referred to in error messages.
  pub fn describe(&self, index: usize) -> String {
    match &self.id {
      Some(id) => format!("partition '{id}'"),
      None => format!("partition #{}", index + 1),
    }
  }

  pub fn start(&self) -> Result<Option<u64>, ImageError> {
    self.start.as_ref().map(|c| c.get("start")).transpose()
  }

  pub fn size(&self) -> Result<Option<u64>, ImageError> {
    self.size.as_ref().map(|c| c.get("size")).transpose()
  }
}

/// A declared partition table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableSpec {
  #[serde(default)]
  pub uuid: Option<String>,
  #[serde(default)]
  pub label: Label,
  #[serde(default)]
  pub partitions: Vec<PartitionSpec>,
}

/// A partition with absolute offsets, in sectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
  pub id: Option<String>,
  pub kind: Option<String>,
  pub start: u64,
  pub size: u64,
  pub bootable: bool,
  pub name: Option<String>,
  pub uuid: Option<String>,
}

impl Partition {
  /// Carry the declared attributes over with resolved offsets.
  pub fn resolved(spec: &PartitionSpec, start: u64, size: u64) -> Self {
    Self {
      id: spec.id.clone(),
      kind: spec.kind.clone(),
      start,
      size,
      bootable: spec.bootable,
      name: spec.name.clone(),
      uuid: spec.uuid.clone(),
    }
  }

  fn to_value(&self, index: usize) -> Result<Value, ImageError> {
    let out_of_range = || ImageError::OutOfRange {
      partition: self.describe(index),
      end: u64::MAX,
      last: u64::MAX / SECTOR_SIZE,
    };
    let start_in_bytes = self.start.checked_mul(SECTOR_SIZE).ok_or_else(out_of_range)?;
    let size_in_bytes = self.size.checked_mul(SECTOR_SIZE).ok_or_else(out_of_range)?;
    Ok(json!({
      "id": self.id,
      "type": self.kind,
      "start": self.start,
      "size": self.size,
      "bootable": self.bootable,
      "name": self.name,
      "uuid": self.uuid,
      "start_in_bytes": start_in_bytes,
      "size_in_bytes": size_in_bytes,
    }))
  }

  fn describe(&self, index: usize) -> String {
    match &self.id {
      Some(id) => format!("partition '{id}'"),
      None => format!("partition #{}", index + 1),
    }
  }
}

/// A partition table with every offset resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
  pub label: Label,
  pub uuid: Option<String>,
  pub partitions: Vec<Partition>,
}

/// Computes absolute partition offsets for a disk of a given size.
pub trait PartitionSynthesizer {
  fn synthesize(&self, size_bytes: u64, table: &TableSpec) -> Result<PartitionTable, ImageError>;
}

/// Parameters of an `mpp-define-image` directive.
#[derive(Debug, Clone)]
pub struct ImageSpec {
  /// Variable the image is bound to.
  pub id: String,
  pub size: u64,
  pub table: TableSpec,
}

#[derive(Deserialize)]
struct RawImage {
  #[serde(default)]
  id: Option<String>,
  size: Count,
  #[serde(default)]
  table: TableSpec,
}

impl ImageSpec {
  /// Read the directive's (already evaluated) parameters.
  pub fn from_value(value: Value) -> Result<Self, ImageError> {
    let raw: RawImage = serde_json::from_value(value).map_err(ImageError::InvalidParameters)?;
    Ok(Self {
      id: raw.id.unwrap_or_else(|| DEFAULT_IMAGE_VAR.to_string()),
      size: raw.size.get("size")?,
      table: raw.table,
    })
  }
}

/// The variable value for a synthesized image.
///
/// Fails when a partition's byte offsets do not fit in 64 bits, which only an
/// external synthesizer can produce.
pub fn image_value(size: u64, table: &PartitionTable) -> Result<Value, ImageError> {
  let partitions = table
    .partitions
    .iter()
    .enumerate()
    .map(|(index, partition)| partition.to_value(index))
    .collect::<Result<Vec<_>, _>>()?;
  Ok(json!({
    "size": size,
    "layout": {
      "label": table.label.as_str(),
      "uuid": table.uuid,
      "partitions": partitions,
    }
  }))
}

//! Built-in partition layout following the usual 1 MiB alignment rules.

use tracing::debug;

use super::{ImageError, Label, Partition, PartitionSynthesizer, PartitionTable, TableSpec};
use crate::consts::SECTOR_SIZE;

/// Alignment grain in sectors (1 MiB).
const GRAIN: u64 = 2048;

/// Sectors reserved at the end of a GPT disk for the backup header and entries.
const GPT_BACKUP_SECTORS: u64 = 33;

/// Lays out partitions without touching a disk.
///
/// Partitions without a `start` begin at the previous partition's end,
/// rounded up to the grain. A partition without a `size` extends to the last
/// usable sector.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignedLayout;

fn align_up(sector: u64, grain: u64) -> u64 {
  sector.div_ceil(grain) * grain
}

impl PartitionSynthesizer for AlignedLayout {
  fn synthesize(&self, size_bytes: u64, table: &TableSpec) -> Result<PartitionTable, ImageError> {
    let total = size_bytes / SECTOR_SIZE;
    let reserved = match table.label {
      Label::Gpt => GPT_BACKUP_SECTORS + 1,
      Label::Dos => 1,
    };
    if total < GRAIN + reserved {
      return Err(ImageError::TooSmall(size_bytes));
    }
    let first = GRAIN;
    let last = total - reserved;

    let mut partitions = Vec::with_capacity(table.partitions.len());
    let mut cursor = first;
    for (index, spec) in table.partitions.iter().enumerate() {
      let start = match spec.start()? {
        Some(start) => start,
        None => align_up(cursor, GRAIN),
      };
      if start < first {
        return Err(ImageError::BeforeFirstUsable {
          partition: spec.describe(index),
          start,
          first,
        });
      }
      if start < cursor {
        return Err(ImageError::Overlap {
          partition: spec.describe(index),
          start,
          previous_end: cursor - 1,
        });
      }
      if start > last {
        return Err(ImageError::OutOfRange {
          partition: spec.describe(index),
          end: start,
          last,
        });
      }

      let size = match spec.size()? {
        Some(size) => size,
        None => last + 1 - start,
      };
      let end = start.checked_add(size).ok_or_else(|| ImageError::OutOfRange {
        partition: spec.describe(index),
        end: u64::MAX,
        last,
      })?;
      if size == 0 || end - 1 > last {
        return Err(ImageError::OutOfRange {
          partition: spec.describe(index),
          end: end.saturating_sub(1),
          last,
        });
      }

      debug!(partition = %spec.describe(index), start, size, "placed partition");
      partitions.push(Partition::resolved(spec, start, size));
      cursor = end;
    }

    Ok(PartitionTable {
      label: table.label,
      uuid: table.uuid.clone(),
      partitions,
    })
  }
}

//! Implementation of the `mpp` command.
//!
//! Reads one manifest, expands every directive and writes the result. The
//! destination is only touched once the whole document expanded cleanly.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::info;

use mpp_lib::depsolve::{DepsolveSession, DnfJsonSolver};
use mpp_lib::image::{AlignedLayout, PartitionSynthesizer, SfdiskSynthesizer};
use mpp_lib::platform::arch::host_arch;
use mpp_lib::preprocess::{PreprocessConfig, Preprocessor, to_json_string};
use mpp_lib::vars::parse_override;

use crate::PartitionTool;

/// Arguments of one preprocessing run.
pub struct PreprocessArgs {
  pub src: PathBuf,
  pub dst: PathBuf,
  pub cache: Option<PathBuf>,
  pub import_dirs: Vec<PathBuf>,
  pub sort_keys: bool,
  pub defines: Vec<String>,
  pub depsolver: Option<PathBuf>,
  pub partition_tool: PartitionTool,
}

fn overrides(defines: &[String]) -> Result<Map<String, Value>> {
  let mut overrides = Map::new();
  for definition in defines {
    let (name, value) = parse_override(definition)?;
    overrides.insert(name, value);
  }
  Ok(overrides)
}

/// Execute the preprocess command.
pub fn cmd_preprocess(args: PreprocessArgs) -> Result<()> {
  let started = Instant::now();

  let mut defaults = Map::new();
  defaults.insert("arch".to_string(), Value::String(host_arch()));
  let config = PreprocessConfig {
    search_dirs: args.import_dirs,
    defaults,
    overrides: overrides(&args.defines)?,
    sort_keys: args.sort_keys,
  };

  let solver = match args.depsolver {
    Some(program) => DnfJsonSolver::new(program),
    None => DnfJsonSolver::default(),
  };
  let mut session =
    DepsolveSession::new(Box::new(solver), args.cache).context("Failed to set up dependency resolution")?;

  let builtin = AlignedLayout;
  let sfdisk = SfdiskSynthesizer::default();
  let partitions: &dyn PartitionSynthesizer = match args.partition_tool {
    PartitionTool::Builtin => &builtin,
    PartitionTool::Sfdisk => &sfdisk,
  };

  let expanded = Preprocessor::new(&config, partitions).run_file(&args.src, &mut session)?;
  let text = to_json_string(&expanded)?;

  if args.dst.as_os_str() == "-" {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes()).context("Failed to write to stdout")?;
    stdout.flush().context("Failed to write to stdout")?;
  } else {
    fs::write(&args.dst, &text).with_context(|| format!("Failed to write {}", args.dst.display()))?;
  }

  info!(
    src = %args.src.display(),
    dst = %args.dst.display(),
    elapsed = %humantime::format_duration(started.elapsed()),
    "manifest written"
  );
  Ok(())
}

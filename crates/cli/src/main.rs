mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::cmd::{PreprocessArgs, cmd_preprocess};
use crate::output::print_error;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum PartitionTool {
  /// Compute aligned offsets in-process
  #[default]
  Builtin,
  /// Ask sfdisk to lay out a scratch image
  Sfdisk,
}

/// Expand mpp directives in an osbuild manifest
#[derive(Parser)]
#[command(name = "mpp")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Manifest to read
  src: PathBuf,

  /// Where to write the expanded manifest ("-" for stdout)
  dst: PathBuf,

  /// Package metadata cache directory (a temporary one is used otherwise)
  #[arg(long, value_name = "DIR")]
  cache: Option<PathBuf>,

  /// Additional directory to search for imports
  #[arg(short = 'I', long = "import-dir", value_name = "DIR")]
  import_dirs: Vec<PathBuf>,

  /// Sort object keys in the output
  #[arg(long)]
  sort_keys: bool,

  /// Override a variable; the value is a literal, a bare name means true
  #[arg(short = 'D', long = "define", value_name = "NAME[=VALUE]")]
  defines: Vec<String>,

  /// Dependency solver to run for mpp-depsolve
  #[arg(long, value_name = "PATH")]
  depsolver: Option<PathBuf>,

  /// How mpp-define-image computes partition offsets
  #[arg(long, value_enum, default_value_t)]
  partition_tool: PartitionTool,

  /// Log progress to stderr
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "info" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let args = PreprocessArgs {
    src: cli.src,
    dst: cli.dst,
    cache: cli.cache,
    import_dirs: cli.import_dirs,
    sort_keys: cli.sort_keys,
    defines: cli.defines,
    depsolver: cli.depsolver,
    partition_tool: cli.partition_tool,
  };

  match cmd_preprocess(args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

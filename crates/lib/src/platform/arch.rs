use std::fmt;

/// CPU architectures, named the way package repositories name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
  Ppc64le,
  S390x,
  Riscv64,
}

impl Arch {
  /// Detect the architecture this binary runs on.
  pub fn current() -> Option<Self> {
    Self::from_rust(std::env::consts::ARCH)
  }

  /// Map a Rust target architecture name.
  pub fn from_rust(name: &str) -> Option<Self> {
    match name {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      // Only the little-endian variant is packaged.
      "powerpc64" if cfg!(target_endian = "little") => Some(Self::Ppc64le),
      "s390x" => Some(Self::S390x),
      "riscv64" => Some(Self::Riscv64),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
      Self::Ppc64le => "ppc64le",
      Self::S390x => "s390x",
      Self::Riscv64 => "riscv64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// The host architecture name, falling back to Rust's own name for it.
pub fn host_arch() -> String {
  match Arch::current() {
    Some(arch) => arch.as_str().to_string(),
    None => std::env::consts::ARCH.to_string(),
  }
}

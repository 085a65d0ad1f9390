//! Host platform detection.

pub mod arch;

pub use arch::Arch;

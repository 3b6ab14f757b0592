//! Loading 32-bit i386 shared objects into 64-bit processes
//!
//! The loader maps an ELF32-i386 shared object into the low 32-bit range
//! of the address space, applies its REL relocations eagerly against
//! host-supplied symbols and the object's own exports, tightens page
//! protections to the union of the segment flags, and hands out 32-bit
//! entry addresses. Runtime-emitted trampolines bridge calls between the
//! guest's 32-bit world and the host's 64-bit libc in both directions.
//!
//! The host must be an x86_64 system with the Linux GDT layout, where
//! far calls can move between the 64-bit code segment and the 32-bit
//! compatibility segment.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

use typed_builder::TypedBuilder;

use reloc::{GlobDatPolicy, Strictness};

pub mod error;
pub mod format;
pub mod image;
pub mod loader;
pub mod mem;
pub mod parser;
pub mod prot;
pub mod reloc;
pub mod shim;
pub mod stack;

#[cfg(test)]
pub(crate) mod fixture;

pub use error::{Error, Result};
pub use loader::Loader;

#[derive(Debug, Clone, TypedBuilder)]
/// A configuration for loading a shared object. Primarily configures how
/// the relocator treats entries with no conventional handling.
pub struct Config {
    #[builder(default)]
    /// What to write for GLOB_DAT relocations
    glob_dat: GlobDatPolicy,
    #[builder(default)]
    /// What to do with relocation types outside the handled set
    strictness: Strictness,
}

impl Config {
    /// The GLOB_DAT policy
    pub fn glob_dat(&self) -> &GlobDatPolicy {
        &self.glob_dat
    }

    /// The handling of relocation types outside the handled set
    pub fn strictness(&self) -> Strictness {
        self.strictness
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

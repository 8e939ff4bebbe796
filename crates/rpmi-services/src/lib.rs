//! Service groups beyond the built-in base group.

#![forbid(unsafe_code)]

mod hsm;
mod sysmsi;
mod sysreset;

pub use hsm::*;
pub use sysmsi::*;
pub use sysreset::*;

#[cfg(test)]
pub(crate) mod testutil;

//! Library backing the `csetup` binary: a deterministic unified-diff patch
//! engine plus a manifest-driven component provisioner.

pub mod cli;
pub mod git;
pub mod manifest;
pub mod patch;
pub mod provision;
pub mod util;

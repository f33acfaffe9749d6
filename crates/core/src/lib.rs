//! patchdiff-core
//!
//! Provenance and orchestration substrate for patch-diff analysis of a binary
//! pair: job records, content-addressed artifact envelopes with an
//! append-only index, the audited stage pipeline, candidate ranking, and a
//! manual container normalizer for PE, ELF, and Mach-O.
//!
//! The binary differ, the decompiler, and the analysis provider are external
//! collaborators reached through the traits in [`services`].

pub mod artifacts;
pub mod audit;
pub mod binary;
pub mod config;
pub mod error;
pub mod hashing;
pub mod job;
pub mod model;
pub mod pipeline;
pub mod ranking;
pub mod services;
pub mod stages;
pub mod storage;
pub mod subprocess;

pub use error::{PatchdiffError, PatchdiffResult};

/// Returns the library version as encoded at compile time.
///
/// Stamped into every artifact envelope as `tool_version`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod pipeline;
pub mod verify;

pub use pipeline::*;
pub use verify::*;

use std::path::Path;

use anyhow::Result;
use patchdiff_core::config::{ConfigOverrides, PipelineConfig};

/// Load configuration and apply command-line overrides.
pub fn load_config(explicit: Option<&Path>, overrides: ConfigOverrides) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(explicit)?;
    overrides.apply(&mut config)?;
    Ok(config)
}

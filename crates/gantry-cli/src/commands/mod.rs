mod deploy;
mod doctor;
mod plan;

use std::path::Path;

use gantry_core::RawConfig;

pub use deploy::deploy;
pub use doctor::doctor;
pub use plan::plan;

/// `gantry.toml` with non-empty environment values laid over it.
pub(crate) fn load_config(project_dir: &Path) -> gantry_core::Result<RawConfig> {
    Ok(RawConfig::load(project_dir)?.overlay_env(|key| std::env::var(key).ok()))
}

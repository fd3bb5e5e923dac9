use std::path::PathBuf;

use gantry_core::PipelineConfig;
use sha2::{Digest, Sha256};

/// Inputs of the image build besides the source snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe {
    pub app_name: String,
    /// Pinned toolchain image, e.g. `rust:1.73`
    pub base_image: String,
    /// Platform the image is built for, e.g. `linux/amd64`
    pub platform: String,
    /// Entrypoint binary; `None` means discover it from the snapshot's Cargo.toml
    pub binary: Option<String>,
    /// Dockerfile inside the snapshot that replaces the generated one
    pub dockerfile: Option<PathBuf>,
}

impl BuildRecipe {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            base_image: config.build.base_image.clone(),
            platform: config.build.platform.clone(),
            binary: config.build.binary.clone(),
            dockerfile: config.build.dockerfile.as_ref().map(PathBuf::from),
        }
    }
}

/// Renders the single-stage Dockerfile: compile with the pinned toolchain,
/// then run the release binary as entrypoint.
pub struct DockerfileGenerator<'a> {
    recipe: &'a BuildRecipe,
    binary: &'a str,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(recipe: &'a BuildRecipe, binary: &'a str) -> Self {
        Self { recipe, binary }
    }

    pub fn render(&self) -> String {
        format!(
            r#"FROM --platform={platform} {base}
WORKDIR /{app}
COPY . .
RUN cargo build --release --bin {binary}
ENTRYPOINT ["./target/release/{binary}"]
"#,
            platform = self.recipe.platform,
            base = self.recipe.base_image,
            app = self.recipe.app_name,
            binary = self.binary,
        )
    }
}

/// Deterministic image tag for a build: identical inputs give identical
/// tags, any change to sources, Dockerfile or platform gives a new one.
pub fn content_tag(fingerprint: &str, dockerfile: &str, platform: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [fingerprint, dockerfile, platform] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_owned()
}

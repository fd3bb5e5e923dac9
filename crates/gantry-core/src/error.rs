use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Validation ──
    #[error("missing required config `{key}` (set [parameters].{key} in gantry.toml or {env})")]
    MissingParameter { key: &'static str, env: &'static str },

    #[error("missing required setting `{key}` for deploy mode '{mode}'")]
    MissingSetting { key: &'static str, mode: &'static str },

    #[error("invalid setting `{key}`: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("environment variable {0} is defined more than once in the service spec")]
    DuplicateEnvVar(String),

    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidImageReference {
        reference: String,
        reason: &'static str,
    },

    // ── Cargo project discovery ──
    #[error("cargo metadata failed for {manifest_path}: {detail}")]
    CargoMetadata {
        manifest_path: PathBuf,
        detail: String,
    },

    #[error("failed to resolve project directory {path}")]
    ProjectDirResolve {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no package found in {dir}")]
    NoPackageInDir { dir: PathBuf },

    #[error("no binary target in package '{package}' — set [build].binary or add a [[bin]]")]
    NoBinaryTarget { package: String },

    #[error(
        "multiple binary targets found: {}; set [build].binary or `default-run` to select one",
        names.join(", ")
    )]
    MultipleBinaries { names: Vec<String> },
}

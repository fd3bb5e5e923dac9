//! Entrypoint binary discovery via `cargo metadata`.
//!
//! Used when `[build].binary` is not set: the build snapshot's manifest is
//! inspected to find which binary `cargo build --release` produces and the
//! image should run.

use cargo_metadata::{MetadataCommand, TargetKind};
use std::path::{Path, PathBuf};

/// A binary target in a Cargo package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoBinary {
    /// Binary name (file under `target/release/`)
    pub name: String,
    pub src_path: PathBuf,
}

/// The package found at a directory, with its resolved entrypoint binary.
///
/// **Invariant:** `default_binary` names an entry of `binaries`.
#[derive(Debug, Clone)]
pub struct CargoProject {
    pub name: String,
    pub version: String,
    pub binaries: Vec<CargoBinary>,
    pub default_binary: String,
}

impl CargoProject {
    /// Discover the package whose `Cargo.toml` lives in `project_dir`.
    ///
    /// # Errors
    ///
    /// - [`Error::CargoMetadata`](crate::Error::CargoMetadata) if `cargo metadata` fails
    /// - [`Error::NoPackageInDir`](crate::Error::NoPackageInDir) for a virtual workspace root
    /// - [`Error::NoBinaryTarget`](crate::Error::NoBinaryTarget) for library-only packages
    /// - [`Error::MultipleBinaries`](crate::Error::MultipleBinaries) when the choice is ambiguous
    pub fn discover(project_dir: &Path) -> crate::Result<Self> {
        let manifest_path = project_dir.join("Cargo.toml");
        tracing::debug!(path = %manifest_path.display(), "running cargo metadata");

        let metadata = MetadataCommand::new()
            .manifest_path(&manifest_path)
            .no_deps()
            .exec()
            .map_err(|e| crate::Error::CargoMetadata {
                manifest_path: manifest_path.clone(),
                detail: e.to_string(),
            })?;

        let canonical_dir =
            project_dir
                .canonicalize()
                .map_err(|e| crate::Error::ProjectDirResolve {
                    path: project_dir.to_path_buf(),
                    source: e,
                })?;

        let package = metadata
            .packages
            .iter()
            .find(|p| {
                p.manifest_path
                    .as_std_path()
                    .parent()
                    .and_then(|d| d.canonicalize().ok())
                    .is_some_and(|d| d == canonical_dir)
            })
            .ok_or_else(|| crate::Error::NoPackageInDir {
                dir: canonical_dir.clone(),
            })?;

        let binaries: Vec<CargoBinary> = package
            .targets
            .iter()
            .filter(|t| t.kind.contains(&TargetKind::Bin))
            .map(|t| CargoBinary {
                name: t.name.clone(),
                src_path: PathBuf::from(t.src_path.as_std_path()),
            })
            .collect();

        let default_binary =
            Self::resolve_default_binary(&binaries, package.default_run.as_deref(), &package.name)?;

        tracing::debug!(
            name = %package.name,
            binary = %default_binary,
            binaries = binaries.len(),
            "cargo package discovered"
        );

        Ok(Self {
            name: package.name.to_string(),
            version: package.version.to_string(),
            binaries,
            default_binary,
        })
    }

    /// Select the entrypoint binary.
    ///
    /// Priority: `default-run`, then a sole binary, then the binary named
    /// after the package.
    fn resolve_default_binary(
        binaries: &[CargoBinary],
        default_run: Option<&str>,
        package_name: &str,
    ) -> crate::Result<String> {
        if let Some(name) = default_run
            && binaries.iter().any(|b| b.name == name)
        {
            return Ok(name.to_owned());
        }

        match binaries {
            [] => Err(crate::Error::NoBinaryTarget {
                package: package_name.to_owned(),
            }),
            [only] => Ok(only.name.clone()),
            _ if binaries.iter().any(|b| b.name == package_name) => Ok(package_name.to_owned()),
            _ => Err(crate::Error::MultipleBinaries {
                names: binaries.iter().map(|b| b.name.clone()).collect(),
            }),
        }
    }
}

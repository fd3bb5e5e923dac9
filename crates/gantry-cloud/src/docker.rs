use std::path::{Path, PathBuf};

use gantry_build::{BuildContext, BuildRecipe, DockerfileGenerator, content_tag};
use gantry_core::{CargoProject, ImageReference, LocalImage};
use secrecy::ExposeSecret;
use tempfile::TempDir;

use crate::client::GcloudClient;
use crate::command::CommandError;
use crate::executor::{CommandExecutor, RealExecutor, args};

/// Username docker expects when the password is a gcloud access token.
const TOKEN_USERNAME: &str = "oauth2accesstoken";

/// Builds images with the docker engine and pushes them to a registry.
#[derive(Debug, Clone)]
pub struct DockerClient<D: CommandExecutor = RealExecutor, G: CommandExecutor = RealExecutor> {
    docker: D,
    gcloud: GcloudClient<G>,
    registry_login: bool,
}

impl DockerClient<RealExecutor, RealExecutor> {
    pub fn new(registry_login: bool) -> Self {
        Self::with_executors(RealExecutor::docker(), RealExecutor::gcloud(), registry_login)
    }
}

impl<D: CommandExecutor, G: CommandExecutor> DockerClient<D, G> {
    pub fn with_executors(docker: D, gcloud: G, registry_login: bool) -> Self {
        Self {
            docker,
            gcloud: GcloudClient::with_executor(gcloud),
            registry_login,
        }
    }

    pub async fn version(&self) -> Result<String, CommandError> {
        let out = self
            .docker
            .exec(&args(["version", "--format", "{{.Server.Version}}"]))
            .await?;
        Ok(out.trim().to_owned())
    }

    // ── Build ──

    /// Build `context` into a local image tagged from its content.
    ///
    /// Takes ownership of the context; it is released together with the
    /// Dockerfile sandbox whether or not the build succeeds.
    pub async fn build(
        &self,
        context: BuildContext,
        recipe: &BuildRecipe,
    ) -> Result<LocalImage, BuildError> {
        let sandbox = tempfile::Builder::new()
            .prefix("gantry-build-")
            .tempdir()
            .map_err(|e| BuildError::Sandbox { source: e })?;

        let result = self.build_in(&context, &sandbox, recipe).await;

        if let Err(e) = context.release() {
            tracing::warn!(error = %e, "failed to remove build context");
        }
        let sandbox_path = sandbox.path().to_path_buf();
        if let Err(e) = sandbox.close() {
            tracing::warn!(
                path = %sandbox_path.display(),
                error = %e,
                "failed to remove build sandbox"
            );
        }

        result
    }

    async fn build_in(
        &self,
        context: &BuildContext,
        sandbox: &TempDir,
        recipe: &BuildRecipe,
    ) -> Result<LocalImage, BuildError> {
        let (dockerfile_path, dockerfile) = match &recipe.dockerfile {
            Some(relative) => {
                if !context.contains(relative) {
                    return Err(BuildError::MissingDockerfile(relative.clone()));
                }
                let path = context.path().join(relative);
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    BuildError::ReadDockerfile {
                        path: path.clone(),
                        source: e,
                    }
                })?;
                (path, content)
            }
            None => {
                let binary = match &recipe.binary {
                    Some(binary) => binary.clone(),
                    None => {
                        CargoProject::discover(context.path())
                            .map_err(|e| BuildError::Binary { source: e })?
                            .default_binary
                    }
                };
                let content = DockerfileGenerator::new(recipe, &binary).render();
                let path = sandbox.path().join("Dockerfile");
                std::fs::write(&path, &content).map_err(|e| BuildError::WriteDockerfile {
                    path: path.clone(),
                    source: e,
                })?;
                (path, content)
            }
        };

        let tag = format!(
            "{}:{}",
            recipe.app_name,
            content_tag(context.fingerprint(), &dockerfile, &recipe.platform)
        );

        tracing::info!(
            tag = %tag,
            platform = %recipe.platform,
            files = context.files().len(),
            "building image"
        );
        self.docker
            .exec_streaming(&[
                "build".to_owned(),
                "--platform".to_owned(),
                recipe.platform.clone(),
                "--file".to_owned(),
                path_arg(&dockerfile_path)?,
                "--tag".to_owned(),
                tag.clone(),
                path_arg(context.path())?,
            ])
            .await
            .map_err(|e| BuildError::Build { source: e })?;

        let id = self
            .docker
            .exec(&args(["image", "inspect", "--format", "{{.Id}}", &tag]))
            .await
            .map_err(|e| BuildError::Inspect { source: e })?;

        Ok(LocalImage {
            id: id.trim().to_owned(),
            tag,
        })
    }

    // ── Publish ──

    /// Push `image` to `registry` and return its digest-qualified reference.
    pub async fn publish(
        &self,
        image: &LocalImage,
        registry: &str,
    ) -> Result<ImageReference, PublishError> {
        if self.registry_login {
            self.login(registry).await?;
        }

        let remote = format!("{registry}:{}", image.tag_suffix());

        self.docker
            .exec(&args(["tag", &image.tag, &remote]))
            .await
            .map_err(|e| PublishError::Tag { source: e })?;

        tracing::info!(remote = %remote, "pushing image");
        self.docker
            .exec_streaming(&args(["push", &remote]))
            .await
            .map_err(|e| PublishError::Push { source: e })?;

        let out = self
            .docker
            .exec(&args([
                "image",
                "inspect",
                "--format",
                "{{json .RepoDigests}}",
                &remote,
            ]))
            .await
            .map_err(|e| PublishError::Inspect { source: e })?;

        let digests: Vec<String> =
            serde_json::from_str(out.trim()).map_err(|e| PublishError::Decode { source: e })?;

        let prefix = format!("{registry}@");
        let reference = digests
            .iter()
            .find(|d| d.starts_with(&prefix))
            .ok_or_else(|| PublishError::NoDigest {
                registry: registry.to_owned(),
            })?;

        ImageReference::parse(reference).map_err(|e| PublishError::InvalidReference { source: e })
    }

    async fn login(&self, registry: &str) -> Result<(), PublishError> {
        let host = registry.split('/').next().unwrap_or(registry);
        let token = self
            .gcloud
            .access_token()
            .await
            .map_err(|e| PublishError::Auth { source: e })?;

        self.docker
            .exec_with_stdin(
                &args([
                    "login",
                    "--username",
                    TOKEN_USERNAME,
                    "--password-stdin",
                    &format!("https://{host}"),
                ]),
                token.expose_secret().as_bytes(),
            )
            .await
            .map_err(|e| PublishError::Login {
                host: host.to_owned(),
                source: e,
            })?;

        Ok(())
    }
}

fn path_arg(path: &Path) -> Result<String, BuildError> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| BuildError::InvalidPath(path.to_path_buf()))
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to create build sandbox")]
    Sandbox { source: std::io::Error },

    #[error("could not determine the binary to run")]
    Binary { source: gantry_core::Error },

    #[error("dockerfile {0} is not part of the build context")]
    MissingDockerfile(PathBuf),

    #[error("failed to read dockerfile at {path}")]
    ReadDockerfile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write dockerfile at {path}")]
    WriteDockerfile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("image build failed")]
    Build { source: CommandError },

    #[error("failed to inspect built image")]
    Inspect { source: CommandError },
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to obtain registry credentials")]
    Auth { source: CommandError },

    #[error("docker login to {host} failed")]
    Login { host: String, source: CommandError },

    #[error("failed to tag image for the registry")]
    Tag { source: CommandError },

    #[error("image push failed")]
    Push { source: CommandError },

    #[error("failed to inspect pushed image")]
    Inspect { source: CommandError },

    #[error("unexpected repo digest listing")]
    Decode { source: serde_json::Error },

    #[error("registry {registry} reported no digest for the pushed image")]
    NoDigest { registry: String },

    #[error("registry returned an invalid image reference")]
    InvalidReference { source: gantry_core::Error },
}

//! Build, publish and deploy a containerized Rust service to Google Cloud.
//!
//! This crate holds the deploy pipeline and re-exports the gantry sub-crates.
//!
//! # Pipeline
//!
//! ```text
//! Validating → Building → Publishing → Deploying → Waiting → Done
//!      └───────────┴───────────┴───────────┴──────────┴──→ Failed
//! ```
//!
//! | Stage | Seam | Production implementation |
//! |-------|------|---------------------------|
//! | Building | [`ImageBuilder`] | [`cloud::DockerClient`] |
//! | Publishing | [`RegistryPublisher`] | [`cloud::DockerClient`] |
//! | Deploying | [`DeployTarget`] | [`Target`] (Cloud Run, provision or instance) |
//! | Waiting | [`OperationWaiter`] | [`cloud::CompletionWaiter`] |
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use gantry::cloud::{CompletionWaiter, DockerClient, HttpTransport};
//! use gantry::{Pipeline, RawConfig, Target};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let raw = RawConfig::load(Path::new("."))?.overlay_env(|k| std::env::var(k).ok());
//! let docker = DockerClient::new(raw.deploy.registry_login);
//! let transport = HttpTransport::new();
//! let waiter = CompletionWaiter::new(transport.clone(), Duration::from_secs(2));
//!
//! let mut pipeline = Pipeline::new(".", docker.clone(), docker, waiter);
//! let outcome = pipeline
//!     .run(raw, |config| Target::select(config, transport))
//!     .await?;
//! println!("{}", outcome.url);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pipeline;
pub mod stages;
pub mod state;
pub mod target;

pub use error::PipelineError;
pub use pipeline::{DeployOutcome, Pipeline};
pub use stages::{DeployTarget, ImageBuilder, OperationWaiter, RegistryPublisher};
pub use state::PipelineState;
pub use target::Target;

// Core types flattened into the root namespace for convenience.
pub use gantry_core::*;

/// Build context snapshots and Dockerfile generation.
pub mod build {
    pub use gantry_build::*;
}

/// Image build/publish, deployment targets and operation polling.
pub mod cloud {
    pub use gantry_cloud::*;
}

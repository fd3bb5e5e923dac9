//! Core types and configuration for gantry.
//!
//! This crate defines the `gantry.toml` schema ([`RawConfig`]) and its
//! validated form ([`PipelineConfig`]), the desired-state description of the
//! running service ([`ServiceSpec`]), image references, Cargo binary
//! discovery ([`CargoProject`]), and shared error types.

pub mod cargo;
pub mod config;
pub mod error;
pub mod image;
pub mod spec;

pub use cargo::{CargoBinary, CargoProject};
pub use config::{
    AuthorizedNetwork, BuildConfig, CONFIG_FILE, DeployConfig, DeployMode, InstanceConfig,
    Parameter, Parameters, PipelineConfig, ProvisionConfig, RawConfig, ScheduledJob,
    ServiceConfig,
};
pub use error::{Error, Result};
pub use image::{ImageReference, LocalImage};
pub use spec::{EnvVar, Ingress, ServiceSpec};

//! Build context snapshots and Dockerfile generation for gantry.
//!
//! # Build stage
//!
//! ```text
//! gantry deploy
//!   1. Snapshot   ── BuildContext::collect(root, include/exclude) → temp dir
//!   2. Dockerfile ── DockerfileGenerator::render() (or [build].dockerfile)
//!   3. Tag        ── content_tag(fingerprint, Dockerfile, platform)
//!   4. Build      ── docker build --platform <platform> (gantry-cloud)
//! ```
//!
//! # Snapshot strategy
//!
//! The snapshot is a private copy of the selected files, so edits on the host
//! after collection never reach an in-progress build. Selection is by path
//! prefix: a rule `src` covers `src/` and everything beneath it. `.gitignore`
//! is not consulted; the include/exclude lists are the whole truth.

pub mod context;
pub mod dockerfile;

pub use context::{BuildContext, ContextError, ContextRules};
pub use dockerfile::{BuildRecipe, DockerfileGenerator, content_tag};

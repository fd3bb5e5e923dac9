//! Container image handles.

use std::fmt;

/// A locally built image, prior to publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    /// Engine image id (`sha256:...`)
    pub id: String,
    /// Local `name:tag`; the tag is derived from the build inputs
    pub tag: String,
}

impl LocalImage {
    /// The tag part of [`tag`](Self::tag).
    pub fn tag_suffix(&self) -> &str {
        self.tag
            .rsplit_once(':')
            .map(|(_, t)| t)
            .unwrap_or("latest")
    }
}

/// Immutable, digest-qualified reference: `<repository>@sha256:<64 hex>`.
///
/// Only constructible through [`ImageReference::parse`], so holders can rely
/// on the reference being content-addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    reference: String,
    at: usize,
}

impl ImageReference {
    pub fn parse(reference: &str) -> crate::Result<Self> {
        let invalid = |reason| crate::Error::InvalidImageReference {
            reference: reference.to_owned(),
            reason,
        };

        let (repository, digest) = reference
            .rsplit_once('@')
            .ok_or_else(|| invalid("missing @sha256 digest"))?;

        if repository.is_empty() {
            return Err(invalid("empty repository"));
        }
        if repository.chars().any(char::is_whitespace) {
            return Err(invalid("repository contains whitespace"));
        }

        let hex = digest
            .strip_prefix("sha256:")
            .ok_or_else(|| invalid("digest algorithm must be sha256"))?;
        if hex.len() != 64 || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(invalid("digest must be 64 lowercase hex characters"));
        }

        Ok(Self {
            reference: reference.to_owned(),
            at: repository.len(),
        })
    }

    pub fn repository(&self) -> &str {
        &self.reference[..self.at]
    }

    /// `sha256:<hex>`
    pub fn digest(&self) -> &str {
        &self.reference[self.at + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

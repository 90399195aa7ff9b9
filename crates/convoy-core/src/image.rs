//! Container image references.
//!
//! Accepts `repo`, `repo:tag`, `repo@digest` and registry-qualified forms
//! such as `quay.io:443/org/app:v2`. A `:` only starts a tag when it comes
//! after the last `/`, so registry ports are not mistaken for tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Image {
    /// Repository, including any registry host.
    pub repo: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("empty image reference")]
    Empty,
    #[error("invalid image reference: {0}")]
    Invalid(String),
}

impl Image {
    pub fn parse(reference: &str) -> Result<Self, ImageError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImageError::Empty);
        }

        if let Some((repo, digest)) = reference.split_once('@') {
            if repo.is_empty() || digest.is_empty() {
                return Err(ImageError::Invalid(reference.to_string()));
            }
            return Ok(Image {
                repo: repo.to_string(),
                tag: None,
                digest: Some(digest.to_string()),
            });
        }

        let name_start = reference.rfind('/').map_or(0, |i| i + 1);
        match reference[name_start..].rfind(':') {
            Some(offset) => {
                let split = name_start + offset;
                let (repo, tag) = (&reference[..split], &reference[split + 1..]);
                if repo.is_empty() || tag.is_empty() {
                    return Err(ImageError::Invalid(reference.to_string()));
                }
                Ok(Image {
                    repo: repo.to_string(),
                    tag: Some(tag.to_string()),
                    digest: None,
                })
            }
            None => Ok(Image {
                repo: reference.to_string(),
                tag: None,
                digest: None,
            }),
        }
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repo)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")
        } else if let Some(tag) = &self.tag {
            write!(f, ":{tag}")
        } else {
            Ok(())
        }
    }
}

impl FromStr for Image {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Image::parse(s)
    }
}

impl TryFrom<String> for Image {
    type Error = ImageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Image::parse(&value)
    }
}

impl From<Image> for String {
    fn from(image: Image) -> Self {
        image.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repo_and_tag() {
        let image = Image::parse("remind101/acme-inc:latest").unwrap();
        assert_eq!(image.repo, "remind101/acme-inc");
        assert_eq!(image.tag.as_deref(), Some("latest"));
        assert_eq!(image.to_string(), "remind101/acme-inc:latest");
    }

    #[test]
    fn parse_untagged() {
        let image = Image::parse("ubuntu").unwrap();
        assert_eq!(image.tag, None);
        assert_eq!(image.to_string(), "ubuntu");
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let image = Image::parse("registry.local:5000/team/app").unwrap();
        assert_eq!(image.repo, "registry.local:5000/team/app");
        assert_eq!(image.tag, None);

        let tagged = Image::parse("registry.local:5000/team/app:v2").unwrap();
        assert_eq!(tagged.repo, "registry.local:5000/team/app");
        assert_eq!(tagged.tag.as_deref(), Some("v2"));
    }

    #[test]
    fn parse_digest() {
        let image = Image::parse("acme@sha256:abc123").unwrap();
        assert_eq!(image.digest.as_deref(), Some("sha256:abc123"));
        assert_eq!(image.to_string(), "acme@sha256:abc123");
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!(Image::parse("  "), Err(ImageError::Empty));
        assert!(matches!(Image::parse("acme:"), Err(ImageError::Invalid(_))));
        assert!(matches!(Image::parse("@sha256:1"), Err(ImageError::Invalid(_))));
    }
}

//! Image reference parsing (C1): splitting a `<transport>:<ref>` string into
//! a typed [`Reference`] and classifying bare paths as file or directory.

use crate::error::{ErrorKind, SifError};
use anyhow::anyhow;
use std::{fmt, path::Path, str::FromStr};

/// A tagged sum over the transports a reference may name. Transport is
/// mandatory on the wire; a bare path is classified against the filesystem
/// into [`Reference::File`] or [`Reference::Dir`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reference {
    /// A single-file immutable image on the local filesystem.
    File(String),

    /// A sandbox directory tree on the local filesystem.
    Dir(String),

    /// A join of a running, named instance.
    Instance(String),

    /// An OCI registry image: `registry/repository[:tag|@digest]`.
    Oci {
        registry: String,
        repository: String,
        tag_or_digest: String,
    },

    /// An OCI artifact fetched over ORAS.
    Oras {
        registry: String,
        repository: String,
        tag_or_digest: String,
    },

    /// A library-protocol reference, optionally with an explicit host.
    Library {
        host: Option<String>,
        path: String,
        tag: String,
    },

    /// A plain HTTP(S) URL.
    Http(String),
}

const RECOGNIZED_TRANSPORTS: &[&str] = &[
    "file", "dir", "instance", "docker", "oci", "oras", "library", "http", "https", "shub",
];

impl Reference {
    /// Parse a reference string exactly as the command line receives it.
    ///
    /// Splits on the first `:` that is followed by `//` (a URI-style
    /// authority) or that names one of the recognized transports. A string
    /// with no recognized transport prefix is treated as a bare path and
    /// classified by `stat`.
    pub fn parse(raw: &str) -> Result<Self, SifError> {
        if let Some((transport, rest)) = split_transport(raw) {
            return Self::from_transport(transport, rest);
        }
        if let Some(scheme) = unrecognized_uri_scheme(raw) {
            return Err(SifError::new(
                ErrorKind::UnsupportedTransport,
                anyhow!("unsupported transport: {}", scheme),
            ));
        }
        Self::classify_bare_path(raw)
    }

    fn from_transport(transport: &str, rest: &str) -> Result<Self, SifError> {
        match transport {
            "file" => Ok(Reference::File(rest.to_string())),
            "dir" => Ok(Reference::Dir(rest.to_string())),
            "instance" => {
                if rest.is_empty() {
                    return Err(SifError::new(
                        ErrorKind::InvalidReference,
                        anyhow!("instance reference is missing a name"),
                    ));
                }
                Ok(Reference::Instance(rest.to_string()))
            }
            "oci" | "docker" => {
                let (registry, repository, tag_or_digest) = split_registry_ref(rest)?;
                Ok(Reference::Oci {
                    registry,
                    repository,
                    tag_or_digest,
                })
            }
            "oras" => {
                let (registry, repository, tag_or_digest) = split_registry_ref(rest)?;
                Ok(Reference::Oras {
                    registry,
                    repository,
                    tag_or_digest,
                })
            }
            "library" => {
                let (host, path, tag) = split_library_ref(rest)?;
                Ok(Reference::Library { host, path, tag })
            }
            "http" | "https" => Ok(Reference::Http(format!("{}:{}", transport, rest))),
            "shub" => Err(SifError::new(
                ErrorKind::UnsupportedTransport,
                anyhow!("shub transport is no longer served upstream"),
            )),
            other => Err(SifError::new(
                ErrorKind::UnsupportedTransport,
                anyhow!("unsupported transport: {}", other),
            )),
        }
    }

    fn classify_bare_path(raw: &str) -> Result<Self, SifError> {
        let path = Path::new(raw);
        if path.is_dir() {
            return Ok(Reference::Dir(raw.to_string()));
        }
        if path.is_file() {
            return Ok(Reference::File(raw.to_string()));
        }
        Err(SifError::new(
            ErrorKind::NotFound,
            anyhow!("no such image: {}", raw),
        ))
    }
}

/// Split off a recognized transport prefix, if any. `instance://foo` and
/// `oci://registry/repo:tag` both split on the first `:`; the `//` is kept
/// attached to `rest` and stripped by the per-transport parser.
fn split_transport(raw: &str) -> Option<(&str, &str)> {
    let idx = raw.find(':')?;
    let (transport, rest) = raw.split_at(idx);
    let rest = &rest[1..];
    if !RECOGNIZED_TRANSPORTS.contains(&transport) {
        return None;
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    Some((transport, rest))
}

/// Detect a `scheme://...` prefix whose scheme is not one of
/// [`RECOGNIZED_TRANSPORTS`], so callers can report `unsupported-transport`
/// instead of falling through to bare-path classification (which would
/// `stat` the literal `scheme://...` string and misreport `not-found`). A
/// scheme is one or more letters/digits/`+`/`-`/`.` immediately followed by
/// `://`, per the generic URI grammar.
fn unrecognized_uri_scheme(raw: &str) -> Option<&str> {
    let idx = raw.find("://")?;
    let scheme = &raw[..idx];
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    if RECOGNIZED_TRANSPORTS.contains(&scheme) {
        return None;
    }
    Some(scheme)
}

fn split_registry_ref(rest: &str) -> Result<(String, String, String), SifError> {
    let rest = rest.trim_start_matches('/');
    let (registry, path) = rest.split_once('/').ok_or_else(|| {
        SifError::new(
            ErrorKind::InvalidReference,
            anyhow!("missing repository in reference: {}", rest),
        )
    })?;

    if let Some((repository, digest)) = path.split_once('@') {
        return Ok((
            registry.to_string(),
            repository.to_string(),
            format!("@{}", digest),
        ));
    }
    if let Some((repository, tag)) = path.rsplit_once(':') {
        return Ok((registry.to_string(), repository.to_string(), tag.to_string()));
    }
    Ok((registry.to_string(), path.to_string(), "latest".to_string()))
}

fn split_library_ref(rest: &str) -> Result<(Option<String>, String, String), SifError> {
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        return Err(SifError::new(
            ErrorKind::InvalidReference,
            anyhow!("empty library reference"),
        ));
    }

    let (host, rest) = match rest.split_once('/') {
        Some((candidate, remainder)) if candidate.contains('.') => {
            (Some(candidate.to_string()), remainder)
        }
        _ => (None, rest),
    };

    let (path, tag) = rest
        .rsplit_once(':')
        .map(|(p, t)| (p.to_string(), t.to_string()))
        .unwrap_or_else(|| (rest.to_string(), "latest".to_string()));

    Ok((host, path, tag))
}

impl FromStr for Reference {
    type Err = SifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::File(p) => write!(f, "file:{}", p),
            Reference::Dir(p) => write!(f, "dir:{}", p),
            Reference::Instance(name) => write!(f, "instance://{}", name),
            Reference::Oci {
                registry,
                repository,
                tag_or_digest,
            } => write!(f, "oci://{}/{}{}", registry, repository, tag_suffix(tag_or_digest)),
            Reference::Oras {
                registry,
                repository,
                tag_or_digest,
            } => write!(
                f,
                "oras://{}/{}{}",
                registry,
                repository,
                tag_suffix(tag_or_digest)
            ),
            Reference::Library { host, path, tag } => match host {
                Some(h) => write!(f, "library://{}/{}:{}", h, path, tag),
                None => write!(f, "library://{}:{}", path, tag),
            },
            Reference::Http(url) => write!(f, "{}", url),
        }
    }
}

fn tag_suffix(tag_or_digest: &str) -> String {
    if tag_or_digest.starts_with('@') {
        tag_or_digest.to_string()
    } else {
        format!(":{}", tag_or_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_reference() {
        let r = Reference::parse("instance://foo").unwrap();
        assert_eq!(r, Reference::Instance("foo".to_string()));
    }

    #[test]
    fn instance_reference_without_name_fails() {
        let err = Reference::parse("instance://").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
    }

    #[test]
    fn oci_reference_with_tag() {
        let r = Reference::parse("oci://docker.io/library/ubuntu:22.04").unwrap();
        assert_eq!(
            r,
            Reference::Oci {
                registry: "docker.io".to_string(),
                repository: "library/ubuntu".to_string(),
                tag_or_digest: "22.04".to_string(),
            }
        );
    }

    #[test]
    fn oci_reference_defaults_to_latest() {
        let r = Reference::parse("docker://docker.io/library/ubuntu").unwrap();
        assert_eq!(
            r,
            Reference::Oci {
                registry: "docker.io".to_string(),
                repository: "library/ubuntu".to_string(),
                tag_or_digest: "latest".to_string(),
            }
        );
    }

    #[test]
    fn oci_reference_with_digest() {
        let r = Reference::parse("oci://docker.io/library/ubuntu@sha256:abc").unwrap();
        assert_eq!(
            r,
            Reference::Oci {
                registry: "docker.io".to_string(),
                repository: "library/ubuntu".to_string(),
                tag_or_digest: "@sha256:abc".to_string(),
            }
        );
    }

    #[test]
    fn library_reference_with_host() {
        let r = Reference::parse("library://custom.host/collection/image:1.0").unwrap();
        assert_eq!(
            r,
            Reference::Library {
                host: Some("custom.host".to_string()),
                path: "collection/image".to_string(),
                tag: "1.0".to_string(),
            }
        );
    }

    #[test]
    fn library_reference_without_host() {
        let r = Reference::parse("library://collection/image").unwrap();
        assert_eq!(
            r,
            Reference::Library {
                host: None,
                path: "collection/image".to_string(),
                tag: "latest".to_string(),
            }
        );
    }

    #[test]
    fn http_reference_round_trips() {
        let r = Reference::parse("https://example.com/image.sif").unwrap();
        assert_eq!(r, Reference::Http("https://example.com/image.sif".to_string()));
        assert_eq!(r.to_string(), "https://example.com/image.sif");
    }

    #[test]
    fn unrecognized_transport_fails() {
        let err = Reference::parse("ftp://example.com/image.sif").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedTransport);
    }

    #[test]
    fn shub_transport_is_explicitly_unsupported() {
        let err = Reference::parse("shub://vendor/image").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedTransport);
    }

    #[test]
    fn nonexistent_bare_path_fails() {
        let err = Reference::parse("/no/such/path-xyz").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn existing_dir_classifies_as_dir() {
        let dir = std::env::temp_dir();
        let r = Reference::parse(dir.to_str().unwrap()).unwrap();
        assert!(matches!(r, Reference::Dir(_)));
    }
}

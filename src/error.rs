//! Error taxonomy and error handling helpers.

use anyhow::Error;
use std::fmt;

/// Chain creates a string from an error stack.
pub fn chain(res: Error) -> String {
    res.chain()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

/// The kind of a [`SifError`], used to pick an exit code and to let callers
/// pattern-match on specific failure categories instead of sniffing error
/// message strings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The image reference could not be parsed.
    InvalidReference,

    /// The reference names a transport this build does not support.
    UnsupportedTransport,

    /// A transport fetcher hit a network error.
    Network,

    /// A transport fetcher failed to authenticate.
    Auth,

    /// The requested object does not exist.
    NotFound,

    /// A checksum or signature did not match.
    Integrity,

    /// The image artifact has an unrecognized format.
    UnsupportedFormat,

    /// The image artifact is structurally invalid.
    CorruptImage,

    /// A kernel mount failed.
    KernelMount,

    /// A FUSE mount failed.
    FuseMount,

    /// Composing an overlay filesystem failed.
    OverlayCompose,

    /// Launch was denied by policy before any side effect occurred.
    PolicyDenied,

    /// Two or more launcher options conflict.
    OptionConflict,

    /// The low-level OCI runtime returned an error.
    Runtime,

    /// An invariant inside the supervisor was violated; this indicates a bug.
    Supervisor,

    /// `instance start` was attempted for a name that already has a live record.
    InstanceExists,

    /// An instance operation named a record that does not exist.
    InstanceMissing,

    /// The requested subcommand is recognized but not implemented by this build.
    Unsupported,
}

impl ErrorKind {
    /// The process exit code a user should see for this kind of failure.
    ///
    /// Runtime errors forward the low-level runtime's own exit code instead,
    /// which is why this only covers the launcher-side kinds.
    pub fn exit_code(self) -> i32 {
        255
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ErrorKind::*;
        let s = match self {
            InvalidReference => "invalid-reference",
            UnsupportedTransport => "unsupported-transport",
            Network => "network",
            Auth => "auth",
            NotFound => "not-found",
            Integrity => "integrity",
            UnsupportedFormat => "unsupported-format",
            CorruptImage => "corrupt-image",
            KernelMount => "mount(kernel-mount)",
            FuseMount => "mount(fuse-mount)",
            OverlayCompose => "mount(overlay-compose)",
            PolicyDenied => "policy-denied",
            OptionConflict => "option-conflict",
            Runtime => "runtime",
            Supervisor => "supervisor",
            InstanceExists => "instance-exists",
            InstanceMissing => "instance-missing",
            Unsupported => "unsupported",
        };
        write!(f, "{}", s)
    }
}

/// A typed error carrying both a classification (for exit-code and policy
/// decisions) and the full causal chain (for diagnostics).
#[derive(Debug)]
pub struct SifError {
    kind: ErrorKind,
    source: Error,
}

impl SifError {
    /// Build a new typed error from a kind and an underlying [`anyhow::Error`].
    pub fn new(kind: ErrorKind, source: impl Into<Error>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    /// The classification of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// One-line representation of the full causal chain.
    pub fn chain(&self) -> String {
        chain_err(&self.source)
    }
}

fn chain_err(err: &Error) -> String {
    err.chain()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

impl fmt::Display for SifError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for SifError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn chain() {
        let first = anyhow!("error 1");
        let second = anyhow!("error 2");

        let res = super::chain(first.context(second));

        assert_eq!(res, "error 2: error 1");
    }

    #[test]
    fn sif_error_kind_and_chain() {
        let err = SifError::new(ErrorKind::OptionConflict, anyhow!("writable-tmpfs"));
        assert_eq!(err.kind(), ErrorKind::OptionConflict);
        assert_eq!(err.chain(), "writable-tmpfs");
        assert_eq!(err.kind().exit_code(), 255);
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::OptionConflict.to_string(), "option-conflict");
        assert_eq!(ErrorKind::InstanceMissing.to_string(), "instance-missing");
    }
}

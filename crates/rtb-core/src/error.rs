//! Error types for rtb

use thiserror::Error;

/// rtb error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// ROOT file read/write error
    #[error("ROOT file error: {0}")]
    RootFile(String),

    /// Columnar (Arrow / Parquet) I/O error
    #[error("Columnar I/O error: {0}")]
    Columnar(String),
}

impl Error {
    /// Prefix the message with `context`, keeping the variant.
    ///
    /// Parse errors from serde cannot be rebuilt and become
    /// [`Error::Validation`].
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), format!("{context}: {e}"))),
            Error::Validation(m) => Error::Validation(format!("{context}: {m}")),
            Error::Computation(m) => Error::Computation(format!("{context}: {m}")),
            Error::RootFile(m) => Error::RootFile(format!("{context}: {m}")),
            Error::Columnar(m) => Error::Columnar(format!("{context}: {m}")),
            other @ (Error::Json(_) | Error::Yaml(_)) => {
                Error::Validation(format!("{context}: {other}"))
            }
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_variant_and_prefixes_once() {
        let e = Error::Validation("schema mismatch".into())
            .context("dy_1.parquet")
            .context("sample 'dy'");
        assert!(matches!(e, Error::Validation(_)));
        assert_eq!(e.to_string(), "Validation error: sample 'dy': dy_1.parquet: schema mismatch");

        let e = Error::Columnar("bad footer".into()).context("sample 'zz'");
        assert_eq!(e.to_string(), "Columnar I/O error: sample 'zz': bad footer");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e = Error::from(io).context("a.arrow");
        match e {
            Error::Io(inner) => assert_eq!(inner.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected {other:?}"),
        }
    }
}

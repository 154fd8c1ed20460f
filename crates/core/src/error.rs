//! Error types for marginal synthesis.

/// Errors that can occur while measuring, reconciling or synthesizing marginals.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// Invalid parameter provided.
    #[error("invalid parameter: {msg}")]
    InvalidParameters {
        /// Human-readable error description.
        msg: String,
    },

    /// Numerical computation error.
    #[error("numerical error: {msg}")]
    NumericalError {
        /// Human-readable error description.
        msg: String,
    },

    /// Configuration error.
    #[error("configuration error: {msg}")]
    ConfigError {
        /// Human-readable error description.
        msg: String,
    },

    /// A measured marginal does not match the declared attribute catalog.
    #[error("domain mismatch for view [{view}]: expected {expected} cells, found {found}")]
    DomainMismatch {
        /// Attribute names of the offending view.
        view: String,
        /// Cell count implied by the attribute catalog.
        expected: usize,
        /// Cell count actually supplied.
        found: usize,
    },

    /// Rounding mode name that is not supported.
    #[error("unsupported rounding mode: {mode}")]
    UnsupportedRounding {
        /// The rejected mode name.
        mode: String,
    },
}

/// Result type for synthesis operations.
pub type Result<T> = std::result::Result<T, SynthError>;

impl SynthError {
    /// Create an invalid parameter error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameters { msg: msg.into() }
    }

    /// Create a numerical error.
    pub fn numerical<S: Into<String>>(msg: S) -> Self {
        Self::NumericalError { msg: msg.into() }
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError { msg: msg.into() }
    }

    /// Create a domain mismatch error for the view labelled `view`.
    pub fn domain_mismatch<S: Into<String>>(view: S, expected: usize, found: usize) -> Self {
        Self::DomainMismatch {
            view: view.into(),
            expected,
            found,
        }
    }

    /// Whether this error is a fatal configuration problem.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigError { .. }
                | Self::DomainMismatch { .. }
                | Self::UnsupportedRounding { .. }
        )
    }
}

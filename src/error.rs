//! Error types of the SROM optimizer.

use thiserror::Error;

use crate::parallel::CommError;

/// Invalid configuration or call argument.
///
/// The variants mirror the two ways an argument can be out of contract: it
/// has a wrong type (e.g., a string where an integer is expected, which can
/// happen only with loosely typed input such as JSON) or it has the right type
/// but a value outside of the accepted range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The argument has a wrong type.
    #[error("invalid type of `{param}`: expected {expected}")]
    Type {
        /// Name of the argument.
        param: String,
        /// Description of the expected type.
        expected: &'static str,
    },
    /// The argument has an unacceptable value.
    #[error("invalid value of `{param}`: {reason}")]
    Value {
        /// Name of the argument.
        param: String,
        /// Why the value is rejected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn type_error(param: impl Into<String>, expected: &'static str) -> Self {
        Self::Type {
            param: param.into(),
            expected,
        }
    }

    pub(crate) fn value_error(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Value {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`ConfigError::Type`].
    pub fn is_type(&self) -> bool {
        matches!(self, Self::Type { .. })
    }

    /// Returns `true` for [`ConfigError::Value`].
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value { .. })
    }

    /// Name of the rejected argument.
    pub fn param(&self) -> &str {
        match self {
            Self::Type { param, .. } | Self::Value { param, .. } => param,
        }
    }
}

/// Error returned from [`Optimizer`](crate::Optimizer) operations.
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// Invalid configuration or call argument.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Requested functionality exists only as a contract.
    #[error("{0} not implemented")]
    NotImplemented(&'static str),
    /// Failure of the messaging layer between workers.
    #[error(transparent)]
    Comm(#[from] CommError),
    /// No worker produced a candidate to return.
    #[error("no candidate found: {0}")]
    NoCandidate(String),
}

//! Errors raised while talking to the property API.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Failure of a gateway or cache operation.
///
/// Any non-success status maps to [`ApiError::Http`]; whether it was a client
/// or server error is only visible through [`ApiError::status`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
  /// Request could not be completed (connect, timeout, TLS).
  #[error("request to {url} could not be completed: {message}")]
  Network { url: String, message: String },

  /// Server answered with a non-success status.
  #[error("request to {url} failed with status {status}")]
  Http { url: String, status: u16 },

  /// Body did not match the expected shape.
  #[error("response from {url} could not be decoded: {message}")]
  Decode { url: String, message: String },

  /// Rejected on the client before dispatch.
  #[error(transparent)]
  Validation(#[from] ValidationErrors),

  /// A cached value could not be converted back into its type.
  #[error("cache entry {0}")]
  Cache(String),

  #[error("invalid url: {0}")]
  InvalidUrl(String),

  /// The task driving the request stopped before it produced a result.
  #[error("request interrupted: {0}")]
  Interrupted(String),
}

impl ApiError {
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Http { status, .. } => Some(*status),
      _ => None,
    }
  }

  pub fn is_not_found(&self) -> bool {
    self.status() == Some(404)
  }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

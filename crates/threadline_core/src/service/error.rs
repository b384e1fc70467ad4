//! Error type shared by the comment use-case services.

use crate::model::comment::CommentId;
use crate::repo::comment_repo::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, CommentServiceError>;

/// Errors surfaced to comment service callers.
#[derive(Debug)]
pub enum CommentServiceError {
    /// Caller input is malformed; never retried.
    InvalidArgument(String),
    /// Referenced comment does not exist.
    NotFound(CommentId),
    /// Store failure, passed through unchanged after retries.
    Store(StoreError),
}

impl CommentServiceError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl Display for CommentServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NotFound(id) => write!(f, "comment not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CommentServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CommentServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::ParentDeleted(id) => {
                Self::InvalidArgument(format!("cannot reply to deleted comment {id}"))
            }
            other => Self::Store(other),
        }
    }
}

use std::any::Any;

use thiserror::Error;

pub const CODE_TRANSFORM_FAILED: &str = "TRANSFORM_FAILED";
pub const CODE_PANIC: &str = "SERVER_PANIC";
pub const CODE_CANCELED: &str = "CLIENT_REQUEST_CANCELED";
pub const CODE_DEADLINE_EXCEEDED: &str = "CLIENT_REQUEST_DEADLINE_EXCEED";
pub const CODE_INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const CODE_INTERNAL: &str = "INTERNAL_ERROR";
pub const CODE_INVALID_ENUM: &str = "INVALID_ENUM";

/// Failure of one `par_map` invocation.
///
/// Callers see exactly one of these or a full ordered output, never both.
#[derive(Debug, Error)]
pub enum MapError<E> {
    /// The transform rejected the item at `index`.
    #[error("transform failed for item {index}: {source}")]
    Transform { index: usize, source: E },

    /// A transform (or a lane running it) panicked.
    #[error("panic while mapping{}: {message}", fmt_index(.index))]
    Panic {
        index: Option<usize>,
        message: String,
    },

    #[error("mapping cancelled")]
    Cancelled,

    #[error("mapping deadline exceeded")]
    DeadlineExceeded,

    #[error("worker count must be at least 1 for non-empty input (got {0})")]
    InvalidWorkerCount(usize),

    #[error("lane queue capacity must be at least 1")]
    InvalidQueueCapacity,

    /// Every lane exited before all results arrived without reporting why.
    #[error("mapping ended with {completed} of {expected} results")]
    Incomplete { completed: usize, expected: usize },
}

fn fmt_index(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" item {i}"),
        None => String::new(),
    }
}

impl<E> MapError<E> {
    /// Stable identifying code of the failure.
    pub fn code(&self) -> &'static str {
        match self {
            MapError::Transform { .. } => CODE_TRANSFORM_FAILED,
            MapError::Panic { .. } => CODE_PANIC,
            MapError::Cancelled => CODE_CANCELED,
            MapError::DeadlineExceeded => CODE_DEADLINE_EXCEEDED,
            MapError::InvalidWorkerCount(_) | MapError::InvalidQueueCapacity => {
                CODE_INVALID_REQUEST
            }
            MapError::Incomplete { .. } => CODE_INTERNAL,
        }
    }

    /// True when the invocation stopped because of the caller's own cancel or deadline.
    #[inline]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, MapError::Cancelled | MapError::DeadlineExceeded)
    }

    #[inline]
    pub fn is_transform(&self) -> bool {
        matches!(self, MapError::Transform { .. })
    }

    /// Input index the failure is attributed to, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            MapError::Transform { index, .. } => Some(*index),
            MapError::Panic { index, .. } => *index,
            _ => None,
        }
    }

    pub fn into_transform(self) -> Option<E> {
        match self {
            MapError::Transform { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failed lookup in an enum table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct LookupError {
    pub code: &'static str,
    pub message: String,
}

impl LookupError {
    pub fn invalid_enum(message: impl Into<String>) -> Self {
        Self {
            code: CODE_INVALID_ENUM,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

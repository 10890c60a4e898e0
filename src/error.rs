use std::fmt;
use thiserror::Error;

/// Boxed error returned by worker functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Store operation that failed, carried by [`Error::Persistence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    MarkConsuming,
    MarkConsumed,
    Get,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MarkConsuming => "mark consuming",
            Self::MarkConsumed => "mark consumed",
            Self::Get => "get",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Another invocation holds the claim for this identity. Let the queue redeliver.
    #[error("message consuming, try again later, id: {id}")]
    StillConsuming { id: String },

    #[error("record not found, id: {id}")]
    NotFound { id: String },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("worker consume failed, message: {message}")]
    Worker {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("persist {operation} failed, id: {id}")]
    Persistence {
        operation: Operation,
        id: String,
        #[source]
        source: Box<Error>,
    },

    /// The claim could not be removed after the worker failed. Supersedes the worker error.
    #[error("persist delete claim failed after worker error, id: {id}")]
    Rollback {
        id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the distinguished "still consuming" contention signal.
    pub fn is_still_consuming(&self) -> bool {
        matches!(self, Error::StillConsuming { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True when the caller's context was cancelled or its deadline passed.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// Attach the failed operation and identity. Cancellation passes through untouched.
    pub(crate) fn in_operation(self, operation: Operation, id: &str) -> Self {
        if self.is_cancellation() {
            return self;
        }
        Error::Persistence {
            operation,
            id: id.to_string(),
            source: Box::new(self),
        }
    }
}

impl<E> From<aws_sdk_dynamodb::error::SdkError<E>> for Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: aws_sdk_dynamodb::error::SdkError<E>) -> Self {
        Error::DynamoDb(err.to_string())
    }
}

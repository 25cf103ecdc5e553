use crate::client::ConnectError;
use crate::config::ConfigError;
use crate::service::CallError;
use pushcore::tuple::{ResultCode, TupleError};
use thiserror::Error;

/// Every failure the benchmark can surface, grouped by kind.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Fatal config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to connect to {address:?}: {source}")]
    Connection {
        address: String,
        #[source]
        source: ConnectError,
    },
    #[error("Error calling {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: CallError,
    },
    #[error("Error calling {operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: TupleError,
    },
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

impl BenchError {
    pub fn transport(operation: &'static str, source: CallError) -> Self {
        BenchError::Transport { operation, source }
    }

    pub fn decode(operation: &'static str, source: TupleError) -> Self {
        BenchError::Decode { operation, source }
    }

    /// The result code a caller should record for this failure.
    pub fn result_code(&self) -> ResultCode {
        match self {
            BenchError::Precondition(PreconditionError::UnexpectedResult { code, .. }) => *code,
            _ => ResultCode::DatabaseError,
        }
    }

    /// Name of the remote procedure that failed, if the error came from one.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            BenchError::Transport { operation, .. } | BenchError::Decode { operation, .. } => {
                Some(operation)
            }
            BenchError::Precondition(PreconditionError::UnexpectedResult { operation, .. }) => {
                Some(operation)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Please run subs first")]
    SubsNotRun,
    #[error("Generated id lists are out of step: {devices} devices, {subscriptions} subscriptions")]
    MismatchedLists { devices: usize, subscriptions: usize },
    #[error("Invalid parameter {name} = {value}: must be at least {min}")]
    InvalidParameter {
        name: &'static str,
        value: usize,
        min: usize,
    },
    #[error("{operation} returned {code}")]
    UnexpectedResult {
        operation: &'static str,
        code: ResultCode,
    },
}

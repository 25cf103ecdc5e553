use std::fmt;

use rmp::Marker;
use rmp::decode::{MarkerReadError, NumValueReadError, ValueReadError};
use rmp::encode::ValueWriteError;

#[derive(Debug)]
pub enum TupleError {
    Io(std::io::Error),
    InvalidMarker {
        expected: &'static str,
        found: Marker,
    },
    IntOutOfRange,
    InvalidUtf8(std::string::FromUtf8Error),
    Arity {
        record: &'static str,
        min: u32,
        max: u32,
        got: u32,
    },
    NegativeTime(i64),
    UnknownResultCode(i64),
    UnexpectedEof,
    LeftoverData(usize),
    ResultSet {
        expected: &'static str,
        got: usize,
    },
}

impl fmt::Display for TupleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TupleError::Io(e) => write!(f, "I/O error: {e}"),
            TupleError::InvalidMarker { expected, found } => {
                write!(f, "Expected {expected}, found marker {found:?}")
            }
            TupleError::IntOutOfRange => write!(f, "Integer does not fit the target type"),
            TupleError::InvalidUtf8(e) => write!(f, "String is not valid UTF-8: {e}"),
            TupleError::Arity {
                record,
                min,
                max,
                got,
            } => {
                if min == max {
                    write!(f, "{record} array len doesn't match: expected {min}, got {got}")
                } else {
                    write!(
                        f,
                        "{record} array len doesn't match: expected {min}..={max}, got {got}"
                    )
                }
            }
            TupleError::NegativeTime(t) => write!(f, "Negative millisecond timestamp: {t}"),
            TupleError::UnknownResultCode(c) => write!(f, "Unknown result code: {c}"),
            TupleError::UnexpectedEof => write!(f, "Unexpected end of tuple data"),
            TupleError::LeftoverData(n) => write!(f, "Leftover data after decoding: {n} bytes"),
            TupleError::ResultSet { expected, got } => {
                write!(f, "result set has {got} tuples, expected {expected}")
            }
        }
    }
}

impl std::error::Error for TupleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TupleError::Io(e) => Some(e),
            TupleError::InvalidUtf8(e) => Some(e),
            _ => None,
        }
    }
}

fn from_read_io(err: std::io::Error) -> TupleError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        TupleError::UnexpectedEof
    } else {
        TupleError::Io(err)
    }
}

impl From<std::io::Error> for TupleError {
    fn from(err: std::io::Error) -> Self {
        from_read_io(err)
    }
}

impl From<ValueWriteError> for TupleError {
    fn from(err: ValueWriteError) -> Self {
        match err {
            ValueWriteError::InvalidMarkerWrite(e) | ValueWriteError::InvalidDataWrite(e) => {
                TupleError::Io(e)
            }
        }
    }
}

impl From<MarkerReadError<std::io::Error>> for TupleError {
    fn from(err: MarkerReadError<std::io::Error>) -> Self {
        from_read_io(err.0)
    }
}

impl From<ValueReadError<std::io::Error>> for TupleError {
    fn from(err: ValueReadError<std::io::Error>) -> Self {
        match err {
            ValueReadError::InvalidMarkerRead(e) | ValueReadError::InvalidDataRead(e) => {
                from_read_io(e)
            }
            ValueReadError::TypeMismatch(found) => TupleError::InvalidMarker {
                expected: "value of the expected type",
                found,
            },
        }
    }
}

impl From<NumValueReadError<std::io::Error>> for TupleError {
    fn from(err: NumValueReadError<std::io::Error>) -> Self {
        match err {
            NumValueReadError::InvalidMarkerRead(e) | NumValueReadError::InvalidDataRead(e) => {
                from_read_io(e)
            }
            NumValueReadError::TypeMismatch(found) => TupleError::InvalidMarker {
                expected: "integer",
                found,
            },
            NumValueReadError::OutOfRange => TupleError::IntOutOfRange,
        }
    }
}

pub type Result<T> = std::result::Result<T, TupleError>;

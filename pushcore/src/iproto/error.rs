use pushcore_tuple::TupleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("tuple codec error: {0}")]
    Tuple(#[from] TupleError),
    #[error("malformed msgpack value: {0}")]
    Value(#[from] rmpv::decode::Error),
    #[error("invalid length prefix marker 0x{0:02x}")]
    InvalidLengthPrefix(u8),
    #[error("frame is too large (max: {max}, got: {got})")]
    FrameTooLarge { max: usize, got: u64 },
    #[error("response header has no sync")]
    MissingSync,
    #[error("invalid greeting: {0}")]
    BadGreeting(String),
    #[error("unexpected schema tuple: {0}")]
    BadSchemaTuple(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

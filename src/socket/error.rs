use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Socket is closed")]
    SocketClosed,
    #[error("Dial to {addr} timed out after {timeout:?}")]
    DialTimeout {
        addr: String,
        timeout: std::time::Duration,
    },
    #[error("Timed out waiting for the server greeting")]
    GreetingTimeout,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SocketError>;

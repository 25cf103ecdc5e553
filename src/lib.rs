pub use pushcore::{generator, tuple};

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod harness;
pub mod memory;
pub mod model;
pub mod progress;
pub mod request;
pub mod retry;
pub mod service;
pub mod socket;

pub use client::{ConnectError, ConnectOptions, Connection, connect};
pub use error::{BenchError, PreconditionError};
pub use service::{CallError, RemoteService};

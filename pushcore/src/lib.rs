pub use pushcore_tuple as tuple;

pub mod framing;
pub mod generator;
pub mod handshake;
pub mod iproto;
